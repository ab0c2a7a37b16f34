use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;

const METHOD_PREFIX: &str = "pbkdf2:sha256";
const SALT_LENGTH: usize = 16;
const DIGEST_LENGTH: usize = 32;

pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// PBKDF2-HMAC-SHA256 hasher producing `pbkdf2:sha256:<iterations>$<salt>$<hex>`.
#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { iterations: DEFAULT_ITERATIONS }
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self { iterations: iterations.max(1) }
    }

    pub fn hash(&self, password: &str) -> String {
        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SALT_LENGTH)
            .map(char::from)
            .collect();
        let digest = derive(password, &salt, self.iterations);
        format!("{}:{}${}${}", METHOD_PREFIX, self.iterations, salt, hex::encode(digest))
    }

    /// A well-formed hash no password matches, with this hasher's cost.
    /// Verifying against it makes a login for an unknown account take as
    /// long as one with a wrong password.
    pub fn dummy_hash(&self) -> String {
        format!("{}:{}$unknownaccount00${}", METHOD_PREFIX, self.iterations, "00".repeat(DIGEST_LENGTH))
    }

    /// Checks `password` against a stored hash. The iteration count is read
    /// from the hash itself, so hashes made with other settings still verify.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((method, rest)) = stored.split_once('$') else {
            return false;
        };
        let Some((salt, expected_hex)) = rest.split_once('$') else {
            return false;
        };
        let Some(iterations) = method
            .strip_prefix(METHOD_PREFIX)
            .and_then(|s| s.strip_prefix(':'))
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0) else {
            return false;
        };
        let Ok(expected) = hex::decode(expected_hex) else {
            return false;
        };

        let actual = derive(password, salt, iterations);
        constant_time_eq(&actual, &expected)
    }
}

fn derive(password: &str, salt: &str, iterations: u32) -> [u8; DIGEST_LENGTH] {
    let mut out = [0u8; DIGEST_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut out);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
