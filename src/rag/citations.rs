//! Chooses which retrieved documents to cite under an answer.

use log::debug;
use url::Url;

use crate::ingest::medlineplus::SOURCE_NAME;
use crate::models::chat::Source;

pub const MAX_SOURCES: usize = 2;
pub const UNKNOWN_TOPIC: &str = "Unknown Topic";

const CONVERSATIONAL_PHRASES: [&str; 16] = [
    "hi",
    "hello",
    "hey",
    "how can i help",
    "you're welcome",
    "take care",
    "great",
    "ok",
    "sounds good",
    "thank you",
    "pleasure chatting",
    "feel free to ask",
    "any new questions",
    "any concerns",
    "free to ask",
    "medical questions",
];

/// A retrieved document that may be cited.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateSource {
    pub provider: String,
    pub url: String,
    pub title: String,
    pub snippet: String,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-word, case-insensitive occurrence of `phrase` in `text`.
fn contains_phrase(text: &str, phrase: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = text[start..].find(phrase) {
        let begin = start + pos;
        let end = begin + phrase.len();
        let before_ok = text[..begin].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok = text[end..].chars().next().map_or(true, |c| !is_word_char(c));
        if before_ok && after_ok {
            return true;
        }
        start = begin + text[begin..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

pub fn is_conversational(answer: &str) -> bool {
    let lowered = answer.trim().to_lowercase();
    let hits = CONVERSATIONAL_PHRASES.iter()
        .filter(|phrase| contains_phrase(&lowered, phrase))
        .count();
    hits >= 2 || (hits >= 1 && lowered.chars().count() < 100)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}

/// Human-readable label for a cited URL.
pub fn source_name(url: &str, title: Option<&str>) -> String {
    if url.contains("medlineplus.gov") {
        return match title.filter(|t| !t.is_empty() && *t != UNKNOWN_TOPIC) {
            Some(title) => format!("{} - {}", SOURCE_NAME, title),
            None => SOURCE_NAME.to_string(),
        };
    }
    match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
        Some(host) => title_case(&host.replace("www.", "")),
        None => "Medical Source".to_string(),
    }
}

/// Picks at most [`MAX_SOURCES`] citations, MedlinePlus first and only once,
/// or none when the answer is small talk.
pub fn select_sources(answer: &str, candidates: &[CandidateSource]) -> Vec<Source> {
    if is_conversational(answer) {
        debug!("Conversational answer; no sources shown");
        return Vec::new();
    }

    let (medlineplus, others): (Vec<&CandidateSource>, Vec<&CandidateSource>) = candidates
        .iter()
        .partition(|c| c.provider == SOURCE_NAME);

    let mut selected: Vec<Source> = Vec::new();
    let mut seen_medlineplus = false;
    for candidate in medlineplus.into_iter().chain(others) {
        if selected.len() >= MAX_SOURCES {
            break;
        }
        if candidate.url.is_empty() || selected.iter().any(|s| s.url == candidate.url) {
            continue;
        }
        let is_medlineplus = candidate.provider == SOURCE_NAME;
        if is_medlineplus && seen_medlineplus {
            continue;
        }
        seen_medlineplus |= is_medlineplus;
        selected.push(Source {
            provider: candidate.provider.clone(),
            name: source_name(&candidate.url, Some(&candidate.title)),
            url: candidate.url.clone(),
        });
    }
    selected
}
