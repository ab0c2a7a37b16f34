pub mod api;
pub mod pages;
pub mod session;

use crate::agent::MedicalAgent;
use crate::auth::{ AuthService, SessionSigner };
use axum::Router;
use governor::{ clock::DefaultClock, state::{ InMemoryState, NotKeyed }, Quota, RateLimiter };
use log::{ error, info, warn };
use minijinja::Environment;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

pub type ChatLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared, immutable state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<MedicalAgent>,
    pub auth: AuthService,
    pub signer: SessionSigner,
    pub templates: Arc<Environment<'static>>,
    pub limiter: Arc<ChatLimiter>,
    /// Adds `Secure` to the session cookie; set when serving over TLS.
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(
        agent: Arc<MedicalAgent>,
        auth: AuthService,
        signer: SessionSigner,
        chat_rate_limit: u32,
        secure_cookies: bool
    ) -> Result<Self, minijinja::Error> {
        let per_second = NonZeroU32::new(chat_rate_limit).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            agent,
            auth,
            signer,
            templates: Arc::new(pages::environment()?),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            secure_cookies,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .merge(pages::routes())
        .merge(api::routes())
        .layer(cors)
        .with_state(state)
}

pub struct TlsPaths {
    pub cert_path: String,
    pub key_path: String,
}

pub struct Server {
    addr: String,
    state: AppState,
    tls: Option<TlsPaths>,
}

impl Server {
    pub fn new(addr: String, state: AppState, tls: Option<TlsPaths>) -> Self {
        Self { addr, state, tls }
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = router(self.state);

        match self.tls {
            Some(tls) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    tls.cert_path,
                    tls.key_path
                );
                let tls_config = axum_server::tls_rustls::RustlsConfig
                    ::from_pem_file(&tls.cert_path, &tls.key_path).await
                    .map_err(|e| {
                        error!("Failed to load TLS certificate/key: {}", e);
                        e
                    })?;
                info!("HTTPS server listening on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            }
            None => {
                warn!("TLS not enabled. Session cookies are sent without the Secure flag.");
                let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                    e
                })?;
                info!("HTTP server listening on: http://{}", addr);
                axum::serve(listener, app.into_make_service()).await?;
            }
        }
        Ok(())
    }
}
