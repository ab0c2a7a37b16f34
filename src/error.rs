//! Error type returned by every HTTP handler.
//!
//! Client mistakes carry their message to the caller. Upstream and internal
//! failures are logged in full and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::agent::AgentError;
use crate::auth::AuthError;
use crate::db::StoreError;

pub const TRY_AGAIN: &str = "Sorry, I couldn't reach the medical knowledge service. Please try again.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("too many requests")]
    RateLimited,

    /// Vector store, embedding or LLM failure.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests. Please wait a moment.".to_owned())
            }
            AppError::Upstream(m) => {
                error!("Upstream failure: {}", m);
                (StatusCode::BAD_GATEWAY, TRY_AGAIN.to_owned())
            }
            AppError::Database(m) => {
                error!("Database failure: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
            AppError::Template(e) => {
                error!("Template rendering failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
            AppError::Internal(m) => {
                error!("Internal error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(field) => AppError::Conflict(format!("{} already exists", field)),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingField(_) => AppError::BadRequest(e.to_string()),
            AuthError::Duplicate(_) => AppError::Conflict(e.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidSession => {
                AppError::Unauthorized(e.to_string())
            }
            AuthError::Hashing(m) => AppError::Internal(m),
            AuthError::Store(inner) => inner.into(),
        }
    }
}

impl From<AgentError> for AppError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Retrieval(_) | AgentError::Generation(_) => AppError::Upstream(e.to_string()),
            AgentError::Prompt(p) => AppError::Internal(p.to_string()),
            AgentError::Store(s) => s.into(),
        }
    }
}
