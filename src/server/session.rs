use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{ header, HeaderMap };

use crate::auth::{ AuthError, Session, User };
use crate::error::AppError;
use super::AppState;

pub const COOKIE_NAME: &str = "smartcare_session";

/// Raw value of the session cookie, if the request carries one.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE_NAME)
        .map(|(_, value)| value)
}

pub fn build_cookie(signed_token: &str, max_age_secs: i64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        COOKIE_NAME,
        signed_token,
        max_age_secs.max(0),
        if secure { "; Secure" } else { "" }
    )
}

pub fn clear_cookie(secure: bool) -> String {
    build_cookie("", 0, secure)
}

/// The logged-in user behind a request.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

/// Resolves the session cookie. `Ok(None)` means "not logged in"; only
/// storage failures are errors.
pub async fn current_user(headers: &HeaderMap, state: &AppState) -> Result<Option<CurrentUser>, AppError> {
    let Some(signed) = session_cookie(headers) else {
        return Ok(None);
    };
    let Some(token) = state.signer.verify(signed) else {
        return Ok(None);
    };
    match state.auth.authenticate(token).await {
        Ok((user, session)) => Ok(Some(CurrentUser { user, session })),
        Err(AuthError::InvalidSession) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        current_user(&parts.headers, state).await?.ok_or_else(||
            AppError::Unauthorized("please log in".to_string())
        )
    }
}
