//! Server-rendered pages: registration, login, chat and history.

use axum::extract::{ Form, Query, State };
use axum::http::{ header, HeaderMap, StatusCode };
use axum::response::{ Html, IntoResponse, Redirect, Response };
use axum::routing::get;
use axum::Router;
use chrono::DateTime;
use minijinja::{ context, Environment, Value };
use serde::{ Deserialize, Serialize };

use super::session::{ self, CurrentUser };
use super::AppState;
use crate::auth::AuthError;
use crate::error::AppError;
use crate::models::chat::{ ChatTurn, Source };

pub fn environment() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template("base.html", include_str!("../../templates/base.html"))?;
    env.add_template("login.html", include_str!("../../templates/login.html"))?;
    env.add_template("register.html", include_str!("../../templates/register.html"))?;
    env.add_template("chat.html", include_str!("../../templates/chat.html"))?;
    env.add_template("history.html", include_str!("../../templates/history.html"))?;
    Ok(env)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout).post(logout))
        .route("/history", get(history_page))
}

fn render(state: &AppState, status: StatusCode, name: &str, ctx: Value) -> Result<Response, AppError> {
    let html = state.templates.get_template(name)?.render(ctx)?;
    Ok((status, Html(html)).into_response())
}

/// A stored turn as the templates display it.
#[derive(Serialize)]
struct TurnView {
    id: i64,
    question: String,
    answer: String,
    sources: Vec<Source>,
    time: String,
}

impl From<ChatTurn> for TurnView {
    fn from(turn: ChatTurn) -> Self {
        let time = DateTime::from_timestamp(turn.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        Self {
            id: turn.id,
            question: turn.question,
            answer: turn.answer,
            sources: turn.sources,
            time,
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct NoticeQuery {
    notice: Option<String>,
}

fn notice_text(code: Option<&str>) -> Option<&'static str> {
    match code? {
        "registered" => Some("Registration successful! Please log in."),
        "logged_out" => Some("Logged out successfully!"),
        _ => None,
    }
}

async fn register_page(State(state): State<AppState>) -> Result<Response, AppError> {
    render(&state, StatusCode::OK, "register.html", context! {})
}

async fn register(State(state): State<AppState>, Form(form): Form<RegisterForm>) -> Result<Response, AppError> {
    let (status, error) = match state.auth.register(&form.username, &form.email, &form.password).await {
        Ok(_) => {
            return Ok(Redirect::to("/login?notice=registered").into_response());
        }
        Err(AuthError::Duplicate(_)) => {
            (StatusCode::CONFLICT, "An account with this username or email already exists.")
        }
        Err(AuthError::MissingField(_)) => {
            (StatusCode::BAD_REQUEST, "Username, email and password are all required.")
        }
        Err(e) => {
            return Err(e.into());
        }
    };
    render(
        &state,
        status,
        "register.html",
        context! { error, form_username => form.username, email => form.email }
    )
}

async fn login_page(State(state): State<AppState>, Query(query): Query<NoticeQuery>) -> Result<Response, AppError> {
    let notice = notice_text(query.notice.as_deref());
    render(&state, StatusCode::OK, "login.html", context! { notice })
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response, AppError> {
    match state.auth.login(&form.email, &form.password).await {
        Ok((_, session)) => {
            let cookie = session::build_cookie(
                &state.signer.sign(&session.token),
                state.auth.session_ttl_secs(),
                state.secure_cookies
            );
            Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
        }
        Err(AuthError::InvalidCredentials) => {
            render(
                &state,
                StatusCode::UNAUTHORIZED,
                "login.html",
                context! { error => "Invalid email or password.", email => form.email }
            )
        }
        Err(e) => Err(e.into()),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let token = session::session_cookie(&headers).and_then(|signed| state.signer.verify(signed));
    if let Some(token) = token {
        state.auth.logout(token).await?;
    }
    Ok(
        (
            [(header::SET_COOKIE, session::clear_cookie(state.secure_cookies))],
            Redirect::to("/login?notice=logged_out"),
        ).into_response()
    )
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let Some(CurrentUser { user, session }) = session::current_user(&headers, &state).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let turns: Vec<TurnView> = state.agent
        .history()
        .conversation_turns(user.id, &session.conversation_id).await?
        .into_iter()
        .map(TurnView::from)
        .collect();
    render(
        &state,
        StatusCode::OK,
        "chat.html",
        context! { username => user.username, assistant_name => state.agent.assistant_name(), turns }
    )
}

async fn history_page(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let Some(CurrentUser { user, .. }) = session::current_user(&headers, &state).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let turns: Vec<TurnView> = state.agent
        .history()
        .list_turns(user.id).await?
        .into_iter()
        .map(TurnView::from)
        .collect();
    render(&state, StatusCode::OK, "history.html", context! { username => user.username, turns })
}
