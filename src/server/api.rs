use axum::extract::{ Form, Path, State };
use axum::routing::{ get, post };
use axum::{ Json, Router };
use log::{ info, warn };
use serde::Deserialize;
use serde_json::{ json, Value };

use super::session::CurrentUser;
use super::AppState;
use crate::error::AppError;
use crate::models::chat::{ ChatReply, ChatTurn };

#[derive(Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    msg: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/get", post(chat_handler))
        .route("/get_sources/{id}", get(sources_handler))
        .route("/api/history", get(history_handler))
        .route("/clear_history", post(clear_history_handler))
        .route("/clear_chat", post(clear_chat_handler))
        .route("/healthz", get(|| async { "ok" }))
}

async fn chat_handler(
    current: CurrentUser,
    State(state): State<AppState>,
    Form(form): Form<ChatForm>
) -> Result<Json<ChatReply>, AppError> {
    let question = form.msg.trim();
    if question.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".into()));
    }
    if state.limiter.check().is_err() {
        warn!("Chat rate limit exceeded; rejecting request from user {}", current.user.id);
        return Err(AppError::RateLimited);
    }

    let turn = state.agent.answer(&current.user, &current.session.conversation_id, question).await?;
    Ok(Json(ChatReply::from(&turn)))
}

async fn sources_handler(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(turn_id): Path<i64>
) -> Result<Json<Value>, AppError> {
    let sources = state.agent
        .history()
        .get_turn(current.user.id, turn_id).await?
        .map(|turn| turn.sources)
        .unwrap_or_default();
    Ok(Json(json!({ "sources": sources })))
}

async fn history_handler(
    current: CurrentUser,
    State(state): State<AppState>
) -> Result<Json<Vec<ChatTurn>>, AppError> {
    Ok(Json(state.agent.history().list_turns(current.user.id).await?))
}

async fn clear_history_handler(
    current: CurrentUser,
    State(state): State<AppState>
) -> Result<Json<Value>, AppError> {
    let removed = state.agent.history().clear(current.user.id).await?;
    info!("Cleared {} turns for user {}", removed, current.user.id);
    Ok(Json(json!({ "success": true })))
}

async fn clear_chat_handler(
    current: CurrentUser,
    State(state): State<AppState>
) -> Result<Json<Value>, AppError> {
    state.auth.new_conversation(&current.session.token).await?;
    Ok(Json(json!({ "status": "success", "message": "Chat cleared" })))
}
