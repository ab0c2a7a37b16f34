use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use sqlx::SqlitePool;

use crate::db::StoreError;
use crate::history::HistoryStore;
use crate::models::chat::{ ChatTurn, NewChatTurn, Source };

type TurnRow = (i64, i64, String, String, String, String, i64);

const SELECT_TURN: &str =
    "SELECT id, user_id, conversation_id, question, answer, sources, created_at FROM chat_turns";

#[derive(Clone, Debug)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_turn(row: TurnRow) -> ChatTurn {
        let (id, user_id, conversation_id, question, answer, sources, timestamp) = row;
        let sources: Vec<Source> = serde_json::from_str(&sources).unwrap_or_else(|e| {
            warn!("Discarding malformed sources on chat turn {}: {}", id, e);
            Vec::new()
        });
        ChatTurn { id, user_id, conversation_id, question, answer, sources, timestamp }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn add_turn(&self, turn: NewChatTurn) -> Result<ChatTurn, StoreError> {
        let timestamp = Utc::now().timestamp();
        let sources_json = serde_json::to_string(&turn.sources)?;

        let result = sqlx
            ::query(
                "INSERT INTO chat_turns (user_id, conversation_id, question, answer, sources, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            )
            .bind(turn.user_id)
            .bind(&turn.conversation_id)
            .bind(&turn.question)
            .bind(&turn.answer)
            .bind(&sources_json)
            .bind(timestamp)
            .execute(&self.pool).await?;

        Ok(ChatTurn {
            id: result.last_insert_rowid(),
            user_id: turn.user_id,
            conversation_id: turn.conversation_id,
            question: turn.question,
            answer: turn.answer,
            sources: turn.sources,
            timestamp,
        })
    }

    async fn recent_turns(
        &self,
        user_id: i64,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ChatTurn>, StoreError> {
        let rows: Vec<TurnRow> = sqlx
            ::query_as(
                &format!(
                    "{} WHERE user_id = ?1 AND conversation_id = ?2 ORDER BY id DESC LIMIT ?3",
                    SELECT_TURN
                )
            )
            .bind(user_id)
            .bind(conversation_id)
            .bind(limit as i64)
            .fetch_all(&self.pool).await?;

        let mut turns: Vec<ChatTurn> = rows.into_iter().map(Self::row_to_turn).collect();
        turns.reverse();
        Ok(turns)
    }

    async fn conversation_turns(
        &self,
        user_id: i64,
        conversation_id: &str
    ) -> Result<Vec<ChatTurn>, StoreError> {
        let rows: Vec<TurnRow> = sqlx
            ::query_as(
                &format!("{} WHERE user_id = ?1 AND conversation_id = ?2 ORDER BY id ASC", SELECT_TURN)
            )
            .bind(user_id)
            .bind(conversation_id)
            .fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Self::row_to_turn).collect())
    }

    async fn list_turns(&self, user_id: i64) -> Result<Vec<ChatTurn>, StoreError> {
        let rows: Vec<TurnRow> = sqlx
            ::query_as(&format!("{} WHERE user_id = ?1 ORDER BY id DESC", SELECT_TURN))
            .bind(user_id)
            .fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Self::row_to_turn).collect())
    }

    async fn get_turn(&self, user_id: i64, turn_id: i64) -> Result<Option<ChatTurn>, StoreError> {
        let row: Option<TurnRow> = sqlx
            ::query_as(&format!("{} WHERE id = ?1 AND user_id = ?2", SELECT_TURN))
            .bind(turn_id)
            .bind(user_id)
            .fetch_optional(&self.pool).await?;

        Ok(row.map(Self::row_to_turn))
    }

    async fn clear(&self, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx
            ::query("DELETE FROM chat_turns WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
