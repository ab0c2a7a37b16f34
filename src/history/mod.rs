mod sqlite;

pub use sqlite::SqliteHistoryStore;

use async_trait::async_trait;
use crate::db::StoreError;
use crate::models::chat::{ ChatTurn, NewChatTurn };

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_turn(&self, turn: NewChatTurn) -> Result<ChatTurn, StoreError>;

    /// The last `limit` turns of a conversation, oldest first.
    async fn recent_turns(
        &self,
        user_id: i64,
        conversation_id: &str,
        limit: usize
    ) -> Result<Vec<ChatTurn>, StoreError>;

    /// Every turn of a conversation, oldest first.
    async fn conversation_turns(
        &self,
        user_id: i64,
        conversation_id: &str
    ) -> Result<Vec<ChatTurn>, StoreError>;

    /// Every turn of a user across conversations, newest first.
    async fn list_turns(&self, user_id: i64) -> Result<Vec<ChatTurn>, StoreError>;

    async fn get_turn(&self, user_id: i64, turn_id: i64) -> Result<Option<ChatTurn>, StoreError>;

    /// Deletes all turns of `user_id`; returns how many were removed.
    async fn clear(&self, user_id: i64) -> Result<u64, StoreError>;
}

pub fn format_history_for_prompt(
    turns: &[ChatTurn],
    username: &str,
    assistant_name: &str,
    current_question: &str
) -> String {
    let mut result = String::new();
    for turn in turns {
        result.push_str(&format!("{}: {}\n", username, turn.question));
        result.push_str(&format!("{}: {}\n", assistant_name, turn.answer));
    }
    result.push_str(&format!("{}: {}\n", username, current_question));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(question: &str, answer: &str) -> ChatTurn {
        ChatTurn {
            id: 1,
            user_id: 1,
            conversation_id: "c".into(),
            question: question.into(),
            answer: answer.into(),
            sources: vec![],
            timestamp: 0,
        }
    }

    #[test]
    fn formats_turns_then_current_question() {
        let turns = vec![turn("I have a headache", "Rest and hydrate.")];
        let text = format_history_for_prompt(&turns, "ana", "SmartCare", "Should I take ibuprofen?");
        assert_eq!(
            text,
            "ana: I have a headache\nSmartCare: Rest and hydrate.\nana: Should I take ibuprofen?\n"
        );
    }

    #[test]
    fn empty_history_still_carries_question() {
        let text = format_history_for_prompt(&[], "ana", "SmartCare", "Hi");
        assert_eq!(text, "ana: Hi\n");
    }
}
