use serde::{ Serialize, Deserialize };

/// A citation shown under an answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub provider: String,
    pub name: String,
    pub url: String,
}

/// One persisted question/answer exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: i64,
    pub user_id: i64,
    pub conversation_id: String,
    pub question: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub timestamp: i64,
}

#[derive(Clone, Debug)]
pub struct NewChatTurn {
    pub user_id: i64,
    pub conversation_id: String,
    pub question: String,
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Body returned by the chat endpoint; mirrors the stored turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub id: i64,
    pub response: String,
    pub sources: Vec<Source>,
    pub timestamp: i64,
}

impl From<&ChatTurn> for ChatReply {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            id: turn.id,
            response: turn.answer.clone(),
            sources: turn.sources.clone(),
            timestamp: turn.timestamp,
        }
    }
}
