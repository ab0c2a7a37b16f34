use crate::auth::User;
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::db::StoreError;
use crate::history::{ format_history_for_prompt, HistoryStore };
use crate::llm::chat::ChatClient;
use crate::models::chat::{ ChatTurn, NewChatTurn };
use crate::rag::citations;
use crate::rag::Retriever;

use log::{ debug, error, info };
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Turns of the current conversation replayed into the prompt.
pub const HISTORY_FOR_PROMPT_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("retrieval failed: {0}")]
    Retrieval(Box<dyn StdError + Send + Sync>),

    #[error("generation failed: {0}")]
    Generation(Box<dyn StdError + Send + Sync>),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct MedicalAgent {
    chat_client: Arc<dyn ChatClient>,
    retriever: Retriever,
    prompt_config: Arc<PromptConfig>,
    history_store: Arc<dyn HistoryStore>,
}

impl MedicalAgent {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        retriever: Retriever,
        prompt_config: Arc<PromptConfig>,
        history_store: Arc<dyn HistoryStore>
    ) -> Self {
        Self { chat_client, retriever, prompt_config, history_store }
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history_store
    }

    pub fn assistant_name(&self) -> &str {
        &self.prompt_config.assistant_name
    }

    /// Answers one question and records the turn. Nothing is stored when
    /// retrieval or generation fails.
    pub async fn answer(
        &self,
        user: &User,
        conversation_id: &str,
        question: &str
    ) -> Result<ChatTurn, AgentError> {
        let recent = self.history_store.recent_turns(
            user.id,
            conversation_id,
            HISTORY_FOR_PROMPT_LEN
        ).await?;
        let chat_history = format_history_for_prompt(
            &recent,
            &user.username,
            &self.prompt_config.assistant_name,
            question
        );

        let retrieved = self.retriever.retrieve(question).await.map_err(|e| {
            error!("Retrieval failed for user {}: {}", user.id, e);
            AgentError::Retrieval(e)
        })?;

        let final_prompt = prompt::get_rag_answer_prompt(
            &self.prompt_config,
            &chat_history,
            &retrieved.context,
            question
        )?;
        debug!(
            "Prompt: {} chars ({} history turns, {} context chars)",
            final_prompt.chars().count(),
            recent.len(),
            retrieved.context.chars().count()
        );

        let completion = self.chat_client.complete(&final_prompt).await.map_err(|e| {
            error!("Generation with {} failed for user {}: {}", self.chat_client.model(), user.id, e);
            AgentError::Generation(e)
        })?;
        let answer = completion.response.trim().to_string();

        let sources = citations::select_sources(&answer, &retrieved.candidates);
        info!(
            "Answered user {} with {} of {} candidate sources",
            user.id,
            sources.len(),
            retrieved.candidates.len()
        );

        let turn = self.history_store.add_turn(NewChatTurn {
            user_id: user.id,
            conversation_id: conversation_id.to_string(),
            question: question.to_string(),
            answer,
            sources,
        }).await?;
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::history::SqliteHistoryStore;
    use crate::llm::chat::CompletionResponse;
    use crate::llm::embedding::{ EmbeddingClient, EmbeddingResponse };
    use crate::vector::{ ChunkMetadata, ChunkRecord, MemoryIndex, Metric, VectorIndex };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>> {
            Ok(EmbeddingResponse { embedding: vec![1.0, 0.0] })
        }
    }

    /// Records prompts and replies with a canned answer.
    struct ScriptedChat {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn complete(&self, prompt: &str) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(CompletionResponse { response: text.clone() }),
                Err(msg) => Err(msg.clone().into()),
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    const PROMPTS: &str =
        r#"{"response_templates":{"rag_answer":"{chat_history}|{context}|{question}"}}"#;

    async fn agent(reply: Result<&str, &str>) -> (MedicalAgent, Arc<ScriptedChat>, User) {
        let pool = db::connect_in_memory().await.unwrap();
        let user_id = sqlx
            ::query("INSERT INTO users (username, email, password_hash, created_at) VALUES ('ana', 'a@x', 'h', 0)")
            .execute(&pool).await
            .unwrap()
            .last_insert_rowid();
        let user = User {
            id: user_id,
            username: "ana".into(),
            email: "a@x".into(),
            password_hash: "h".into(),
            created_at: 0,
        };

        let index = Arc::new(MemoryIndex::new(Metric::Cosine));
        index
            .upsert("medlineplus", &[
                ChunkRecord {
                    id: "c1".into(),
                    values: vec![1.0, 0.0],
                    metadata: ChunkMetadata {
                        source: "https://medlineplus.gov/asthma.html".into(),
                        title: "Asthma".into(),
                        source_name: "MedlinePlus".into(),
                        text: "Asthma is a chronic lung disease.".into(),
                    },
                },
            ]).await
            .unwrap();

        let chat = Arc::new(ScriptedChat {
            reply: reply.map(String::from).map_err(String::from),
            prompts: Mutex::new(Vec::new()),
        });
        let retriever = Retriever::new(Arc::new(FixedEmbedder), index, "medlineplus".into(), 2, 4, 2);
        let agent = MedicalAgent::new(
            chat.clone(),
            retriever,
            Arc::new(PromptConfig::from_json(PROMPTS).unwrap()),
            Arc::new(SqliteHistoryStore::new(pool))
        );
        (agent, chat, user)
    }

    const ANSWER: &str =
        "Asthma inflames and narrows the airways, causing wheezing and shortness of breath; \
         an inhaled controller medicine keeps symptoms in check.";

    #[tokio::test]
    async fn stored_turn_matches_returned_turn() {
        let (agent, _, user) = agent(Ok(ANSWER)).await;
        let turn = agent.answer(&user, "conv", "What is asthma?").await.unwrap();

        assert_eq!(turn.answer, ANSWER);
        assert_eq!(turn.sources.len(), 1);
        assert_eq!(turn.sources[0].name, "MedlinePlus - Asthma");
        let stored = agent.history().get_turn(user.id, turn.id).await.unwrap().unwrap();
        assert_eq!(stored, turn);
    }

    #[tokio::test]
    async fn prompt_carries_history_context_and_question() {
        let (agent, chat, user) = agent(Ok(ANSWER)).await;
        agent.answer(&user, "conv", "What is asthma?").await.unwrap();
        agent.answer(&user, "conv", "Is it curable?").await.unwrap();

        let prompts = chat.prompts.lock().unwrap();
        let second = &prompts[1];
        assert!(second.starts_with(&format!("ana: What is asthma?\nSmartCare: {}\nana: Is it curable?\n|", ANSWER)));
        assert!(second.contains("MEDLINEPLUS SOURCES:\nSource 1: Asthma is a chronic lung disease...."));
        assert!(second.ends_with("|Is it curable?"));
    }

    #[tokio::test]
    async fn small_talk_gets_no_sources() {
        let (agent, _, user) = agent(Ok("Hi! How can I help you today?")).await;
        let turn = agent.answer(&user, "conv", "hi").await.unwrap();
        assert!(turn.sources.is_empty());
    }

    #[tokio::test]
    async fn generation_failure_stores_nothing() {
        let (agent, _, user) = agent(Err("quota exceeded")).await;
        let err = agent.answer(&user, "conv", "What is asthma?").await.unwrap_err();
        assert!(matches!(err, AgentError::Generation(_)));
        assert!(agent.history().list_turns(user.id).await.unwrap().is_empty());
    }
}
