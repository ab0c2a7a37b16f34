use async_trait::async_trait;
use std::error::Error as StdError;

use super::openai::OpenAIChatClient;
use super::{ ChatClient, CompletionResponse };
use crate::llm::LlmConfig;

pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const GROQ_DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq exposes the OpenAI wire format under `/openai/v1`.
pub struct GroqChatClient {
    inner: OpenAIChatClient,
}

impl GroqChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| GROQ_DEFAULT_MODEL.to_string());
        let api_url = base_url.unwrap_or_else(|| GROQ_DEFAULT_BASE_URL.to_string());

        Ok(Self {
            inner: OpenAIChatClient::new(api_key, chat_model, api_url)?,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Groq API key is required".to_string())?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }
}

#[async_trait]
impl ChatClient for GroqChatClient {
    async fn complete(
        &self,
        prompt: &str
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        self.inner.complete(prompt).await.map_err(|e| format!("Groq API error: {}", e).into())
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
