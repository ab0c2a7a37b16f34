pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::Arc;
use log::warn;

use super::{ LlmConfig, LlmType };
use self::ollama::OllamaEmbeddingClient;
use self::openai::OpenAIEmbeddingClient;

#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>>;

    /// Embeds several texts, preserving input order. Backends that accept a
    /// list in one request override this.
    async fn embed_batch(
        &self,
        texts: &[String]
    ) -> Result<Vec<Vec<f32>>, Box<dyn StdError + Send + Sync>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?.embedding);
        }
        Ok(out)
    }
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn EmbeddingClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn EmbeddingClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaEmbeddingClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIEmbeddingClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Groq => {
            warn!("Groq does not serve embedding models. Use ollama or openai for EMBEDDING_LLM_TYPE.");
            return Err("Unsupported embedding backend: groq".into());
        }
    };
    Ok(client)
}
