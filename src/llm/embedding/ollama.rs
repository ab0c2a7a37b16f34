use async_trait::async_trait;
use std::error::Error as StdError;
use super::{ EmbeddingClient, EmbeddingResponse };
use super::super::{ LlmConfig, LlmType };
use super::super::chat::ollama::OLLAMA_DEFAULT_URL;
use rllm::{ builder::{ LLMBackend, LLMBuilder }, LLMProvider };

/// 384-dimensional MiniLM, the same model family the MedlinePlus index was built with.
pub const OLLAMA_DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

pub struct OllamaEmbeddingClient {
    llm: Box<dyn LLMProvider + Send + Sync>,
}

impl OllamaEmbeddingClient {
    pub fn new(
        base_url: Option<String>,
        model: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let llm = LLMBuilder::new()
            .backend(LLMBackend::Ollama)
            .base_url(base_url.unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()))
            .model(model.unwrap_or_else(|| OLLAMA_DEFAULT_EMBEDDING_MODEL.to_string()))
            .stream(false)
            .build()?;
        Ok(Self { llm })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaEmbeddingClient".into());
        }
        Self::new(config.base_url.clone(), config.embedding_model.clone())
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(
        &self,
        text: &str
    ) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>> {
        let mut embeddings = self.llm.embed(vec![text.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| "Ollama embedding generation returned no results".to_string())?;

        Ok(EmbeddingResponse { embedding })
    }

    async fn embed_batch(
        &self,
        texts: &[String]
    ) -> Result<Vec<Vec<f32>>, Box<dyn StdError + Send + Sync>> {
        let embeddings = self.llm.embed(texts.to_vec()).await?;
        if embeddings.len() != texts.len() {
            return Err(
                format!("Ollama returned {} embeddings for {} inputs", embeddings.len(), texts.len()).into()
            );
        }
        Ok(embeddings)
    }
}
