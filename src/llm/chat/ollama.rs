use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use std::error::Error as StdError;
use super::{ ChatClient, CompletionResponse, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE };
use crate::llm::{ LlmConfig, LlmType };

pub const OLLAMA_DEFAULT_CHAT_MODEL: &str = "llama3.1:8b";
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Local Ollama server, `/api/generate` with streaming off.
#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    generate_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        Self {
            http: HttpClient::new(),
            generate_url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            completion_model: completion_model.unwrap_or_else(|| OLLAMA_DEFAULT_CHAT_MODEL.to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }
        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }

    fn request<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.completion_model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: DEFAULT_TEMPERATURE,
                num_predict: DEFAULT_MAX_TOKENS,
            },
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(
        &self,
        prompt: &str
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let resp = self.http
            .post(&self.generate_url)
            .json(&self.request(prompt))
            .send().await?
            .error_for_status()?;
        let generated = resp.json::<GenerateResponse>().await?;
        Ok(CompletionResponse { response: generated.response })
    }

    fn model(&self) -> &str {
        &self.completion_model
    }
}
