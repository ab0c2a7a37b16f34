use clap::{ Args, Parser, Subcommand };
use std::path::PathBuf;

use crate::llm::{ LlmConfig, LlmType, ParseLlmTypeError };
use crate::vector::{ VectorConfig, VectorType };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "SmartCare medical question-answering service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the web application.
    Serve(ServeArgs),
    /// Parse the MedlinePlus XML export, chunk, embed and upsert it.
    Ingest(IngestArgs),
    /// Create the vector index (Pinecone) or collection (Qdrant).
    CreateIndex(CreateIndexArgs),
    /// Create the database tables, optionally dropping them first.
    InitDb(InitDbArgs),
}

// --- Relational store ---
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// SQLite database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://smartcare.db")]
    pub database_url: String,

    /// Maximum pooled SQLite connections.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "5")]
    pub database_max_connections: u32,
}

// --- Chat LLM Provider Args ---
#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// Type of LLM provider for chat completion (groq, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "groq")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider (e.g., Groq, OpenAI)
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., llama-3.1-8b-instant, gpt-4o-mini)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,
}

impl ChatArgs {
    pub fn llm_config(&self) -> Result<LlmConfig, ParseLlmTypeError> {
        Ok(LlmConfig {
            llm_type: self.chat_llm_type.parse::<LlmType>()?,
            api_key: non_empty(&self.chat_api_key),
            completion_model: self.chat_model.clone(),
            embedding_model: None,
            base_url: self.chat_base_url.clone(),
        })
    }
}

// --- Embedding LLM Provider Args ---
#[derive(Args, Debug, Clone)]
pub struct EmbeddingArgs {
    /// Type of LLM provider for text embedding (ollama, openai)
    #[arg(long, env = "EMBEDDING_LLM_TYPE", default_value = "ollama")]
    pub embedding_llm_type: String,

    /// Base URL for the Embedding LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "EMBEDDING_BASE_URL")]
    pub embedding_base_url: Option<String>,

    /// API Key for the Embedding LLM provider
    #[arg(long, env = "EMBEDDING_API_KEY", default_value = "", hide_env_values = true)]
    pub embedding_api_key: String,

    /// Model name for text embedding; must match the model used at ingestion.
    /// Ollama defaults to all-minilm (384 dimensions).
    #[arg(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,
}

impl EmbeddingArgs {
    pub fn llm_config(&self) -> Result<LlmConfig, ParseLlmTypeError> {
        Ok(LlmConfig {
            llm_type: self.embedding_llm_type.parse::<LlmType>()?,
            api_key: non_empty(&self.embedding_api_key),
            completion_model: None,
            embedding_model: self.embedding_model.clone(),
            base_url: self.embedding_base_url.clone(),
        })
    }
}

// --- Vector Store Args ---
#[derive(Args, Debug, Clone)]
pub struct VectorArgs {
    /// Vector database type (pinecone, qdrant, memory)
    #[arg(short = 't', long, env = "VECTOR_TYPE", default_value = "pinecone")]
    pub vector_type: String,

    /// Vector database host. Pinecone discovers it from the index name when unset.
    #[arg(long, env = "VECTOR_HOST")]
    pub host: Option<String>,

    /// API key for the vector database (Pinecone, Qdrant)
    #[arg(short = 'k', long, env = "VECTOR_SECRET", default_value = "", hide_env_values = true)]
    pub secret: String,

    /// Index/Collection name
    #[arg(long, env = "VECTOR_INDEX_NAME", default_value = "medical-chatbot")]
    pub index_name: String,

    /// Namespace holding the MedlinePlus chunks
    #[arg(long, env = "VECTOR_NAMESPACE", default_value = "medlineplus")]
    pub namespace: String,

    /// Vector dimension size
    #[arg(long, env = "VECTOR_DIMENSION", default_value = "384")]
    pub dimension: usize,

    /// Distance metric for vector similarity (cosine, euclidean, dotproduct)
    #[arg(long, env = "VECTOR_METRIC", default_value = "cosine")]
    pub metric: String,

    /// Cloud provider for Pinecone (aws, azure, gcp)
    #[arg(long, env = "PINECONE_CLOUD", default_value = "aws")]
    pub cloud: String,

    /// Cloud region for Pinecone
    #[arg(long, env = "PINECONE_REGION", default_value = "us-east-1")]
    pub region: String,
}

impl VectorArgs {
    pub fn vector_config(&self) -> Result<VectorConfig, String> {
        Ok(VectorConfig {
            vector_type: self.vector_type.parse::<VectorType>()?,
            host: self.host.clone(),
            secret: non_empty(&self.secret),
            index_name: self.index_name.clone(),
            dimension: self.dimension,
            metric: self.metric.parse()?,
            cloud: self.cloud.clone(),
            region: self.region.clone(),
        })
    }
}

// --- Retrieval Args ---
#[derive(Args, Debug, Clone)]
pub struct RagArgs {
    /// Number of nearest chunks fetched per question.
    #[arg(long, env = "RAG_TOP_K", default_value = "4")]
    pub top_k: usize,

    /// How many of the fetched chunks go into the prompt context.
    #[arg(long, env = "RAG_CONTEXT_DOCS", default_value = "2")]
    pub context_docs: usize,

    /// Path to the prompt configuration file.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json")]
    pub prompts_path: String,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub chat: ChatArgs,

    #[command(flatten)]
    pub embedding: EmbeddingArgs,

    #[command(flatten)]
    pub vector: VectorArgs,

    #[command(flatten)]
    pub rag: RagArgs,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:5050")]
    pub server_addr: String,

    /// Secret used to sign session cookies.
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    /// Lifetime of a login session.
    #[arg(long, env = "SESSION_TTL_HOURS", default_value = "24")]
    pub session_ttl_hours: u32,

    /// PBKDF2 iterations for new password hashes.
    #[arg(long, env = "PASSWORD_HASH_ITERATIONS", default_value = "600000")]
    pub password_hash_iterations: u32,

    /// Chat requests allowed per second across all users.
    #[arg(long, env = "CHAT_RATE_LIMIT", default_value = "10")]
    pub chat_rate_limit: u32,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// MedlinePlus health-topics XML file.
    #[arg(long, env = "MEDLINEPLUS_XML", default_value = "Data/medlineplus/HealthTopics.xml")]
    pub xml_path: PathBuf,

    /// Chunks embedded and upserted per request.
    #[arg(long, env = "INGEST_BATCH_SIZE", default_value = "64")]
    pub batch_size: usize,

    #[arg(long, env = "CHUNK_SIZE", default_value = "1000")]
    pub chunk_size: usize,

    #[arg(long, env = "CHUNK_OVERLAP", default_value = "200")]
    pub chunk_overlap: usize,

    /// Create the index first if it does not exist.
    #[arg(long, default_value = "false")]
    pub create_index: bool,

    #[command(flatten)]
    pub embedding: EmbeddingArgs,

    #[command(flatten)]
    pub vector: VectorArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CreateIndexArgs {
    #[command(flatten)]
    pub vector: VectorArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InitDbArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Drop all tables before recreating them.
    #[arg(long, default_value = "false")]
    pub reset: bool,
}

fn non_empty(value: &str) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value.to_string()) }
}
