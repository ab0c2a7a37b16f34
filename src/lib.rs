pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;
pub mod vector;

use agent::MedicalAgent;
use auth::{ AuthService, PasswordHasher, SessionSigner, SqliteAccountStore };
use cli::{ Cli, Command, CreateIndexArgs, IngestArgs, InitDbArgs, ServeArgs };
use history::SqliteHistoryStore;
use ingest::chunker::RecursiveSplitter;
use ingest::Ingestor;
use log::{ error, info, warn };
use rag::Retriever;
use server::{ AppState, Server, TlsPaths };
use std::error::Error;
use std::sync::Arc;

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Ingest(args) => ingest(args).await,
        Command::CreateIndex(args) => create_index(args).await,
        Command::InitDb(args) => init_db(args).await,
    }
}

fn tls_paths(args: &ServeArgs) -> Result<Option<TlsPaths>, Box<dyn Error + Send + Sync>> {
    if !args.enable_tls {
        return Ok(None);
    }
    match (&args.tls_cert_path, &args.tls_key_path) {
        (Some(cert_path), Some(key_path)) => {
            Ok(Some(TlsPaths { cert_path: cert_path.clone(), key_path: key_path.clone() }))
        }
        (Some(_), None) | (None, Some(_)) => {
            error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
            Err("Missing TLS certificate or key path".into())
        }
        (None, None) => {
            error!("--enable-tls was set but no certificate/key paths provided.");
            Err("TLS enabled without cert/key".into())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let chat_config = args.chat.llm_config()?;
    let embedding_config = args.embedding.llm_config()?;
    let vector_config = args.vector.vector_config()?;

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Database URL: {}", args.database.database_url);
    info!("Chat LLM Type: {}", chat_config.llm_type);
    info!("Chat Model: {}", chat_config.completion_model.as_deref().unwrap_or("(provider default)"));
    info!("Embedding LLM Type: {}", embedding_config.llm_type);
    info!(
        "Embedding Model: {}",
        embedding_config.embedding_model.as_deref().unwrap_or("(provider default)")
    );
    info!("Vector Store Type: {}", vector_config.vector_type);
    info!("Vector Index: {} (namespace {})", vector_config.index_name, args.vector.namespace);
    info!("Vector Dimension: {}", vector_config.dimension);
    info!("Retrieval: top_k={} context_docs={}", args.rag.top_k, args.rag.context_docs);
    info!("Prompts Path: {}", args.rag.prompts_path);
    info!("Session TTL: {}h", args.session_ttl_hours);
    info!("Chat Rate Limit: {}/s", args.chat_rate_limit);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    if args.session_secret.trim().is_empty() {
        return Err("SESSION_SECRET must not be empty".into());
    }
    let tls = tls_paths(&args)?;

    let pool = db::connect(&args.database.database_url, args.database.database_max_connections).await?;

    let chat_client = llm::chat::new_client(&chat_config)?;
    let embedding_client = llm::embedding::new_client(&embedding_config)?;
    let index = vector::create_vector_index(&vector_config)?;
    let prompts = config::prompt::load_prompts(&args.rag.prompts_path)?;

    let retriever = Retriever::new(
        embedding_client,
        index,
        args.vector.namespace.clone(),
        vector_config.dimension,
        args.rag.top_k,
        args.rag.context_docs
    );
    let agent = Arc::new(
        MedicalAgent::new(chat_client, retriever, prompts, Arc::new(SqliteHistoryStore::new(pool.clone())))
    );

    let auth = AuthService::new(
        Arc::new(SqliteAccountStore::new(pool)),
        PasswordHasher::new(args.password_hash_iterations),
        args.session_ttl_hours
    );
    let purged = auth.purge_expired().await?;
    if purged > 0 {
        info!("Removed {} expired sessions", purged);
    }

    let signer = SessionSigner::new(args.session_secret.as_bytes()).map_err(|e|
        format!("SESSION_SECRET is not a usable signing key: {}", e)
    )?;
    let state = AppState::new(agent, auth, signer, args.chat_rate_limit, tls.is_some())?;

    Server::new(args.server_addr, state, tls).run().await
}

async fn ingest(args: IngestArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let embedding_config = args.embedding.llm_config()?;
    let vector_config = args.vector.vector_config()?;
    info!(
        "Ingesting {} into {} index '{}' (namespace {})",
        args.xml_path.display(),
        vector_config.vector_type,
        vector_config.index_name,
        args.vector.namespace
    );

    let embedding_client = llm::embedding::new_client(&embedding_config)?;
    let index = vector::create_vector_index(&vector_config)?;
    if args.create_index {
        index.ensure_index().await?;
    }

    let xml = tokio::fs::read_to_string(&args.xml_path).await.map_err(|e| {
        error!("Failed to read {}: {}", args.xml_path.display(), e);
        e
    })?;

    let ingestor = Ingestor {
        splitter: RecursiveSplitter::new(args.chunk_size, args.chunk_overlap),
        embedder: embedding_client.as_ref(),
        index: index.as_ref(),
        namespace: args.vector.namespace.clone(),
        batch_size: args.batch_size,
        dimension: Some(vector_config.dimension),
    };
    let report = ingestor.ingest_xml(&xml).await?;
    info!(
        "Ingest complete: {} topics, {} chunks, {} vectors upserted",
        report.topics,
        report.chunks,
        report.upserted
    );
    if report.topics == 0 {
        warn!("No health topics found in {}", args.xml_path.display());
    }
    Ok(())
}

async fn create_index(args: CreateIndexArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let vector_config = args.vector.vector_config()?;
    let index = vector::create_vector_index(&vector_config)?;
    index.ensure_index().await?;
    info!("Index '{}' is ready on {}", vector_config.index_name, index.name());
    Ok(())
}

async fn init_db(args: InitDbArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let pool = db::connect(&args.database.database_url, args.database.database_max_connections).await?;
    if args.reset {
        warn!("Dropping all tables in {}", args.database.database_url);
        db::reset(&pool).await?;
    }
    info!("Database initialised");
    Ok(())
}
