pub mod citations;

use log::{ debug, info };
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::ingest::medlineplus::SOURCE_NAME;
use crate::llm::embedding::EmbeddingClient;
use crate::vector::{ ScoredChunk, VectorIndex };
use self::citations::{ CandidateSource, UNKNOWN_TOPIC };

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_CONTEXT_DOCS: usize = 2;
const CONTEXT_EXCERPT_CHARS: usize = 300;
const SNIPPET_CHARS: usize = 100;

#[derive(Debug)]
pub struct RetrievalError(pub String);

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Retrieval error: {}", self.0)
    }
}

impl StdError for RetrievalError {}

/// Context text for the prompt plus the documents it was built from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetrievedContext {
    pub context: String,
    pub candidates: Vec<CandidateSource>,
    pub hits: Vec<ScoredChunk>,
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Formats the first `context_docs` hits under a `<PROVIDER> SOURCES:`
/// header and collects a citation candidate for each one with a URL.
pub fn build_context(hits: &[ScoredChunk], context_docs: usize) -> (String, Vec<CandidateSource>) {
    let used = &hits[..hits.len().min(context_docs)];
    if used.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut lines = vec![format!("{} SOURCES:", SOURCE_NAME.to_uppercase())];
    let mut candidates = Vec::new();
    for (i, hit) in used.iter().enumerate() {
        let text = &hit.metadata.text;
        lines.push(format!("Source {}: {}...", i + 1, excerpt(text, CONTEXT_EXCERPT_CHARS)));
        if !hit.metadata.source.is_empty() {
            let title = if hit.metadata.title.is_empty() {
                UNKNOWN_TOPIC.to_string()
            } else {
                hit.metadata.title.clone()
            };
            candidates.push(CandidateSource {
                provider: SOURCE_NAME.to_string(),
                url: hit.metadata.source.clone(),
                title,
                snippet: excerpt(text, SNIPPET_CHARS).to_string(),
            });
        }
    }
    (lines.join("\n"), candidates)
}

#[derive(Clone)]
pub struct Retriever {
    embedding_client: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    namespace: String,
    dimension: usize,
    top_k: usize,
    context_docs: usize,
}

impl Retriever {
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        namespace: String,
        dimension: usize,
        top_k: usize,
        context_docs: usize
    ) -> Self {
        Self {
            embedding_client,
            index,
            namespace,
            dimension,
            top_k: top_k.max(1),
            context_docs,
        }
    }

    pub async fn retrieve(&self, question: &str) -> Result<RetrievedContext, Box<dyn StdError + Send + Sync>> {
        let embedding = self.embedding_client
            .embed(question).await
            .map_err(|e| RetrievalError(format!("Embedding failed: {}", e)))?
            .embedding;
        if embedding.len() != self.dimension {
            return Err(
                Box::new(
                    RetrievalError(
                        format!(
                            "embedding has {} dimensions but the index expects {}",
                            embedding.len(),
                            self.dimension
                        )
                    )
                )
            );
        }

        let hits = self.index
            .query(&self.namespace, &embedding, self.top_k).await
            .map_err(|e| RetrievalError(format!("Vector query failed: {}", e)))?;
        info!("Retrieved {} docs from {} ('{}')", hits.len(), self.index.name(), self.namespace);

        let (context, candidates) = build_context(&hits, self.context_docs);
        debug!("Context: {} chars, {} candidate sources", context.chars().count(), candidates.len());
        Ok(RetrievedContext { context, candidates, hits })
    }
}
