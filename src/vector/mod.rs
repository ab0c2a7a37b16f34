pub mod memory;
pub mod pinecone;
pub mod qdrant;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use memory::MemoryIndex;
pub use pinecone::PineconeIndex;
pub use qdrant::QdrantIndex;

/// Metadata stored alongside every chunk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    pub source: String,
    pub title: String,
    pub source_name: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" => Ok(Metric::Euclidean),
            "dotproduct" | "dot" => Ok(Metric::DotProduct),
            _ => Err(format!("Invalid metric: '{}'", s)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::Euclidean => write!(f, "euclidean"),
            Metric::DotProduct => write!(f, "dotproduct"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorType {
    Pinecone,
    Qdrant,
    Memory,
}

impl FromStr for VectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pinecone" => Ok(VectorType::Pinecone),
            "qdrant" => Ok(VectorType::Qdrant),
            "memory" => Ok(VectorType::Memory),
            _ => Err(format!("Invalid vector type: '{}'", s)),
        }
    }
}

impl fmt::Display for VectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorType::Pinecone => write!(f, "pinecone"),
            VectorType::Qdrant => write!(f, "qdrant"),
            VectorType::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VectorConfig {
    pub vector_type: VectorType,
    pub host: Option<String>,
    pub secret: Option<String>,
    pub index_name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
}

#[derive(Debug)]
pub struct VectorError(pub String);

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector store error: {}", self.0)
    }
}

impl StdError for VectorError {}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the index if it does not exist yet.
    async fn ensure_index(&self) -> Result<(), Box<dyn StdError + Send + Sync>>;

    /// Inserts or overwrites records by id.
    async fn upsert(
        &self,
        namespace: &str,
        records: &[ChunkRecord]
    ) -> Result<usize, Box<dyn StdError + Send + Sync>>;

    /// Nearest neighbours of `vector`, best first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize
    ) -> Result<Vec<ScoredChunk>, Box<dyn StdError + Send + Sync>>;

    fn name(&self) -> &str;
}

pub fn create_vector_index(
    config: &VectorConfig
) -> Result<Arc<dyn VectorIndex>, Box<dyn StdError + Send + Sync>> {
    match config.vector_type {
        VectorType::Pinecone => Ok(Arc::new(PineconeIndex::from_config(config)?)),
        VectorType::Qdrant => Ok(Arc::new(QdrantIndex::from_config(config)?)),
        VectorType::Memory => Ok(Arc::new(MemoryIndex::new(config.metric))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vector_types_and_metrics() {
        assert_eq!(" Pinecone ".parse::<VectorType>().unwrap(), VectorType::Pinecone);
        assert_eq!("memory".parse::<VectorType>().unwrap(), VectorType::Memory);
        assert!("milvus".parse::<VectorType>().is_err());
        assert_eq!("COSINE".parse::<Metric>().unwrap(), Metric::Cosine);
        assert_eq!(Metric::DotProduct.to_string(), "dotproduct");
    }
}
