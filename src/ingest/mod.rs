pub mod chunker;
pub mod medlineplus;

use log::{ debug, info };
use std::error::Error as StdError;
use uuid::Uuid;

use crate::llm::embedding::EmbeddingClient;
use crate::vector::{ ChunkMetadata, ChunkRecord, VectorError, VectorIndex };
use self::chunker::RecursiveSplitter;
use self::medlineplus::{ HealthTopic, SOURCE_NAME };

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// A chunk waiting to be embedded.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingChunk {
    pub id: String,
    pub metadata: ChunkMetadata,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub topics: usize,
    pub chunks: usize,
    pub upserted: usize,
}

/// Stable id so re-ingesting a topic overwrites its previous chunks.
pub fn chunk_id(url: &str, index: usize) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{}#{}", url, index).as_bytes()).to_string()
}

pub fn build_chunks(topics: &[HealthTopic], splitter: &RecursiveSplitter) -> Vec<PendingChunk> {
    let mut chunks = Vec::new();
    for topic in topics {
        for (index, text) in splitter.split(&topic.summary).into_iter().enumerate() {
            chunks.push(PendingChunk {
                id: chunk_id(&topic.url, index),
                metadata: ChunkMetadata {
                    source: topic.url.clone(),
                    title: topic.title.clone(),
                    source_name: SOURCE_NAME.to_string(),
                    text,
                },
            });
        }
    }
    chunks
}

pub struct Ingestor<'a> {
    pub splitter: RecursiveSplitter,
    pub embedder: &'a dyn EmbeddingClient,
    pub index: &'a dyn VectorIndex,
    pub namespace: String,
    pub batch_size: usize,
    /// When set, every embedding must have this length.
    pub dimension: Option<usize>,
}

impl Ingestor<'_> {
    pub async fn ingest_xml(&self, xml: &str) -> Result<IngestReport, Box<dyn StdError + Send + Sync>> {
        let topics = medlineplus::parse_health_topics(xml)?;
        info!("Extracted {} topics", topics.len());
        self.ingest_topics(&topics).await
    }

    pub async fn ingest_topics(
        &self,
        topics: &[HealthTopic]
    ) -> Result<IngestReport, Box<dyn StdError + Send + Sync>> {
        let chunks = build_chunks(topics, &self.splitter);
        info!("Total chunks created: {}", chunks.len());

        let mut upserted = 0;
        let batch_size = self.batch_size.max(1);
        let batches = chunks.len().div_ceil(batch_size);
        for (n, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch
                .iter()
                .map(|c| c.metadata.text.clone())
                .collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(
                    Box::new(
                        VectorError(
                            format!("expected {} embeddings, got {}", batch.len(), embeddings.len())
                        )
                    )
                );
            }

            let mut records = Vec::with_capacity(batch.len());
            for (chunk, values) in batch.iter().zip(embeddings) {
                if let Some(expected) = self.dimension {
                    if values.len() != expected {
                        return Err(
                            Box::new(
                                VectorError(
                                    format!(
                                        "embedding dimension {} does not match index dimension {}",
                                        values.len(),
                                        expected
                                    )
                                )
                            )
                        );
                    }
                }
                records.push(ChunkRecord {
                    id: chunk.id.clone(),
                    values,
                    metadata: chunk.metadata.clone(),
                });
            }

            upserted += self.index.upsert(&self.namespace, &records).await?;
            debug!("Upserted batch {}/{} into '{}'", n + 1, batches, self.namespace);
        }

        info!(
            "{} chunks uploaded to {} under '{}' namespace",
            upserted,
            self.index.name(),
            self.namespace
        );
        Ok(IngestReport { topics: topics.len(), chunks: chunks.len(), upserted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::embedding::EmbeddingResponse;
    use crate::vector::{ MemoryIndex, Metric };
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingClient for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<EmbeddingResponse, Box<dyn StdError + Send + Sync>> {
            Ok(EmbeddingResponse { embedding: vec![text.len() as f32, 1.0] })
        }
    }

    fn topic(title: &str, url: &str, summary: &str) -> HealthTopic {
        HealthTopic { title: title.into(), url: url.into(), summary: summary.into() }
    }

    #[test]
    fn chunk_ids_are_stable_per_url_and_index() {
        assert_eq!(chunk_id("https://medlineplus.gov/a.html", 0), chunk_id("https://medlineplus.gov/a.html", 0));
        assert_ne!(chunk_id("https://medlineplus.gov/a.html", 0), chunk_id("https://medlineplus.gov/a.html", 1));
    }

    #[test]
    fn chunks_carry_topic_metadata() {
        let topics = vec![topic("Asthma", "https://medlineplus.gov/asthma.html", "aaa bbb ccc ddd"), topic("Empty", "u", "")];
        let chunks = build_chunks(&topics, &RecursiveSplitter::new(10, 4));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.metadata.title == "Asthma" && c.metadata.source_name == "MedlinePlus"));
        assert_eq!(chunks[1].metadata.text, "bbb ccc");
    }

    #[tokio::test]
    async fn ingest_twice_overwrites_instead_of_duplicating() {
        let index = MemoryIndex::new(Metric::Cosine);
        let ingestor = Ingestor {
            splitter: RecursiveSplitter::new(10, 4),
            embedder: &LengthEmbedder,
            index: &index,
            namespace: "medlineplus".into(),
            batch_size: 2,
            dimension: Some(2),
        };
        let topics = vec![topic("Asthma", "https://medlineplus.gov/asthma.html", "aaa bbb ccc ddd")];

        let report = ingestor.ingest_topics(&topics).await.unwrap();
        assert_eq!(report, IngestReport { topics: 1, chunks: 3, upserted: 3 });
        ingestor.ingest_topics(&topics).await.unwrap();
        assert_eq!(index.len("medlineplus").await, 3);
    }

    #[tokio::test]
    async fn dimension_mismatch_aborts_ingest() {
        let index = MemoryIndex::new(Metric::Cosine);
        let ingestor = Ingestor {
            splitter: RecursiveSplitter::default(),
            embedder: &LengthEmbedder,
            index: &index,
            namespace: "medlineplus".into(),
            batch_size: 8,
            dimension: Some(384),
        };
        let topics = vec![topic("Asthma", "u", "Asthma is a chronic disease.")];
        assert!(ingestor.ingest_topics(&topics).await.is_err());
        assert_eq!(index.len("medlineplus").await, 0);
    }
}
