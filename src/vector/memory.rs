use async_trait::async_trait;
use log::warn;
use std::cmp::Ordering;
use std::collections::{ BTreeMap, HashMap };
use std::error::Error as StdError;
use tokio::sync::RwLock;

use super::{ ChunkRecord, Metric, ScoredChunk, VectorError, VectorIndex };

/// Process-local index for development and tests. Contents are lost on exit.
pub struct MemoryIndex {
    metric: Metric,
    namespaces: RwLock<HashMap<String, BTreeMap<String, ChunkRecord>>>,
}

impl MemoryIndex {
    pub fn new(metric: Metric) -> Self {
        Self { metric, namespaces: RwLock::new(HashMap::new()) }
    }

    pub async fn len(&self, namespace: &str) -> usize {
        self.namespaces.read().await.get(namespace).map_or(0, |ns| ns.len())
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            Metric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
            }
            Metric::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            // Negated so that higher is always better.
            Metric::Euclidean => -a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt(),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_index(&self) -> Result<(), Box<dyn StdError + Send + Sync>> {
        warn!("In-memory vector index selected; ingested chunks are not persisted");
        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &str,
        records: &[ChunkRecord]
    ) -> Result<usize, Box<dyn StdError + Send + Sync>> {
        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            ns.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize
    ) -> Result<Vec<ScoredChunk>, Box<dyn StdError + Send + Sync>> {
        let namespaces = self.namespaces.read().await;
        let Some(ns) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored = Vec::with_capacity(ns.len());
        for record in ns.values() {
            if record.values.len() != vector.len() {
                return Err(
                    Box::new(
                        VectorError(
                            format!(
                                "query dimension {} does not match stored dimension {}",
                                vector.len(),
                                record.values.len()
                            )
                        )
                    )
                );
            }
            scored.push(ScoredChunk {
                id: record.id.clone(),
                score: self.score(vector, &record.values),
                metadata: record.metadata.clone(),
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
