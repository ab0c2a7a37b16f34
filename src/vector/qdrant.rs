use async_trait::async_trait;
use log::{ debug, info };
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    value::Kind,
    Condition,
    CreateCollectionBuilder,
    Distance,
    Filter,
    PointStruct,
    SearchPointsBuilder,
    UpsertPointsBuilder,
    Value,
    VectorParamsBuilder,
};
use std::collections::HashMap;
use std::error::Error as StdError;

use super::{ ChunkMetadata, ChunkRecord, Metric, ScoredChunk, VectorConfig, VectorIndex };

const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Qdrant collection; namespaces become a `namespace` payload filter.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
    metric: Metric,
}

impl QdrantIndex {
    pub fn from_config(config: &VectorConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let url = config.host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(DEFAULT_QDRANT_URL);
        let client = Qdrant::from_url(url).api_key(config.secret.clone()).build()?;
        Ok(Self {
            client,
            collection: config.index_name.clone(),
            dimension: config.dimension,
            metric: config.metric,
        })
    }

    fn distance(&self) -> Distance {
        match self.metric {
            Metric::Cosine => Distance::Cosine,
            Metric::Euclidean => Distance::Euclid,
            Metric::DotProduct => Distance::Dot,
        }
    }
}

fn string_value(s: &str) -> Value {
    Value { kind: Some(Kind::StringValue(s.to_string())) }
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> String {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

fn to_payload(namespace: &str, record: &ChunkRecord) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    payload.insert("namespace".to_string(), string_value(namespace));
    payload.insert("chunk_id".to_string(), string_value(&record.id));
    payload.insert("source".to_string(), string_value(&record.metadata.source));
    payload.insert("title".to_string(), string_value(&record.metadata.title));
    payload.insert("source_name".to_string(), string_value(&record.metadata.source_name));
    payload.insert("text".to_string(), string_value(&record.metadata.text));
    payload
}

fn from_payload(payload: &HashMap<String, Value>) -> ChunkMetadata {
    ChunkMetadata {
        source: payload_string(payload, "source"),
        title: payload_string(payload, "title"),
        source_name: payload_string(payload, "source_name"),
        text: payload_string(payload, "text"),
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_index(&self) -> Result<(), Box<dyn StdError + Send + Sync>> {
        if self.client.collection_exists(&self.collection).await? {
            info!("Qdrant collection '{}' already exists", self.collection);
            return Ok(());
        }
        self.client.create_collection(
            CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
                VectorParamsBuilder::new(self.dimension as u64, self.distance())
            )
        ).await?;
        info!("Created Qdrant collection '{}' ({} dims, {})", self.collection, self.dimension, self.metric);
        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &str,
        records: &[ChunkRecord]
    ) -> Result<usize, Box<dyn StdError + Send + Sync>> {
        if records.is_empty() {
            return Ok(0);
        }
        let points: Vec<PointStruct> = records
            .iter()
            .map(|r| PointStruct::new(r.id.clone(), r.values.clone(), to_payload(namespace, r)))
            .collect();
        self.client.upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true)).await?;
        debug!("Qdrant upserted {} points into '{}'", records.len(), namespace);
        Ok(records.len())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize
    ) -> Result<Vec<ScoredChunk>, Box<dyn StdError + Send + Sync>> {
        let response = self.client.search_points(
            SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                .filter(Filter::must([Condition::matches("namespace", namespace.to_string())]))
                .with_payload(true)
        ).await?;

        Ok(
            response.result
                .iter()
                .map(|point| ScoredChunk {
                    id: payload_string(&point.payload, "chunk_id"),
                    score: point.score,
                    metadata: from_payload(&point.payload),
                })
                .collect()
        )
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
