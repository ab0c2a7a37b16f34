use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ header, Client, StatusCode };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use tokio::sync::OnceCell;

use super::{ ChunkMetadata, ChunkRecord, Metric, ScoredChunk, VectorConfig, VectorError, VectorIndex };

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

#[derive(Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<ChunkMetadata>,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: String,
    spec: IndexSpec<'a>,
}

#[derive(Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

/// Pinecone serverless index reached over its REST API.
pub struct PineconeIndex {
    http: Client,
    index_name: String,
    dimension: usize,
    metric: Metric,
    cloud: String,
    region: String,
    host: OnceCell<String>,
}

impl PineconeIndex {
    pub fn new(api_key: &str, config: &VectorConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = header::HeaderMap::new();
        headers.insert("Api-Key", header::HeaderValue::from_str(api_key)?);
        headers.insert("X-Pinecone-API-Version", header::HeaderValue::from_static(API_VERSION));
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        let http = Client::builder().default_headers(headers).build()?;

        let host = OnceCell::new();
        if let Some(configured) = config.host.as_deref().filter(|h| !h.trim().is_empty()) {
            host.set(normalize_host(configured)).ok();
        }

        Ok(Self {
            http,
            index_name: config.index_name.clone(),
            dimension: config.dimension,
            metric: config.metric,
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            host,
        })
    }

    pub fn from_config(config: &VectorConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.secret
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| VectorError("VECTOR_SECRET (Pinecone API key) is required".into()))?;
        Self::new(api_key, config)
    }

    /// Data-plane host, discovered from the control plane when not configured.
    async fn data_host(&self) -> Result<&str, Box<dyn StdError + Send + Sync>> {
        let host = self.host
            .get_or_try_init(|| async {
                let described = self.describe_index().await?.ok_or_else(|| {
                    VectorError(format!("Pinecone index '{}' does not exist", self.index_name))
                })?;
                Ok::<_, Box<dyn StdError + Send + Sync>>(normalize_host(&described.host))
            }).await?;
        Ok(host.as_str())
    }

    async fn describe_index(&self) -> Result<Option<DescribeIndexResponse>, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/indexes/{}", CONTROL_PLANE_URL, self.index_name);
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, "describe index").await?;
        Ok(Some(response.json().await?))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

async fn check_status(
    response: reqwest::Response,
    action: &str
) -> Result<reqwest::Response, Box<dyn StdError + Send + Sync>> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Box::new(VectorError(format!("Pinecone {} failed ({}): {}", action, status, body))))
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn ensure_index(&self) -> Result<(), Box<dyn StdError + Send + Sync>> {
        if self.describe_index().await?.is_some() {
            info!("Pinecone index '{}' already exists", self.index_name);
            return Ok(());
        }

        let request = CreateIndexRequest {
            name: &self.index_name,
            dimension: self.dimension,
            metric: self.metric.to_string(),
            spec: IndexSpec {
                serverless: ServerlessSpec { cloud: &self.cloud, region: &self.region },
            },
        };
        let response = self.http
            .post(format!("{}/indexes", CONTROL_PLANE_URL))
            .json(&request)
            .send().await?;
        if response.status() == StatusCode::CONFLICT {
            info!("Pinecone index '{}' was created concurrently", self.index_name);
            return Ok(());
        }
        check_status(response, "create index").await?;
        info!(
            "Created Pinecone index '{}' ({} dims, {}, {}/{})",
            self.index_name,
            self.dimension,
            self.metric,
            self.cloud,
            self.region
        );
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
        let host = self.data_host().await?;
        let request = UpsertRequest {
            vectors: records
                .iter()
                .map(|r| PineconeVector { id: &r.id, values: &r.values, metadata: &r.metadata })
                .collect(),
            namespace,
        };
        let response = self.http.post(format!("{}/vectors/upsert", host)).json(&request).send().await?;
        let body: UpsertResponse = check_status(response, "upsert").await?.json().await?;
        debug!("Pinecone upserted {} vectors into '{}'", body.upserted_count, namespace);
        Ok(body.upserted_count)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize
    ) -> Result<Vec<ScoredChunk>, Box<dyn StdError + Send + Sync>> {
        let host = self.data_host().await?;
        let request = QueryRequest {
            namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };
        let response = self.http.post(format!("{}/query", host)).json(&request).send().await?;
        let body: QueryResponse = check_status(response, "query").await?.json().await?;

        Ok(
            body.matches
                .into_iter()
                .map(|m| ScoredChunk {
                    id: m.id,
                    score: m.score,
                    metadata: m.metadata.unwrap_or_default(),
                })
                .collect()
        )
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::VectorType;

    fn config(host: Option<&str>) -> VectorConfig {
        VectorConfig {
            vector_type: VectorType::Pinecone,
            host: host.map(String::from),
            secret: Some("pc-key".into()),
            index_name: "medical-chatbot".into(),
            dimension: 384,
            metric: Metric::Cosine,
            cloud: "aws".into(),
            region: "us-east-1".into(),
        }
    }

    #[test]
    fn hosts_gain_https_scheme() {
        assert_eq!(normalize_host("idx-abc.svc.pinecone.io"), "https://idx-abc.svc.pinecone.io");
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[test]
    fn configured_host_skips_discovery() {
        let index = PineconeIndex::from_config(&config(Some("idx.pinecone.io"))).unwrap();
        assert_eq!(index.host.get().map(String::as_str), Some("https://idx.pinecone.io"));
        assert!(PineconeIndex::from_config(&config(None)).unwrap().host.get().is_none());
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let mut cfg = config(None);
        cfg.secret = None;
        assert!(PineconeIndex::from_config(&cfg).is_err());
    }

    #[test]
    fn query_request_uses_camel_case() {
        let request = QueryRequest {
            namespace: "medlineplus",
            vector: &[0.5],
            top_k: 4,
            include_metadata: true,
            include_values: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["topK"], 4);
        assert_eq!(json["includeMetadata"], true);
    }

    #[test]
    fn query_response_tolerates_missing_metadata() {
        let body: QueryResponse = serde_json
            ::from_str(
                r#"{"matches":[{"id":"a","score":0.9,"metadata":{"source":"u","title":"T","source_name":"MedlinePlus","text":"x"}},{"id":"b","score":0.1}]}"#
            )
            .unwrap();
        assert_eq!(body.matches.len(), 2);
        assert_eq!(body.matches[0].metadata.as_ref().unwrap().title, "T");
        assert!(body.matches[1].metadata.is_none());
    }
}
