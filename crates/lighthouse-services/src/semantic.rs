//! Minimal Qdrant HTTP client for the optional semantic index.
//!
//! The collection is created lazily on first use; vectors use cosine
//! distance. Point ids are u64s derived from SHA-256 of
//! `"<peer_id>:<service_name>"` because this Qdrant setup expects
//! numeric or UUID ids.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("qdrant request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("qdrant {op} failed: status={status} body={body}")]
    Status {
        op: &'static str,
        status: u16,
        body: String,
    },
    #[error("empty query vector")]
    EmptyVector,
}

/// One similarity hit, score plus the payload stored at upsert time.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Debug)]
pub struct QdrantIndex {
    base_url: String,
    collection: String,
    http: reqwest::Client,
    collection_ready: AtomicBool,
}

impl QdrantIndex {
    pub fn new(base_url: &str, collection: &str) -> Result<Self, SemanticError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            http,
            collection_ready: AtomicBool::new(false),
        })
    }

    /// Create the collection if this client has not confirmed it yet.
    /// 200, 201, and 409 (already exists) all count as success.
    async fn ensure_collection(&self, dim: usize) -> Result<(), SemanticError> {
        if self.collection_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let url = format!("{}/collections/{}", self.base_url, self.collection);
        let body = json!({
            "vectors": { "size": dim, "distance": "Cosine" },
        });
        let response = self.http.put(&url).json(&body).send().await?;
        let status = response.status().as_u16();
        if !matches!(status, 200 | 201 | 409) {
            return Err(SemanticError::Status {
                op: "create collection",
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        self.collection_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Store or update a single service vector.
    pub async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        payload: serde_json::Value,
    ) -> Result<(), SemanticError> {
        if vector.is_empty() {
            return Ok(());
        }
        self.ensure_collection(vector.len()).await?;

        let url = format!("{}/collections/{}/points", self.base_url, self.collection);
        let body = json!({
            "points": [{
                "id": point_id(id),
                "vector": vector,
                "payload": payload,
            }],
        });
        let response = self.http.put(&url).json(&body).send().await?;
        let status = response.status().as_u16();
        if !matches!(status, 200 | 202) {
            return Err(SemanticError::Status {
                op: "upsert",
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Vector similarity search, best `limit` hits with payloads.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, SemanticError> {
        if vector.is_empty() {
            return Err(SemanticError::EmptyVector);
        }
        let limit = if limit == 0 {
            DEFAULT_SEARCH_LIMIT
        } else {
            limit
        };
        self.ensure_collection(vector.len()).await?;

        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(SemanticError::Status {
                op: "search",
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.result)
    }
}

/// Deterministically map a point id string to a u64: the high 8 bytes of
/// its SHA-256 digest, big-endian.
pub fn point_id(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut value = 0u64;
    for byte in &digest[..8] {
        value = (value << 8) | u64::from(*byte);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic_and_distinct() {
        assert_eq!(point_id("peerA:math"), point_id("peerA:math"));
        assert_ne!(point_id("peerA:math"), point_id("peerB:math"));
        assert_ne!(point_id("peerA:math"), point_id("peerA:stats"));
    }

    #[test]
    fn point_id_uses_the_digest_prefix() {
        let digest = Sha256::digest(b"peerA:math");
        let expected = u64::from_be_bytes(digest[..8].try_into().unwrap());
        assert_eq!(point_id("peerA:math"), expected);
    }

    #[test]
    fn base_url_is_normalized() {
        let index = QdrantIndex::new("http://localhost:6333/", "prxs_services").unwrap();
        assert_eq!(index.base_url, "http://localhost:6333");
    }

    #[test]
    fn search_hits_tolerate_missing_fields() {
        let hit: SearchHit = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(hit.score, 0.0);
        assert!(hit.payload.is_null());
    }
}
