//! /api/v1 handlers — project registry state into JSON.
//!
//! Every handler is read-only: state is locked only for the duration of
//! the projection, and the semantic index is queried before the state is
//! consulted so no external call happens under the lock.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use lighthouse_core::addr;
use lighthouse_core::embedding;
use lighthouse_core::protocol::{AddrInfo, ServiceCard};
use lighthouse_services::semantic::QdrantIndex;
use lighthouse_services::state::{RegistryState, ServiceGroup};

/// The node's own identity, fixed at startup.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub peer_id: String,
    /// Multiaddrs without the `/p2p/` suffix.
    pub multiaddrs: Vec<String>,
}

#[derive(Clone)]
pub struct ApiState {
    pub state: Arc<RegistryState>,
    pub semantic: Option<Arc<QdrantIndex>>,
    pub node: NodeIdentity,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
        }),
    )
}

// ── /health ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ── /services ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ServicesResponse {
    pub services: HashMap<String, Vec<AddrInfo>>,
    pub count: usize,
}

pub async fn all_services(State(api): State<ApiState>) -> Json<ServicesResponse> {
    let services = api.state.snapshot_services();
    let count = services.len();
    Json(ServicesResponse { services, count })
}

// ── /services_full ────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ServicesFullResponse {
    pub services: HashMap<String, ServiceGroup>,
    pub count: usize,
}

pub async fn all_services_full(State(api): State<ApiState>) -> Json<ServicesFullResponse> {
    let services = api.state.snapshot_full();
    let count = services.len();
    Json(ServicesFullResponse { services, count })
}

// ── /services/search ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub services: HashMap<String, Vec<AddrInfo>>,
    pub count: usize,
}

pub async fn search_services(
    State(api): State<ApiState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    if params.q.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "query parameter 'q' is required",
        ));
    }

    let services = api.state.search_by_name(&params.q);
    let count = services.len();
    Ok(Json(SearchResponse {
        query: params.q,
        services,
        count,
    }))
}

// ── /services/{name} ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ServiceByNameResponse {
    pub service: String,
    pub providers: Vec<AddrInfo>,
    pub count: usize,
}

pub async fn service_by_name(
    State(api): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceByNameResponse>, ApiError> {
    let providers = api.state.get_by_name(&name);
    if providers.is_empty() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("service '{name}' not found"),
        ));
    }
    let count = providers.len();
    Ok(Json(ServiceByNameResponse {
        service: name,
        providers,
        count,
    }))
}

// ── /services/semantic_search ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SemanticParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub k: Option<String>,
}

#[derive(Serialize)]
pub struct SemanticResult {
    pub service_name: String,
    pub score: f64,
    pub card: ServiceCard,
    pub providers: Vec<AddrInfo>,
}

#[derive(Serialize)]
pub struct SemanticResponse {
    pub query: String,
    pub results: Vec<SemanticResult>,
    pub count: usize,
}

pub async fn semantic_search(
    State(api): State<ApiState>,
    Query(params): Query<SemanticParams>,
) -> Result<Json<SemanticResponse>, ApiError> {
    let Some(index) = &api.semantic else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "semantic search is not enabled (no Qdrant configured)",
        ));
    };
    if params.q.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "query parameter 'q' is required",
        ));
    }
    let k = parse_limit(params.k.as_deref());

    let vector = embedding::embed_query(&params.q);
    let hits = index.search(&vector, k).await.map_err(|err| {
        tracing::warn!(error = %err, "qdrant search failed");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("qdrant search failed: {err}"),
        )
    })?;

    // Cross-reference each hit against live state: a provider may have
    // unregistered or renamed its service since the vector was indexed.
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let service_name = hit
            .payload
            .get("service_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let peer_id = hit
            .payload
            .get("peer_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if service_name.is_empty() || peer_id.is_empty() {
            continue;
        }
        let Some(record) = api.state.get(peer_id) else {
            continue;
        };
        if record.service_card.name != service_name {
            continue;
        }
        results.push(SemanticResult {
            service_name: service_name.to_string(),
            score: hit.score,
            card: record.service_card,
            providers: vec![record.addr_info],
        });
    }

    let count = results.len();
    Ok(Json(SemanticResponse {
        query: params.q,
        results,
        count,
    }))
}

/// `k` query parameter: default 5, garbage or non-positive values fall
/// back to the default.
fn parse_limit(k: Option<&str>) -> usize {
    k.and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(5)
}

// ── /registry/info ────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RegistryInfoResponse {
    pub peer_id: String,
    pub multiaddrs: Vec<String>,
    pub bootstrap: String,
}

pub async fn registry_info(State(api): State<ApiState>) -> Json<RegistryInfoResponse> {
    let multiaddrs = api
        .node
        .multiaddrs
        .iter()
        .map(|a| addr::with_peer(a, &api.node.peer_id))
        .collect();
    let bootstrap =
        addr::preferred_bootstrap(&api.node.multiaddrs, &api.node.peer_id).unwrap_or_default();

    Json(RegistryInfoResponse {
        peer_id: api.node.peer_id.clone(),
        multiaddrs,
        bootstrap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_parsing_defaults_on_garbage() {
        assert_eq!(parse_limit(None), 5);
        assert_eq!(parse_limit(Some("abc")), 5);
        assert_eq!(parse_limit(Some("0")), 5);
        assert_eq!(parse_limit(Some("-3")), 5);
        assert_eq!(parse_limit(Some("12")), 12);
    }
}
