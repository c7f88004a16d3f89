//! lighthouse-api — read-only HTTP projection of registry state.

pub mod handlers;

use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

pub use handlers::{ApiState, NodeIdentity};

/// Developer frontends allowed to call the API from a browser.
const ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:5173",
    "http://localhost:3000",
    "http://127.0.0.1:5173",
];

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "REST API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router. Split out from [`serve`] so tests can drive the
/// handlers without a socket.
pub fn router(state: ApiState) -> Router {
    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .into_iter()
        .map(HeaderValue::from_static)
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(12 * 60 * 60));

    let api = Router::new()
        .route("/services", get(handlers::all_services))
        .route("/services_full", get(handlers::all_services_full))
        .route("/services/search", get(handlers::search_services))
        .route("/services/semantic_search", get(handlers::semantic_search))
        .route("/services/{name}", get(handlers::service_by_name))
        .route("/registry/info", get(handlers::registry_info))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .layer(cors)
}
