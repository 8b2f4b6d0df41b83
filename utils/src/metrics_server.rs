//! HTTP endpoint exposing a service's Prometheus registry.
//!
//! - `GET /metrics`: text exposition format
//! - `GET /health`: liveness

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tracing::info;

/// Encode every metric in `registry` as Prometheus text.
pub fn encode_metrics(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

async fn metrics_handler(State(registry): State<Registry>) -> Response {
    match encode_metrics(&registry) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(registry)
}

/// Serve `/metrics` and `/health` on `port` until shutdown is signalled.
pub async fn serve_metrics(
    registry: Registry,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("metrics endpoint listening on {}", addr);
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
