//! Prometheus metrics endpoint handler.
//!
//! `/metrics` is unauthenticated so Prometheus can scrape it. Labels carry no
//! user identifiers or token contents.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE todo_jwt_validations_total counter
/// todo_jwt_validations_total{result="success"} 42
/// ```
#[tracing::instrument(skip_all, name = "todo.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
