//! Metrics definitions for the todo service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `todo_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: normalized paths (ids replaced with `{id}`)
//! - `result`: `success` or an `AuthFailure` label
//! - `status`: `success`, `error`, `throttled`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used by `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("todo_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("todo_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `todo_http_requests_total`, `todo_http_request_duration_seconds`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("todo_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.clone(),
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("todo_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Replace numeric path segments so per-todo URLs share one series.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" | "/api/todos" => path.to_string(),
        _ if path.starts_with("/api/todos/") => path
            .split('/')
            .map(|segment| {
                if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                    "{id}"
                } else {
                    segment
                }
            })
            .collect::<Vec<_>>()
            .join("/"),
        _ => "other".to_string(),
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record a token verification outcome.
///
/// Metric: `todo_jwt_validations_total`
/// Labels: `result` (`success` or an `AuthFailure::metric_label`)
pub fn record_jwt_validation(result: &'static str) {
    counter!("todo_jwt_validations_total", "result" => result).increment(1);
}

/// Record a key set fetch attempt.
///
/// Metric: `todo_jwks_refresh_total`, `todo_jwks_refresh_duration_seconds`
/// Labels: `status` (`success`, `error`, `throttled`)
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    counter!("todo_jwks_refresh_total", "status" => status).increment(1);
    if status != "throttled" {
        histogram!("todo_jwks_refresh_duration_seconds", "status" => status)
            .record(duration.as_secs_f64());
    }
}

/// Number of keys in the current key set snapshot.
///
/// Metric: `todo_jwks_keys`
pub fn set_jwks_key_count(count: usize) {
    gauge!("todo_jwks_keys").set(count as f64);
}

// ============================================================================
// Persistence Metrics
// ============================================================================

/// Record a repository operation.
///
/// Metric: `todo_db_queries_total`, `todo_db_query_duration_seconds`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("todo_db_query_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("todo_db_queries_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}
