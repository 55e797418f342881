//! HTTP metrics middleware.
//!
//! Applied as the outermost layer so framework-level rejections (404, 405,
//! 415, JSON extractor 400s) and 401s from `require_auth` are counted too.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Records method, normalized path, status and latency for every response.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}
