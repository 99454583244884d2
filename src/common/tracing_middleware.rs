//! Structured logging and request tracing middleware
//!
//! Every request gets an `x-request-id` (taken from the caller or freshly
//! generated), a tracing span carrying it, start/completion log lines and a
//! latency sample in the global metrics registry.

use crate::common::metrics::METRICS;
use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath},
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Metrics label for requests that matched no route
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Generate a new unique request ID
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Middleware that adds request ID and structured logging to each request
pub async fn request_tracing_middleware(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let start = Instant::now();

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_request_id);

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    // Route template, so the metric label set stays bounded
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let client_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path,
        client_ip = %client_ip,
    );

    async move {
        debug!("Request started");

        let mut response = next.run(request).await;

        let duration = start.elapsed();
        let status = response.status();

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        METRICS.record_request(&route, duration, !status.is_server_error());

        if status.is_success() {
            info!(
                status = %status.as_u16(),
                duration_ms = %duration.as_millis(),
                "Request completed"
            );
        } else if status.is_client_error() {
            warn!(
                status = %status.as_u16(),
                duration_ms = %duration.as_millis(),
                "Client error"
            );
        } else {
            warn!(
                status = %status.as_u16(),
                duration_ms = %duration.as_millis(),
                "Server error"
            );
        }

        response
    }
    .instrument(span)
    .await
}
