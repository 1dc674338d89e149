//! Prometheus export and per-request HTTP metrics.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<Result<PrometheusHandle, String>> = OnceLock::new();

/// Install the global Prometheus recorder. Safe to call more than once; later
/// calls return the outcome of the first.
pub fn init_metrics_recorder() -> Result<(), anyhow::Error> {
    METRICS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
}

/// Current metrics in Prometheus text format.
pub fn render_metrics() -> String {
    match METRICS_HANDLE.get() {
        Some(Ok(handle)) => handle.render(),
        _ => "# Metrics recorder not initialized\n".to_string(),
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds`,
/// labelled by the matched route template so ids do not explode cardinality.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    let labels = [("method", method), ("path", path), ("status", status)];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());

    response
}
