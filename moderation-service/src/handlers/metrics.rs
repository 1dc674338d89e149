use axum::response::IntoResponse;

/// GET /metrics, Prometheus text format.
pub async fn metrics() -> impl IntoResponse {
    service_core::middleware::metrics::render_metrics()
}
