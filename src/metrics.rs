use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::middleware::Next;
use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder};
use std::time::Instant;

lazy_static! {
	static ref HTTP_REQUESTS_TOTAL: IntCounterVec =
		register_int_counter_vec!("gateway_http_requests_total", "Total number of HTTP requests", &["method", "route", "status"]).expect("failed to register gateway_http_requests_total");
	static ref HTTP_REQUEST_DURATION: HistogramVec =
		register_histogram_vec!("gateway_http_request_duration_seconds", "HTTP request duration in seconds", &["method", "route"]).expect("failed to register gateway_http_request_duration_seconds");
	pub static ref RATE_LIMIT_REJECTIONS: IntCounterVec =
		register_int_counter_vec!("gateway_rate_limit_rejections_total", "Requests rejected by the per-client rate limiter", &["pool"]).expect("failed to register gateway_rate_limit_rejections_total");
	pub static ref CONCURRENCY_REJECTIONS: IntCounterVec = register_int_counter_vec!(
		"gateway_concurrency_rejections_total",
		"Requests rejected after the admission queue timed out",
		&["pool"]
	)
	.expect("failed to register gateway_concurrency_rejections_total");
	pub static ref INFLIGHT_REQUESTS: IntGaugeVec =
		register_int_gauge_vec!("gateway_inflight_requests", "Requests currently holding an admission slot", &["pool"]).expect("failed to register gateway_inflight_requests");
	pub static ref BACKEND_ACTIVE: IntGaugeVec =
		register_int_gauge_vec!("gateway_backend_active", "Active member count per backend pool", &["pool"]).expect("failed to register gateway_backend_active");
}

/// Records request count and latency by method/route/status. Mounted as an
/// outer `axum::middleware::from_fn` layer, outside the admission pipeline,
/// so `/metrics` and `/health` are counted too.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response<Body> {
	let method = req.method().to_string();
	let route = normalize_path(req.uri().path());

	let start = Instant::now();
	let response = next.run(req).await;
	let duration = start.elapsed().as_secs_f64();

	let status = response.status().as_u16().to_string();
	HTTP_REQUESTS_TOTAL.with_label_values(&[&method, &route, &status]).inc();
	HTTP_REQUEST_DURATION.with_label_values(&[&method, &route]).observe(duration);

	response
}

fn normalize_path(path: &str) -> String {
	path.trim_end_matches('/').split('?').next().unwrap_or("/").to_string()
}

pub async fn metrics_handler() -> Result<String, StatusCode> {
	let encoder = TextEncoder::new();
	let metric_families = prometheus::gather();
	let mut buffer = Vec::new();

	if encoder.encode(&metric_families, &mut buffer).is_err() {
		return Err(StatusCode::INTERNAL_SERVER_ERROR);
	}

	String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
