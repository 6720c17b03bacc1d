pub mod admission;
pub mod backend;
pub mod config;
pub mod error;
pub mod handler;
pub mod health;
pub mod http_client;
pub mod identity;
pub mod metrics;
pub mod proxy;
pub mod rate_limiter;
pub mod router;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::admission::AdmissionQueue;
use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::rate_limiter::RateLimiter;
use crate::router::Route;
use crate::state::AppState;

/// Builds the fully-wired `AppState` from a parsed `Config` (C9's
/// dependencies, assembled once at startup).
pub fn build_state(config: Config) -> AppState {
	let config = Arc::new(config);

	let rate_limiter = Arc::new(RateLimiter::new(config.rps_window(), config.rate_window_allowance()));
	let admission = Arc::new(AdmissionQueue::new(config.max_inflight_per_ip, config.queue_timeout()));
	let backends = Arc::new(BackendRegistry::new(
		config.chat_backends.clone(),
		config.text2sql_backend.clone(),
		config.embed_backend.clone(),
		config.rerank_backend.clone(),
		config.health_fail_threshold,
		config.health_ok_threshold,
	));
	let http_client = http_client::build_http_client(&config.backend_api_key);

	AppState {
		config,
		rate_limiter,
		admission,
		backends,
		http_client,
		last_seen: Arc::new(DashMap::new()),
	}
}

/// Wraps a fixed `Route` into an axum handler closure bound to that route,
/// so the immutable C8 route table stays the single source of truth for
/// path→{pool, upstream path, mode} instead of being re-derived from the
/// axum `Router`'s own path matching.
fn proxied_route(route: Route) -> axum::routing::MethodRouter<AppState> {
	post(move |State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, body: Bytes| async move { handler::handle_proxied(route, state, peer, headers, body).await })
}

/// Assembles the full axum `Router`, wiring C8's route table, the
/// unauthenticated `/health` and `/metrics` surfaces, and the tracing +
/// metrics middleware stack (A3/A4) applied uniformly to every path.
pub fn build_router(state: AppState) -> Router {
	let mut router = Router::new();
	for &(path, route) in router::ROUTES {
		router = router.route(path, proxied_route(route));
	}

	router
		.route("/health", get(health::health))
		.route("/metrics", get(metrics::metrics_handler))
		.fallback(handler::not_found)
		.layer(ServiceBuilder::new().layer(axum::middleware::from_fn(metrics::metrics_middleware)).layer(TraceLayer::new_for_http()))
		.with_state(state)
}

/// Spawns the background reaper (C10) and health prober (C4), both
/// cancelled together via `shutdown`.
pub fn spawn_background_tasks(state: AppState, shutdown: CancellationToken) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
	let reaper = tokio::spawn(state::run_reaper(state.clone(), shutdown.clone()));
	let prober = tokio::spawn(state::run_health_prober(state, shutdown));
	(reaper, prober)
}

pub fn init_tracing(config: &Config) {
	use std::str::FromStr;
	use tracing_subscriber::filter::EnvFilter;
	use tracing_subscriber::fmt::format::JsonFields;
	use tracing_subscriber::layer::SubscriberExt;
	use tracing_subscriber::util::SubscriberInitExt;
	use tracing_subscriber::Layer;

	let directive = config.rust_log.as_deref().unwrap_or("info");
	let filter = EnvFilter::from_str(directive).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(if config.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(tracing_subscriber::fmt::layer().event_format(tracing_subscriber::fmt::format().pretty()).with_filter(filter))
		})
		.init();
}

pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
