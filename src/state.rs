use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionQueue;
use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::metrics;
use crate::rate_limiter::RateLimiter;

/// Shared state handed to every handler via axum's `State` extractor.
///
/// Cloning is cheap: every field is already an `Arc` (or a plain `DashMap`
/// behind one, for `last_seen`), matching the teacher's convention of
/// wrapping all shared services once at startup and cloning the wrapper.
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub rate_limiter: Arc<RateLimiter>,
	pub admission: Arc<AdmissionQueue>,
	pub backends: Arc<BackendRegistry>,
	pub http_client: reqwest::Client,
	pub last_seen: Arc<DashMap<String, Instant>>,
}

impl AppState {
	/// Marks `key` as freshly active. Called on every admit and on every
	/// admission-slot release so the reaper's idle horizon is measured from
	/// the most recent activity, not just the most recent admit.
	pub fn touch(&self, key: &str) {
		self.last_seen.insert(key.to_string(), Instant::now());
	}
}

/// Background eviction of idle per-client state (C10). Sweeps the
/// rate-limiter windows, the admission queue's semaphores, and the
/// `last_seen` map together so the three stay consistent with each other.
///
/// A key is only dropped from `last_seen` once `admission.remove_if_idle`
/// confirms nothing currently holds a permit for it — a key that is both
/// idle-by-timestamp and currently in flight (a very long request) is left
/// alone until the request completes and releases its slot.
pub async fn run_reaper(state: AppState, shutdown: CancellationToken) {
	let mut ticker = tokio::time::interval(state.config.reaper_period());

	loop {
		tokio::select! {
			_ = ticker.tick() => {},
			_ = shutdown.cancelled() => {
				tracing::info!("state reaper shutting down");
				return;
			}
		}

		let cutoff = Instant::now() - state.config.ip_idle();
		let mut evicted = 0usize;

		state.last_seen.retain(|key, &mut last_touched| {
			if last_touched > cutoff {
				return true;
			}
			if !state.admission.remove_if_idle(key) {
				return true;
			}
			evicted += 1;
			false
		});

		state.rate_limiter.evict_idle(cutoff);

		if evicted > 0 {
			tracing::debug!(evicted, "reaper evicted idle client state");
		}
	}
}

/// Background health prober driving C4's active/inactive subset. Runs
/// until cancelled; never invoked from the request path.
pub async fn run_health_prober(state: AppState, shutdown: CancellationToken) {
	let mut ticker = tokio::time::interval(state.config.health_interval());

	loop {
		tokio::select! {
			_ = ticker.tick() => {},
			_ = shutdown.cancelled() => {
				tracing::info!("health prober shutting down");
				return;
			}
		}

		state.backends.probe_once(&state.http_client).await;

		for (pool, active, _total) in state.backends.active_counts() {
			metrics::BACKEND_ACTIVE.with_label_values(&[pool]).set(active as i64);
		}
	}
}
