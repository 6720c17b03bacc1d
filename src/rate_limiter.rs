use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Per-client sliding-window rate limiter (C2).
///
/// Each client identity (K) owns a FIFO of hit timestamps. `check` evicts
/// everything older than the window, then admits iff the window still has
/// room under `allowed = max(RPS_BURST, floor(MAX_RPS_PER_IP * RPS_WINDOW_SECS))`.
/// The O(n) eviction is fine because n is bounded by `allowed`.
pub struct RateLimiter {
	window: Duration,
	allowed: usize,
	windows: DashMap<String, Arc<Mutex<VecDeque<Instant>>>>,
}

impl RateLimiter {
	pub fn new(window: Duration, allowed: usize) -> Self {
		Self {
			window,
			allowed,
			windows: DashMap::new(),
		}
	}

	fn window_for(&self, key: &str) -> Arc<Mutex<VecDeque<Instant>>> {
		self.windows.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(VecDeque::new()))).clone()
	}

	/// Returns `true` if the hit at `now` is admitted.
	pub async fn check(&self, key: &str) -> bool {
		self.check_at(key, Instant::now()).await
	}

	async fn check_at(&self, key: &str, now: Instant) -> bool {
		let window = self.window_for(key);
		let mut timestamps = window.lock().await;

		while let Some(&front) = timestamps.front() {
			if now.duration_since(front) > self.window {
				timestamps.pop_front();
			} else {
				break;
			}
		}

		if timestamps.len() >= self.allowed {
			false
		} else {
			timestamps.push_back(now);
			true
		}
	}

	/// Drops the hit window for any key untouched since `cutoff`. Called by
	/// the state reaper (C10); safe to call concurrently with `check`.
	pub fn evict_idle(&self, cutoff: Instant) {
		self.windows.retain(|_, window| match window.try_lock() {
			Ok(timestamps) => match timestamps.back() {
				Some(&last) => last > cutoff,
				None => false,
			},
			Err(_) => true,
		});
	}

	pub fn tracked_keys(&self) -> usize {
		self.windows.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn allows_up_to_the_limit_then_rejects() {
		let limiter = RateLimiter::new(Duration::from_secs(1), 3);

		assert!(limiter.check("org-a").await);
		assert!(limiter.check("org-a").await);
		assert!(limiter.check("org-a").await);
		assert!(!limiter.check("org-a").await);
	}

	#[tokio::test]
	async fn keys_are_independent() {
		let limiter = RateLimiter::new(Duration::from_secs(1), 1);

		assert!(limiter.check("org-a").await);
		assert!(!limiter.check("org-a").await);
		assert!(limiter.check("org-b").await);
	}

	#[tokio::test]
	async fn admits_again_once_the_window_expires() {
		let limiter = RateLimiter::new(Duration::from_millis(50), 1);

		let t0 = Instant::now();
		assert!(limiter.check_at("org-a", t0).await);
		assert!(!limiter.check_at("org-a", t0).await);
		assert!(limiter.check_at("org-a", t0 + Duration::from_millis(60)).await);
	}

	#[tokio::test]
	async fn evict_idle_drops_untouched_keys() {
		let limiter = RateLimiter::new(Duration::from_secs(1), 5);
		limiter.check("org-a").await;
		assert_eq!(limiter.tracked_keys(), 1);

		limiter.evict_idle(Instant::now() + Duration::from_secs(10));
		assert_eq!(limiter.tracked_keys(), 0);
	}
}
