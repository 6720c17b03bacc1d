use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::GatewayError;

/// One backend base URL plus the health-probe bookkeeping used to compute
/// its active/inactive state (C4).
struct Backend {
	base_url: String,
	active: AtomicBool,
	consecutive_failures: AtomicU32,
	consecutive_successes: AtomicU32,
}

impl Backend {
	fn new(base_url: String) -> Self {
		Self {
			base_url,
			active: AtomicBool::new(true),
			consecutive_failures: AtomicU32::new(0),
			consecutive_successes: AtomicU32::new(0),
		}
	}
}

/// A named pool of equivalent backend base URLs for one model role.
///
/// Selection is round-robin via an atomically-advanced cursor — no
/// randomness, no stickiness. When health probing is enabled, selection
/// skips members flagged inactive; if every member in the pool is inactive,
/// selection falls back to round-robin over the full membership so the
/// caller still gets *a* backend and experiences the outage as a 502/504,
/// rather than the gateway itself failing the request.
pub struct Pool {
	members: Vec<Arc<Backend>>,
	cursor: AtomicUsize,
}

impl Pool {
	fn new(urls: Vec<String>) -> Self {
		Self {
			members: urls.into_iter().map(|u| Arc::new(Backend::new(u))).collect(),
			cursor: AtomicUsize::new(0),
		}
	}

	fn next_index(&self) -> usize {
		self.cursor.fetch_add(1, Ordering::Relaxed) % self.members.len()
	}

	/// Round-robin over the active subset; falls back to round-robin over
	/// the full membership if nothing is currently active.
	fn choose(&self) -> String {
		let len = self.members.len();
		for _ in 0..len {
			let idx = self.next_index();
			if self.members[idx].active.load(Ordering::Relaxed) {
				return self.members[idx].base_url.clone();
			}
		}
		let idx = self.next_index();
		self.members[idx].base_url.clone()
	}

	fn active_count(&self) -> usize {
		self.members.iter().filter(|b| b.active.load(Ordering::Relaxed)).count()
	}

	fn len(&self) -> usize {
		self.members.len()
	}
}

/// The four model-role pools named in the route table, plus health-probe
/// thresholds shared by all of them.
pub struct BackendRegistry {
	pub chat: Pool,
	pub text2sql: Pool,
	pub embed: Pool,
	pub rerank: Pool,
	fail_threshold: u32,
	ok_threshold: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolName {
	Chat,
	Text2Sql,
	Embed,
	Rerank,
}

impl BackendRegistry {
	pub fn new(chat_backends: Vec<String>, text2sql_backend: String, embed_backend: String, rerank_backend: String, fail_threshold: u32, ok_threshold: u32) -> Self {
		Self {
			chat: Pool::new(chat_backends),
			text2sql: Pool::new(vec![text2sql_backend]),
			embed: Pool::new(vec![embed_backend]),
			rerank: Pool::new(vec![rerank_backend]),
			fail_threshold,
			ok_threshold,
		}
	}

	pub fn pool(&self, name: PoolName) -> &Pool {
		match name {
			PoolName::Chat => &self.chat,
			PoolName::Text2Sql => &self.text2sql,
			PoolName::Embed => &self.embed,
			PoolName::Rerank => &self.rerank,
		}
	}

	pub fn choose(&self, name: PoolName) -> Result<String, GatewayError> {
		let pool = self.pool(name);
		if pool.len() == 0 {
			return Err(GatewayError::UpstreamMalformed);
		}
		Ok(pool.choose())
	}

	pub fn chat_backend_count(&self) -> usize {
		self.chat.len()
	}

	fn all_pools(&self) -> [&Pool; 4] {
		[&self.chat, &self.text2sql, &self.embed, &self.rerank]
	}

	/// Issues one lightweight GET per backend across all pools and updates
	/// each backend's consecutive-failure/-success counters, flipping
	/// `active` once a threshold is crossed. Runs on a background interval
	/// (see [`crate::state::spawn_health_prober`]); never invoked from the
	/// request path.
	pub async fn probe_once(&self, client: &reqwest::Client) {
		for pool in self.all_pools() {
			for backend in &pool.members {
				let healthy = client
					.get(format!("{}/health", backend.base_url.trim_end_matches('/')))
					.timeout(Duration::from_secs(3))
					.send()
					.await
					.map(|resp| resp.status().is_success())
					.unwrap_or(false);

				if healthy {
					backend.consecutive_failures.store(0, Ordering::Relaxed);
					let successes = backend.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
					if successes >= self.ok_threshold && !backend.active.load(Ordering::Relaxed) {
						backend.active.store(true, Ordering::Relaxed);
						tracing::info!(backend = %backend.base_url, "backend marked active");
					}
				} else {
					backend.consecutive_successes.store(0, Ordering::Relaxed);
					let failures = backend.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
					if failures >= self.fail_threshold && backend.active.load(Ordering::Relaxed) {
						backend.active.store(false, Ordering::Relaxed);
						tracing::warn!(backend = %backend.base_url, "backend marked inactive");
					}
				}
			}
		}
	}

	pub fn active_counts(&self) -> [(&'static str, usize, usize); 4] {
		[
			("chat", self.chat.active_count(), self.chat.len()),
			("text2sql", self.text2sql.active_count(), self.text2sql.len()),
			("embed", self.embed.active_count(), self.embed.len()),
			("rerank", self.rerank.active_count(), self.rerank.len()),
		]
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn round_robins_fairly_across_members() {
		let pool = Pool::new(vec!["http://b0".into(), "http://b1".into(), "http://b2".into()]);

		let mut counts: HashMap<String, usize> = HashMap::new();
		for _ in 0..30 {
			*counts.entry(pool.choose()).or_default() += 1;
		}

		assert_eq!(counts.len(), 3);
		for count in counts.values() {
			assert_eq!(*count, 10);
		}
	}

	#[test]
	fn single_member_pool_always_returns_that_member() {
		let pool = Pool::new(vec!["http://only".into()]);
		for _ in 0..5 {
			assert_eq!(pool.choose(), "http://only");
		}
	}

	#[test]
	fn skips_inactive_members() {
		let pool = Pool::new(vec!["http://b0".into(), "http://b1".into()]);
		pool.members[0].active.store(false, Ordering::Relaxed);

		for _ in 0..10 {
			assert_eq!(pool.choose(), "http://b1");
		}
	}

	#[test]
	fn falls_back_to_full_membership_when_all_inactive() {
		let pool = Pool::new(vec!["http://b0".into(), "http://b1".into()]);
		for member in &pool.members {
			member.active.store(false, Ordering::Relaxed);
		}

		// Doesn't panic or hang; returns some member.
		let choice = pool.choose();
		assert!(choice == "http://b0" || choice == "http://b1");
	}
}
