use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::GatewayError;

/// Per-client bounded concurrency with bounded wait (C3).
///
/// Each client identity (K) owns a counting semaphore of `capacity` permits.
/// `acquire` waits at most `timeout` for a permit; on timeout it rejects
/// with `ConcurrencyOverflow` rather than queueing indefinitely. The
/// returned [`AdmissionSlot`] releases its permit on `Drop`, so the slot is
/// reclaimed on every control-flow exit — success, error, timeout, or a
/// client disconnect that drops the handler future mid-await.
pub struct AdmissionQueue {
	capacity: usize,
	timeout: Duration,
	clients: DashMap<String, Arc<Semaphore>>,
}

impl AdmissionQueue {
	pub fn new(capacity: usize, timeout: Duration) -> Self {
		Self {
			capacity,
			timeout,
			clients: DashMap::new(),
		}
	}

	fn semaphore_for(&self, key: &str) -> Arc<Semaphore> {
		self.clients.entry(key.to_string()).or_insert_with(|| Arc::new(Semaphore::new(self.capacity))).clone()
	}

	pub async fn acquire(&self, key: &str) -> Result<AdmissionSlot, GatewayError> {
		let semaphore = self.semaphore_for(key);

		match tokio::time::timeout(self.timeout, semaphore.acquire_owned()).await {
			Ok(Ok(permit)) => Ok(AdmissionSlot { _permit: permit }),
			Ok(Err(_closed)) => {
				// Semaphores in this registry are never explicitly closed.
				unreachable!("admission semaphore closed while outstanding")
			}
			Err(_elapsed) => Err(GatewayError::ConcurrencyOverflow {
				retry_after_secs: self.timeout.as_secs(),
			}),
		}
	}

	/// Permits currently held for `key`; 0 if the key has no tracked state.
	pub fn active(&self, key: &str) -> usize {
		self.clients.get(key).map(|sem| self.capacity - sem.available_permits()).unwrap_or(0)
	}

	/// Drops the tracked state for `key` iff nothing currently holds a
	/// permit. Returns whether the key was removed. Safe to call
	/// concurrently with `acquire` — a racing acquire simply recreates the
	/// entry next time it is needed.
	pub fn remove_if_idle(&self, key: &str) -> bool {
		let capacity = self.capacity;
		self.clients.remove_if(key, move |_, sem| sem.available_permits() == capacity).is_some()
	}

	pub fn tracked_keys(&self) -> usize {
		self.clients.len()
	}
}

/// RAII handle on one admission permit. The permit is returned to its
/// client's semaphore when this value is dropped, regardless of why the
/// request handler unwound.
pub struct AdmissionSlot {
	_permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Instant;

	#[tokio::test]
	async fn admits_up_to_capacity() {
		let queue = AdmissionQueue::new(2, Duration::from_millis(50));

		let a = queue.acquire("org-a").await.unwrap();
		let b = queue.acquire("org-a").await.unwrap();
		assert_eq!(queue.active("org-a"), 2);

		drop(a);
		drop(b);
	}

	#[tokio::test]
	async fn rejects_after_capacity_and_timeout() {
		let queue = AdmissionQueue::new(1, Duration::from_millis(50));

		let _slot = queue.acquire("org-a").await.unwrap();

		let start = Instant::now();
		let err = queue.acquire("org-a").await.unwrap_err();
		assert!(start.elapsed() >= Duration::from_millis(50));
		assert!(matches!(err, GatewayError::ConcurrencyOverflow { .. }));
	}

	#[tokio::test]
	async fn releases_permit_on_drop_so_next_waiter_proceeds() {
		let queue = AdmissionQueue::new(1, Duration::from_millis(200));

		let slot = queue.acquire("org-a").await.unwrap();
		drop(slot);

		let second = queue.acquire("org-a").await;
		assert!(second.is_ok());
	}

	#[tokio::test]
	async fn keys_are_independent() {
		let queue = AdmissionQueue::new(1, Duration::from_millis(50));

		let _a = queue.acquire("org-a").await.unwrap();
		let b = queue.acquire("org-b").await;
		assert!(b.is_ok());
	}

	#[tokio::test]
	async fn remove_if_idle_only_removes_when_unheld() {
		let queue = AdmissionQueue::new(1, Duration::from_millis(50));

		let slot = queue.acquire("org-a").await.unwrap();
		assert!(!queue.remove_if_idle("org-a"));

		drop(slot);
		assert!(queue.remove_if_idle("org-a"));
		assert_eq!(queue.tracked_keys(), 0);
	}
}
