//! Per-key async locks for read-modify-write sequences.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// A lazily populated set of async mutexes, one per key.
///
/// Holding the guard returned by [`KeyedLocks::lock`] serializes every other
/// caller that locks the same key; different keys never contend. A key's
/// mutex is dropped from the map once nobody holds or waits for it.
#[derive(Default)]
pub struct KeyedLocks {
	locks: Arc<LockMap>,
}

/// Guard of one key, released on drop.
pub struct KeyGuard {
	guard: Option<OwnedMutexGuard<()>>,
	locks: Arc<LockMap>,
	key: String,
}

impl Drop for KeyGuard {
	fn drop(&mut self) {
		self.guard.take();
		// only the map itself still references an idle mutex
		self.locks
			.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
	}
}

impl KeyedLocks {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn lock(&self, key: &str) -> KeyGuard {
		let mutex = self.locks.entry(key.to_string()).or_default().clone();
		let guard = mutex.lock_owned().await;
		KeyGuard {
			guard: Some(guard),
			locks: self.locks.clone(),
			key: key.to_string(),
		}
	}

	/// Number of keys currently tracked.
	pub fn len(&self) -> usize {
		self.locks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.locks.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_same_key_is_exclusive() {
		let locks = Arc::new(KeyedLocks::new());
		let guard = locks.lock("user").await;

		let contender = {
			let locks = locks.clone();
			tokio::spawn(async move {
				let _guard = locks.lock("user").await;
			})
		};

		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!contender.is_finished());

		drop(guard);
		contender.await.unwrap();
	}

	#[tokio::test]
	async fn test_different_keys_do_not_contend() {
		let locks = KeyedLocks::new();
		let _a = locks.lock("a").await;
		let _b = locks.lock("b").await;
		assert_eq!(locks.len(), 2);
	}

	#[tokio::test]
	async fn test_idle_keys_are_evicted() {
		let locks = KeyedLocks::new();
		for user in 0..50 {
			let _guard = locks.lock(&format!("user-{}", user)).await;
		}
		assert!(locks.is_empty());
	}

	#[tokio::test]
	async fn test_waiting_key_is_kept_until_released() {
		let locks = Arc::new(KeyedLocks::new());
		let guard = locks.lock("user").await;

		let contender = {
			let locks = locks.clone();
			tokio::spawn(async move {
				let _guard = locks.lock("user").await;
			})
		};
		tokio::time::sleep(Duration::from_millis(20)).await;

		// the waiter still references the mutex, so it must stay mapped
		drop(guard);
		assert_eq!(locks.len(), 1);

		contender.await.unwrap();
		assert!(locks.is_empty());
	}
}
