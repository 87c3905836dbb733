use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::Result;

/// Type-erased cached payload.
///
/// Rendered output is stored as `bytes`-like values; memoized computations
/// store whatever type they return. Typed access goes through
/// [`NamespacedCache::get`](crate::NamespacedCache::get).
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Backing store shared by every cache namespace.
///
/// Implementations must make single-key writes atomic and must not serialize
/// operations on unrelated keys behind one lock. Expired entries must be
/// reported as absent by `get`/`has` even before [`cleanup`](Self::cleanup)
/// removes them.
pub trait CacheStore: Send + Sync + fmt::Debug {
	/// Returns the live value stored under `key`.
	fn get(&self, key: &str) -> Result<Option<CacheValue>>;

	/// Stores `value` under `key` for `ttl`, replacing any previous entry.
	fn insert(&self, key: String, value: CacheValue, ttl: Duration) -> Result<()>;

	/// Removes `key`. Returns whether a live entry was removed.
	fn remove(&self, key: &str) -> Result<bool>;

	/// Returns the live keys starting with `prefix`.
	fn keys(&self, prefix: &str) -> Result<Vec<String>>;

	/// Removes every entry whose key starts with `prefix`. Returns the number removed.
	fn clear_prefix(&self, prefix: &str) -> Result<usize>;

	/// Evicts expired entries. Returns the number evicted.
	fn cleanup(&self) -> Result<usize>;

	/// Returns true when a live entry exists for `key`.
	fn has(&self, key: &str) -> Result<bool> {
		Ok(self.get(key)?.is_some())
	}
}

struct Entry {
	value: CacheValue,
	created: Instant,
	ttl: Duration,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		now.saturating_duration_since(self.created) >= self.ttl
	}
}

/// In-memory [`CacheStore`] backed by a sharded concurrent map.
#[derive(Default)]
pub struct MemoryStore {
	entries: DashMap<String, Entry>,
}

impl fmt::Debug for MemoryStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryStore").field("entries", &self.entries.len()).finish()
	}
}

impl MemoryStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an empty store behind an `Arc`, ready to share.
	pub fn shared() -> Arc<Self> {
		Arc::new(Self::new())
	}

	/// Number of stored entries, including expired ones not yet swept.
	pub fn raw_len(&self) -> usize {
		self.entries.len()
	}
}

impl CacheStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<CacheValue>> {
		let now = Instant::now();
		if let Some(entry) = self.entries.get(key) {
			if !entry.is_expired(now) {
				return Ok(Some(Arc::clone(&entry.value)));
			}
		}
		self.entries.remove_if(key, |_, entry| entry.is_expired(now));
		Ok(None)
	}

	fn insert(&self, key: String, value: CacheValue, ttl: Duration) -> Result<()> {
		self.entries.insert(
			key,
			Entry {
				value,
				created: Instant::now(),
				ttl,
			},
		);
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<bool> {
		let now = Instant::now();
		Ok(self.entries.remove(key).is_some_and(|(_, entry)| !entry.is_expired(now)))
	}

	fn keys(&self, prefix: &str) -> Result<Vec<String>> {
		let now = Instant::now();
		let mut keys: Vec<String> = self
			.entries
			.iter()
			.filter(|e| e.key().starts_with(prefix) && !e.value().is_expired(now))
			.map(|e| e.key().clone())
			.collect();
		keys.sort();
		Ok(keys)
	}

	fn clear_prefix(&self, prefix: &str) -> Result<usize> {
		let before = self.entries.len();
		self.entries.retain(|key, _| !key.starts_with(prefix));
		Ok(before.saturating_sub(self.entries.len()))
	}

	fn cleanup(&self) -> Result<usize> {
		let now = Instant::now();
		let before = self.entries.len();
		self.entries.retain(|_, entry| !entry.is_expired(now));
		let evicted = before.saturating_sub(self.entries.len());
		if evicted > 0 {
			tracing::debug!(evicted, remaining = self.entries.len(), "cache.cleanup");
		}
		Ok(evicted)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn value(n: u32) -> CacheValue {
		Arc::new(n)
	}

	#[tokio::test(start_paused = true)]
	async fn expired_entries_read_as_absent_before_sweep() {
		let store = MemoryStore::new();
		store.insert("k".into(), value(1), Duration::from_millis(100)).unwrap();
		assert!(store.has("k").unwrap());

		tokio::time::advance(Duration::from_millis(100)).await;
		assert!(!store.has("k").unwrap());
		assert!(store.get("k").unwrap().is_none());
		assert_eq!(store.raw_len(), 0, "lazy read evicts the expired entry");
	}

	#[tokio::test(start_paused = true)]
	async fn cleanup_evicts_only_expired() {
		let store = MemoryStore::new();
		store.insert("short".into(), value(1), Duration::from_millis(10)).unwrap();
		store.insert("long".into(), value(2), Duration::from_secs(10)).unwrap();

		tokio::time::advance(Duration::from_millis(20)).await;
		assert_eq!(store.raw_len(), 2);
		assert_eq!(store.cleanup().unwrap(), 1);
		assert_eq!(store.keys("").unwrap(), vec!["long".to_string()]);
	}

	#[test]
	fn clear_prefix_leaves_other_keys() {
		let store = MemoryStore::new();
		let ttl = Duration::from_secs(60);
		store.insert("a::1".into(), value(1), ttl).unwrap();
		store.insert("a::2".into(), value(2), ttl).unwrap();
		store.insert("b::1".into(), value(3), ttl).unwrap();

		assert_eq!(store.clear_prefix("a::").unwrap(), 2);
		assert_eq!(store.keys("").unwrap(), vec!["b::1".to_string()]);
	}

	#[test]
	fn insert_replaces_existing_value() {
		let store = MemoryStore::new();
		let ttl = Duration::from_secs(60);
		store.insert("k".into(), value(1), ttl).unwrap();
		store.insert("k".into(), value(2), ttl).unwrap();

		let got = store.get("k").unwrap().unwrap();
		assert_eq!(got.downcast_ref::<u32>(), Some(&2));
		assert!(store.remove("k").unwrap());
		assert!(!store.remove("k").unwrap());
	}
}
