use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::store::{CacheStore, CacheValue, MemoryStore};
use crate::{CacheError, DEFAULT_TTL, Result};

const SEPARATOR: &str = "::";

/// Root cache handle owning the shared backing store.
#[derive(Clone)]
pub struct Cache {
	store: Arc<dyn CacheStore>,
	default_ttl: Duration,
}

impl fmt::Debug for Cache {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Cache")
			.field("store", &self.store)
			.field("default_ttl", &self.default_ttl)
			.finish()
	}
}

impl Default for Cache {
	fn default() -> Self {
		Self::in_memory(DEFAULT_TTL)
	}
}

impl Cache {
	/// Creates a cache over an arbitrary backing store.
	pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
		Self { store, default_ttl }
	}

	/// Creates a cache over a fresh [`MemoryStore`].
	pub fn in_memory(default_ttl: Duration) -> Self {
		Self::new(MemoryStore::shared(), default_ttl)
	}

	/// Returns a handle scoped to `namespace`.
	pub fn namespace(&self, namespace: impl Into<String>) -> NamespacedCache {
		let namespace: String = namespace.into();
		let prefix = format!("{namespace}{SEPARATOR}");
		NamespacedCache {
			store: Arc::clone(&self.store),
			namespace: namespace.into(),
			prefix: prefix.into(),
			default_ttl: self.default_ttl,
		}
	}

	/// Returns the shared backing store.
	pub fn store(&self) -> &Arc<dyn CacheStore> {
		&self.store
	}

	pub fn default_ttl(&self) -> Duration {
		self.default_ttl
	}

	/// Evicts expired entries across every namespace.
	pub fn cleanup(&self) -> Result<usize> {
		self.store.cleanup()
	}

	/// Removes every entry across every namespace.
	pub fn clear(&self) -> Result<usize> {
		self.store.clear_prefix("")
	}
}

/// View of the shared store restricted to one namespace.
///
/// Keys passed to and returned from a handle are namespace-relative.
#[derive(Clone)]
pub struct NamespacedCache {
	store: Arc<dyn CacheStore>,
	namespace: Arc<str>,
	prefix: Arc<str>,
	default_ttl: Duration,
}

impl fmt::Debug for NamespacedCache {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NamespacedCache").field("namespace", &self.namespace).finish_non_exhaustive()
	}
}

impl NamespacedCache {
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn default_ttl(&self) -> Duration {
		self.default_ttl
	}

	fn full_key(&self, key: &str) -> String {
		format!("{}{key}", self.prefix)
	}

	/// Returns the raw value stored under `key`.
	pub fn get_raw(&self, key: &str) -> Result<Option<CacheValue>> {
		self.store.get(&self.full_key(key))
	}

	/// Returns the value stored under `key` as a `T`.
	///
	/// A live entry of a different type is reported as [`CacheError::TypeMismatch`].
	pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>> {
		let Some(raw) = self.get_raw(key)? else {
			return Ok(None);
		};
		raw.downcast::<T>().map(Some).map_err(|_| CacheError::TypeMismatch {
			key: self.full_key(key),
			expected: std::any::type_name::<T>(),
		})
	}

	/// Stores `value` with the namespace's default TTL.
	pub fn insert<T: Any + Send + Sync>(&self, key: impl AsRef<str>, value: T) -> Result<()> {
		self.insert_with_ttl(key, value, self.default_ttl)
	}

	/// Stores `value` for `ttl`.
	pub fn insert_with_ttl<T: Any + Send + Sync>(&self, key: impl AsRef<str>, value: T, ttl: Duration) -> Result<()> {
		self.insert_raw(key, Arc::new(value), ttl)
	}

	pub fn insert_raw(&self, key: impl AsRef<str>, value: CacheValue, ttl: Duration) -> Result<()> {
		self.store.insert(self.full_key(key.as_ref()), value, ttl)
	}

	pub fn has(&self, key: &str) -> Result<bool> {
		self.store.has(&self.full_key(key))
	}

	pub fn remove(&self, key: &str) -> Result<bool> {
		self.store.remove(&self.full_key(key))
	}

	/// Live keys in this namespace, relative to the namespace.
	pub fn keys(&self) -> Result<Vec<String>> {
		Ok(self
			.store
			.keys(&self.prefix)?
			.into_iter()
			.filter_map(|key| key.strip_prefix(&*self.prefix).map(str::to_owned))
			.collect())
	}

	/// Number of live entries in this namespace.
	pub fn size(&self) -> Result<usize> {
		Ok(self.store.keys(&self.prefix)?.len())
	}

	/// Removes every entry in this namespace and nothing else.
	pub fn clear(&self) -> Result<usize> {
		self.store.clear_prefix(&self.prefix)
	}

	/// Removes the live entries whose relative key matches `pred`.
	pub fn remove_where(&self, mut pred: impl FnMut(&str) -> bool) -> Result<usize> {
		let mut removed = 0;
		for key in self.keys()? {
			if pred(&key) && self.remove(&key)? {
				removed += 1;
			}
		}
		Ok(removed)
	}
}
