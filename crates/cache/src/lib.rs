#![cfg_attr(test, allow(unused_crate_dependencies))]
//! TTL cache used by the composition engine.
//!
//! The cache is a single shared [`CacheStore`] viewed through
//! [`NamespacedCache`] handles. Every handle prefixes its keys with its
//! namespace, so `keys()`, `size()` and `clear()` only observe the handle's own
//! slice of the backing store.
//!
//! # Mental model
//!
//! - Entries carry their creation instant and TTL. Expiry is lazy: reads treat an
//!   expired entry as absent and evict it on the spot.
//! - [`spawn_sweeper`] runs [`CacheStore::cleanup`] periodically so entries that
//!   are never read again still get evicted.
//! - Writes to a single key are atomic; distinct keys never contend on a global lock.
//! - [`Memoized`] wraps any async function so its results are stored in a
//!   namespace under a caller-supplied (or fingerprint-derived) key.
//!
//! Caching is an optimization. Callers on the render path treat every
//! [`CacheError`] as a miss.

mod error;
pub mod fingerprint;
mod memoize;
mod namespace;
mod store;
mod sweeper;

pub use error::{CacheError, Result};
pub use fingerprint::Fingerprint;
pub use memoize::{Memoized, memoize};
pub use namespace::{Cache, NamespacedCache};
pub use store::{CacheStore, CacheValue, MemoryStore};
pub use sweeper::{SweeperHandle, spawn_sweeper};

/// Default entry lifetime when neither the caller nor the view specifies one.
pub const DEFAULT_TTL: std::time::Duration = std::time::Duration::from_secs(5 * 60);
