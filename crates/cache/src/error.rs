//! Error types for cache operations.

use thiserror::Error;

/// Errors surfaced by a cache backend or a typed lookup.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
	/// The backing store failed to serve the operation.
	#[error("cache backend failure: {0}")]
	Backend(String),

	/// An entry exists but holds a value of a different type.
	#[error("cached value for {key:?} is not a {expected}")]
	TypeMismatch {
		/// Namespaced key of the entry.
		key: String,
		/// Type name the caller asked for.
		expected: &'static str,
	},
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
