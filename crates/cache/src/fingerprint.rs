//! Deterministic cache-key derivation.

use serde::Serialize;

/// Incremental fingerprint builder.
///
/// Every part is length-prefixed before hashing, so `("ab", "c")` and
/// `("a", "bc")` never collide.
#[derive(Clone)]
pub struct Fingerprint {
	hasher: blake3::Hasher,
}

impl Default for Fingerprint {
	fn default() -> Self {
		Self::new()
	}
}

impl Fingerprint {
	pub fn new() -> Self {
		Self {
			hasher: blake3::Hasher::new(),
		}
	}

	/// Appends a string part.
	pub fn text(mut self, part: &str) -> Self {
		self.push(part.as_bytes());
		self
	}

	/// Appends the JSON encoding of a serializable part.
	///
	/// Map types with a stable iteration order (`BTreeMap`, sorted `IndexMap`)
	/// produce stable fingerprints; `HashMap` does not.
	pub fn json<T: Serialize + ?Sized>(mut self, part: &T) -> Self {
		match serde_json::to_vec(part) {
			Ok(bytes) => self.push(&bytes),
			Err(error) => {
				tracing::warn!(%error, "fingerprint part is not serializable");
				self.push(b"\0unserializable");
			}
		}
		self
	}

	fn push(&mut self, bytes: &[u8]) {
		self.hasher.update(&(bytes.len() as u64).to_le_bytes());
		self.hasher.update(bytes);
	}

	/// Returns the hex digest.
	pub fn finish(self) -> String {
		self.hasher.finalize().to_hex().to_string()
	}
}

/// Fingerprints a single serializable value.
pub fn of<T: Serialize + ?Sized>(value: &T) -> String {
	Fingerprint::new().json(value).finish()
}
