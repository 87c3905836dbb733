use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::NamespacedCache;
use crate::fingerprint;

type KeyFn<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;

/// Async function wrapped with a cache lookup.
///
/// Built with [`memoize`]. Hits return a clone of the stored value without
/// calling the wrapped function; misses call it and store successful results.
/// Errors are never cached. A failing store is logged and treated as a miss.
pub struct Memoized<A, F> {
	cache: NamespacedCache,
	ttl: Option<Duration>,
	key_fn: KeyFn<A>,
	func: F,
	_arg: PhantomData<fn(A)>,
}

/// Wraps `func` so its results are memoized in `cache`.
///
/// Keys default to a fingerprint of the serialized argument; use
/// [`Memoized::with_key`] to supply a custom key function.
pub fn memoize<A, F, Fut>(cache: NamespacedCache, func: F) -> Memoized<A, F>
where
	A: Serialize + 'static,
	F: Fn(A) -> Fut,
	Fut: Future,
{
	Memoized {
		cache,
		ttl: None,
		key_fn: Arc::new(|arg: &A| fingerprint::of(arg)),
		func,
		_arg: PhantomData,
	}
}

impl<A, F> Memoized<A, F> {
	/// Replaces the key function.
	pub fn with_key(mut self, key_fn: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
		self.key_fn = Arc::new(key_fn);
		self
	}

	/// Overrides the namespace's default TTL for stored results.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = Some(ttl);
		self
	}

	pub fn cache(&self) -> &NamespacedCache {
		&self.cache
	}

	/// Invokes the wrapped function through the cache.
	pub async fn call<T, E, Fut>(&self, arg: A) -> Result<T, E>
	where
		F: Fn(A) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		T: Clone + Send + Sync + 'static,
	{
		let key = (self.key_fn)(&arg);
		match self.cache.get::<T>(&key) {
			Ok(Some(hit)) => return Ok(T::clone(&hit)),
			Ok(None) => {}
			Err(error) => tracing::warn!(namespace = self.cache.namespace(), %error, "memoize.lookup_failed"),
		}

		let value = (self.func)(arg).await?;
		let ttl = self.ttl.unwrap_or(self.cache.default_ttl());
		if let Err(error) = self.cache.insert_with_ttl(&key, value.clone(), ttl) {
			tracing::warn!(namespace = self.cache.namespace(), %error, "memoize.store_failed");
		}
		Ok(value)
	}
}
