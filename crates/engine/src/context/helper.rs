use std::fmt;
use std::sync::Arc;

use serde_json::Value;

type HelperFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// Named template helper.
///
/// Helpers are pure functions over JSON arguments, invoked from templates as
/// `{{ name arg... }}`.
#[derive(Clone)]
pub struct Helper {
	name: Arc<str>,
	func: Arc<HelperFn>,
}

impl Helper {
	pub fn new(name: impl AsRef<str>, func: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			func: Arc::new(func),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn call(&self, args: &[Value]) -> Value {
		(self.func)(args)
	}
}

impl fmt::Debug for Helper {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Helper").field("name", &self.name).finish_non_exhaustive()
	}
}
