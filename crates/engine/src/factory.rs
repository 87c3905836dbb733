//! Factory pipeline.
//!
//! Factories are async pre-render steps that read and mutate a
//! [`ComponentContext`]. A view's plan is its component's shared factories
//! followed by its own, deduplicated by name and stably sorted by priority
//! (ascending, unprioritized last). Plans are built once at startup and run
//! strictly sequentially: a factory may rely on anything earlier ones did.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use mosaic_manifest::{FactoryRef, View};
use rustc_hash::FxHashMap as HashMap;
use tracing::trace;

use crate::context::ComponentContext;
use crate::error::{ConfigurationError, FactoryError, FactoryFailure};

/// Async pre-render step.
#[async_trait]
pub trait Factory: Send + Sync {
	/// Name views reference this factory by.
	fn name(&self) -> &str;

	/// Priority used when the manifest reference does not set one.
	fn priority(&self) -> Option<i32> {
		None
	}

	async fn run(&self, ctx: &mut ComponentContext) -> Result<(), FactoryFailure>;
}

type FactoryFn = dyn for<'a> Fn(&'a mut ComponentContext) -> BoxFuture<'a, Result<(), FactoryFailure>> + Send + Sync;

struct FnFactory {
	name: String,
	func: Box<FactoryFn>,
}

#[async_trait]
impl Factory for FnFactory {
	fn name(&self) -> &str {
		&self.name
	}

	async fn run(&self, ctx: &mut ComponentContext) -> Result<(), FactoryFailure> {
		(self.func)(ctx).await
	}
}

/// Wraps a closure as a [`Factory`].
///
/// ```ignore
/// let price = factory_fn("price", |ctx| Box::pin(async move {
///     ctx.set_public_data_key("price", 9.99);
///     Ok(())
/// }));
/// ```
pub fn factory_fn<F>(name: impl Into<String>, func: F) -> Arc<dyn Factory>
where
	F: for<'a> Fn(&'a mut ComponentContext) -> BoxFuture<'a, Result<(), FactoryFailure>> + Send + Sync + 'static,
{
	Arc::new(FnFactory {
		name: name.into(),
		func: Box::new(func),
	})
}

/// Factories available to views, by name.
#[derive(Default, Clone)]
pub struct FactoryRegistry {
	factories: HashMap<String, Arc<dyn Factory>>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a factory, replacing any previous one of the same name.
	pub fn register(&mut self, factory: Arc<dyn Factory>) {
		self.factories.insert(factory.name().to_string(), factory);
	}

	pub fn get(&self, name: &str) -> Option<&Arc<dyn Factory>> {
		self.factories.get(name)
	}

	pub fn len(&self) -> usize {
		self.factories.len()
	}

	pub fn is_empty(&self) -> bool {
		self.factories.is_empty()
	}

	/// Resolves a view's factory references into an ordered plan.
	pub fn plan(&self, view: &View) -> Result<FactoryPlan, ConfigurationError> {
		let mut steps: Vec<PlannedFactory> = Vec::with_capacity(view.factories.len());
		for reference in &view.factories {
			let factory = self.get(reference.name()).ok_or_else(|| ConfigurationError::UnknownFactory {
				view: view.id(),
				factory: reference.name().to_string(),
			})?;
			if steps.iter().any(|s| Arc::ptr_eq(&s.factory, factory)) {
				continue;
			}
			steps.push(PlannedFactory {
				priority: priority_of(reference, factory.as_ref()),
				factory: Arc::clone(factory),
			});
		}
		steps.sort_by_key(|s| (s.priority.is_none(), s.priority.unwrap_or_default()));
		Ok(FactoryPlan { steps })
	}
}

impl fmt::Debug for FactoryRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<_> = self.factories.keys().collect();
		names.sort();
		f.debug_struct("FactoryRegistry").field("factories", &names).finish()
	}
}

fn priority_of(reference: &FactoryRef, factory: &dyn Factory) -> Option<i32> {
	reference.priority().or_else(|| factory.priority())
}

struct PlannedFactory {
	factory: Arc<dyn Factory>,
	priority: Option<i32>,
}

/// Ordered factories of one view.
#[derive(Default)]
pub struct FactoryPlan {
	steps: Vec<PlannedFactory>,
}

impl FactoryPlan {
	/// Factory names in execution order.
	pub fn names(&self) -> Vec<&str> {
		self.steps.iter().map(|s| s.factory.name()).collect()
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	/// Runs every factory in order, stopping at the first failure or
	/// [`ComponentContext::throw`].
	pub async fn run(&self, ctx: &mut ComponentContext) -> Result<(), FactoryError> {
		for step in &self.steps {
			let name = step.factory.name();
			trace!(view = %ctx.view().id(), factory = name, priority = ?step.priority, "factory.run");
			let cause = match step.factory.run(ctx).await {
				Err(failure) => Some(failure),
				Ok(()) => ctx.take_abort().map(FactoryFailure::Abort),
			};
			if let Some(cause) = cause {
				return Err(FactoryError {
					factory: name.to_string(),
					component: ctx.view().component.to_string(),
					view: ctx.view().name.to_string(),
					level: ctx.level(),
					cause,
				});
			}
		}
		Ok(())
	}
}

impl fmt::Debug for FactoryPlan {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.names()).finish()
	}
}
