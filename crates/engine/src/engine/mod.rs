//! Request orchestration.
//!
//! A render runs: lookup, parameter extraction, cache read, context build,
//! factory pipeline, composition, renderer dispatch, assembly, cache write.
//! Child components go through the same path in-process at the next nesting
//! level, via the engine's own [`ChildFetcher`] implementation.

mod builder;
mod fetch;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use mosaic_cache::{Cache, CacheError, Fingerprint, Memoized, NamespacedCache, SweeperHandle};
use mosaic_manifest::{ManifestRegistry, View, ViewManifest};
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, warn};
use url::Url;

pub use self::builder::EngineBuilder;
use crate::assemble::{self, RenderedResponse, normalize_assets};
use crate::compose::{self, ChildOutcome};
use crate::config::EngineConfig;
use crate::context::{CREDENTIAL_HEADERS, ContextBuilder, Helper, RequestScope};
use crate::device::{self, DeviceType};
use crate::error::{EngineError, RenderError};
use crate::factory::FactoryPlan;
use crate::params::{self, Params, RawRequest};
use crate::render::{RendererRegistry, TemplateSet};

/// How a view's output is wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
	/// A page when the view is exposed as a top-level page, otherwise a fragment.
	#[default]
	Auto,
	Page,
	Fragment,
}

/// Startup-resolved parts of one view.
struct ViewRuntime {
	plan: FactoryPlan,
	helpers: Vec<Helper>,
}

struct Inner {
	config: EngineConfig,
	server_url: Url,
	manifest: Arc<ManifestRegistry>,
	views: HashMap<String, ViewRuntime>,
	renderers: RendererRegistry,
	templates: Arc<TemplateSet>,
	cache: Cache,
	remote: Option<Arc<dyn compose::ChildFetcher>>,
}

/// The composition engine. Cheap to clone; all clones share one registry and cache.
#[derive(Clone)]
pub struct Engine {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for Engine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Engine")
			.field("views", &self.inner.manifest.len())
			.field("renderers", &self.inner.renderers)
			.field("cache", &self.inner.cache)
			.finish_non_exhaustive()
	}
}

impl Engine {
	pub fn builder(manifest: ManifestRegistry) -> EngineBuilder {
		EngineBuilder::new(manifest)
	}

	pub fn config(&self) -> &EngineConfig {
		&self.inner.config
	}

	pub fn manifest(&self) -> &ManifestRegistry {
		&self.inner.manifest
	}

	pub fn cache(&self) -> &Cache {
		&self.inner.cache
	}

	/// Renders a top-level request under the configured overall deadline.
	pub async fn render(&self, component: &str, view: &str, raw: RawRequest, mode: RenderMode) -> Result<RenderedResponse, EngineError> {
		let deadline = self.inner.config.request_timeout();
		match tokio::time::timeout(deadline, self.render_at(component, view, &raw, mode, 0)).await {
			Ok(result) => result,
			Err(_) => {
				warn!(component, view, deadline_ms = deadline.as_millis() as u64, "engine.request_timeout");
				Err(EngineError::Timeout(deadline))
			}
		}
	}

	/// Asset and child description of a view.
	pub fn describe(&self, component: &str, view: &str) -> Result<ViewManifest, EngineError> {
		let view = self.inner.manifest.get(component, view).ok_or_else(|| EngineError::not_found(component, view))?;
		let mut manifest = view.describe();
		manifest.assets = normalize_assets(manifest.assets);
		Ok(manifest)
	}

	fn render_at<'a>(
		&'a self,
		component: &'a str,
		view_name: &'a str,
		raw: &'a RawRequest,
		mode: RenderMode,
		level: u32,
	) -> BoxFuture<'a, Result<RenderedResponse, EngineError>> {
		let span = debug_span!("render", component, view = view_name, level);
		Box::pin(
			async move {
				let started = Instant::now();
				let inner = &self.inner;
				let view = Arc::clone(inner.manifest.get(component, view_name).ok_or_else(|| EngineError::not_found(component, view_name))?);
				let runtime = inner.views.get(&view.id()).ok_or_else(|| EngineError::not_found(component, view_name))?;

				let as_page = match mode {
					RenderMode::Auto => view.expose_as_page && level == 0,
					RenderMode::Page => true,
					RenderMode::Fragment => false,
				};
				let params = params::extract(raw, &view.params)?;
				let device = device::classify(params.header("user-agent"));

				let slot = self.cache_slot(&view, &params, device, as_page, level);
				if let Some(slot) = &slot
					&& let Some(hit) = slot.lookup()
				{
					debug!(key = %slot.key, "engine.cache_hit");
					return Ok(hit);
				}

				let scope = RequestScope::from_params(&inner.server_url, &params);
				let mut ctx = ContextBuilder::new(Arc::clone(&view), Arc::clone(&inner.manifest), scope)
					.params(params)
					.device(device)
					.level(level)
					.as_page(as_page)
					.helpers(runtime.helpers.iter().cloned())
					.templates(Arc::clone(&inner.templates))
					.build();

				runtime.plan.run(&mut ctx).await?;
				compose::resolve(self, &inner.config.composition, &mut ctx).await?;

				let kind = ctx.renderer_kind().clone();
				let renderer = inner.renderers.get(&kind).ok_or_else(|| EngineError::Render {
					view: ctx.view().id(),
					source: RenderError::Unregistered(kind.clone()),
				})?;
				let markup = renderer.render(&ctx).await.map_err(|source| EngineError::Render {
					view: ctx.view().id(),
					source,
				})?;
				let response = assemble::assemble(ctx.into_parts(), markup, renderer.as_ref());

				match slot {
					Some(slot) if response.outcomes.iter().all(ChildOutcome::is_ok) => slot.store(&response),
					Some(_) => debug!("engine.cache_skipped_degraded"),
					None => {}
				}
				debug!(elapsed_ms = started.elapsed().as_millis() as u64, bytes = response.body.len(), "engine.rendered");
				Ok(response)
			}
			.instrument(span),
		)
	}

	/// Keys include the nesting level; deeper renders may be truncated at `max_depth`.
	/// Credential headers and the view's `varyHeaders` are keyed by value.
	fn cache_slot(&self, view: &View, params: &Params, device: DeviceType, as_page: bool, level: u32) -> Option<CacheSlot> {
		let config = &self.inner.config.cache;
		if !config.enabled || view.cache_disabled() {
			return None;
		}
		let fingerprint = Fingerprint::new()
			.text(&view.component)
			.text(&view.name)
			.json(&params.cache_identity(CREDENTIAL_HEADERS.iter().copied().chain(view.vary_headers.iter().map(String::as_str))))
			.text(device.as_str())
			.text(if as_page { "page" } else { "fragment" })
			.json(&level)
			.finish();
		Some(CacheSlot {
			cache: self.component_cache(&view.component),
			key: format!("{}:{fingerprint}", view.name),
			ttl: view.cache_ttl.unwrap_or_else(|| config.default_ttl()),
		})
	}

	fn component_cache(&self, component: &str) -> NamespacedCache {
		self.inner.cache.namespace(format!("component:{component}"))
	}

	/// Drops cached renders of one view.
	pub fn invalidate_view(&self, component: &str, view: &str) -> Result<usize, CacheError> {
		let prefix = format!("{view}:");
		let removed = self.component_cache(component).remove_where(|key| key.starts_with(&prefix))?;
		debug!(component, view, removed, "engine.invalidate_view");
		Ok(removed)
	}

	/// Drops cached renders of every view of a component.
	pub fn invalidate_component(&self, component: &str) -> Result<usize, CacheError> {
		let removed = self.component_cache(component).clear()?;
		debug!(component, removed, "engine.invalidate_component");
		Ok(removed)
	}

	/// Drops every cache entry, memoized results included.
	pub fn clear_cache(&self) -> Result<usize, CacheError> {
		self.inner.cache.clear()
	}

	/// Memoizes `func` in a namespace of the engine's cache.
	pub fn memoize<A, F, Fut>(&self, namespace: &str, func: F) -> Memoized<A, F>
	where
		A: Serialize + 'static,
		F: Fn(A) -> Fut,
		Fut: Future,
	{
		mosaic_cache::memoize(self.inner.cache.namespace(format!("memo:{namespace}")), func)
	}

	/// Starts the periodic expiry sweep, unless disabled by configuration.
	pub fn spawn_sweeper(&self) -> Option<SweeperHandle> {
		let interval: Duration = self.inner.config.cache.sweep_interval()?;
		Some(mosaic_cache::spawn_sweeper(Arc::clone(self.inner.cache.store()), interval))
	}
}

/// Where one render would be cached.
struct CacheSlot {
	cache: NamespacedCache,
	key: String,
	ttl: Duration,
}

impl CacheSlot {
	fn lookup(&self) -> Option<RenderedResponse> {
		match self.cache.get::<RenderedResponse>(&self.key) {
			Ok(Some(hit)) => Some(RenderedResponse {
				cached: true,
				..RenderedResponse::clone(&hit)
			}),
			Ok(None) => None,
			Err(error) => {
				warn!(namespace = self.cache.namespace(), key = %self.key, %error, "engine.cache_read_failed");
				None
			}
		}
	}

	fn store(&self, response: &RenderedResponse) {
		if let Err(error) = self.cache.insert_with_ttl(&self.key, response.clone(), self.ttl) {
			warn!(namespace = self.cache.namespace(), key = %self.key, %error, "engine.cache_write_failed");
		}
	}
}
