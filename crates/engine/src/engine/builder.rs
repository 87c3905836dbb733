use std::sync::Arc;

use mosaic_cache::{Cache, CacheStore, MemoryStore};
use mosaic_manifest::{ManifestRegistry, RendererKind};
use rustc_hash::FxHashMap as HashMap;
use tracing::info;
use url::Url;

use super::{Engine, Inner, ViewRuntime};
use crate::compose::ChildFetcher;
use crate::config::{ConfigError, EngineConfig};
use crate::context::Helper;
use crate::error::ConfigurationError;
use crate::factory::{Factory, FactoryRegistry};
use crate::render::{Renderer, RendererRegistry, TemplateSet};

/// Collects everything an [`Engine`] needs and validates it as a whole.
///
/// [`build`](Self::build) is the single startup gate: any unknown renderer,
/// factory or helper reference, or unparsable template, fails it.
pub struct EngineBuilder {
	manifest: ManifestRegistry,
	config: EngineConfig,
	factories: FactoryRegistry,
	helpers: HashMap<String, Helper>,
	renderers: RendererRegistry,
	store: Option<Arc<dyn CacheStore>>,
	remote: Option<Arc<dyn ChildFetcher>>,
}

impl EngineBuilder {
	pub(super) fn new(manifest: ManifestRegistry) -> Self {
		Self {
			manifest,
			config: EngineConfig::default(),
			factories: FactoryRegistry::new(),
			helpers: HashMap::default(),
			renderers: RendererRegistry::with_builtins(),
			store: None,
			remote: None,
		}
	}

	pub fn config(mut self, config: EngineConfig) -> Self {
		self.config = config;
		self
	}

	pub fn factory(mut self, factory: Arc<dyn Factory>) -> Self {
		self.factories.register(factory);
		self
	}

	pub fn factories(mut self, factories: impl IntoIterator<Item = Arc<dyn Factory>>) -> Self {
		for factory in factories {
			self.factories.register(factory);
		}
		self
	}

	/// Registers a helper views may declare by name.
	pub fn helper(mut self, helper: Helper) -> Self {
		self.helpers.insert(helper.name().to_string(), helper);
		self
	}

	pub fn renderer(mut self, kind: RendererKind, renderer: Arc<dyn Renderer>) -> Self {
		self.renderers.register(kind, renderer);
		self
	}

	/// Replaces the in-memory cache backend.
	pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
		self.store = Some(store);
		self
	}

	/// Transport for child addresses outside this process (absolute URLs).
	pub fn remote_fetcher(mut self, fetcher: Arc<dyn ChildFetcher>) -> Self {
		self.remote = Some(fetcher);
		self
	}

	pub fn build(self) -> Result<Engine, ConfigurationError> {
		let server_url = Url::parse(&self.config.server_url).map_err(|e| ConfigError::InvalidValue {
			key: "server_url".into(),
			value: self.config.server_url.clone(),
			reason: e.to_string(),
		})?;

		self.renderers.validate(&self.manifest)?;
		let templates = TemplateSet::compile(&self.manifest);

		let mut views = HashMap::default();
		for view in self.manifest.views() {
			let plan = self.factories.plan(view)?;
			let helpers = view
				.helpers
				.iter()
				.map(|name| {
					self.helpers.get(name).cloned().ok_or_else(|| ConfigurationError::UnknownHelper {
						view: view.id(),
						helper: name.clone(),
					})
				})
				.collect::<Result<Vec<_>, _>>()?;
			views.insert(view.id(), ViewRuntime { plan, helpers });
		}

		let store: Arc<dyn CacheStore> = match self.store {
			Some(store) => store,
			None => MemoryStore::shared(),
		};
		let cache = Cache::new(store, self.config.cache.default_ttl());

		info!(
			views = views.len(),
			templates = templates.len(),
			factories = self.factories.len(),
			helpers = self.helpers.len(),
			cache = self.config.cache.enabled,
			max_depth = self.config.composition.max_depth,
			"engine.ready"
		);

		Ok(Engine {
			inner: Arc::new(Inner {
				config: self.config,
				server_url,
				manifest: Arc::new(self.manifest),
				views,
				renderers: self.renderers,
				templates: Arc::new(templates),
				cache,
				remote: self.remote,
			}),
		})
	}
}
