//! Renderer registry and dispatch.
//!
//! Every [`RendererKind`] a view can declare maps to one [`Renderer`] in the
//! [`RendererRegistry`]. The registry is checked against the manifest once at
//! startup, so dispatch is a single map lookup and never discovers an unknown
//! kind while serving.

mod template;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mosaic_manifest::{AssetRef, ManifestRegistry, RendererKind, View};
use rustc_hash::FxHashMap as HashMap;

pub(crate) use self::template::escape_html;
pub use self::template::{Template, TemplateError, scope};
use crate::context::ComponentContext;
use crate::error::{ConfigurationError, RenderError};

pub const HTML: &str = "text/html; charset=utf-8";
pub const JSON: &str = "application/json";

/// Turns a fully populated context into response bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
	async fn render(&self, ctx: &ComponentContext) -> Result<Bytes, RenderError>;

	/// Content type of the rendered bytes. Only HTML output is wrapped into
	/// pages and gets a hydration payload.
	fn content_type(&self) -> &'static str {
		HTML
	}

	/// Scripts and styles a page needs when this renderer produced it.
	fn vendor_assets(&self) -> &[AssetRef] {
		&[]
	}

	/// Startup check of a view declaring this renderer.
	fn validate(&self, _view: &View) -> Result<(), String> {
		Ok(())
	}
}

/// Renders the effective template with the built-in template language.
/// Serves both the `template` and `file` kinds.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRenderer;

#[async_trait]
impl Renderer for TemplateRenderer {
	async fn render(&self, ctx: &ComponentContext) -> Result<Bytes, RenderError> {
		let html = match ctx.compiled_template() {
			Some(template) => template.render(&scope(ctx), |name| ctx.helper(name)),
			None => {
				let source = ctx.template().ok_or(RenderError::MissingTemplate)?;
				Template::parse(source)?.render(&scope(ctx), |name| ctx.helper(name))
			}
		};
		Ok(Bytes::from(html))
	}

	fn validate(&self, view: &View) -> Result<(), String> {
		let source = view.template.text().ok_or("no template declared")?;
		Template::parse(source).map(drop).map_err(|e| e.to_string())
	}
}

/// Serializes the public data bag.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRenderer;

#[async_trait]
impl Renderer for JsonRenderer {
	async fn render(&self, ctx: &ComponentContext) -> Result<Bytes, RenderError> {
		Ok(Bytes::from(serde_json::to_vec(ctx.public_data())?))
	}

	fn content_type(&self) -> &'static str {
		JSON
	}
}

/// Templates of the `template` and `file` views, parsed once at startup and
/// keyed by view id.
#[derive(Debug, Default)]
pub struct TemplateSet {
	templates: HashMap<String, Arc<Template>>,
}

impl TemplateSet {
	/// Parses every template-rendered view's template. Views whose text does
	/// not parse are left out; validation reports them.
	pub fn compile(manifest: &ManifestRegistry) -> Self {
		let templates = manifest
			.views()
			.filter(|view| matches!(view.renderer, RendererKind::Template | RendererKind::File))
			.filter_map(|view| {
				let template = Template::parse(view.template.text()?).ok()?;
				Some((view.id(), Arc::new(template)))
			})
			.collect();
		Self { templates }
	}

	pub fn get(&self, view_id: &str) -> Option<&Template> {
		self.templates.get(view_id).map(Arc::as_ref)
	}

	pub fn len(&self) -> usize {
		self.templates.len()
	}

	pub fn is_empty(&self) -> bool {
		self.templates.is_empty()
	}
}

/// Adapters by renderer kind.
#[derive(Clone)]
pub struct RendererRegistry {
	adapters: HashMap<RendererKind, Arc<dyn Renderer>>,
}

impl Default for RendererRegistry {
	fn default() -> Self {
		Self::with_builtins()
	}
}

impl RendererRegistry {
	pub fn empty() -> Self {
		Self { adapters: HashMap::default() }
	}

	/// `template`, `file` and `json`.
	pub fn with_builtins() -> Self {
		let mut registry = Self::empty();
		let template: Arc<dyn Renderer> = Arc::new(TemplateRenderer);
		registry.register(RendererKind::Template, Arc::clone(&template));
		registry.register(RendererKind::File, template);
		registry.register(RendererKind::Json, Arc::new(JsonRenderer));
		registry
	}

	pub fn register(&mut self, kind: RendererKind, renderer: Arc<dyn Renderer>) {
		self.adapters.insert(kind, renderer);
	}

	pub fn get(&self, kind: &RendererKind) -> Option<&Arc<dyn Renderer>> {
		self.adapters.get(kind)
	}

	/// Checks that every view's renderer is registered and accepts the view.
	pub fn validate(&self, manifest: &ManifestRegistry) -> Result<(), ConfigurationError> {
		for view in manifest.views() {
			let renderer = self.get(&view.renderer).ok_or_else(|| ConfigurationError::UnregisteredRenderer {
				view: view.id(),
				kind: view.renderer.to_string(),
			})?;
			renderer
				.validate(view)
				.map_err(|reason| ConfigurationError::InvalidView { view: view.id(), reason })?;
		}
		Ok(())
	}
}

impl fmt::Debug for RendererRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut kinds: Vec<_> = self.adapters.keys().map(RendererKind::as_str).collect();
		kinds.sort_unstable();
		f.debug_struct("RendererRegistry").field("kinds", &kinds).finish()
	}
}
