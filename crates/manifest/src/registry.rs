//! View registry built once at startup.
//!
//! [`ManifestRegistryBuilder`] accepts manifest files and resolves every view
//! against its component's shared defaults. [`ManifestRegistryBuilder::seal`]
//! turns it into a [`ManifestRegistry`], which has no mutating methods and can
//! be read concurrently without synchronization.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap as HashMap;

use crate::file::{AddressDecl, ComponentDecl, ManifestFile, ViewDecl};
use crate::view::{Address, ParamSchema, RendererKind, TemplateSource, View};
use crate::{ManifestError, Result};

type ViewTable = HashMap<Arc<str>, Arc<View>>;

/// Mutable registry under construction.
#[derive(Debug, Default)]
pub struct ManifestRegistryBuilder {
	base_dir: Option<PathBuf>,
	components: HashMap<Arc<str>, ViewTable>,
	order: Vec<(Arc<str>, Arc<str>)>,
	controllers: usize,
	services: usize,
}

impl ManifestRegistryBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Directory that `templateFile` paths resolve against.
	pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.base_dir = Some(dir.into());
		self
	}

	/// Loads a manifest file, resolving template files against its directory
	/// unless a base directory was set explicitly.
	pub fn load(mut self, path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let file = ManifestFile::load(path)?;
		if self.base_dir.is_none() {
			self.base_dir = path.parent().map(Path::to_path_buf);
		}
		self.add_file(file)?;
		Ok(self)
	}

	/// Adds every component of a parsed manifest.
	pub fn add_file(&mut self, file: ManifestFile) -> Result<()> {
		self.controllers += file.controllers.len();
		self.services += file.services.len();
		for component in file.components {
			self.add_component(component)?;
		}
		Ok(())
	}

	/// Resolves and adds one component with all of its views.
	pub fn add_component(&mut self, decl: ComponentDecl) -> Result<()> {
		validate_name("component", &decl.path)?;
		let path: Arc<str> = Arc::from(decl.path.as_str());
		if self.components.contains_key(&path) {
			return Err(ManifestError::DuplicateComponent(decl.path));
		}

		let mut table = ViewTable::default();
		for view_decl in &decl.views {
			validate_name("view", &view_decl.view_name)?;
			let view = self.resolve_view(&path, &decl, view_decl)?;
			if table.contains_key(view_decl.view_name.as_str()) {
				return Err(ManifestError::DuplicateView {
					component: decl.path.clone(),
					view: view_decl.view_name.clone(),
				});
			}
			self.order.push((Arc::clone(&path), Arc::clone(&view.name)));
			table.insert(Arc::clone(&view.name), Arc::new(view));
		}

		tracing::debug!(component = %path, views = table.len(), "manifest.component_added");
		self.components.insert(path, table);
		Ok(())
	}

	fn resolve_view(&self, component: &Arc<str>, decl: &ComponentDecl, view: &ViewDecl) -> Result<View> {
		let template = self.resolve_template(component, view)?;
		let renderer = match (&view.renderer, &template) {
			(Some(name), _) => RendererKind::parse(name),
			(None, TemplateSource::File { .. }) => RendererKind::File,
			(None, _) => RendererKind::Template,
		};

		let mut children: Vec<Address> = Vec::with_capacity(decl.shared.children.len() + view.children.len());
		for addr in decl.shared.children.iter().chain(&view.children) {
			let addr = resolve_address(component, &view.view_name, addr)?;
			match children.iter_mut().find(|c| c.name == addr.name) {
				Some(existing) => *existing = addr,
				None => children.push(addr),
			}
		}

		let mut helpers: Vec<String> = Vec::new();
		for helper in decl.shared.helpers.iter().chain(&view.helpers) {
			if !helpers.contains(helper) {
				helpers.push(helper.clone());
			}
		}

		let mut vary_headers: Vec<String> = Vec::new();
		for header in decl.shared.vary_headers.iter().chain(&view.vary_headers) {
			let header = header.trim().to_ascii_lowercase();
			if !header.is_empty() && !vary_headers.contains(&header) {
				vary_headers.push(header);
			}
		}

		Ok(View {
			component: Arc::clone(component),
			name: Arc::from(view.view_name.as_str()),
			title: view.title.clone(),
			template,
			children,
			factories: decl.shared.factories.iter().chain(&view.factories).cloned().collect(),
			helpers,
			renderer,
			cache_ttl: view.cache_ttl.map(Duration::from_millis),
			expose_as_page: view.expose_as_blueprint,
			params: ParamSchema {
				fields: view.params.clone(),
			},
			assets: decl.shared.assets.iter().chain(&view.assets).cloned().collect(),
			vary_headers,
		})
	}

	fn resolve_template(&self, component: &str, view: &ViewDecl) -> Result<TemplateSource> {
		match (&view.template, &view.template_file) {
			(Some(_), Some(_)) => Err(ManifestError::AmbiguousTemplate {
				component: component.to_string(),
				view: view.view_name.clone(),
			}),
			(Some(text), None) => Ok(TemplateSource::Inline(text.clone())),
			(None, Some(file)) => {
				let path = match &self.base_dir {
					Some(base) if file.is_relative() => base.join(file),
					_ => file.clone(),
				};
				let contents = std::fs::read_to_string(&path).map_err(|error| ManifestError::Io { path: path.clone(), error })?;
				Ok(TemplateSource::File { path, contents })
			}
			(None, None) => Ok(TemplateSource::None),
		}
	}

	/// Freezes the registry.
	pub fn seal(self) -> ManifestRegistry {
		tracing::info!(
			components = self.components.len(),
			views = self.order.len(),
			controllers = self.controllers,
			services = self.services,
			"manifest.sealed"
		);
		ManifestRegistry {
			components: self.components,
			order: self.order,
		}
	}
}

fn validate_name(what: &'static str, name: &str) -> Result<()> {
	let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
	if valid {
		Ok(())
	} else {
		Err(ManifestError::InvalidName {
			what,
			name: name.to_string(),
		})
	}
}

fn resolve_address(component: &str, view: &str, decl: &AddressDecl) -> Result<Address> {
	let invalid = |reason: &str| ManifestError::InvalidAddress {
		component: component.to_string(),
		view: view.to_string(),
		reason: reason.to_string(),
	};
	if decl.name.trim().is_empty() {
		return Err(invalid("empty child name"));
	}
	if decl.content_url.trim().is_empty() {
		return Err(invalid(&format!("child {:?} has no contentUrl", decl.name)));
	}
	Ok(Address {
		name: decl.name.clone(),
		content_url: decl.content_url.clone(),
		manifest_url: decl.manifest_url.clone(),
		request_timeout: decl.request_timeout.map(Duration::from_millis),
		required: decl.required,
	})
}

/// Sealed, read-only view registry.
///
/// Lookups are two hash lookups keyed by borrowed strings. There is no way to
/// add or replace a view once sealed.
#[derive(Debug, Default)]
pub struct ManifestRegistry {
	components: HashMap<Arc<str>, ViewTable>,
	order: Vec<(Arc<str>, Arc<str>)>,
}

impl ManifestRegistry {
	pub fn builder() -> ManifestRegistryBuilder {
		ManifestRegistryBuilder::new()
	}

	/// Looks up a view by component path and view name.
	#[inline]
	pub fn get(&self, component: &str, view: &str) -> Option<&Arc<View>> {
		self.components.get(component)?.get(view)
	}

	pub fn has_component(&self, component: &str) -> bool {
		self.components.contains_key(component)
	}

	/// Iterates views in registration order.
	pub fn views(&self) -> impl Iterator<Item = &Arc<View>> {
		self.order.iter().filter_map(|(c, v)| self.get(c, v))
	}

	/// View names of a component in registration order.
	pub fn view_names(&self, component: &str) -> Vec<&str> {
		self.order.iter().filter(|(c, _)| &**c == component).map(|(_, v)| &**v).collect()
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}
