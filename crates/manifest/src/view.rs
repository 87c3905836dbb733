//! Resolved, immutable view declarations.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::file::FactoryRef;

/// A renderable unit resolved from the manifest.
///
/// Shared component defaults are already folded in. Views are created once
/// while building the registry and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct View {
	pub component: Arc<str>,
	pub name: Arc<str>,
	pub title: Option<String>,
	pub template: TemplateSource,
	/// Shared children followed by the view's own; a view child replaces a shared one of the same name.
	pub children: Vec<Address>,
	/// Shared factories followed by the view's own, in declaration order.
	pub factories: Vec<FactoryRef>,
	/// Shared helpers followed by the view's own, without duplicates.
	pub helpers: Vec<String>,
	pub renderer: RendererKind,
	/// Per-view render cache lifetime. `None` uses the engine default.
	pub cache_ttl: Option<Duration>,
	/// Whether the view may be served as a top-level page.
	pub expose_as_page: bool,
	pub params: ParamSchema,
	/// Shared assets followed by the view's own.
	pub assets: Vec<AssetRef>,
	/// Lowercase names of headers that split the render cache.
	pub vary_headers: Vec<String>,
}

impl View {
	/// `component/view` identifier used in logs and cache namespaces.
	pub fn id(&self) -> String {
		format!("{}/{}", self.component, self.name)
	}

	/// Returns true when render caching is disabled for this view.
	pub fn cache_disabled(&self) -> bool {
		self.cache_ttl.is_some_and(|ttl| ttl.is_zero())
	}

	/// Wire description served by the manifest endpoint.
	pub fn describe(&self) -> ViewManifest {
		ViewManifest {
			component: self.component.to_string(),
			view: self.name.to_string(),
			title: self.title.clone(),
			assets: self.assets.clone(),
			children: self.children.clone(),
		}
	}
}

/// Where a view's template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
	/// No template declared; renderers that need one reject the view at startup.
	None,
	Inline(String),
	/// File contents are read while building the registry.
	File { path: PathBuf, contents: String },
}

impl TemplateSource {
	pub fn text(&self) -> Option<&str> {
		match self {
			Self::None => None,
			Self::Inline(text) | Self::File { contents: text, .. } => Some(text),
		}
	}
}

/// Renderer technology declared by a view.
///
/// Built-in kinds have dedicated variants; anything else names an adapter the
/// host registers at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RendererKind {
	/// Inline template string.
	Template,
	/// Template file read at startup.
	File,
	/// Serializes the public data bag.
	Json,
	/// Externally registered adapter (component frameworks and the like).
	Custom(Arc<str>),
}

impl RendererKind {
	pub fn parse(name: &str) -> Self {
		match name {
			"template" => Self::Template,
			"file" => Self::File,
			"json" => Self::Json,
			other => Self::Custom(Arc::from(other.strip_prefix("custom:").unwrap_or(other))),
		}
	}

	pub fn as_str(&self) -> &str {
		match self {
			Self::Template => "template",
			Self::File => "file",
			Self::Json => "json",
			Self::Custom(name) => name,
		}
	}
}

impl fmt::Display for RendererKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Resolved child component address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
	/// Key under which the child's output is embedded.
	pub name: String,
	pub content_url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub manifest_url: Option<String>,
	/// Per-address timeout; `None` uses the engine default.
	#[serde(default, skip_serializing_if = "Option::is_none", with = "millis")]
	pub request_timeout: Option<Duration>,
	/// A required child fails the parent render instead of falling back.
	#[serde(default)]
	pub required: bool,
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
		match value {
			Some(d) => s.serialize_u64(d.as_millis() as u64),
			None => s.serialize_none(),
		}
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
		Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
	}
}

/// Static asset kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
	Script,
	Style,
}

/// Where an asset tag is placed in the composed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
	Head,
	AfterBody,
}

/// Script or style reference with ordering and placement hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
	pub kind: AssetKind,
	pub src: String,
	#[serde(default)]
	pub priority: i32,
	/// Defaults to `head` for styles and `after-body` for scripts.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub placement: Option<Placement>,
}

impl AssetRef {
	pub fn script(src: impl Into<String>, priority: i32) -> Self {
		Self {
			kind: AssetKind::Script,
			src: src.into(),
			priority,
			placement: None,
		}
	}

	pub fn style(src: impl Into<String>, priority: i32) -> Self {
		Self {
			kind: AssetKind::Style,
			src: src.into(),
			priority,
			placement: None,
		}
	}

	pub fn placement(&self) -> Placement {
		self.placement.unwrap_or(match self.kind {
			AssetKind::Style => Placement::Head,
			AssetKind::Script => Placement::AfterBody,
		})
	}
}

/// JSON description of a view served by the manifest endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewManifest {
	pub component: String,
	pub view: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default)]
	pub assets: Vec<AssetRef>,
	#[serde(default)]
	pub children: Vec<Address>,
}

/// Parameter bucket of an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
	Header,
	Path,
	Query,
	Body,
}

impl ParamLocation {
	pub const ALL: [Self; 4] = [Self::Header, Self::Path, Self::Query, Self::Body];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Header => "header",
			Self::Path => "path",
			Self::Query => "query",
			Self::Body => "body",
		}
	}
}

impl fmt::Display for ParamLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
	#[default]
	Any,
	String,
	Number,
	Boolean,
	Object,
	Array,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamField {
	pub name: String,
	#[serde(rename = "in")]
	pub location: ParamLocation,
	#[serde(rename = "type", default)]
	pub kind: ParamKind,
	#[serde(default)]
	pub required: bool,
}

/// Parameter schema of a view. An empty schema accepts anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSchema {
	pub fields: Vec<ParamField>,
}

impl ParamSchema {
	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn fields_in(&self, location: ParamLocation) -> impl Iterator<Item = &ParamField> {
		self.fields.iter().filter(move |f| f.location == location)
	}
}
