//! Serde shape of the manifest file consumed at startup.
//!
//! ```json
//! {
//!   "components": [{
//!     "path": "product",
//!     "shared": { "helpers": ["currency"], "factories": [{ "name": "session", "priority": 0 }] },
//!     "views": [{
//!       "viewName": "card",
//!       "title": "Product card",
//!       "template": "<div>{{ data.display }}</div>",
//!       "factories": ["price", { "name": "format", "priority": 5 }],
//!       "children": [{ "name": "badge", "contentUrl": "/badge/default", "requestTimeout": 500 }],
//!       "renderer": "template",
//!       "cacheTtl": 60000,
//!       "exposeAsBlueprint": true,
//!       "varyHeaders": ["accept-language"]
//!     }]
//!   }]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::view::{AssetRef, ParamField};
use crate::{ManifestError, Result};

/// Root of a manifest file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManifestFile {
	pub components: Vec<ComponentDecl>,
	/// Controller declarations. Owned by the host application, carried through untouched.
	#[serde(default)]
	pub controllers: Vec<serde_json::Value>,
	/// Service declarations. Owned by the host application, carried through untouched.
	#[serde(default)]
	pub services: Vec<serde_json::Value>,
}

impl ManifestFile {
	/// Parses a manifest from JSON text.
	pub fn parse(input: &str) -> Result<Self> {
		Ok(serde_json::from_str(input)?)
	}

	/// Loads a manifest file from disk.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|error| ManifestError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::parse(&content)
	}
}

/// One component: a named group of views sharing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentDecl {
	pub path: String,
	pub views: Vec<ViewDecl>,
	#[serde(default)]
	pub shared: SharedDecl,
}

/// Defaults inherited by every view of a component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SharedDecl {
	#[serde(default)]
	pub helpers: Vec<String>,
	#[serde(default)]
	pub children: Vec<AddressDecl>,
	#[serde(default)]
	pub factories: Vec<FactoryRef>,
	#[serde(default)]
	pub assets: Vec<AssetRef>,
	#[serde(default)]
	pub vary_headers: Vec<String>,
}

/// One view declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ViewDecl {
	pub view_name: String,
	#[serde(default)]
	pub title: Option<String>,
	/// Inline template source.
	#[serde(default)]
	pub template: Option<String>,
	/// Template file, relative to the manifest's base directory.
	#[serde(default)]
	pub template_file: Option<PathBuf>,
	#[serde(default)]
	pub factories: Vec<FactoryRef>,
	#[serde(default)]
	pub children: Vec<AddressDecl>,
	#[serde(default)]
	pub helpers: Vec<String>,
	#[serde(default)]
	pub renderer: Option<String>,
	/// Render cache lifetime in milliseconds. `0` disables render caching.
	#[serde(default)]
	pub cache_ttl: Option<u64>,
	#[serde(default)]
	pub expose_as_blueprint: bool,
	#[serde(default)]
	pub params: Vec<ParamField>,
	#[serde(default)]
	pub assets: Vec<AssetRef>,
	/// Request headers whose values select a separate render cache entry.
	#[serde(default)]
	pub vary_headers: Vec<String>,
}

/// Factory reference: a bare name or a name with a priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactoryRef {
	Name(String),
	Detailed {
		name: String,
		#[serde(default)]
		priority: Option<i32>,
	},
}

impl FactoryRef {
	pub fn name(&self) -> &str {
		match self {
			Self::Name(name) | Self::Detailed { name, .. } => name,
		}
	}

	pub fn priority(&self) -> Option<i32> {
		match self {
			Self::Name(_) => None,
			Self::Detailed { priority, .. } => *priority,
		}
	}
}

/// Child component address as written in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddressDecl {
	pub name: String,
	pub content_url: String,
	#[serde(default)]
	pub manifest_url: Option<String>,
	/// Per-child timeout in milliseconds.
	#[serde(default)]
	pub request_timeout: Option<u64>,
	#[serde(default)]
	pub required: bool,
}
