//! Error types for manifest loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a manifest or building the view registry.
///
/// Every variant is fatal at startup.
#[derive(Debug, Error)]
pub enum ManifestError {
	/// The manifest is not valid JSON or does not match the expected shape.
	#[error("malformed manifest: {0}")]
	Parse(#[from] serde_json::Error),

	/// Error reading a manifest or template file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Two components share the same path.
	#[error("duplicate component path: {0}")]
	DuplicateComponent(String),

	/// A component declares the same view name twice.
	#[error("duplicate view {view:?} in component {component:?}")]
	DuplicateView {
		/// Owning component path.
		component: String,
		/// Repeated view name.
		view: String,
	},

	/// A component path or view name contains unsupported characters.
	#[error("invalid {what} name {name:?}: expected [A-Za-z0-9_.-]+")]
	InvalidName {
		/// Which kind of name failed validation.
		what: &'static str,
		/// The offending name.
		name: String,
	},

	/// A child address is missing its name or content URL.
	#[error("invalid child address in {component}/{view}: {reason}")]
	InvalidAddress {
		component: String,
		view: String,
		reason: String,
	},

	/// A view declares both an inline template and a template file.
	#[error("view {component}/{view} declares both template and templateFile")]
	AmbiguousTemplate { component: String, view: String },
}

/// Result type for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;
