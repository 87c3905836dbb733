//! Error taxonomy of the composition engine.
//!
//! Startup problems are [`ConfigurationError`]s and stop the process before it
//! serves traffic. Request-time problems are [`EngineError`]s, each mapping to
//! an HTTP status and a stable `{ code, message, detail? }` body.

use std::fmt;
use std::time::Duration;

use mosaic_manifest::{ManifestError, ParamLocation, RendererKind};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;
use crate::render::TemplateError;

/// Boxed error carried by internal factory failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Client-facing failure a factory raises through [`ComponentContext::throw`].
///
/// [`ComponentContext::throw`]: crate::ComponentContext::throw
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpFailure {
	pub status: u16,
	pub code: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub detail: Option<Value>,
}

impl HttpFailure {
	pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			status,
			code: code.into(),
			message: message.into(),
			detail: None,
		}
	}

	pub fn bad_request(message: impl Into<String>) -> Self {
		Self::new(400, "bad_request", message)
	}

	pub fn not_found(message: impl Into<String>) -> Self {
		Self::new(404, "not_found", message)
	}

	pub fn forbidden(message: impl Into<String>) -> Self {
		Self::new(403, "forbidden", message)
	}

	pub fn with_detail(mut self, detail: Value) -> Self {
		self.detail = Some(detail);
		self
	}

	/// 4xx failures are shown to clients verbatim.
	pub fn is_client_error(&self) -> bool {
		(400..500).contains(&self.status)
	}
}

impl fmt::Display for HttpFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}: {}", self.status, self.code, self.message)
	}
}

/// Why a factory stopped the pipeline.
///
/// Any `std::error::Error` converts into [`FactoryFailure::Failed`], so
/// factories can use `?` on their own fallible calls.
#[derive(Debug)]
pub enum FactoryFailure {
	/// Deliberate abort carrying a client-facing response.
	Abort(HttpFailure),
	/// Unexpected failure; surfaced as a server error.
	Failed(BoxError),
}

impl FactoryFailure {
	pub fn msg(message: impl fmt::Display) -> Self {
		Self::Failed(message.to_string().into())
	}
}

impl fmt::Display for FactoryFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Abort(failure) => write!(f, "aborted with {failure}"),
			Self::Failed(error) => fmt::Display::fmt(error, f),
		}
	}
}

impl From<HttpFailure> for FactoryFailure {
	fn from(failure: HttpFailure) -> Self {
		Self::Abort(failure)
	}
}

impl<E> From<E> for FactoryFailure
where
	E: std::error::Error + Send + Sync + 'static,
{
	fn from(error: E) -> Self {
		Self::Failed(Box::new(error))
	}
}

/// A factory aborted the pipeline.
#[derive(Debug)]
pub struct FactoryError {
	pub factory: String,
	pub component: String,
	pub view: String,
	pub level: u32,
	pub cause: FactoryFailure,
}

impl fmt::Display for FactoryError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"factory {:?} failed in {}/{} at level {}: {}",
			self.factory, self.component, self.view, self.level, self.cause
		)
	}
}

impl std::error::Error for FactoryError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match &self.cause {
			FactoryFailure::Failed(error) => Some(error.as_ref()),
			FactoryFailure::Abort(_) => None,
		}
	}
}

/// One rejected request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
	#[serde(rename = "in")]
	pub location: ParamLocation,
	pub name: String,
	pub reason: String,
}

/// Request parameters did not satisfy the view's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
	pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
	pub fn single(location: ParamLocation, name: impl Into<String>, reason: impl Into<String>) -> Self {
		Self {
			issues: vec![ValidationIssue {
				location,
				name: name.into(),
				reason: reason.into(),
			}],
		}
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("invalid request parameters")?;
		for (i, issue) in self.issues.iter().enumerate() {
			let sep = if i == 0 { ": " } else { "; " };
			write!(f, "{sep}{}.{} {}", issue.location, issue.name, issue.reason)?;
		}
		Ok(())
	}
}

impl std::error::Error for ValidationError {}

/// Misuse of a [`ComponentContext`](crate::ComponentContext) mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
	#[error("helpers must have a non-empty name")]
	AnonymousHelper,

	#[error("public data key {0:?} is already set")]
	DuplicatePublicKey(String),

	#[error("public data must be a JSON object")]
	NotAnObject,

	#[error("component {component} has no view {view:?}")]
	UnknownView { component: String, view: String },
}

/// Why a child component produced no content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChildFetchError {
	#[error("timed out after {0:?}")]
	Timeout(Duration),

	#[error("nesting level {level} exceeds maximum depth {max}")]
	DepthExceeded { level: u32, max: u32 },

	#[error("invalid child address {0:?}")]
	InvalidAddress(String),

	#[error("no transport for child address {0:?}")]
	Unsupported(String),

	#[error("{0}")]
	Failed(String),
}

/// A renderer adapter failed at request time.
#[derive(Debug, Error)]
pub enum RenderError {
	#[error(transparent)]
	Template(#[from] TemplateError),

	#[error("no renderer registered for kind {0:?}")]
	Unregistered(RendererKind),

	#[error("view has no template")]
	MissingTemplate,

	#[error("failed to serialize public data: {0}")]
	Serialize(#[from] serde_json::Error),

	#[error("{0}")]
	Adapter(String),
}

/// Startup validation failure. The process must not serve traffic.
#[derive(Debug, Error)]
pub enum ConfigurationError {
	#[error(transparent)]
	Manifest(#[from] ManifestError),

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("view {view} declares renderer {kind:?}, which is not registered")]
	UnregisteredRenderer { view: String, kind: String },

	#[error("view {view} references unknown factory {factory:?}")]
	UnknownFactory { view: String, factory: String },

	#[error("view {view} references unknown helper {helper:?}")]
	UnknownHelper { view: String, helper: String },

	#[error("view {view} is not renderable: {reason}")]
	InvalidView { view: String, reason: String },
}

/// Request-time failure of a render or manifest request.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error(transparent)]
	Validation(#[from] ValidationError),

	#[error("component view {component}/{view} not found")]
	ComponentNotFound { component: String, view: String },

	#[error(transparent)]
	Factory(#[from] FactoryError),

	#[error("required child {child:?} of {view} failed: {source}")]
	RequiredChild {
		view: String,
		child: String,
		#[source]
		source: ChildFetchError,
	},

	#[error("rendering {view} failed: {source}")]
	Render {
		view: String,
		#[source]
		source: RenderError,
	},

	#[error("request exceeded its {0:?} deadline")]
	Timeout(Duration),
}

impl EngineError {
	pub fn not_found(component: &str, view: &str) -> Self {
		Self::ComponentNotFound {
			component: component.to_string(),
			view: view.to_string(),
		}
	}

	pub fn status(&self) -> u16 {
		match self {
			Self::Validation(_) => 400,
			Self::ComponentNotFound { .. } => 404,
			Self::Factory(FactoryError {
				cause: FactoryFailure::Abort(failure),
				..
			}) => failure.status,
			Self::Factory(_) | Self::Render { .. } => 500,
			Self::RequiredChild { .. } => 502,
			Self::Timeout(_) => 504,
		}
	}

	pub fn code(&self) -> &str {
		match self {
			Self::Validation(_) => "validation_error",
			Self::ComponentNotFound { .. } => "component_not_found",
			Self::Factory(FactoryError {
				cause: FactoryFailure::Abort(failure),
				..
			}) => &failure.code,
			Self::Factory(_) => "factory_error",
			Self::RequiredChild { .. } => "required_child_failed",
			Self::Render { .. } => "render_error",
			Self::Timeout(_) => "timeout",
		}
	}

	/// Builds the response body. Server errors carry their cause chain only
	/// when `expose_details` is set.
	pub fn body(&self, expose_details: bool) -> ErrorBody {
		let code = self.code().to_string();
		match self {
			Self::Validation(err) => ErrorBody {
				code,
				message: "invalid request parameters".into(),
				detail: serde_json::to_value(&err.issues).ok(),
			},
			Self::ComponentNotFound { .. } => ErrorBody {
				code,
				message: self.to_string(),
				detail: None,
			},
			Self::Factory(FactoryError {
				cause: FactoryFailure::Abort(failure),
				..
			}) if failure.is_client_error() || expose_details => ErrorBody {
				code,
				message: failure.message.clone(),
				detail: failure.detail.clone(),
			},
			_ if expose_details => ErrorBody {
				code,
				message: self.to_string(),
				detail: Some(Value::Array(error_chain(self).into_iter().map(Value::String).collect())),
			},
			Self::Timeout(_) => ErrorBody {
				code,
				message: "request timed out".into(),
				detail: None,
			},
			_ => ErrorBody {
				code,
				message: "internal server error".into(),
				detail: None,
			},
		}
	}
}

fn error_chain(error: &dyn std::error::Error) -> Vec<String> {
	let mut chain = Vec::new();
	let mut next = error.source();
	while let Some(cause) = next {
		chain.push(cause.to_string());
		next = cause.source();
	}
	chain
}

/// Stable JSON error shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
	pub code: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub detail: Option<Value>,
}
