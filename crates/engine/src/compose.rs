//! Composition resolver.
//!
//! Fetches every child a view declares, concurrently, each under its own
//! timeout. A failed child contributes an empty buffer and a recorded
//! [`ChildOutcome`]; only children marked `required` fail the parent.
//!
//! Depth is bounded by passing the nesting level down by value: a child
//! that would render deeper than `max_depth` is never requested.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use mosaic_manifest::{Address, AssetRef, ViewManifest};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CompositionConfig;
use crate::context::{ComponentContext, RequestScope};
use crate::error::{ChildFetchError, EngineError};

/// One child request issued on behalf of a parent render.
#[derive(Debug, Clone)]
pub struct ChildRequest {
	pub address: Address,
	/// Level the child renders at, one deeper than its parent.
	pub level: u32,
	pub scope: RequestScope,
}

/// Rendered output of one child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildContent {
	pub markup: Bytes,
	/// Some descendant of the child fell back to empty output.
	pub degraded: bool,
}

impl From<Bytes> for ChildContent {
	fn from(markup: Bytes) -> Self {
		Self { markup, degraded: false }
	}
}

/// Transport used to fetch child content and manifests.
#[async_trait]
pub trait ChildFetcher: Send + Sync {
	/// Fetches the child's rendered fragment.
	async fn fetch_content(&self, request: &ChildRequest) -> Result<ChildContent, ChildFetchError>;

	/// Fetches the child's asset manifest.
	async fn fetch_manifest(&self, request: &ChildRequest) -> Result<ViewManifest, ChildFetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
	Ok,
	/// Rendered, but a descendant fell back.
	Degraded,
	Timeout,
	Failed,
	DepthExceeded,
}

impl ChildStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::Degraded => "degraded",
			Self::Timeout => "timeout",
			Self::Failed => "failed",
			Self::DepthExceeded => "depth-exceeded",
		}
	}
}

impl fmt::Display for ChildStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Diagnostic record of one child fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildOutcome {
	pub name: String,
	pub status: ChildStatus,
	pub elapsed: Duration,
	pub error: Option<ChildFetchError>,
}

impl ChildOutcome {
	pub fn is_ok(&self) -> bool {
		self.status == ChildStatus::Ok
	}
}

struct Fetched {
	markup: Bytes,
	assets: Vec<AssetRef>,
	outcome: ChildOutcome,
}

/// Fills `ctx.components()` with the output of every declared child.
///
/// All children complete (or fall back) before this returns.
pub async fn resolve(fetcher: &dyn ChildFetcher, config: &CompositionConfig, ctx: &mut ComponentContext) -> Result<(), EngineError> {
	let view = Arc::clone(ctx.view());
	if view.children.is_empty() {
		return Ok(());
	}

	let level = ctx.level() + 1;
	let scope = ctx.scope().clone();
	let fetches = view.children.iter().map(|address| fetch_child(fetcher, config, address, level, &scope));
	let results = join_all(fetches).await;

	let mut required_failure = None;
	for (address, fetched) in view.children.iter().zip(results) {
		let outcome = fetched.outcome;
		match &outcome.error {
			None => debug!(
				view = %view.id(),
				child = %address.name,
				status = %outcome.status,
				elapsed_ms = outcome.elapsed.as_millis() as u64,
				"compose.child_rendered"
			),
			Some(error) => warn!(
				view = %view.id(),
				child = %address.name,
				status = %outcome.status,
				level,
				required = address.required,
				elapsed_ms = outcome.elapsed.as_millis() as u64,
				%error,
				"compose.child_fallback"
			),
		}
		if address.required
			&& required_failure.is_none()
			&& let Some(error) = &outcome.error
		{
			required_failure = Some(EngineError::RequiredChild {
				view: view.id(),
				child: address.name.clone(),
				source: error.clone(),
			});
		}
		ctx.set_component(address.name.clone(), fetched.markup);
		ctx.add_child_assets(fetched.assets);
		ctx.record_outcome(outcome);
	}

	match required_failure {
		Some(err) => Err(err),
		None => Ok(()),
	}
}

async fn fetch_child(fetcher: &dyn ChildFetcher, config: &CompositionConfig, address: &Address, level: u32, scope: &RequestScope) -> Fetched {
	let started = Instant::now();
	let outcome = |status: ChildStatus, error: Option<ChildFetchError>| ChildOutcome {
		name: address.name.clone(),
		status,
		elapsed: started.elapsed(),
		error,
	};

	if level > config.max_depth {
		return Fetched {
			markup: Bytes::new(),
			assets: Vec::new(),
			outcome: outcome(
				ChildStatus::DepthExceeded,
				Some(ChildFetchError::DepthExceeded {
					level,
					max: config.max_depth,
				}),
			),
		};
	}

	let timeout = address.request_timeout.unwrap_or_else(|| config.child_timeout());
	let request = ChildRequest {
		address: address.clone(),
		level,
		scope: scope.clone(),
	};
	let (content, manifest) = tokio::join!(
		tokio::time::timeout(timeout, fetcher.fetch_content(&request)),
		tokio::time::timeout(timeout, fetcher.fetch_manifest(&request)),
	);

	let assets = match manifest {
		Ok(Ok(manifest)) => manifest.assets,
		Ok(Err(error)) => {
			debug!(child = %address.name, %error, "compose.manifest_unavailable");
			Vec::new()
		}
		Err(_) => Vec::new(),
	};

	match content {
		Ok(Ok(content)) => Fetched {
			markup: content.markup,
			assets,
			outcome: outcome(if content.degraded { ChildStatus::Degraded } else { ChildStatus::Ok }, None),
		},
		Ok(Err(error)) => {
			let status = match error {
				ChildFetchError::DepthExceeded { .. } => ChildStatus::DepthExceeded,
				ChildFetchError::Timeout(_) => ChildStatus::Timeout,
				_ => ChildStatus::Failed,
			};
			Fetched {
				markup: Bytes::new(),
				assets: Vec::new(),
				outcome: outcome(status, Some(error)),
			}
		}
		Err(_) => Fetched {
			markup: Bytes::new(),
			assets: Vec::new(),
			outcome: outcome(ChildStatus::Timeout, Some(ChildFetchError::Timeout(timeout))),
		},
	}
}
