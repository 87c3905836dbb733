//! In-process child transport.
//!
//! Relative content URLs (`/component/view[/segment...][?query]`) are
//! rendered by this engine as fragments at the child's nesting level;
//! trailing segments fill the child's path parameters. Absolute URLs go to
//! the remote fetcher supplied at build time, if any.

use async_trait::async_trait;
use mosaic_manifest::ViewManifest;

use super::{Engine, RenderMode};
use crate::compose::{ChildContent, ChildFetcher, ChildOutcome, ChildRequest};
use crate::error::ChildFetchError;
use crate::params::RawRequest;

/// Parsed child address.
#[derive(Debug, PartialEq, Eq)]
enum Target<'a> {
	Local {
		component: &'a str,
		view: &'a str,
		segments: Vec<&'a str>,
		query: Option<&'a str>,
	},
	Remote,
}

fn is_absolute(url: &str) -> bool {
	url.starts_with("//") || url.contains("://")
}

/// Parses `/component/view[/segment...][?query]`.
fn parse_target(url: &str) -> Result<Target<'_>, ChildFetchError> {
	if is_absolute(url) {
		return Ok(Target::Remote);
	}
	let invalid = || ChildFetchError::InvalidAddress(url.to_string());
	let path = url.strip_prefix('/').ok_or_else(invalid)?;
	let (path, query) = match path.split_once('?') {
		Some((path, query)) => (path, Some(query)),
		None => (path, None),
	};
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	match segments.as_slice() {
		[component, view, rest @ ..] => Ok(Target::Local {
			component: *component,
			view: *view,
			segments: rest.to_vec(),
			query,
		}),
		_ => Err(invalid()),
	}
}

#[async_trait]
impl ChildFetcher for Engine {
	async fn fetch_content(&self, request: &ChildRequest) -> Result<ChildContent, ChildFetchError> {
		let url = request.address.content_url.as_str();
		match parse_target(url)? {
			Target::Local {
				component,
				view,
				segments,
				query,
			} => {
				let raw = RawRequest {
					headers: request.scope.outbound_headers(),
					segments: segments.into_iter().map(str::to_string).collect(),
					query: query.map(str::to_string),
					..RawRequest::default()
				};
				let response = self
					.render_at(component, view, &raw, RenderMode::Fragment, request.level)
					.await
					.map_err(|e| ChildFetchError::Failed(e.to_string()))?;
				Ok(ChildContent {
					degraded: !response.outcomes.iter().all(ChildOutcome::is_ok),
					markup: response.body,
				})
			}
			Target::Remote => match &self.inner.remote {
				Some(remote) => remote.fetch_content(request).await,
				None => Err(ChildFetchError::Unsupported(url.to_string())),
			},
		}
	}

	async fn fetch_manifest(&self, request: &ChildRequest) -> Result<ViewManifest, ChildFetchError> {
		let url = request.address.manifest_url.as_deref().unwrap_or(&request.address.content_url);
		match parse_target(url)? {
			Target::Local { component, view, .. } => self.describe(component, view).map_err(|e| ChildFetchError::Failed(e.to_string())),
			Target::Remote => match &self.inner.remote {
				Some(remote) => remote.fetch_manifest(request).await,
				None => Err(ChildFetchError::Unsupported(url.to_string())),
			},
		}
	}
}
