#![cfg_attr(test, allow(unused_crate_dependencies))]
//! HTTP surface of the composition engine.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET`/`POST /{component}/{view}` | render the view |
//! | `GET`/`POST /{component}/{view}/{segment}...` | render with positional path parameters |
//! | `GET /{component}/{view}/manifest` | asset and child description |
//!
//! A view exposed as a page renders as a full document unless the request
//! asks for a fragment with `?fragment=1` or an `x-mosaic-fragment: 1`
//! header. Failures, unknown routes included, are JSON
//! `{ code, message, detail? }` bodies with the status of the underlying
//! [`EngineError`].

pub mod cli;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use mosaic_engine::{Engine, EngineError, ErrorBody, RawRequest, RenderMode, RenderedResponse};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Request header forcing fragment output.
pub const FRAGMENT_HEADER: HeaderName = HeaderName::from_static("x-mosaic-fragment");
/// `hit` or `miss`.
pub const CACHE_HEADER: HeaderName = HeaderName::from_static("x-mosaic-cache");
/// Comma-separated names of children that fell back to empty output.
pub const DEGRADED_HEADER: HeaderName = HeaderName::from_static("x-mosaic-degraded");

const FRAGMENT_PARAM: &str = "fragment";
const MANIFEST_SEGMENT: &str = "manifest";

/// Routes every component view of `engine`.
pub fn router(engine: Engine) -> Router {
	Router::new()
		.route("/{component}/{view}", get(render).post(render))
		.route("/{component}/{view}/{*rest}", get(render_nested).post(render_nested))
		.fallback(unmatched)
		.layer(TraceLayer::new_for_http())
		.with_state(engine)
}

async fn render(
	State(engine): State<Engine>,
	Path((component, view)): Path<(String, String)>,
	RawQuery(query): RawQuery,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	render_view(&engine, &component, &view, Vec::new(), query, headers, body).await
}

/// `GET .../manifest` describes the view; any other trailing segments are
/// positional path parameters.
async fn render_nested(
	State(engine): State<Engine>,
	method: Method,
	Path((component, view, rest)): Path<(String, String, String)>,
	RawQuery(query): RawQuery,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let segments: Vec<String> = rest.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
	if method == Method::GET && segments == [MANIFEST_SEGMENT] {
		return describe(&engine, &component, &view);
	}
	render_view(&engine, &component, &view, segments, query, headers, body).await
}

async fn render_view(
	engine: &Engine,
	component: &str,
	view: &str,
	segments: Vec<String>,
	query: Option<String>,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let (query, fragment_param) = split_fragment_param(query.as_deref());
	let mode = if fragment_param || is_truthy(headers.get(FRAGMENT_HEADER).and_then(|v| v.to_str().ok())) {
		RenderMode::Fragment
	} else {
		RenderMode::Auto
	};

	let raw = RawRequest {
		headers: headers
			.iter()
			.filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
			.collect(),
		segments,
		query,
		body: (!body.is_empty()).then_some(body),
		..RawRequest::default()
	};

	match engine.render(component, view, raw, mode).await {
		Ok(response) => rendered(response),
		Err(err) => failure(&err, engine.config().development),
	}
}

fn describe(engine: &Engine, component: &str, view: &str) -> Response {
	match engine.describe(component, view) {
		Ok(manifest) => Json(manifest).into_response(),
		Err(err) => failure(&err, engine.config().development),
	}
}

fn rendered(response: RenderedResponse) -> Response {
	let cache = if response.cached { "hit" } else { "miss" };
	let degraded: Vec<&str> = response.outcomes.iter().filter(|o| !o.is_ok()).map(|o| o.name.as_str()).collect();
	let degraded = (!degraded.is_empty()).then(|| HeaderValue::from_str(&degraded.join(",")).ok()).flatten();

	let mut res = (
		StatusCode::OK,
		[(header::CONTENT_TYPE, response.content_type), (CACHE_HEADER, cache)],
		response.body,
	)
		.into_response();
	if let Some(degraded) = degraded {
		res.headers_mut().insert(DEGRADED_HEADER, degraded);
	}
	res
}

fn failure(err: &EngineError, development: bool) -> Response {
	let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	if status.is_server_error() {
		error!(status = status.as_u16(), code = err.code(), error = %err, "server.render_failed");
	} else {
		debug!(status = status.as_u16(), code = err.code(), error = %err, "server.render_rejected");
	}
	(status, Json(err.body(development))).into_response()
}

async fn unmatched(uri: Uri) -> Response {
	debug!(path = uri.path(), "server.route_not_found");
	let body = ErrorBody {
		code: "route_not_found".into(),
		message: format!("no route for {}", uri.path()),
		detail: None,
	};
	(StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Removes the `fragment` flag from a query string. Returns the remaining
/// query and whether the flag was set.
fn split_fragment_param(query: Option<&str>) -> (Option<String>, bool) {
	let Some(query) = query else {
		return (None, false);
	};
	let mut fragment = false;
	let rest: Vec<&str> = query
		.split('&')
		.filter(|&pair| {
			let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
			if key == FRAGMENT_PARAM {
				fragment = value.is_empty() || is_truthy(Some(value));
				false
			} else {
				!pair.is_empty()
			}
		})
		.collect();
	((!rest.is_empty()).then(|| rest.join("&")), fragment)
}

fn is_truthy(value: Option<&str>) -> bool {
	matches!(value.map(str::trim), Some("1" | "true" | "yes"))
}
