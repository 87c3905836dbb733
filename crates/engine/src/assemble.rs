//! Response assembly.
//!
//! Consumes the retired context of a render together with the renderer's
//! output and produces the final response: a full HTML page for top-level
//! pages, or the fragment followed by a component-scoped hydration script.

use std::fmt::Write as _;

use bytes::Bytes;
use mosaic_manifest::{AssetKind, AssetRef, Placement};
use serde_json::{Map, Value};

use crate::compose::ChildOutcome;
use crate::context::RetiredContext;
use crate::render::{HTML, Renderer, escape_html};

/// `id` of the page-level hydration script.
pub const HYDRATION_SCRIPT_ID: &str = "__MOSAIC_DATA__";

/// Final output of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResponse {
	pub content_type: &'static str,
	pub body: Bytes,
	/// Whether the body is a full page rather than a fragment.
	pub page: bool,
	/// Child fetch diagnostics of the render that produced the body.
	pub outcomes: Vec<ChildOutcome>,
	/// Served from the render cache.
	pub cached: bool,
}

pub(crate) fn assemble(ctx: RetiredContext, markup: Bytes, renderer: &dyn Renderer) -> RenderedResponse {
	let content_type = renderer.content_type();
	let body = if content_type != HTML {
		markup
	} else if ctx.as_page {
		Bytes::from(page(&ctx, &markup, renderer.vendor_assets()))
	} else {
		fragment(&ctx, markup)
	};
	RenderedResponse {
		content_type,
		body,
		page: ctx.as_page && content_type == HTML,
		outcomes: ctx.outcomes,
		cached: false,
	}
}

fn page(ctx: &RetiredContext, markup: &[u8], vendor: &[AssetRef]) -> String {
	let assets = normalize_assets(ctx.view.assets.iter().chain(&ctx.child_assets).chain(vendor).cloned());
	let mut html = String::with_capacity(markup.len() + 512);
	html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
	if let Some(title) = ctx.title() {
		let _ = writeln!(html, "<title>{}</title>", escape_html(title));
	}
	for asset in assets.iter().filter(|a| a.placement() == Placement::Head) {
		html.push_str(&asset_tag(asset));
		html.push('\n');
	}
	html.push_str("</head>\n<body>\n");
	html.push_str(&String::from_utf8_lossy(markup));
	html.push('\n');
	let _ = writeln!(
		html,
		"<script id=\"{HYDRATION_SCRIPT_ID}\" type=\"application/json\" data-component=\"{}\">{}</script>",
		escape_html(&ctx.view.id()),
		hydration_json(&ctx.data)
	);
	for asset in assets.iter().filter(|a| a.placement() == Placement::AfterBody) {
		html.push_str(&asset_tag(asset));
		html.push('\n');
	}
	html.push_str("</body>\n</html>\n");
	html
}

fn fragment(ctx: &RetiredContext, markup: Bytes) -> Bytes {
	if ctx.data.is_empty() {
		return markup;
	}
	let script = format!(
		"<script type=\"application/json\" data-component=\"{}\">{}</script>",
		escape_html(&ctx.view.id()),
		hydration_json(&ctx.data)
	);
	let mut body = Vec::with_capacity(markup.len() + script.len());
	body.extend_from_slice(&markup);
	body.extend_from_slice(script.as_bytes());
	Bytes::from(body)
}

/// Serializes public data so it can sit inside a `<script>` element.
///
/// `<`, `>`, `&` and the JS line separators are emitted as unicode escapes,
/// which keeps the JSON equivalent while making `</script>` unrepresentable.
pub fn hydration_json(data: &Map<String, Value>) -> String {
	let json = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());
	let mut out = String::with_capacity(json.len());
	for c in json.chars() {
		match c {
			'<' => out.push_str("\\u003c"),
			'>' => out.push_str("\\u003e"),
			'&' => out.push_str("\\u0026"),
			'\u{2028}' => out.push_str("\\u2028"),
			'\u{2029}' => out.push_str("\\u2029"),
			c => out.push(c),
		}
	}
	out
}

/// Rewrites source extensions, drops duplicate sources (first wins) and
/// stably sorts by ascending priority.
pub fn normalize_assets(assets: impl IntoIterator<Item = AssetRef>) -> Vec<AssetRef> {
	let mut out: Vec<AssetRef> = Vec::new();
	for mut asset in assets {
		asset.src = rewrite_asset_src(&asset.src);
		if !out.iter().any(|a| a.src == asset.src) {
			out.push(asset);
		}
	}
	out.sort_by_key(|a| a.priority);
	out
}

/// Maps a source-language extension to the extension that is actually served.
pub fn rewrite_asset_src(src: &str) -> String {
	let split = src.find(['?', '#']).unwrap_or(src.len());
	let (path, suffix) = src.split_at(split);
	let Some(dot) = path.rfind('.').filter(|&i| !path[i..].contains('/')) else {
		return src.to_string();
	};
	let served = match &path[dot + 1..] {
		"ts" | "tsx" | "jsx" | "mts" => "js",
		"scss" | "sass" | "less" | "styl" => "css",
		_ => return src.to_string(),
	};
	format!("{}.{served}{suffix}", &path[..dot])
}

fn asset_tag(asset: &AssetRef) -> String {
	let src = escape_html(&asset.src);
	match asset.kind {
		AssetKind::Script => format!("<script src=\"{src}\" defer></script>"),
		AssetKind::Style => format!("<link rel=\"stylesheet\" href=\"{src}\">"),
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn hydration_json_cannot_close_the_script() {
		let data = json!({ "html": "</script><script>alert(1)</script>", "amp": "a&b" });
		let Value::Object(map) = data else { unreachable!() };
		let encoded = hydration_json(&map);

		assert!(!encoded.contains('<'));
		assert!(!encoded.contains("</script>"));
		assert_eq!(serde_json::from_str::<Value>(&encoded).unwrap(), Value::Object(map));
	}

	#[test]
	fn source_extensions_are_rewritten() {
		assert_eq!(rewrite_asset_src("/app/main.tsx"), "/app/main.js");
		assert_eq!(rewrite_asset_src("/styles/site.scss?v=3"), "/styles/site.css?v=3");
		assert_eq!(rewrite_asset_src("/vendor/lib.js"), "/vendor/lib.js");
		assert_eq!(rewrite_asset_src("/v1.2/readme"), "/v1.2/readme");
	}

	#[test]
	fn assets_are_deduplicated_and_sorted() {
		let assets = normalize_assets([
			AssetRef::script("/b.ts", 5),
			AssetRef::style("/a.scss", 1),
			AssetRef::script("/b.js", 0),
			AssetRef::script("/c.js", 1),
		]);
		let srcs: Vec<_> = assets.iter().map(|a| (a.src.as_str(), a.priority)).collect();
		assert_eq!(srcs, vec![("/a.css", 1), ("/c.js", 1), ("/b.js", 5)]);
	}
}
