use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mosaic_engine::manifest::{AssetRef, ManifestError, ManifestRegistry, RendererKind};
use mosaic_engine::{ComponentContext, ConfigurationError, Engine, EngineConfig, RawRequest, RenderError, RenderMode, Renderer};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{body, registry};

#[derive(Debug)]
struct IslandRenderer {
	runtime: Vec<AssetRef>,
}

#[async_trait]
impl Renderer for IslandRenderer {
	async fn render(&self, ctx: &ComponentContext) -> Result<Bytes, RenderError> {
		Ok(Bytes::from(format!("<div data-island=\"{}\"></div>", ctx.view().id())))
	}

	fn vendor_assets(&self) -> &[AssetRef] {
		&self.runtime
	}
}

#[test]
fn unknown_renderer_fails_at_build() {
	let manifest = registry(json!({ "components": [{
		"path": "chart",
		"views": [{ "viewName": "line", "renderer": "island" }]
	}] }));
	let err = Engine::builder(manifest).build().unwrap_err();
	assert!(
		matches!(&err, ConfigurationError::UnregisteredRenderer { view, kind } if view == "chart/line" && kind == "island"),
		"{err}"
	);
}

#[tokio::test]
async fn registered_adapter_renders_with_its_vendor_assets() {
	let manifest = registry(json!({ "components": [{
		"path": "chart",
		"views": [{ "viewName": "line", "renderer": "island", "exposeAsBlueprint": true }]
	}] }));
	let island = IslandRenderer {
		runtime: vec![AssetRef::script("/vendor/island-runtime.js", -10)],
	};
	let engine = Engine::builder(manifest)
		.renderer(RendererKind::parse("island"), Arc::new(island))
		.build()
		.unwrap();

	let response = engine.render("chart", "line", RawRequest::new(), RenderMode::Auto).await.unwrap();
	let html = body(&response);
	assert!(html.contains("<div data-island=\"chart/line\"></div>"));
	assert!(html.contains("/vendor/island-runtime.js"));
}

#[test]
fn unknown_helper_and_factory_fail_at_build() {
	let manifest = registry(json!({ "components": [{
		"path": "cart",
		"views": [{ "viewName": "total", "template": "{{ currency 1 }}", "helpers": ["currency"] }]
	}] }));
	let err = Engine::builder(manifest).build().unwrap_err();
	assert!(matches!(&err, ConfigurationError::UnknownHelper { helper, .. } if helper == "currency"), "{err}");

	let manifest = registry(json!({ "components": [{
		"path": "cart",
		"views": [{ "viewName": "total", "template": "-", "factories": ["pricing"] }]
	}] }));
	let err = Engine::builder(manifest).build().unwrap_err();
	assert!(matches!(&err, ConfigurationError::UnknownFactory { factory, .. } if factory == "pricing"), "{err}");
}

#[test]
fn broken_templates_fail_at_build() {
	let manifest = registry(json!({ "components": [{
		"path": "news",
		"views": [{ "viewName": "teaser" }, { "viewName": "full", "template": "<h1>{{ data.title </h1>" }]
	}] }));
	let err = Engine::builder(manifest).build().unwrap_err();
	assert!(matches!(err, ConfigurationError::InvalidView { .. }), "{err}");
}

#[test]
fn invalid_server_url_fails_at_build() {
	let manifest = registry(json!({ "components": [] }));
	let config = EngineConfig {
		server_url: "not a url".into(),
		..EngineConfig::default()
	};
	let err = Engine::builder(manifest).config(config).build().unwrap_err();
	assert!(matches!(err, ConfigurationError::Config(_)), "{err}");
}

#[tokio::test]
async fn manifest_and_templates_load_from_disk() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::create_dir(dir.path().join("templates")).unwrap();
	std::fs::write(dir.path().join("templates/hero.html"), "<section>{{ title }}</section>").unwrap();
	let manifest_path = dir.path().join("mosaic.json");
	let manifest = json!({ "components": [{
		"path": "home",
		"views": [{ "viewName": "hero", "title": "Welcome", "templateFile": "templates/hero.html" }]
	}] });
	std::fs::write(&manifest_path, manifest.to_string()).unwrap();
	let config_path = dir.path().join("mosaic.toml");
	std::fs::write(&config_path, "development = true\n\n[composition]\nmax_depth = 2\n").unwrap();

	let registry = ManifestRegistry::builder().load(&manifest_path).unwrap().seal();
	let config = EngineConfig::load(&config_path).unwrap();
	assert!(config.development);
	assert_eq!(config.composition.max_depth, 2);

	let engine = Engine::builder(registry).config(config).build().unwrap();
	let response = engine.render("home", "hero", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	assert_eq!(body(&response), "<section>Welcome</section>");
}

#[test]
fn malformed_manifests_are_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("broken.json");
	std::fs::write(&path, r#"{ "components": [{ "path": "x", "views": [ }"#).unwrap();
	assert!(matches!(ManifestRegistry::builder().load(&path), Err(ManifestError::Parse(_))));

	let missing = dir.path().join("missing.json");
	assert!(matches!(ManifestRegistry::builder().load(&missing), Err(ManifestError::Io { .. })));
}

#[test]
fn describe_reports_normalized_assets() {
	let manifest = registry(json!({ "components": [{
		"path": "product",
		"shared": { "assets": [{ "kind": "style", "src": "/css/product.less", "priority": 1 }] },
		"views": [{
			"viewName": "card",
			"template": "-",
			"assets": [{ "kind": "script", "src": "/js/card.ts?v=3", "priority": 0 }],
			"children": [{ "name": "badge", "contentUrl": "/badge/default" }]
		}]
	}] }));
	let engine = Engine::builder(manifest).build().unwrap();

	let described = engine.describe("product", "card").unwrap();
	let sources: Vec<_> = described.assets.iter().map(|a| a.src.as_str()).collect();
	assert_eq!(sources, ["/js/card.js?v=3", "/css/product.css"]);
	assert_eq!(described.children[0].name, "badge");
}
