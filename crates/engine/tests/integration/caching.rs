use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mosaic_engine::{Engine, RawRequest, RenderMode};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{body, counter, registry};

fn engine(calls: &Arc<AtomicUsize>) -> Engine {
	let manifest = registry(json!({ "components": [{
		"path": "ticker",
		"views": [
			{ "viewName": "quote", "template": "<span>{{ data.n }}</span>", "factories": ["tick"], "cacheTtl": 100 },
			{ "viewName": "board", "template": "<ul>{{ data.n }}</ul>", "factories": ["tick"] }
		]
	}] }));
	Engine::builder(manifest).factory(counter("tick", calls)).build().unwrap()
}

async fn quote(engine: &Engine, query: &str) -> mosaic_engine::RenderedResponse {
	engine
		.render("ticker", "quote", RawRequest::new().query(query), RenderMode::Fragment)
		.await
		.unwrap()
}

#[tokio::test(start_paused = true)]
async fn view_ttl_expires_cached_output() {
	let calls = Arc::new(AtomicUsize::new(0));
	let engine = engine(&calls);

	let first = quote(&engine, "sym=ACME").await;
	assert!(!first.cached);
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	tokio::time::advance(Duration::from_millis(50)).await;
	let second = quote(&engine, "sym=ACME").await;
	assert!(second.cached);
	assert_eq!(second.body, first.body);
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	tokio::time::advance(Duration::from_millis(100)).await;
	let third = quote(&engine, "sym=ACME").await;
	assert!(!third.cached);
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert!(body(&third).starts_with("<span>2</span>"));
}

#[tokio::test]
async fn hit_skips_the_pipeline_and_returns_identical_bytes() {
	let calls = Arc::new(AtomicUsize::new(0));
	let engine = engine(&calls);

	let miss = engine.render("ticker", "board", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	for _ in 0..5 {
		let hit = engine.render("ticker", "board", RawRequest::new(), RenderMode::Fragment).await.unwrap();
		assert!(hit.cached);
		assert_eq!(hit.body, miss.body);
	}
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn params_are_part_of_the_key() {
	let calls = Arc::new(AtomicUsize::new(0));
	let engine = engine(&calls);

	quote(&engine, "sym=ACME").await;
	quote(&engine, "sym=INIT").await;
	let again = quote(&engine, "sym=ACME").await;

	assert!(again.cached);
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(engine.invalidate_view("ticker", "quote").unwrap(), 2);
}

#[tokio::test]
async fn disabled_cache_always_renders() {
	let calls = Arc::new(AtomicUsize::new(0));
	let manifest = registry(json!({ "components": [{
		"path": "ticker",
		"views": [{ "viewName": "board", "template": "{{ data.n }}", "factories": ["tick"] }]
	}] }));
	let config = mosaic_engine::EngineConfig::parse_toml("[cache]\nenabled = false\n").unwrap();
	let engine = Engine::builder(manifest).config(config).factory(counter("tick", &calls)).build().unwrap();

	for _ in 0..3 {
		let response = engine.render("ticker", "board", RawRequest::new(), RenderMode::Fragment).await.unwrap();
		assert!(!response.cached);
	}
	assert_eq!(calls.load(Ordering::SeqCst), 3);
}
