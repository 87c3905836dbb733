use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mosaic_engine::{ChildFetchError, ChildStatus, Engine, EngineConfig, FactoryFailure, RawRequest, RenderMode, factory_fn};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;

use crate::common::{body, delay, registry};

fn cyclic_engine(max_depth: u32) -> Engine {
	let manifest = registry(json!({ "components": [{
		"path": "loop",
		"views": [
			{ "viewName": "a", "template": "<a>{{{ components.next }}}</a>", "children": [{ "name": "next", "contentUrl": "/loop/b" }] },
			{ "viewName": "b", "template": "<b>{{{ components.next }}}</b>", "children": [{ "name": "next", "contentUrl": "/loop/a" }] }
		]
	}] }));
	let mut config = EngineConfig::default();
	config.composition.max_depth = max_depth;
	Engine::builder(manifest).config(config).build().unwrap()
}

#[tokio::test]
async fn cycles_stop_at_max_depth() {
	let engine = cyclic_engine(3);
	let response = engine.render("loop", "a", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	assert_eq!(body(&response), "<a><b><a><b></b></a></b></a>");
	assert_eq!(response.outcomes[0].status, ChildStatus::Degraded);

	let deep = cyclic_engine(8);
	let response = deep.render("loop", "b", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	assert_eq!(body(&response).matches("<a>").count(), 4);
	assert_eq!(body(&response).matches("<b>").count(), 5);
}

#[tokio::test]
async fn truncated_renders_are_never_cached() {
	let engine = cyclic_engine(3);
	let first = engine.render("loop", "a", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	let from_b = engine.render("loop", "b", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	let again = engine.render("loop", "a", RawRequest::new(), RenderMode::Fragment).await.unwrap();

	assert_eq!(body(&from_b), "<b><a><b><a></a></b></a></b>");
	assert!(!again.cached);
	assert_eq!(again.body, first.body);
	assert!(engine.cache().store().keys("component:loop").unwrap().is_empty());
}

#[tokio::test]
async fn grandchild_failures_propagate_and_are_retried() {
	let manifest = registry(json!({ "components": [{
		"path": "shop",
		"views": [
			{ "viewName": "page", "template": "<page>{{{ components.mid }}}</page>", "children": [{ "name": "mid", "contentUrl": "/shop/mid" }] },
			{ "viewName": "mid", "template": "<mid>{{{ components.leaf }}}</mid>", "children": [{ "name": "leaf", "contentUrl": "/shop/leaf" }] },
			{ "viewName": "leaf", "template": "<leaf>", "factories": ["flaky"] }
		]
	}] }));
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&calls);
	let flaky = factory_fn("flaky", move |_| {
		let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
		Box::pin(async move {
			if first {
				return Err(FactoryFailure::msg("inventory service restarting"));
			}
			Ok(())
		})
	});
	let engine = Engine::builder(manifest).factory(flaky).build().unwrap();

	let first = engine.render("shop", "page", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	assert_eq!(body(&first), "<page><mid></mid></page>");
	assert_eq!(first.outcomes[0].status, ChildStatus::Degraded);
	assert!(engine.cache().store().keys("component:shop").unwrap().is_empty());

	let second = engine.render("shop", "page", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	assert!(!second.cached);
	assert_eq!(body(&second), "<page><mid><leaf></mid></page>");
	assert!(second.outcomes.iter().all(|o| o.is_ok()));
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	assert!(engine.render("shop", "page", RawRequest::new(), RenderMode::Fragment).await.unwrap().cached);
}

#[tokio::test]
async fn trailing_url_segments_fill_child_path_params() {
	let manifest = registry(json!({ "components": [{
		"path": "shop",
		"views": [
			{ "viewName": "page", "template": "<main>{{{ components.item }}}</main>", "children": [{ "name": "item", "contentUrl": "/shop/item/42?color=red" }] },
			{ "viewName": "item", "template": "<i>{{ params.path.id }} {{ params.query.color }}</i>", "params": [{ "name": "id", "in": "path", "type": "number", "required": true }] }
		]
	}] }));
	let engine = Engine::builder(manifest).build().unwrap();

	let response = engine.render("shop", "page", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	assert!(body(&response).starts_with("<main><i>42 red</i>"), "{}", body(&response));
	assert!(response.outcomes[0].is_ok());
}

fn dashboard(children: serde_json::Value) -> Engine {
	let manifest = registry(json!({ "components": [
		{ "path": "dash", "views": [{
			"viewName": "home",
			"template": "<main>{{{ components.a }}}{{{ components.b }}}{{{ components.c }}}</main>",
			"children": children
		}] },
		{ "path": "widget", "views": [{ "viewName": "slow", "template": "[{{ params.query.ms }}]", "factories": ["delay"] }] }
	] }));
	Engine::builder(manifest).factory(delay()).build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn children_are_fetched_concurrently() {
	let engine = dashboard(json!([
		{ "name": "a", "contentUrl": "/widget/slow?ms=100" },
		{ "name": "b", "contentUrl": "/widget/slow?ms=150" },
		{ "name": "c", "contentUrl": "/widget/slow?ms=50" }
	]));

	let started = Instant::now();
	let response = engine.render("dash", "home", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	let elapsed = started.elapsed();

	assert_eq!(body(&response), "<main>[100][150][50]</main>");
	assert!(elapsed >= Duration::from_millis(150), "{elapsed:?}");
	assert!(elapsed < Duration::from_millis(200), "{elapsed:?}");
	assert!(response.outcomes.iter().all(|o| o.is_ok()));
}

#[tokio::test(start_paused = true)]
async fn slow_child_falls_back_to_empty_output() {
	let engine = dashboard(json!([
		{ "name": "a", "contentUrl": "/widget/slow?ms=10" },
		{ "name": "b", "contentUrl": "/widget/slow?ms=500", "requestTimeout": 50 },
		{ "name": "c", "contentUrl": "/nowhere/view" }
	]));

	let response = engine.render("dash", "home", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	assert_eq!(body(&response), "<main>[10]</main>");

	let statuses: Vec<_> = response.outcomes.iter().map(|o| (o.name.as_str(), o.status)).collect();
	assert_eq!(statuses, [("a", ChildStatus::Ok), ("b", ChildStatus::Timeout), ("c", ChildStatus::Failed)]);
	assert_eq!(response.outcomes[1].error, Some(ChildFetchError::Timeout(Duration::from_millis(50))));
	assert!(!response.cached);
}

#[tokio::test]
async fn required_child_failure_fails_the_parent() {
	let engine = dashboard(json!([
		{ "name": "a", "contentUrl": "/widget/slow?ms=0" },
		{ "name": "b", "contentUrl": "/nowhere/view", "required": true }
	]));

	let err = engine.render("dash", "home", RawRequest::new(), RenderMode::Fragment).await.unwrap_err();
	assert_eq!(err.status(), 502);
	assert_eq!(err.code(), "required_child_failed");
	assert!(engine.cache().store().keys("component:dash").unwrap().is_empty());
}

#[tokio::test]
async fn page_collects_child_assets_in_priority_order() {
	let manifest = registry(json!({ "components": [{
		"path": "shop",
		"views": [
			{
				"viewName": "page",
				"template": "<body-content>{{{ components.basket }}}</body-content>",
				"exposeAsBlueprint": true,
				"assets": [{ "kind": "style", "src": "/css/base.scss", "priority": 0 }, { "kind": "script", "src": "/js/app.ts", "priority": 5 }],
				"children": [{ "name": "basket", "contentUrl": "/shop/basket" }]
			},
			{
				"viewName": "basket",
				"template": "<aside>basket</aside>",
				"assets": [{ "kind": "script", "src": "/js/basket.tsx", "priority": 2 }, { "kind": "style", "src": "/css/base.scss" }]
			}
		]
	}] }));
	let engine = Engine::builder(manifest).build().unwrap();

	let response = engine.render("shop", "page", RawRequest::new(), RenderMode::Auto).await.unwrap();
	let html = body(&response);
	assert!(html.contains("<body-content><aside>basket</aside></body-content>"));
	assert_eq!(html.matches("/css/base.css").count(), 1);
	let basket = html.find("/js/basket.js").unwrap();
	let app = html.find("/js/app.js").unwrap();
	assert!(basket < app);
	assert!(html.find("/css/base.css").unwrap() < html.find("</head>").unwrap());
}

#[tokio::test]
async fn children_share_the_request_id() {
	let manifest = registry(json!({ "components": [{
		"path": "profile",
		"views": [
			{ "viewName": "page", "template": "<div>{{{ components.avatar }}}</div>", "children": [{ "name": "avatar", "contentUrl": "/profile/avatar" }] },
			{ "viewName": "avatar", "template": "<img>", "factories": ["trace"] }
		]
	}] }));
	let trace = factory_fn("trace", |ctx| {
		Box::pin(async move {
			let request_id = ctx.scope().request_id().to_string();
			ctx.set_public_data_key("requestId", request_id);
			Ok(())
		})
	});
	let engine = Engine::builder(manifest).factory(trace).build().unwrap();

	let raw = RawRequest::new().header("X-Request-Id", "req-42");
	let response = engine.render("profile", "page", raw, RenderMode::Fragment).await.unwrap();
	assert!(body(&response).contains(r#"{"requestId":"req-42"}"#));
}
