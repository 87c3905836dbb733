use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mosaic_engine::render::HTML;
use mosaic_engine::{Engine, EngineConfig, EngineError, FactoryFailure, Helper, HttpFailure, RawRequest, RenderMode, factory_fn};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use crate::common::{body, counter, delay, hydration, registry};

fn product_engine() -> Engine {
	let manifest = registry(json!({ "components": [{
		"path": "product",
		"views": [{
			"viewName": "card",
			"title": "Product",
			"template": "<div class=\"card\">{{ data.display }}</div>",
			"factories": [{ "name": "format", "priority": 5 }, { "name": "price", "priority": 1 }],
			"exposeAsBlueprint": true,
			"assets": [{ "kind": "script", "src": "/static/card.ts" }, { "kind": "style", "src": "/static/card.scss" }]
		}]
	}] }));
	let price = factory_fn("price", |ctx| {
		Box::pin(async move {
			ctx.set_public_data_key("price", 9.99);
			Ok(())
		})
	});
	let format = factory_fn("format", |ctx| {
		Box::pin(async move {
			let price = ctx
				.public_data_key("price")
				.and_then(Value::as_f64)
				.ok_or_else(|| FactoryFailure::msg("price was not set"))?;
			ctx.set_public_data_key("display", format!("${price:.2}"));
			Ok(())
		})
	});
	Engine::builder(manifest).factories([price, format]).build().unwrap()
}

#[tokio::test]
async fn product_card_publishes_formatted_price() {
	let engine = product_engine();
	let response = engine.render("product", "card", RawRequest::new(), RenderMode::Auto).await.unwrap();

	assert!(response.page);
	assert_eq!(response.content_type, HTML);
	let html = body(&response);
	assert!(html.starts_with("<!DOCTYPE html>"));
	assert!(html.contains("<title>Product</title>"));
	assert!(html.contains("<div class=\"card\">$9.99</div>"));
	assert!(html.contains("id=\"__MOSAIC_DATA__\""));
	assert!(html.contains("/static/card.js"));
	assert!(html.contains("/static/card.css"));
	assert_eq!(hydration(html)["display"], json!("$9.99"));
}

#[tokio::test]
async fn fragments_carry_a_component_scoped_payload() {
	let engine = product_engine();
	let response = engine.render("product", "card", RawRequest::new(), RenderMode::Fragment).await.unwrap();

	assert!(!response.page);
	let html = body(&response);
	assert!(html.starts_with("<div class=\"card\">$9.99</div><script"));
	assert!(html.contains("data-component=\"product/card\""));
	assert!(!html.contains("<html"));
	assert_eq!(hydration(html), json!({ "price": 9.99, "display": "$9.99" }));
}

#[tokio::test]
async fn unknown_view_is_not_found_and_never_cached() {
	let engine = product_engine();
	let err = engine.render("ghost", "missing", RawRequest::new(), RenderMode::Auto).await.unwrap_err();

	assert_eq!(err.status(), 404);
	assert_eq!(err.code(), "component_not_found");
	assert!(engine.cache().store().keys("").unwrap().is_empty());
	assert!(engine.describe("ghost", "missing").is_err());
}

#[tokio::test]
async fn thrown_failure_stops_the_pipeline() {
	let later = Arc::new(AtomicUsize::new(0));
	let manifest = registry(json!({ "components": [{
		"path": "account",
		"views": [{ "viewName": "settings", "template": "secret", "factories": ["guard", "later"] }]
	}] }));
	let guard = factory_fn("guard", |ctx| {
		Box::pin(async move {
			ctx.throw(HttpFailure::forbidden("login required"));
			Ok(())
		})
	});
	let engine = Engine::builder(manifest).factory(guard).factory(counter("later", &later)).build().unwrap();

	let err = engine.render("account", "settings", RawRequest::new(), RenderMode::Auto).await.unwrap_err();
	assert_eq!(err.status(), 403);
	assert_eq!(err.body(false).message, "login required");
	assert_eq!(later.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn factory_errors_hide_details_outside_development() {
	let manifest = registry(json!({ "components": [{
		"path": "inventory",
		"views": [{ "viewName": "stock", "template": "-", "factories": ["lookup"] }]
	}] }));
	let lookup = factory_fn("lookup", |_| Box::pin(async { Err::<(), _>(FactoryFailure::msg("warehouse db unreachable")) }));
	let engine = Engine::builder(manifest).factory(lookup).build().unwrap();

	let err = engine.render("inventory", "stock", RawRequest::new(), RenderMode::Auto).await.unwrap_err();
	assert_eq!(err.status(), 500);

	let public = err.body(false);
	assert_eq!(public.message, "internal server error");
	assert_eq!(public.detail, None);

	let detailed = serde_json::to_string(&err.body(true)).unwrap();
	assert!(detailed.contains("warehouse db unreachable"));
	assert!(detailed.contains("lookup"));
}

#[tokio::test]
async fn declared_params_are_validated_and_coerced() {
	let manifest = registry(json!({ "components": [{
		"path": "order",
		"views": [{
			"viewName": "detail",
			"template": "#{{ params.query.id }}",
			"params": [{ "name": "id", "in": "query", "type": "number", "required": true }]
		}]
	}] }));
	let engine = Engine::builder(manifest).build().unwrap();

	let err = engine.render("order", "detail", RawRequest::new(), RenderMode::Fragment).await.unwrap_err();
	assert_eq!(err.status(), 400);
	assert_eq!(err.body(false).detail, Some(json!([{ "in": "query", "name": "id", "reason": "is required" }])));

	let err = engine
		.render("order", "detail", RawRequest::new().query("id=abc"), RenderMode::Fragment)
		.await
		.unwrap_err();
	assert_eq!(err.status(), 400);

	let response = engine
		.render("order", "detail", RawRequest::new().query("?id=7"), RenderMode::Fragment)
		.await
		.unwrap();
	assert_eq!(body(&response), "#7");
}

#[tokio::test]
async fn declared_helpers_are_callable_from_templates() {
	let manifest = registry(json!({ "components": [{
		"path": "cart",
		"shared": { "helpers": ["currency"] },
		"views": [{ "viewName": "total", "template": "{{ currency data.total \"EUR\" }}", "factories": ["total"] }]
	}] }));
	let total = factory_fn("total", |ctx| {
		Box::pin(async move {
			ctx.set_public_data_key("total", 12.5);
			Ok(())
		})
	});
	let currency = Helper::new("currency", |args| {
		let amount = args.first().and_then(Value::as_f64).unwrap_or_default();
		let code = args.get(1).and_then(Value::as_str).unwrap_or("USD");
		Value::from(format!("{amount:.2} {code}"))
	});
	let engine = Engine::builder(manifest).factory(total).helper(currency).build().unwrap();

	let response = engine.render("cart", "total", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	assert!(body(&response).starts_with("12.50 EUR<script"));
}

#[tokio::test]
async fn factories_can_switch_view_and_title() {
	let manifest = registry(json!({ "components": [{
		"path": "article",
		"views": [
			{ "viewName": "full", "title": "Article", "template": "full body", "factories": ["switch"], "exposeAsBlueprint": true },
			{ "viewName": "compact", "template": "compact body" }
		]
	}] }));
	let switch = factory_fn("switch", |ctx| {
		Box::pin(async move {
			ctx.override_view("compact")?;
			ctx.override_title("Article (compact)");
			Ok(())
		})
	});
	let engine = Engine::builder(manifest).factory(switch).build().unwrap();

	let response = engine.render("article", "full", RawRequest::new(), RenderMode::Auto).await.unwrap();
	let html = body(&response);
	assert!(html.contains("compact body"));
	assert!(!html.contains("full body"));
	assert!(html.contains("<title>Article (compact)</title>"));
}

#[tokio::test]
async fn json_renderer_returns_public_data() {
	let manifest = registry(json!({ "components": [{
		"path": "api",
		"views": [{ "viewName": "status", "renderer": "json", "factories": ["status"], "exposeAsBlueprint": true }]
	}] }));
	let status = factory_fn("status", |ctx| {
		Box::pin(async move {
			ctx.set_public_data_key("ok", true);
			Ok(())
		})
	});
	let engine = Engine::builder(manifest).factory(status).build().unwrap();

	let response = engine.render("api", "status", RawRequest::new(), RenderMode::Auto).await.unwrap();
	assert_eq!(response.content_type, "application/json");
	assert!(!response.page);
	assert_eq!(serde_json::from_slice::<Value>(&response.body).unwrap(), json!({ "ok": true }));
}

#[tokio::test]
async fn hydration_payload_cannot_close_its_script() {
	let manifest = registry(json!({ "components": [{
		"path": "comment",
		"views": [{ "viewName": "show", "template": "<p>{{ data.text }}</p>", "factories": ["load"] }]
	}] }));
	let load = factory_fn("load", |ctx| {
		Box::pin(async move {
			ctx.set_public_data_key("text", "</script><script>alert(1)</script>");
			Ok(())
		})
	});
	let engine = Engine::builder(manifest).factory(load).build().unwrap();

	let response = engine.render("comment", "show", RawRequest::new(), RenderMode::Fragment).await.unwrap();
	let html = body(&response);
	assert!(html.starts_with("<p>&lt;/script&gt;"));
	assert_eq!(html.matches("</script>").count(), 1);
	assert_eq!(hydration(html)["text"], json!("</script><script>alert(1)</script>"));
}

#[tokio::test(start_paused = true)]
async fn request_deadline_aborts_a_stalled_render() {
	let manifest = registry(json!({ "components": [{
		"path": "report",
		"views": [{ "viewName": "slow", "template": "<table>", "factories": ["delay"] }]
	}] }));
	let config = EngineConfig {
		request_timeout_ms: 100,
		..EngineConfig::default()
	};
	let engine = Engine::builder(manifest).config(config).factory(delay()).build().unwrap();

	let started = tokio::time::Instant::now();
	let err = engine
		.render("report", "slow", RawRequest::new().query("ms=60000"), RenderMode::Fragment)
		.await
		.unwrap_err();
	assert!(matches!(err, EngineError::Timeout(deadline) if deadline == Duration::from_millis(100)), "{err}");
	assert_eq!(err.status(), 504);
	assert_eq!(err.code(), "timeout");
	assert!(started.elapsed() < Duration::from_secs(1));

	let fast = engine.render("report", "slow", RawRequest::new().query("ms=10"), RenderMode::Fragment).await.unwrap();
	assert_eq!(body(&fast), "<table>");
}
