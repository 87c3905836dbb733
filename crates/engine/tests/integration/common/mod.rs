use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mosaic_engine::manifest::{ManifestFile, ManifestRegistry, ParamLocation};
use mosaic_engine::{Factory, RenderedResponse, factory_fn};
use serde_json::Value;

/// Builds a sealed registry from an inline manifest.
pub fn registry(manifest: Value) -> ManifestRegistry {
	let file: ManifestFile = serde_json::from_value(manifest).expect("manifest shape");
	let mut builder = ManifestRegistry::builder();
	builder.add_file(file).expect("valid manifest");
	builder.seal()
}

/// Factory that bumps `calls` and publishes the new count as `data.n`.
pub fn counter(name: &str, calls: &Arc<AtomicUsize>) -> Arc<dyn Factory> {
	let calls = Arc::clone(calls);
	factory_fn(name, move |ctx| {
		let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
		Box::pin(async move {
			ctx.set_public_data_key("n", n);
			Ok(())
		})
	})
}

/// Factory that sleeps for `?ms=` milliseconds.
pub fn delay() -> Arc<dyn Factory> {
	factory_fn("delay", |ctx| {
		Box::pin(async move {
			let ms = ctx
				.param(ParamLocation::Query, "ms")
				.and_then(Value::as_str)
				.and_then(|ms| ms.parse().ok())
				.unwrap_or(0);
			tokio::time::sleep(Duration::from_millis(ms)).await;
			Ok(())
		})
	})
}

pub fn body(response: &RenderedResponse) -> &str {
	std::str::from_utf8(&response.body).expect("utf-8 body")
}

/// Extracts the JSON payload of the first hydration script in `html`.
pub fn hydration(html: &str) -> Value {
	let start = html.find("type=\"application/json\"").expect("hydration script");
	let open = start + html[start..].find('>').expect("script open tag") + 1;
	let close = open + html[open..].find("</script>").expect("script close tag");
	serde_json::from_str(&html[open..close]).expect("hydration json")
}
