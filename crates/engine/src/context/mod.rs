//! Per-request component context.
//!
//! A [`ComponentContext`] is created by [`ContextBuilder`] for exactly one
//! render and owned by that render alone. Factories mutate it through
//! `&mut`; once the renderer has produced markup the engine hands the context
//! to the response assembler by value and it is never touched again.

mod builder;
mod helper;

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use mosaic_manifest::{AssetRef, ManifestRegistry, ParamLocation, RendererKind, View};
use regex::Regex;
use serde_json::{Map, Value};

pub use self::builder::{CREDENTIAL_HEADERS, ContextBuilder, FORWARDED_HEADERS, REQUEST_ID_HEADER, RequestScope};
pub use self::helper::Helper;
use crate::compose::ChildOutcome;
use crate::device::DeviceType;
use crate::error::{ContextError, HttpFailure};
use crate::params::{Bucket, Params};
use crate::render::{Template, TemplateSet};

/// Mutable aggregate of one render.
#[derive(Debug)]
pub struct ComponentContext {
	view: Arc<View>,
	registry: Arc<ManifestRegistry>,
	device: DeviceType,
	params: Params,
	data: Map<String, Value>,
	helpers: IndexMap<String, Helper>,
	components: IndexMap<String, Bytes>,
	child_assets: Vec<AssetRef>,
	outcomes: Vec<ChildOutcome>,
	level: u32,
	as_page: bool,
	renderer: Option<RendererKind>,
	title: Option<String>,
	template: Option<String>,
	templates: Arc<TemplateSet>,
	scope: RequestScope,
	abort: Option<HttpFailure>,
}

impl ComponentContext {
	/// The view being rendered, after any [`override_view`](Self::override_view).
	pub fn view(&self) -> &Arc<View> {
		&self.view
	}

	pub fn device(&self) -> DeviceType {
		self.device
	}

	/// Nesting level; the top-level view renders at 0.
	pub fn level(&self) -> u32 {
		self.level
	}

	pub fn is_page(&self) -> bool {
		self.as_page
	}

	pub fn scope(&self) -> &RequestScope {
		&self.scope
	}

	pub fn params(&self) -> &Params {
		&self.params
	}

	pub fn param(&self, location: ParamLocation, name: &str) -> Option<&Value> {
		self.params.get(location, name)
	}

	// Public data

	/// Sets one key of the public data bag, replacing any previous value.
	pub fn set_public_data_key(&mut self, key: impl Into<String>, value: impl Into<Value>) {
		self.data.insert(key.into(), value.into());
	}

	/// Shallow-merges a JSON object into the public data bag.
	pub fn set_public_data(&mut self, data: Value) -> Result<(), ContextError> {
		match data {
			Value::Object(map) => {
				self.data.extend(map);
				Ok(())
			}
			_ => Err(ContextError::NotAnObject),
		}
	}

	/// Inserts a key that must not exist yet unless `overwrite` is set.
	pub fn insert_public_data_key(&mut self, key: impl Into<String>, value: impl Into<Value>, overwrite: bool) -> Result<(), ContextError> {
		let key = key.into();
		if !overwrite && self.data.contains_key(&key) {
			return Err(ContextError::DuplicatePublicKey(key));
		}
		self.data.insert(key, value.into());
		Ok(())
	}

	pub fn public_data(&self) -> &Map<String, Value> {
		&self.data
	}

	pub fn public_data_key(&self, key: &str) -> Option<&Value> {
		self.data.get(key)
	}

	// Helpers

	/// Registers a helper, replacing one with the same name.
	pub fn add_helper(&mut self, helper: Helper) -> Result<(), ContextError> {
		if helper.name().trim().is_empty() {
			return Err(ContextError::AnonymousHelper);
		}
		self.helpers.insert(helper.name().to_string(), helper);
		Ok(())
	}

	pub fn helper(&self, name: &str) -> Option<&Helper> {
		self.helpers.get(name)
	}

	pub fn helpers(&self) -> impl Iterator<Item = &Helper> {
		self.helpers.values()
	}

	// Parameters

	pub fn add_param(&mut self, location: ParamLocation, key: impl Into<String>, value: impl Into<Value>) -> &Bucket {
		let bucket = self.params.bucket_mut(location);
		bucket.insert(key.into(), value.into());
		bucket
	}

	pub fn add_params<K, V>(&mut self, location: ParamLocation, entries: impl IntoIterator<Item = (K, V)>) -> &Bucket
	where
		K: Into<String>,
		V: Into<Value>,
	{
		let bucket = self.params.bucket_mut(location);
		bucket.extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
		bucket
	}

	pub fn remove_param(&mut self, location: ParamLocation, key: &str) -> &Bucket {
		let bucket = self.params.bucket_mut(location);
		bucket.remove(key);
		bucket
	}

	pub fn remove_params<K: AsRef<str>>(&mut self, location: ParamLocation, keys: impl IntoIterator<Item = K>) -> &Bucket {
		let bucket = self.params.bucket_mut(location);
		for key in keys {
			bucket.remove(key.as_ref());
		}
		bucket
	}

	/// Removes every key matching `pattern`.
	pub fn remove_params_by_match(&mut self, location: ParamLocation, pattern: &Regex) -> &Bucket {
		let bucket = self.params.bucket_mut(location);
		bucket.retain(|key, _| !pattern.is_match(key));
		bucket
	}

	/// Removes every entry for which `filter` returns true.
	pub fn remove_params_by_filter(&mut self, location: ParamLocation, mut filter: impl FnMut(&str, &Value) -> bool) -> &Bucket {
		let bucket = self.params.bucket_mut(location);
		bucket.retain(|key, value| !filter(key, value));
		bucket
	}

	// Rendering overrides

	/// Renders `template` instead of the view's declared template.
	pub fn override_template(&mut self, template: impl Into<String>) {
		self.template = Some(template.into());
	}

	/// Switches to another view of the same component. Its children,
	/// template and renderer are used from here on; public data, helpers and
	/// parameters carry over.
	pub fn override_view(&mut self, view: &str) -> Result<(), ContextError> {
		let target = self.registry.get(&self.view.component, view).ok_or_else(|| ContextError::UnknownView {
			component: self.view.component.to_string(),
			view: view.to_string(),
		})?;
		self.view = Arc::clone(target);
		Ok(())
	}

	pub fn override_renderer(&mut self, kind: RendererKind) {
		self.renderer = Some(kind);
	}

	pub fn override_title(&mut self, title: impl Into<String>) {
		self.title = Some(title.into());
	}

	pub fn render_as_page(&mut self, as_page: bool) {
		self.as_page = as_page;
	}

	/// Aborts the request with a client-facing failure once the running
	/// factory returns. The first failure thrown wins.
	pub fn throw(&mut self, failure: HttpFailure) {
		if self.abort.is_none() {
			self.abort = Some(failure);
		}
	}

	/// Effective template text.
	pub fn template(&self) -> Option<&str> {
		self.template.as_deref().or_else(|| self.view.template.text())
	}

	/// Startup-parsed template of the effective view, unless a factory
	/// overrode the template text.
	pub fn compiled_template(&self) -> Option<&Template> {
		if self.template.is_some() {
			return None;
		}
		self.templates.get(&self.view.id())
	}

	/// Effective page title.
	pub fn title(&self) -> Option<&str> {
		self.title.as_deref().or(self.view.title.as_deref())
	}

	/// Effective renderer kind.
	pub fn renderer_kind(&self) -> &RendererKind {
		self.renderer.as_ref().unwrap_or(&self.view.renderer)
	}

	// Composition results

	/// Rendered child output keyed by child name.
	pub fn components(&self) -> &IndexMap<String, Bytes> {
		&self.components
	}

	pub fn component(&self, name: &str) -> Option<&Bytes> {
		self.components.get(name)
	}

	pub fn child_outcomes(&self) -> &[ChildOutcome] {
		&self.outcomes
	}

	/// Assets declared by child manifests.
	pub fn child_assets(&self) -> &[AssetRef] {
		&self.child_assets
	}

	pub(crate) fn set_component(&mut self, name: String, markup: Bytes) {
		self.components.insert(name, markup);
	}

	pub(crate) fn record_outcome(&mut self, outcome: ChildOutcome) {
		self.outcomes.push(outcome);
	}

	pub(crate) fn add_child_assets(&mut self, assets: impl IntoIterator<Item = AssetRef>) {
		self.child_assets.extend(assets);
	}

	pub(crate) fn take_abort(&mut self) -> Option<HttpFailure> {
		self.abort.take()
	}

	pub(crate) fn into_parts(self) -> RetiredContext {
		RetiredContext {
			view: self.view,
			title: self.title,
			data: self.data,
			child_assets: self.child_assets,
			outcomes: self.outcomes,
			as_page: self.as_page,
		}
	}
}

/// What the response assembler keeps of a context after dispatch.
#[derive(Debug)]
pub(crate) struct RetiredContext {
	pub view: Arc<View>,
	pub title: Option<String>,
	pub data: Map<String, Value>,
	pub child_assets: Vec<AssetRef>,
	pub outcomes: Vec<ChildOutcome>,
	pub as_page: bool,
}

impl RetiredContext {
	pub fn title(&self) -> Option<&str> {
		self.title.as_deref().or(self.view.title.as_deref())
	}
}
