use std::sync::Arc;

use mosaic_manifest::{ManifestRegistry, View};
use serde_json::Value;
use url::Url;

use super::{ComponentContext, Helper};
use crate::device::DeviceType;
use crate::params::{Bucket, Params};
use crate::render::TemplateSet;

/// Inbound headers carried into child requests and exposed to factories.
pub const FORWARDED_HEADERS: &[&str] = &["user-agent", "accept-language", "cookie", "authorization", "x-forwarded-for"];

/// Forwarded headers that identify the client; they always split the render cache.
pub const CREDENTIAL_HEADERS: &[&str] = &["cookie", "authorization"];

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request facts a factory needs to make its own outbound calls.
#[derive(Debug, Clone)]
pub struct RequestScope {
	server_url: Url,
	request_id: String,
	forwarded: Bucket,
}

impl RequestScope {
	pub fn new(server_url: Url, request_id: impl Into<String>) -> Self {
		Self {
			server_url,
			request_id: request_id.into(),
			forwarded: Bucket::new(),
		}
	}

	/// Derives the scope of an inbound request. Reuses its `x-request-id` or
	/// mints a new one.
	pub fn from_params(server_url: &Url, params: &Params) -> Self {
		let request_id = params
			.header(REQUEST_ID_HEADER)
			.map(str::to_string)
			.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
		let forwarded = FORWARDED_HEADERS
			.iter()
			.filter_map(|name| params.headers.get(*name).map(|v| (name.to_string(), v.clone())))
			.collect();
		Self {
			server_url: server_url.clone(),
			request_id,
			forwarded,
		}
	}

	pub fn server_url(&self) -> &Url {
		&self.server_url
	}

	pub fn request_id(&self) -> &str {
		&self.request_id
	}

	pub fn forwarded_headers(&self) -> &Bucket {
		&self.forwarded
	}

	/// Header pairs to attach to an outbound request on behalf of this one.
	pub fn outbound_headers(&self) -> Vec<(String, String)> {
		let mut headers: Vec<_> = self
			.forwarded
			.iter()
			.filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
			.collect();
		headers.push((REQUEST_ID_HEADER.to_string(), self.request_id.clone()));
		headers
	}

	/// Resolves `path` against the server URL.
	pub fn url(&self, path: &str) -> Result<Url, url::ParseError> {
		self.server_url.join(path)
	}
}

/// Assembles a fresh [`ComponentContext`] for one render.
pub struct ContextBuilder {
	view: Arc<View>,
	registry: Arc<ManifestRegistry>,
	scope: RequestScope,
	params: Params,
	device: DeviceType,
	level: u32,
	as_page: bool,
	helpers: Vec<Helper>,
	templates: Arc<TemplateSet>,
}

impl ContextBuilder {
	pub fn new(view: Arc<View>, registry: Arc<ManifestRegistry>, scope: RequestScope) -> Self {
		Self {
			view,
			registry,
			scope,
			params: Params::default(),
			device: DeviceType::default(),
			level: 0,
			as_page: false,
			helpers: Vec::new(),
			templates: Arc::default(),
		}
	}

	pub fn params(mut self, params: Params) -> Self {
		self.params = params;
		self
	}

	pub fn device(mut self, device: DeviceType) -> Self {
		self.device = device;
		self
	}

	pub fn level(mut self, level: u32) -> Self {
		self.level = level;
		self
	}

	pub fn as_page(mut self, as_page: bool) -> Self {
		self.as_page = as_page;
		self
	}

	/// Helpers resolved from the view's declaration.
	pub fn helpers(mut self, helpers: impl IntoIterator<Item = Helper>) -> Self {
		self.helpers.extend(helpers);
		self
	}

	/// Startup-parsed templates, consulted before parsing template text.
	pub fn templates(mut self, templates: Arc<TemplateSet>) -> Self {
		self.templates = templates;
		self
	}

	pub fn build(self) -> ComponentContext {
		let helpers = self.helpers.into_iter().map(|h| (h.name().to_string(), h)).collect();
		ComponentContext {
			view: self.view,
			registry: self.registry,
			device: self.device,
			params: self.params,
			data: serde_json::Map::<String, Value>::new(),
			helpers,
			components: Default::default(),
			child_assets: Vec::new(),
			outcomes: Vec::new(),
			level: self.level,
			as_page: self.as_page,
			renderer: None,
			title: None,
			template: None,
			templates: self.templates,
			scope: self.scope,
			abort: None,
		}
	}
}
