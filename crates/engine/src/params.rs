//! Parameter extraction.
//!
//! Normalizes raw request data into four buckets (`headers`, `path`, `query`,
//! `body`) and validates them against the view's [`ParamSchema`]. Every bucket
//! is always present, possibly empty.

use std::collections::BTreeMap;

use bytes::Bytes;
use mosaic_manifest::{ParamField, ParamKind, ParamLocation, ParamSchema};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ValidationError, ValidationIssue};

/// One parameter bucket.
pub type Bucket = BTreeMap<String, Value>;

/// The four parameter buckets of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Params {
	pub headers: Bucket,
	pub path: Bucket,
	pub query: Bucket,
	pub body: Bucket,
}

impl Params {
	pub fn bucket(&self, location: ParamLocation) -> &Bucket {
		match location {
			ParamLocation::Header => &self.headers,
			ParamLocation::Path => &self.path,
			ParamLocation::Query => &self.query,
			ParamLocation::Body => &self.body,
		}
	}

	pub fn bucket_mut(&mut self, location: ParamLocation) -> &mut Bucket {
		match location {
			ParamLocation::Header => &mut self.headers,
			ParamLocation::Path => &mut self.path,
			ParamLocation::Query => &mut self.query,
			ParamLocation::Body => &mut self.body,
		}
	}

	pub fn get(&self, location: ParamLocation, name: &str) -> Option<&Value> {
		self.bucket(location).get(name)
	}

	/// Header value as a string, by lowercase name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(Value::as_str)
	}

	/// The parameters that identify a render: every bucket except the
	/// headers, plus the values of the named `headers` that are present.
	pub fn cache_identity<'a>(&'a self, headers: impl IntoIterator<Item = &'a str>) -> impl Serialize + 'a {
		let selected: BTreeMap<&str, &Value> = headers.into_iter().filter_map(|name| Some((name, self.headers.get(name)?))).collect();
		(selected, &self.path, &self.query, &self.body)
	}

	pub fn to_value(&self) -> Value {
		serde_json::to_value(self).unwrap_or(Value::Null)
	}
}

/// Raw request data handed to the engine by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
	pub headers: Vec<(String, String)>,
	pub path: BTreeMap<String, String>,
	/// Trailing URL segments after `/{component}/{view}`, bound in order to
	/// the view's declared path parameters.
	pub segments: Vec<String>,
	/// Query string without the leading `?`.
	pub query: Option<String>,
	pub body: Option<Bytes>,
}

impl RawRequest {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.path.insert(name.into(), value.into());
		self
	}

	pub fn segment(mut self, segment: impl Into<String>) -> Self {
		self.segments.push(segment.into());
		self
	}

	pub fn query(mut self, query: impl Into<String>) -> Self {
		let query = query.into();
		self.query = Some(query.strip_prefix('?').map(str::to_string).unwrap_or(query));
		self
	}

	pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
		self.headers.push(("content-type".into(), content_type.into()));
		self.body = Some(body.into());
		self
	}

	pub fn json_body(self, body: &Value) -> Self {
		self.body("application/json", body.to_string())
	}

	fn content_type(&self) -> Option<&str> {
		self.headers
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
			.map(|(_, value)| value.as_str())
	}
}

/// Extracts and validates parameters.
pub fn extract(raw: &RawRequest, schema: &ParamSchema) -> Result<Params, ValidationError> {
	let mut params = Params::default();

	for (name, value) in &raw.headers {
		let name = name.to_ascii_lowercase();
		match params.headers.get_mut(&name) {
			Some(Value::String(existing)) => {
				existing.push_str(", ");
				existing.push_str(value);
			}
			_ => {
				params.headers.insert(name, Value::String(value.clone()));
			}
		}
	}

	params.path = raw.path.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
	bind_segments(&mut params.path, &raw.segments, schema)?;

	if let Some(query) = &raw.query {
		params.query = parse_form(query.as_bytes());
	}

	if let Some(body) = raw.body.as_ref().filter(|b| !b.is_empty()) {
		params.body = parse_body(raw.content_type(), body)?;
	}

	validate(&mut params, schema)?;
	Ok(params)
}

/// Binds positional segments to the schema's path fields in declaration order.
/// Explicitly named path values take precedence.
fn bind_segments(path: &mut Bucket, segments: &[String], schema: &ParamSchema) -> Result<(), ValidationError> {
	let mut fields = schema.fields_in(ParamLocation::Path);
	for segment in segments {
		let Some(field) = fields.next() else {
			return Err(ValidationError::single(ParamLocation::Path, segment.clone(), "unexpected path segment"));
		};
		path.entry(field.name.clone()).or_insert_with(|| Value::String(segment.clone()));
	}
	Ok(())
}

/// Parses `a=1&b=2&b=3`; repeated keys collect into an array.
fn parse_form(input: &[u8]) -> Bucket {
	let mut bucket = Bucket::new();
	for (key, value) in url::form_urlencoded::parse(input) {
		let value = Value::String(value.into_owned());
		match bucket.get_mut(key.as_ref()) {
			Some(Value::Array(items)) => items.push(value),
			Some(existing) => {
				let first = existing.take();
				*existing = Value::Array(vec![first, value]);
			}
			None => {
				bucket.insert(key.into_owned(), value);
			}
		}
	}
	bucket
}

fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<Bucket, ValidationError> {
	let mime = content_type
		.and_then(|ct| ct.split(';').next())
		.map(|ct| ct.trim().to_ascii_lowercase())
		.unwrap_or_default();

	match mime.as_str() {
		"application/x-www-form-urlencoded" => Ok(parse_form(body)),
		m if m == "application/json" || m.ends_with("+json") || m.is_empty() => {
			let value: Value =
				serde_json::from_slice(body).map_err(|e| ValidationError::single(ParamLocation::Body, "", format!("malformed JSON body: {e}")))?;
			match value {
				Value::Object(map) => Ok(object_to_bucket(map)),
				_ => Err(ValidationError::single(ParamLocation::Body, "", "body must be a JSON object")),
			}
		}
		other => {
			tracing::debug!(content_type = other, "params.body_ignored");
			Ok(Bucket::new())
		}
	}
}

fn object_to_bucket(map: Map<String, Value>) -> Bucket {
	map.into_iter().collect()
}

fn validate(params: &mut Params, schema: &ParamSchema) -> Result<(), ValidationError> {
	let mut issues = Vec::new();
	for field in &schema.fields {
		let bucket = params.bucket_mut(field.location);
		match bucket.get_mut(&field.name) {
			None if field.required => issues.push(issue(field, "is required")),
			None => {}
			Some(value) => {
				if let Err(reason) = coerce(value, field.kind) {
					issues.push(issue(field, &reason));
				}
			}
		}
	}
	if issues.is_empty() { Ok(()) } else { Err(ValidationError { issues }) }
}

fn issue(field: &ParamField, reason: &str) -> ValidationIssue {
	ValidationIssue {
		location: field.location,
		name: field.name.clone(),
		reason: reason.to_string(),
	}
}

/// Checks `value` against `kind`, converting strings to numbers or booleans.
fn coerce(value: &mut Value, kind: ParamKind) -> Result<(), String> {
	match (kind, &*value) {
		(ParamKind::Any, _)
		| (ParamKind::String, Value::String(_))
		| (ParamKind::Number, Value::Number(_))
		| (ParamKind::Boolean, Value::Bool(_))
		| (ParamKind::Object, Value::Object(_))
		| (ParamKind::Array, Value::Array(_)) => Ok(()),
		(ParamKind::Number, Value::String(s)) => {
			let number = s
				.trim()
				.parse::<i64>()
				.map(Value::from)
				.or_else(|_| s.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number).ok_or(()))
				.map_err(|_| format!("expected a number, got {s:?}"))?;
			*value = number;
			Ok(())
		}
		(ParamKind::Boolean, Value::String(s)) => {
			*value = Value::Bool(match s.trim().to_ascii_lowercase().as_str() {
				"true" | "1" | "yes" | "on" => true,
				"false" | "0" | "no" | "off" => false,
				_ => return Err(format!("expected a boolean, got {s:?}")),
			});
			Ok(())
		}
		(ParamKind::Array, Value::String(_)) => {
			let single = value.take();
			*value = Value::Array(vec![single]);
			Ok(())
		}
		(kind, other) => Err(format!("expected {}, got {}", kind_name(kind), value_kind(other))),
	}
}

fn kind_name(kind: ParamKind) -> &'static str {
	match kind {
		ParamKind::Any => "any value",
		ParamKind::String => "a string",
		ParamKind::Number => "a number",
		ParamKind::Boolean => "a boolean",
		ParamKind::Object => "an object",
		ParamKind::Array => "an array",
	}
}

fn value_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}
