//! Engine configuration.
//!
//! Read once at startup: an optional TOML file, then `MOSAIC_*` environment
//! variables on top. Every field has a default, so an empty file (or none at
//! all) yields a working configuration.
//!
//! ```toml
//! request_timeout_ms = 10000
//! development = false
//!
//! [cache]
//! default_ttl_ms = 300000
//!
//! [composition]
//! max_depth = 8
//! child_timeout_ms = 3000
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },

	#[error("invalid value {value:?} for {key}: {reason}")]
	InvalidValue { key: String, value: String, reason: String },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
	pub cache: CacheConfig,
	pub composition: CompositionConfig,
	/// Overall deadline of a top-level request.
	pub request_timeout_ms: u64,
	pub log_level: LogLevel,
	/// Exposes error causes in response bodies.
	pub development: bool,
	/// Base URL factories use to build absolute URLs back into this server.
	pub server_url: String,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			cache: CacheConfig::default(),
			composition: CompositionConfig::default(),
			request_timeout_ms: 10_000,
			log_level: LogLevel::Info,
			development: false,
			server_url: "http://127.0.0.1:3000".into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
	pub enabled: bool,
	pub default_ttl_ms: u64,
	/// Interval of the background expiry sweep. `0` disables the sweeper.
	pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			default_ttl_ms: mosaic_cache::DEFAULT_TTL.as_millis() as u64,
			sweep_interval_ms: 60_000,
		}
	}
}

impl CacheConfig {
	pub fn default_ttl(&self) -> Duration {
		Duration::from_millis(self.default_ttl_ms)
	}

	pub fn sweep_interval(&self) -> Option<Duration> {
		(self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompositionConfig {
	/// Deepest nesting level a child may render at. The top-level view is level 0.
	pub max_depth: u32,
	/// Per-child timeout for addresses that do not declare their own.
	pub child_timeout_ms: u64,
}

impl Default for CompositionConfig {
	fn default() -> Self {
		Self {
			max_depth: 8,
			child_timeout_ms: 3_000,
		}
	}
}

impl CompositionConfig {
	pub fn child_timeout(&self) -> Duration {
		Duration::from_millis(self.child_timeout_ms)
	}
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Error,
	Warn,
	#[default]
	Info,
	Debug,
	Trace,
}

impl LogLevel {
	pub fn as_tracing(self) -> tracing::Level {
		match self {
			Self::Error => tracing::Level::ERROR,
			Self::Warn => tracing::Level::WARN,
			Self::Info => tracing::Level::INFO,
			Self::Debug => tracing::Level::DEBUG,
			Self::Trace => tracing::Level::TRACE,
		}
	}
}

impl FromStr for LogLevel {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"error" => Ok(Self::Error),
			"warn" | "warning" => Ok(Self::Warn),
			"info" => Ok(Self::Info),
			"debug" => Ok(Self::Debug),
			"trace" => Ok(Self::Trace),
			_ => Err("expected error, warn, info, debug or trace".into()),
		}
	}
}

impl EngineConfig {
	pub fn parse_toml(input: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(input)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::parse_toml(&content)
	}

	/// Defaults overlaid with the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::default().overlay(|key| std::env::var(key).ok())
	}

	/// Defaults overlaid with values from `lookup`.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		Self::default().overlay(lookup)
	}

	/// Applies `MOSAIC_*` overrides from `lookup` on top of `self`.
	pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

		if let Some(v) = get("MOSAIC_CACHE_ENABLED") {
			self.cache.enabled = parse_bool("MOSAIC_CACHE_ENABLED", &v)?;
		}
		if let Some(v) = get("MOSAIC_CACHE_TTL_MS") {
			self.cache.default_ttl_ms = parse_num("MOSAIC_CACHE_TTL_MS", &v)?;
		}
		if let Some(v) = get("MOSAIC_CACHE_SWEEP_MS") {
			self.cache.sweep_interval_ms = parse_num("MOSAIC_CACHE_SWEEP_MS", &v)?;
		}
		if let Some(v) = get("MOSAIC_MAX_DEPTH") {
			self.composition.max_depth = parse_num("MOSAIC_MAX_DEPTH", &v)?;
		}
		if let Some(v) = get("MOSAIC_CHILD_TIMEOUT_MS") {
			self.composition.child_timeout_ms = parse_num("MOSAIC_CHILD_TIMEOUT_MS", &v)?;
		}
		if let Some(v) = get("MOSAIC_REQUEST_TIMEOUT_MS") {
			self.request_timeout_ms = parse_num("MOSAIC_REQUEST_TIMEOUT_MS", &v)?;
		}
		if let Some(v) = get("MOSAIC_LOG") {
			self.log_level = v.parse().map_err(|reason| invalid("MOSAIC_LOG", &v, reason))?;
		}
		if let Some(v) = get("MOSAIC_DEV") {
			self.development = parse_bool("MOSAIC_DEV", &v)?;
		}
		if let Some(v) = get("MOSAIC_SERVER_URL") {
			url::Url::parse(&v).map_err(|e| invalid("MOSAIC_SERVER_URL", &v, e.to_string()))?;
			self.server_url = v;
		}
		Ok(self)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
	ConfigError::InvalidValue {
		key: key.to_string(),
		value: value.to_string(),
		reason: reason.into(),
	}
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
	T::Err: std::fmt::Display,
{
	value.trim().parse().map_err(|e: T::Err| invalid(key, value, e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(invalid(key, value, "expected a boolean")),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use pretty_assertions::assert_eq;

	use super::*;

	fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |key| map.get(key).cloned()
	}

	#[test]
	fn defaults() {
		let config = EngineConfig::default();
		assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
		assert_eq!(config.composition.max_depth, 8);
		assert_eq!(config.composition.child_timeout(), Duration::from_secs(3));
		assert_eq!(config.request_timeout(), Duration::from_secs(10));
		assert!(!config.development);
	}

	#[test]
	fn partial_toml_keeps_other_defaults() {
		let config = EngineConfig::parse_toml("development = true\n[composition]\nmax_depth = 3\n").unwrap();
		assert!(config.development);
		assert_eq!(config.composition.max_depth, 3);
		assert_eq!(config.composition.child_timeout_ms, 3_000);
		assert_eq!(config.cache, CacheConfig::default());
	}

	#[test]
	fn unknown_toml_key_is_rejected() {
		assert!(matches!(EngineConfig::parse_toml("max_dept = 3"), Err(ConfigError::Toml(_))));
	}

	#[test]
	fn environment_overrides_file() {
		let base = EngineConfig::parse_toml("[cache]\ndefault_ttl_ms = 10\n").unwrap();
		let config = base
			.overlay(env(&[
				("MOSAIC_CACHE_TTL_MS", "250"),
				("MOSAIC_MAX_DEPTH", "2"),
				("MOSAIC_LOG", "DEBUG"),
				("MOSAIC_DEV", "yes"),
				("MOSAIC_CACHE_SWEEP_MS", "0"),
			]))
			.unwrap();
		assert_eq!(config.cache.default_ttl_ms, 250);
		assert_eq!(config.composition.max_depth, 2);
		assert_eq!(config.log_level, LogLevel::Debug);
		assert!(config.development);
		assert_eq!(config.cache.sweep_interval(), None);
	}

	#[test]
	fn malformed_environment_values_fail() {
		let err = EngineConfig::from_lookup(env(&[("MOSAIC_MAX_DEPTH", "deep")])).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "MOSAIC_MAX_DEPTH"));

		let err = EngineConfig::from_lookup(env(&[("MOSAIC_SERVER_URL", "not a url")])).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}
}
