//! Command line of the `mosaic` binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use mosaic_engine::{EngineConfig, LogLevel};

/// Serve component views declared in a manifest.
///
/// Only views whose factories and helpers are registered can be served; the
/// bare binary registers none, so it suits template-only manifests. Embed
/// [`router`](crate::router) to register your own.
#[derive(Parser, Debug)]
#[command(name = "mosaic")]
pub struct Args {
	/// Manifest file
	#[arg(short, long, value_name = "PATH")]
	pub manifest: PathBuf,

	/// TOML configuration file; `MOSAIC_*` environment variables override it
	#[arg(short, long, value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// Listen address
	#[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:3000")]
	pub bind: SocketAddr,

	/// Debug logging regardless of the configured level
	#[arg(short, long)]
	pub verbose: bool,
}

impl Args {
	/// Configuration file (or defaults) with the process environment on top.
	pub fn load_config(&self) -> Result<EngineConfig, mosaic_engine::ConfigError> {
		let config = match &self.config {
			Some(path) => EngineConfig::load(path)?,
			None => EngineConfig::default(),
		};
		config.overlay(|key| std::env::var(key).ok())
	}

	pub fn log_level(&self, config: &EngineConfig) -> tracing::Level {
		if self.verbose { LogLevel::Debug.as_tracing() } else { config.log_level.as_tracing() }
	}
}

/// Installs the global fmt subscriber.
pub fn init_tracing(level: tracing::Level) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
	let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
	tracing::subscriber::set_global_default(subscriber)
}
