#![allow(unused_crate_dependencies)]
//! Mosaic composition server.

use clap::Parser;
use mosaic_engine::Engine;
use mosaic_engine::manifest::ManifestRegistry;
use mosaic_server::cli::{self, Args};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	let config = args.load_config()?;
	cli::init_tracing(args.log_level(&config))?;

	let manifest = ManifestRegistry::builder().load(&args.manifest)?.seal();
	let engine = Engine::builder(manifest).config(config).build()?;
	let sweeper = engine.spawn_sweeper();

	let listener = TcpListener::bind(args.bind).await?;
	info!(addr = %listener.local_addr()?, manifest = %args.manifest.display(), "server.listening");
	axum::serve(listener, mosaic_server::router(engine))
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	if let Some(sweeper) = sweeper {
		sweeper.shutdown().await;
	}
	info!("server.stopped");
	Ok(())
}

async fn shutdown_signal() {
	if let Err(error) = tokio::signal::ctrl_c().await {
		warn!(%error, "server.signal_unavailable");
		std::future::pending::<()>().await;
	}
}
