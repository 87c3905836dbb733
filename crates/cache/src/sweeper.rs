use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::CacheStore;

/// Handle to a running sweeper task. Dropping it stops the sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
	cancel: CancellationToken,
	task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
	/// Requests the sweeper to stop after its current pass.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Cancels the sweeper and waits for the task to exit.
	pub async fn shutdown(mut self) {
		self.cancel.cancel();
		if let Some(task) = self.task.take() {
			let _ = task.await;
		}
	}
}

impl Drop for SweeperHandle {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// Spawns a task that evicts expired entries from `store` every `interval`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(store: Arc<dyn CacheStore>, interval: Duration) -> SweeperHandle {
	let cancel = CancellationToken::new();
	let token = cancel.clone();
	let task = tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		// First tick completes immediately.
		ticker.tick().await;
		loop {
			tokio::select! {
				_ = token.cancelled() => break,
				_ = ticker.tick() => {
					if let Err(error) = store.cleanup() {
						tracing::warn!(%error, "cache.sweep_failed");
					}
				}
			}
		}
		tracing::debug!("cache.sweeper_stopped");
	});
	SweeperHandle {
		cancel,
		task: Some(task),
	}
}
