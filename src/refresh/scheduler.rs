// src/refresh/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::RefreshEngine;

/// Background worker: first cycle immediately, then `interval` of sleep after
/// each completed cycle, so cycles never overlap. Abort the handle to stop it.
pub fn spawn_scheduler(engine: Arc<RefreshEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            // failures are logged inside the cycle; the next tick retries
            let _ = engine.run_cycle().await;
            tokio::time::sleep(interval).await;
        }
    })
}
