// ABOUTME: Background scheduler that rotates the signing key on a fixed interval
// ABOUTME: Runs as a tokio task with a shutdown channel and stops on fatal crypto failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::constants::bounds::MAX_DURATION_SECS;
use crate::errors::{AppError, AppResult};
use crate::signing_keys::SigningKeyStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Handle to a running rotation task
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct KeyRotationHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<AppResult<()>>,
}

impl KeyRotationHandle {
    /// Whether the task has ended, by shutdown or by a fatal error
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and wait for it
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the task early, if any
    pub async fn shutdown(mut self) -> AppResult<()> {
        if let Some(tx) = self.shutdown.take() {
            // Already-finished tasks have dropped the receiver
            let _ = tx.send(());
        }
        self.wait().await
    }

    /// Wait for the task to end on its own
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the task
    pub async fn wait(self) -> AppResult<()> {
        self.task
            .await
            .map_err(|e| AppError::internal(format!("Key rotation task failed: {e}")))?
    }
}

/// Spawn a task calling [`SigningKeyStore::rotate`] every `period`
///
/// The first rotation happens one full `period` after the call; the store
/// already holds a current key. `period` is clamped to between one
/// millisecond and the longest accepted duration. Must be called from within
/// a Tokio runtime.
#[must_use]
pub fn start_scheduler(keys: Arc<SigningKeyStore>, period: Duration) -> KeyRotationHandle {
    let period = period.clamp(
        Duration::from_millis(1),
        Duration::from_secs(MAX_DURATION_SECS),
    );
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    info!(
        "Starting signing key rotation scheduler - rotating every {}s",
        period.as_secs()
    );

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Signing key rotation scheduler stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = keys.rotate() {
                        error!("Scheduled key rotation failed, stopping scheduler: {e}");
                        return Err(e);
                    }
                }
            }
        }
    });

    KeyRotationHandle {
        shutdown: Some(shutdown_tx),
        task,
    }
}
