//! Long-running operations.
//!
//! Each operation runs as a spawned tokio task owned by the coordinator,
//! reporting progress through its [`TaskHandle`] and checking for
//! cancellation between rows. Transient source/destination failures are
//! retried a bounded number of times at the point of failure.

mod backup;
mod restore;
mod transfer;

pub(crate) use backup::run_backup;
pub(crate) use restore::{run_restore, RestorePlan};
pub(crate) use transfer::run_transfer;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::tasks::TaskHandle;
use portavault_archive::StorageBackend;
use portavault_core::ModuleRegistry;
use std::future::Future;
use std::sync::Arc;

/// Everything an operation needs besides its own request.
pub(crate) struct OpContext {
    pub handle: Arc<TaskHandle>,
    pub registry: Arc<ModuleRegistry>,
    pub config: EngineConfig,
    pub backend: Arc<dyn StorageBackend>,
}

impl OpContext {
    /// Bail out between rows when the task was dequeued.
    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.handle.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Map per-phase completion onto the task's progress range.
    pub fn report_progress(
        &self,
        base: u8,
        span: u8,
        done: usize,
        total: usize,
    ) -> Result<(), EngineError> {
        let total = total.max(1);
        let pct = base as usize + span as usize * done / total;
        self.handle.advance_to(pct.min(100) as u8)
    }
}

/// Retry a transient-failure-prone call with bounded attempts and backoff.
pub(crate) async fn with_retries<T, F, Fut>(
    config: &EngineConfig,
    what: &str,
    mut call: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                tracing::warn!(
                    error = %e,
                    attempt,
                    max = config.max_retries,
                    what,
                    "transient failure, retrying"
                );
                tokio::time::sleep(config.retry_backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
