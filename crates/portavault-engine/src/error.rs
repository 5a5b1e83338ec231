//! Engine error types.

use portavault_core::Error as CoreError;
use portavault_archive::ArchiveError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the coordinator and the operations it runs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Schema model, graph, or mapper error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Archive serialization or transport error.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Durable task store failure.
    #[error("task store error: {0}")]
    Store(#[from] sled::Error),

    /// A durable task record could not be encoded or decoded.
    #[error("task record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The queue lock could not be acquired within the bounded timeout.
    /// Transient: the caller should retry.
    #[error("queue '{queue}' lock not acquired within {timeout:?}")]
    LockTimeout {
        /// Queue name the lock is keyed by.
        queue: String,
        /// The configured bound.
        timeout: Duration,
    },

    /// The tenant is already running an operation of a different kind.
    #[error("tenant '{tenant}' already running a {running} operation")]
    IncompatibleOperation {
        /// The tenant.
        tenant: String,
        /// Kind of the live operation.
        running: String,
    },

    /// This worker instance is at its concurrency ceiling.
    #[error("worker saturated: {live} live tasks at ceiling {ceiling}")]
    Saturated {
        /// Live tasks bound to this instance.
        live: usize,
        /// The configured ceiling.
        ceiling: usize,
    },

    /// Invalid schedule or start-request configuration, rejected before a
    /// task is created.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Full-instance dump requested on a deployment that does not permit it.
    #[error("full instance dump not permitted on this deployment")]
    InstanceDumpNotAllowed,

    /// No task for the given tenant and kind.
    #[error("no {kind} task for tenant '{tenant}'")]
    TaskNotFound {
        /// The tenant.
        tenant: String,
        /// The operation kind.
        kind: String,
    },

    /// Source store failure while scanning rows.
    #[error("tenant source error: {0}")]
    Source(String),

    /// Destination store failure while inserting or patching rows.
    #[error("tenant destination error: {0}")]
    Destination(String),

    /// The operation was cancelled by dequeue.
    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether retrying at the point of failure is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::LockTimeout { .. }
                | EngineError::Source(_)
                | EngineError::Destination(_)
                | EngineError::Archive(ArchiveError::Backend(_))
                | EngineError::Archive(ArchiveError::Io(_))
        )
    }
}
