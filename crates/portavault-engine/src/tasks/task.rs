//! Task records and live handles.

use super::store::TaskStore;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Kind of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Export one tenant into an archive.
    Backup,
    /// Import an archive into a tenant.
    Restore,
    /// Export then import into another tenant/region.
    Transfer,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Backup => write!(f, "backup"),
            OperationKind::Restore => write!(f, "restore"),
            OperationKind::Transfer => write!(f, "transfer"),
        }
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Accepted, not yet picked up by the worker.
    Created,
    /// Executing.
    Running,
    /// Finished; a non-empty error marks best-effort completion with
    /// dropped rows.
    Completed,
    /// Aborted with a terminal error.
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Created => write!(f, "created"),
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// Durable record of one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTask {
    /// Task id, unique within the queue.
    pub id: String,
    /// Owning tenant.
    pub tenant: String,
    /// Operation kind.
    pub kind: OperationKind,
    /// Lifecycle state.
    pub state: TaskState,
    /// Monotonically non-decreasing percentage.
    pub progress: u8,
    /// Terminal or best-effort error message.
    pub error: Option<String>,
    /// Locator of the produced archive, once known.
    pub artifact: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Process-local sequence mixed into task ids so tasks created within the
/// same clock microsecond still get distinct ids.
static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a task id from the clock and a sequence number, scrambled with
/// a multiplicative hash.
fn generate_task_id() -> String {
    let ts = Utc::now().timestamp_micros() as u64;
    let seq = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut id = [0u8; 16];
    id[0..8].copy_from_slice(&ts.to_be_bytes());
    let hash = (ts ^ seq).wrapping_mul(0x517cc1b727220a95);
    id[8..16].copy_from_slice(&hash.to_be_bytes());
    hex::encode(id)
}

impl OperationTask {
    /// Create a fresh task in `Created` state.
    pub fn new(tenant: impl Into<String>, kind: OperationKind) -> Self {
        let now = Utc::now();
        Self {
            id: generate_task_id(),
            tenant: tenant.into(),
            kind,
            state: TaskState::Created,
            progress: 0,
            error: None,
            artifact: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the task still occupies its tenant+kind slot.
    pub fn is_live(&self) -> bool {
        matches!(self.state, TaskState::Created | TaskState::Running)
    }

    /// Whether the task reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

/// Snapshot returned by the status query surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Progress percentage.
    pub percentage: u8,
    /// Whether the task completed (best-effort or clean).
    pub completed: bool,
    /// Terminal or best-effort error, `None` when clean.
    pub error: Option<String>,
    /// Produced archive locator, if any.
    pub artifact: Option<String>,
}

/// Shared handle to a tracked task.
///
/// The executing worker mutates the task through the handle; every mutation
/// is mirrored to the durable store.
pub struct TaskHandle {
    id: String,
    tenant: String,
    kind: OperationKind,
    inner: Mutex<OperationTask>,
    cancelled: AtomicBool,
    store: TaskStore,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl TaskHandle {
    pub(crate) fn new(task: OperationTask, store: TaskStore) -> Arc<Self> {
        Arc::new(Self {
            id: task.id.clone(),
            tenant: task.tenant.clone(),
            kind: task.kind,
            inner: Mutex::new(task),
            cancelled: AtomicBool::new(false),
            store,
        })
    }

    /// Task id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning tenant.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    fn mutate<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut OperationTask),
    {
        let mut task = self.inner.lock();
        f(&mut task);
        task.updated_at = Utc::now();
        self.store.save(&task)
    }

    /// Transition to `Running`.
    pub fn set_running(&self) -> Result<(), EngineError> {
        self.mutate(|t| t.state = TaskState::Running)
    }

    /// Raise progress to `percentage`; lower values are ignored so the
    /// reported progress never decreases.
    pub fn advance_to(&self, percentage: u8) -> Result<(), EngineError> {
        self.mutate(|t| t.progress = t.progress.max(percentage.min(100)))
    }

    /// Terminal success. A non-empty `error` marks best-effort completion.
    pub fn complete(
        &self,
        artifact: Option<String>,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        self.mutate(|t| {
            t.state = TaskState::Completed;
            t.progress = 100;
            t.artifact = artifact;
            t.error = error;
        })
    }

    /// Terminal failure.
    pub fn fail(&self, message: impl Into<String>) -> Result<(), EngineError> {
        self.mutate(|t| {
            t.state = TaskState::Failed;
            t.error = Some(message.into());
        })
    }

    /// Clear the error field so an operator can retry a stuck task without
    /// fully restarting it.
    pub fn reset_error(&self) -> Result<(), EngineError> {
        self.mutate(|t| t.error = None)
    }

    /// Snapshot for the status query surface.
    pub fn status(&self) -> TaskStatus {
        let task = self.inner.lock();
        TaskStatus {
            percentage: task.progress,
            completed: task.state == TaskState::Completed,
            error: task.error.clone(),
            artifact: task.artifact.clone(),
        }
    }

    /// Full snapshot of the task record.
    pub fn snapshot(&self) -> OperationTask {
        self.inner.lock().clone()
    }

    /// Whether the task still occupies its slot.
    pub fn is_live(&self) -> bool {
        self.inner.lock().is_live()
    }

    /// Request cooperative cancellation; in-flight row processing checks
    /// this flag between rows.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
