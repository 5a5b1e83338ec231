//! Portavault Engine - operation coordination and the export/import flows.
//!
//! Ties the schema model and archive format together: the coordinator
//! accepts start requests, enforces single-flight per tenant through a
//! lock-guarded task queue backed by a durable store, and drives the
//! long-running backup, restore, and transfer operations on the tokio
//! runtime. Callers never block on completion; they enqueue and poll.

pub mod config;
pub mod coordinator;
pub mod error;
mod ops;
pub mod schedule;
pub mod source;
pub mod tasks;

pub use config::EngineConfig;
pub use coordinator::{OperationCoordinator, RestoreRequest, TransferRequest};
pub use error::EngineError;
pub use schedule::{BackupRecord, BackupSchedule, RecordStore};
pub use source::{MemoryStore, TenantDestination, TenantSource};
pub use tasks::{OperationKind, OperationTask, TaskHandle, TaskQueue, TaskState, TaskStatus, TaskStore};
