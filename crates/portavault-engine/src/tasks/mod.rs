//! Operation task tracking.
//!
//! Long-running operations are tracked as tasks: created when a start
//! request is accepted, mutated by the executing worker, queryable until
//! dequeued or superseded. The active set lives in a lock-guarded queue and
//! every mutation is mirrored to a durable sled store so tasks survive
//! process restarts.

mod queue;
mod store;
mod task;

pub use queue::{StartOutcome, TaskQueue};
pub use store::TaskStore;
pub use task::{OperationKind, OperationTask, TaskHandle, TaskState, TaskStatus};
