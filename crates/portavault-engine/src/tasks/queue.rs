//! Lock-guarded active-task queue.

use super::store::TaskStore;
use super::task::{OperationKind, OperationTask, TaskHandle};
use crate::error::EngineError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type SlotKey = (String, OperationKind);

/// Result of a start request against the queue.
#[derive(Debug)]
pub struct StartOutcome {
    /// The live task occupying the tenant+kind slot.
    pub handle: Arc<TaskHandle>,
    /// `true` when an already-live task was returned instead of a new one.
    pub existing: bool,
}

/// The active-task registry.
///
/// All mutations happen while holding the queue lock, acquired with a
/// bounded timeout; a timeout is a transient error, not a failed operation.
/// The registry is explicitly owned: it is constructed once, passed into
/// the coordinator, and drained on teardown.
pub struct TaskQueue {
    name: String,
    lock_timeout: Duration,
    slots: Mutex<HashMap<SlotKey, Arc<TaskHandle>>>,
    store: TaskStore,
}

impl TaskQueue {
    /// Open the queue, recovering persisted tasks.
    ///
    /// Tasks that were live when the previous process died cannot resume
    /// execution; they are marked failed so the next start request creates
    /// a fresh one.
    pub fn open(
        name: impl Into<String>,
        lock_timeout: Duration,
        store: TaskStore,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        let mut slots = HashMap::new();

        for task in store.load_all()? {
            let was_live = task.is_live();
            let handle = TaskHandle::new(task, store.clone());
            if was_live {
                tracing::warn!(
                    queue = %name,
                    task = %handle.id(),
                    tenant = %handle.tenant(),
                    "task interrupted by worker restart"
                );
                handle.fail("interrupted by worker restart")?;
            }
            slots.insert(
                (handle.tenant().to_string(), handle.kind()),
                handle,
            );
        }

        Ok(Self {
            name,
            lock_timeout,
            slots: Mutex::new(slots),
            store,
        })
    }

    async fn locked<R>(
        &self,
        f: impl FnOnce(&mut HashMap<SlotKey, Arc<TaskHandle>>) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        match tokio::time::timeout(self.lock_timeout, self.slots.lock()).await {
            Ok(mut slots) => f(&mut slots),
            Err(_) => Err(EngineError::LockTimeout {
                queue: self.name.clone(),
                timeout: self.lock_timeout,
            }),
        }
    }

    /// Accept a start request: return the existing live task for the slot
    /// (idempotent start), or evict a terminal one and create a fresh task.
    ///
    /// Fails fast when the tenant is running an operation of a different
    /// kind, or when this instance is at the given concurrency ceiling.
    pub async fn enqueue(
        &self,
        tenant: &str,
        kind: OperationKind,
        ceiling: usize,
    ) -> Result<StartOutcome, EngineError> {
        let store = self.store.clone();
        self.locked(move |slots| {
            for ((slot_tenant, slot_kind), handle) in slots.iter() {
                if slot_tenant == tenant && *slot_kind != kind && handle.is_live() {
                    return Err(EngineError::IncompatibleOperation {
                        tenant: tenant.to_string(),
                        running: slot_kind.to_string(),
                    });
                }
            }

            let key = (tenant.to_string(), kind);
            if let Some(handle) = slots.get(&key) {
                if handle.is_live() {
                    return Ok(StartOutcome {
                        handle: Arc::clone(handle),
                        existing: true,
                    });
                }
                // Terminal task: evict and supersede.
                store.delete(handle.id())?;
                slots.remove(&key);
            }

            let live = slots.values().filter(|h| h.is_live()).count();
            if live >= ceiling {
                return Err(EngineError::Saturated { live, ceiling });
            }

            let task = OperationTask::new(tenant, kind);
            store.save(&task)?;
            let handle = TaskHandle::new(task, store);
            tracing::info!(
                queue = %self.name,
                task = %handle.id(),
                tenant = %tenant,
                kind = %kind,
                "task created"
            );
            slots.insert(key, Arc::clone(&handle));
            Ok(StartOutcome {
                handle,
                existing: false,
            })
        })
        .await
    }

    /// Look up the task occupying a slot.
    pub async fn get(
        &self,
        tenant: &str,
        kind: OperationKind,
    ) -> Result<Option<Arc<TaskHandle>>, EngineError> {
        self.locked(|slots| Ok(slots.get(&(tenant.to_string(), kind)).map(Arc::clone)))
            .await
    }

    /// Remove a task from the active set, cancelling it if still live.
    pub async fn dequeue(&self, tenant: &str, kind: OperationKind) -> Result<bool, EngineError> {
        let store = self.store.clone();
        self.locked(move |slots| {
            match slots.remove(&(tenant.to_string(), kind)) {
                Some(handle) => {
                    handle.cancel();
                    store.delete(handle.id())?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    /// Live tasks bound to this instance.
    pub async fn live_count(&self) -> Result<usize, EngineError> {
        self.locked(|slots| Ok(slots.values().filter(|h| h.is_live()).count()))
            .await
    }

    /// Teardown: cancel every live task. Records stay in the durable store
    /// and are recovered as failed on the next open.
    pub async fn drain(&self) -> Result<(), EngineError> {
        self.locked(|slots| {
            for handle in slots.values() {
                if handle.is_live() {
                    handle.cancel();
                }
            }
            slots.clear();
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> (TaskQueue, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = TaskStore::open(&db).unwrap();
        let queue = TaskQueue::open("test", Duration::from_secs(1), store).unwrap();
        (queue, dir)
    }

    #[tokio::test]
    async fn test_idempotent_start() {
        let (queue, _dir) = queue();
        let first = queue.enqueue("t1", OperationKind::Backup, 4).await.unwrap();
        assert!(!first.existing);

        let second = queue.enqueue("t1", OperationKind::Backup, 4).await.unwrap();
        assert!(second.existing);
        assert_eq!(first.handle.id(), second.handle.id());
        assert_eq!(queue.live_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_starts_share_one_task() {
        let (queue, _dir) = queue();
        let (first, second) = tokio::join!(
            queue.enqueue("t1", OperationKind::Backup, 4),
            queue.enqueue("t1", OperationKind::Backup, 4)
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.handle.id(), second.handle.id());
        // Exactly one of the two requests created the task.
        assert_ne!(first.existing, second.existing);
        assert_eq!(queue.live_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_completed_task_superseded() {
        let (queue, _dir) = queue();
        let first = queue.enqueue("t1", OperationKind::Backup, 4).await.unwrap();
        first.handle.complete(None, None).unwrap();

        let second = queue.enqueue("t1", OperationKind::Backup, 4).await.unwrap();
        assert!(!second.existing);
        assert_ne!(first.handle.id(), second.handle.id());
    }

    #[tokio::test]
    async fn test_incompatible_kind_rejected() {
        let (queue, _dir) = queue();
        queue.enqueue("t1", OperationKind::Backup, 4).await.unwrap();

        let err = queue
            .enqueue("t1", OperationKind::Restore, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleOperation { .. }));
    }

    #[tokio::test]
    async fn test_saturation() {
        let (queue, _dir) = queue();
        queue.enqueue("t1", OperationKind::Backup, 2).await.unwrap();
        queue.enqueue("t2", OperationKind::Backup, 2).await.unwrap();

        let err = queue
            .enqueue("t3", OperationKind::Backup, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Saturated { live: 2, ceiling: 2 }));

        // Different tenants run independently below the ceiling.
        assert_eq!(queue.live_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dequeue_cancels() {
        let (queue, _dir) = queue();
        let outcome = queue.enqueue("t1", OperationKind::Backup, 4).await.unwrap();

        assert!(queue.dequeue("t1", OperationKind::Backup).await.unwrap());
        assert!(outcome.handle.is_cancelled());
        assert!(queue.get("t1", OperationKind::Backup).await.unwrap().is_none());
        assert!(!queue.dequeue("t1", OperationKind::Backup).await.unwrap());
    }

    #[tokio::test]
    async fn test_restart_recovery_marks_live_tasks_failed() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();

        {
            let store = TaskStore::open(&db).unwrap();
            let queue = TaskQueue::open("test", Duration::from_secs(1), store).unwrap();
            let outcome = queue.enqueue("t1", OperationKind::Backup, 4).await.unwrap();
            outcome.handle.set_running().unwrap();
            // Process "dies" here without completing the task.
        }

        let store = TaskStore::open(&db).unwrap();
        let queue = TaskQueue::open("test", Duration::from_secs(1), store).unwrap();
        let handle = queue
            .get("t1", OperationKind::Backup)
            .await
            .unwrap()
            .expect("task must be recovered");
        assert!(!handle.is_live());
        assert!(handle.status().error.unwrap().contains("restart"));
    }
}
