//! Durable task store.

use super::task::OperationTask;
use crate::error::EngineError;

const TREE_NAME: &str = "portavault_tasks";

/// Sled-backed persistence for task records.
///
/// Every task mutation is mirrored here so tasks survive process restarts.
#[derive(Clone)]
pub struct TaskStore {
    tree: sled::Tree,
}

impl TaskStore {
    /// Open the task tree within a sled database.
    pub fn open(db: &sled::Db) -> Result<Self, EngineError> {
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { tree })
    }

    /// Save a task record.
    pub fn save(&self, task: &OperationTask) -> Result<(), EngineError> {
        let value = serde_json::to_vec(task)?;
        self.tree.insert(task.id.as_bytes(), value)?;
        Ok(())
    }

    /// Delete a task record.
    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        self.tree.remove(id.as_bytes())?;
        Ok(())
    }

    /// Load all persisted task records.
    pub fn load_all(&self) -> Result<Vec<OperationTask>, EngineError> {
        let mut tasks = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item?;
            tasks.push(serde_json::from_slice(&value)?);
        }
        Ok(tasks)
    }
}
