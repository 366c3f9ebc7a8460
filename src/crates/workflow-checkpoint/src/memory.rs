//! In-memory [`CheckpointStorage`] for development, tests, and demos.
//!
//! Checkpoints are kept in a `RwLock<HashMap<String, WorkflowCheckpoint>>`
//! plus a secondary index from workflow id to the insertion-ordered list of
//! its checkpoint ids, so `list_checkpoints` can answer without a full scan.
//! Nothing here is persisted across process restarts; swap in a different
//! `CheckpointStorage` implementation for that.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::checkpoint::WorkflowCheckpoint;
use crate::error::Result;
use crate::traits::CheckpointStorage;

#[derive(Debug, Default)]
struct Inner {
    checkpoints: HashMap<String, WorkflowCheckpoint>,
    by_workflow: HashMap<String, Vec<String>>,
}

/// Reference `CheckpointStorage` implementation backed by an in-process map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStorage {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints currently held, across all workflows.
    pub async fn checkpoint_count(&self) -> usize {
        self.inner.read().await.checkpoints.len()
    }

    /// Remove every stored checkpoint. Useful for test isolation.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.checkpoints.clear();
        inner.by_workflow.clear();
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryCheckpointStorage {
    async fn save_checkpoint(&self, mut checkpoint: WorkflowCheckpoint) -> Result<String> {
        let id = if checkpoint.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            checkpoint.id.clone()
        };
        checkpoint.id = id.clone();

        let mut inner = self.inner.write().await;
        inner
            .by_workflow
            .entry(checkpoint.workflow_id.clone())
            .or_default()
            .push(id.clone());
        inner.checkpoints.insert(id.clone(), checkpoint);

        Ok(id)
    }

    async fn load_checkpoint(&self, checkpoint_id: &str) -> Result<Option<WorkflowCheckpoint>> {
        Ok(self.inner.read().await.checkpoints.get(checkpoint_id).cloned())
    }

    async fn list_checkpoints(&self, workflow_id: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .read()
            .await
            .by_workflow
            .get(workflow_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointMetadata;
    use std::collections::HashMap as Map;

    fn empty_checkpoint(workflow_id: &str) -> WorkflowCheckpoint {
        WorkflowCheckpoint::new(
            workflow_id,
            Map::new(),
            Map::new(),
            Map::new(),
            0,
            100,
            CheckpointMetadata::initial(),
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let storage = InMemoryCheckpointStorage::new();
        let id = storage.save_checkpoint(empty_checkpoint("wf-1")).await.unwrap();

        let loaded = storage.load_checkpoint(&id).await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().workflow_id, "wf-1");
    }

    #[tokio::test]
    async fn unknown_id_loads_none() {
        let storage = InMemoryCheckpointStorage::new();
        assert!(storage.load_checkpoint("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_checkpoints_preserves_insertion_order() {
        let storage = InMemoryCheckpointStorage::new();
        let a = storage.save_checkpoint(empty_checkpoint("wf-1")).await.unwrap();
        let b = storage.save_checkpoint(empty_checkpoint("wf-1")).await.unwrap();
        storage.save_checkpoint(empty_checkpoint("wf-2")).await.unwrap();

        let ids = storage.list_checkpoints("wf-1").await.unwrap();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn clear_empties_storage() {
        let storage = InMemoryCheckpointStorage::new();
        storage.save_checkpoint(empty_checkpoint("wf-1")).await.unwrap();
        assert_eq!(storage.checkpoint_count().await, 1);
        storage.clear().await;
        assert_eq!(storage.checkpoint_count().await, 0);
    }
}
