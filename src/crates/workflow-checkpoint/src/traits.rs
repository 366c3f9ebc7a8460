//! The storage abstraction a [`WorkflowCheckpoint`] is saved to and loaded from.
//!
//! `spec.md` §6 treats checkpoint storage as an interface, not a durability
//! guarantee: callers are free to back it with memory, a file, or a remote
//! store, and the runner/workflow facade never assumes more than
//! `save_checkpoint`/`load_checkpoint` (plus the optional listing query).
//! Keeping this as a trait rather than a concrete type is what makes the
//! "foreign restore" path in the workflow crate possible — a checkpoint
//! saved by one storage handle can be loaded and transferred into a run
//! bound to a different one.

use async_trait::async_trait;

use crate::checkpoint::WorkflowCheckpoint;
use crate::error::Result;

/// Abstract checkpoint persistence backend.
///
/// Implementors only need to guarantee that a checkpoint saved with
/// `save_checkpoint` can later be retrieved with `load_checkpoint` given the
/// returned id. `list_checkpoints` is a convenience query used by tooling
/// and tests; it is not on the hot path of a resumed run.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Persist `checkpoint` and return the id it was stored under.
    async fn save_checkpoint(&self, checkpoint: WorkflowCheckpoint) -> Result<String>;

    /// Load a previously saved checkpoint by id, or `None` if it does not exist.
    async fn load_checkpoint(&self, checkpoint_id: &str) -> Result<Option<WorkflowCheckpoint>>;

    /// List checkpoint ids for a given workflow, oldest first. The default
    /// implementation reports that listing is unsupported; backends that
    /// can only do point lookups are not required to implement it.
    async fn list_checkpoints(&self, _workflow_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
