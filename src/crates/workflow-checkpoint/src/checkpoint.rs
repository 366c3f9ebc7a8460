//! The checkpoint payload: everything needed to resume a workflow run.
//!
//! A [`WorkflowCheckpoint`] is a snapshot of pending messages, shared state,
//! per-executor state, and the iteration counters, taken after a superstep
//! (or right after the initial message delivery). It has no notion of
//! channels or versions — unlike a Pregel checkpoint, it only needs to
//! reproduce the inputs to the next superstep.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One buffered, not-yet-delivered message, in the shape the checkpoint
/// payload carries it (see `spec.md` §6's JSON layout).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointedMessage {
    pub data: Value,
    pub source_id: String,
    pub target_id: Option<String>,
}

/// Distinguishes the checkpoint taken right after the initial message
/// delivery from the ones taken after each subsequent superstep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    Initial,
    Superstep,
}

/// User- and runner-visible metadata attached to a checkpoint.
///
/// The runner always sets `checkpoint_type` and, for superstep checkpoints,
/// `superstep`; callers may stash additional ordering/filtering keys in
/// `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMetadata {
    pub superstep: Option<u64>,
    pub checkpoint_type: Option<CheckpointType>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn initial() -> Self {
        Self {
            superstep: None,
            checkpoint_type: Some(CheckpointType::Initial),
            extra: HashMap::new(),
        }
    }

    pub fn superstep(n: u64) -> Self {
        Self {
            superstep: Some(n),
            checkpoint_type: Some(CheckpointType::Superstep),
            extra: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A full snapshot of a workflow run, as described in `spec.md` §3 and §6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowCheckpoint {
    /// Opaque id of this checkpoint, assigned by the storage backend at save time.
    pub id: String,
    pub workflow_id: String,
    pub created_at: DateTime<Utc>,
    /// Outbound messages, keyed by the executor id that emitted them.
    pub messages: HashMap<String, Vec<CheckpointedMessage>>,
    pub shared_state: HashMap<String, Value>,
    pub executor_states: HashMap<String, Value>,
    pub iteration_count: u64,
    pub max_iterations: u64,
    pub metadata: CheckpointMetadata,
}

impl WorkflowCheckpoint {
    /// Build a checkpoint for `workflow_id` with the given state; `id` is
    /// left blank for the storage backend's `save_checkpoint` to assign.
    pub fn new(
        workflow_id: impl Into<String>,
        messages: HashMap<String, Vec<CheckpointedMessage>>,
        shared_state: HashMap<String, Value>,
        executor_states: HashMap<String, Value>,
        iteration_count: u64,
        max_iterations: u64,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            id: String::new(),
            workflow_id: workflow_id.into(),
            created_at: Utc::now(),
            messages,
            shared_state,
            executor_states,
            iteration_count,
            max_iterations,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_builders_set_expected_tags() {
        let initial = CheckpointMetadata::initial();
        assert_eq!(initial.checkpoint_type, Some(CheckpointType::Initial));
        assert_eq!(initial.superstep, None);

        let step = CheckpointMetadata::superstep(3);
        assert_eq!(step.checkpoint_type, Some(CheckpointType::Superstep));
        assert_eq!(step.superstep, Some(3));
    }
}
