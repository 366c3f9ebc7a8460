//! Per-run state the runner and handlers share: the outbound message
//! buffer, the event buffer, per-executor snapshots, and the iteration
//! counters.
//!
//! Grounded on the original's `InProcRunnerContext` (`_runner_context.py`).
//! Kept as a trait, not a concrete type, for the same reason checkpoint
//! storage is a trait: it lets `Workflow::run_from_checkpoint` stage a
//! restore into a throwaway context before committing it to the live one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use workflow_checkpoint::{CheckpointMetadata, CheckpointStorage, CheckpointedMessage, WorkflowCheckpoint};

use crate::error::{Result, WorkflowError};
use crate::events::WorkflowEvent;
use crate::message::{Message, Payload};

/// The subset of a [`WorkflowCheckpoint`] relevant to resuming a run,
/// decoupled from the storage crate's exact payload shape so the runner can
/// build and consume it without round-tripping through `serde_json::Value`
/// for the fields it actually needs typed.
#[derive(Debug, Clone, Default)]
pub struct CheckpointState {
    pub messages: HashMap<String, Vec<Message>>,
    pub shared_state: HashMap<String, Value>,
    pub executor_states: HashMap<String, Value>,
    pub iteration_count: u64,
    pub max_iterations: u64,
}

/// Abstraction over the mutable state a single workflow run needs, shared
/// between the runner loop and every [`crate::context::WorkflowContext`]
/// handed to a handler.
#[async_trait]
pub trait RunnerContext: Send + Sync {
    async fn send_message(&self, message: Message);
    /// Remove and return all buffered outbound messages, grouped by the
    /// executor id that emitted them.
    async fn drain_messages(&self) -> HashMap<String, Vec<Message>>;
    async fn has_messages(&self) -> bool;

    async fn add_event(&self, event: WorkflowEvent);
    async fn drain_events(&self) -> Vec<WorkflowEvent>;

    async fn set_state(&self, executor_id: &str, state: Value);
    async fn get_state(&self, executor_id: &str) -> Option<Value>;
    async fn all_states(&self) -> HashMap<String, Value>;

    fn has_checkpointing(&self) -> bool;
    fn set_workflow_id(&self, workflow_id: &str);

    /// Reset this context for a fresh `run`/`run_streaming` call: pending
    /// messages, events, per-executor state, the iteration counter, and the
    /// resumed-from-checkpoint flag are all cleared. Checkpoint storage
    /// itself is left intact. Shared state lives outside `RunnerContext`
    /// (see `SharedState`) and is cleared separately by the caller.
    async fn reset_for_new_run(&self);

    async fn create_checkpoint(&self, shared_state: HashMap<String, Value>, metadata: CheckpointMetadata) -> Result<String>;
    async fn restore_from_checkpoint(&self, checkpoint_id: &str) -> Result<CheckpointState>;

    async fn checkpoint_state(&self) -> CheckpointState;
    async fn load_checkpoint_state(&self, state: CheckpointState);

    fn iteration_count(&self) -> u64;
    fn set_iteration_count(&self, n: u64);
    fn max_iterations(&self) -> u64;
    fn set_max_iterations(&self, n: u64);
    fn mark_resumed(&self);
    fn is_resumed(&self) -> bool;
}

#[derive(Default)]
struct Inner {
    workflow_id: String,
    messages: HashMap<String, Vec<Message>>,
    events: Vec<WorkflowEvent>,
    executor_states: HashMap<String, Value>,
    iteration_count: u64,
    max_iterations: u64,
    resumed: bool,
}

/// In-process `RunnerContext`, the only implementation a [`crate::workflow::Workflow`]
/// builds today. Optionally backed by a [`CheckpointStorage`].
pub struct InProcRunnerContext {
    inner: RwLock<Inner>,
    checkpoint_storage: Option<Arc<dyn CheckpointStorage>>,
}

impl InProcRunnerContext {
    pub fn new(checkpoint_storage: Option<Arc<dyn CheckpointStorage>>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            checkpoint_storage,
        }
    }
}

#[async_trait]
impl RunnerContext for InProcRunnerContext {
    async fn send_message(&self, message: Message) {
        let mut inner = self.inner.write().await;
        inner.messages.entry(message.source_id.clone()).or_default().push(message);
    }

    async fn drain_messages(&self) -> HashMap<String, Vec<Message>> {
        std::mem::take(&mut self.inner.write().await.messages)
    }

    async fn has_messages(&self) -> bool {
        !self.inner.read().await.messages.is_empty()
    }

    async fn add_event(&self, event: WorkflowEvent) {
        self.inner.write().await.events.push(event);
    }

    async fn drain_events(&self) -> Vec<WorkflowEvent> {
        std::mem::take(&mut self.inner.write().await.events)
    }

    async fn set_state(&self, executor_id: &str, state: Value) {
        self.inner.write().await.executor_states.insert(executor_id.to_string(), state);
    }

    async fn get_state(&self, executor_id: &str) -> Option<Value> {
        self.inner.read().await.executor_states.get(executor_id).cloned()
    }

    async fn all_states(&self) -> HashMap<String, Value> {
        self.inner.read().await.executor_states.clone()
    }

    fn has_checkpointing(&self) -> bool {
        self.checkpoint_storage.is_some()
    }

    fn set_workflow_id(&self, workflow_id: &str) {
        if let Ok(mut inner) = self.inner.try_write() {
            inner.workflow_id = workflow_id.to_string();
        }
    }

    async fn reset_for_new_run(&self) {
        let mut inner = self.inner.write().await;
        inner.messages.clear();
        inner.events.clear();
        inner.executor_states.clear();
        inner.iteration_count = 0;
        inner.resumed = false;
    }

    async fn create_checkpoint(&self, shared_state: HashMap<String, Value>, metadata: CheckpointMetadata) -> Result<String> {
        let storage = self
            .checkpoint_storage
            .as_ref()
            .ok_or_else(|| WorkflowError::Checkpoint("no checkpoint storage configured".into()))?;

        let inner = self.inner.read().await;
        let messages = inner
            .messages
            .iter()
            .map(|(source, msgs)| {
                let checkpointed = msgs
                    .iter()
                    .map(|m| CheckpointedMessage {
                        data: serde_json::to_value(&m.payload).unwrap_or(Value::Null),
                        source_id: m.source_id.clone(),
                        target_id: m.target_id.clone(),
                    })
                    .collect();
                (source.clone(), checkpointed)
            })
            .collect();

        let checkpoint = WorkflowCheckpoint::new(
            inner.workflow_id.clone(),
            messages,
            shared_state,
            inner.executor_states.clone(),
            inner.iteration_count,
            inner.max_iterations,
            metadata,
        );
        drop(inner);

        storage.save_checkpoint(checkpoint).await.map_err(|e| WorkflowError::Checkpoint(e.to_string()))
    }

    async fn restore_from_checkpoint(&self, checkpoint_id: &str) -> Result<CheckpointState> {
        let storage = self
            .checkpoint_storage
            .as_ref()
            .ok_or_else(|| WorkflowError::Checkpoint("no checkpoint storage configured".into()))?;

        let checkpoint = storage
            .load_checkpoint(checkpoint_id)
            .await
            .map_err(|e| WorkflowError::Checkpoint(e.to_string()))?
            .ok_or_else(|| WorkflowError::Checkpoint(format!("checkpoint '{checkpoint_id}' not found")))?;

        checkpoint_to_state(checkpoint)
    }

    async fn checkpoint_state(&self) -> CheckpointState {
        let inner = self.inner.read().await;
        CheckpointState {
            messages: inner.messages.clone(),
            shared_state: HashMap::new(),
            executor_states: inner.executor_states.clone(),
            iteration_count: inner.iteration_count,
            max_iterations: inner.max_iterations,
        }
    }

    async fn load_checkpoint_state(&self, state: CheckpointState) {
        let mut inner = self.inner.write().await;
        inner.messages = state.messages;
        inner.executor_states = state.executor_states;
        inner.iteration_count = state.iteration_count;
        inner.max_iterations = state.max_iterations;
    }

    fn iteration_count(&self) -> u64 {
        self.inner.try_read().map(|i| i.iteration_count).unwrap_or(0)
    }

    fn set_iteration_count(&self, n: u64) {
        if let Ok(mut inner) = self.inner.try_write() {
            inner.iteration_count = n;
        }
    }

    fn max_iterations(&self) -> u64 {
        self.inner.try_read().map(|i| i.max_iterations).unwrap_or(0)
    }

    fn set_max_iterations(&self, n: u64) {
        if let Ok(mut inner) = self.inner.try_write() {
            inner.max_iterations = n;
        }
    }

    fn mark_resumed(&self) {
        if let Ok(mut inner) = self.inner.try_write() {
            inner.resumed = true;
        }
    }

    fn is_resumed(&self) -> bool {
        self.inner.try_read().map(|i| i.resumed).unwrap_or(false)
    }
}

fn checkpoint_to_state(checkpoint: WorkflowCheckpoint) -> Result<CheckpointState> {
    let mut messages: HashMap<String, Vec<Message>> = HashMap::new();
    for (source, checkpointed) in checkpoint.messages {
        let restored = checkpointed
            .into_iter()
            .map(|c| {
                let tag = c
                    .data
                    .get("type_tag")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let value = c.data.get("value").cloned().unwrap_or(Value::Null);
                Message {
                    payload: Payload::new(tag, value),
                    source_id: c.source_id,
                    target_id: c.target_id,
                    trace_contexts: Vec::new(),
                    source_span_ids: Vec::new(),
                }
            })
            .collect();
        messages.insert(source, restored);
    }

    Ok(CheckpointState {
        messages,
        shared_state: checkpoint.shared_state,
        executor_states: checkpoint.executor_states,
        iteration_count: checkpoint.iteration_count,
        max_iterations: checkpoint.max_iterations,
    })
}
