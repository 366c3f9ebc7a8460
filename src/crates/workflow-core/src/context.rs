//! The context object passed into every executor handler invocation.
//!
//! Grounded on the original's `WorkflowContext` (`_workflow_context.py`):
//! handlers never touch the runner or the edge topology directly, only this
//! facade over message sending, event emission, shared state, and per-
//! executor persisted state.

use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::events::WorkflowEvent;
use crate::message::{Message, Payload};
use crate::runner_context::RunnerContext;
use crate::shared_state::SharedState;

/// Messages and events a handler has emitted during its own invocation, held
/// here rather than forwarded straight to the [`RunnerContext`]. `spec.md`
/// §9's resolved open question requires that a handler which ultimately
/// returns an error have everything it emitted discarded rather than
/// delivered; staging first is what makes that rollback possible.
#[derive(Default)]
struct Staged {
    messages: Vec<Message>,
    events: Vec<WorkflowEvent>,
}

/// Handed to an executor's handler on every invocation.
#[derive(Clone)]
pub struct WorkflowContext {
    executor_id: String,
    source_executor_ids: Vec<String>,
    shared_state: SharedState,
    runner_context: Arc<dyn RunnerContext>,
    is_streaming: bool,
    staged: Arc<Mutex<Staged>>,
}

impl WorkflowContext {
    pub fn new(
        executor_id: impl Into<String>,
        source_executor_ids: Vec<String>,
        shared_state: SharedState,
        runner_context: Arc<dyn RunnerContext>,
        is_streaming: bool,
    ) -> Self {
        Self {
            executor_id: executor_id.into(),
            source_executor_ids,
            shared_state,
            runner_context,
            is_streaming,
            staged: Arc::new(Mutex::new(Staged::default())),
        }
    }

    /// Direct access to the underlying runner context, bypassing staging.
    /// Used only by [`crate::executor::Executor`] to record the
    /// engine-owned `ExecutorInvoke`/`ExecutorCompleted`/`ExecutorFailed`
    /// events, which are never subject to handler-failure rollback.
    pub(crate) fn runner_context(&self) -> &Arc<dyn RunnerContext> {
        &self.runner_context
    }

    /// Commit every message and event staged during this invocation to the
    /// runner context, in emission order. Called by `Executor::execute`
    /// only once the handler has returned `Ok(())`.
    pub(crate) async fn commit_staged(&self) {
        let Staged { messages, events } = std::mem::take(&mut *self.staged.lock().unwrap());
        for message in messages {
            self.runner_context.send_message(message).await;
        }
        for event in events {
            self.runner_context.add_event(event).await;
        }
    }

    /// Discard everything staged during this invocation. Called by
    /// `Executor::execute` when the handler returns `Err`.
    pub(crate) fn discard_staged(&self) {
        *self.staged.lock().unwrap() = Staged::default();
    }

    /// The executor this invocation is running on behalf of.
    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    /// Ids of the executors whose messages triggered this invocation, in the
    /// order declared by the edge group (fan-in preserves declared-source
    /// order, not arrival order).
    pub fn source_executor_ids(&self) -> &[String] {
        &self.source_executor_ids
    }

    /// Convenience accessor when exactly one source triggered this
    /// invocation (the common case outside fan-in joins).
    pub fn source_executor_id(&self) -> Option<&str> {
        self.source_executor_ids.first().map(String::as_str)
    }

    /// Whether this run is being driven through the streaming entry points.
    /// Read-only: a handler cannot switch a run between streaming and
    /// non-streaming mid-flight (`SPEC_FULL.md` §9).
    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    /// Emit a message from this executor, either targeted at a specific
    /// executor or left for the outgoing edge group to route. Staged until
    /// the handler returns; discarded entirely if it returns an error.
    pub async fn send_message(&self, payload: Payload, target_id: Option<String>) {
        let message = match target_id {
            Some(target) => Message::targeted(payload, self.executor_id.clone(), target),
            None => Message::new(payload, self.executor_id.clone()),
        };
        self.staged.lock().unwrap().messages.push(message);
    }

    /// Record an event from this executor. Staged alongside emitted
    /// messages — see [`Self::send_message`].
    pub async fn add_event(&self, event: WorkflowEvent) {
        self.staged.lock().unwrap().events.push(event);
    }

    pub async fn get_state(&self) -> Option<Value> {
        self.runner_context.get_state(&self.executor_id).await
    }

    pub async fn set_state(&self, state: Value) {
        self.runner_context.set_state(&self.executor_id, state).await;
    }
}
