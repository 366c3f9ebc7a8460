//! The event stream a workflow run emits, and the run-state machine it drives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowErrorDetails;

/// One event produced during a workflow run, in emission order.
///
/// `#[non_exhaustive]` because `spec.md` §6 anticipates new event kinds
/// (e.g. richer agent-streaming updates) without that being a breaking
/// change for match arms that already have a wildcard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
#[non_exhaustive]
pub enum WorkflowEvent {
    WorkflowStarted,
    WorkflowStatus { state: WorkflowRunState },
    ExecutorInvoke { executor_id: String },
    ExecutorCompleted { executor_id: String },
    ExecutorFailed { executor_id: String, error: WorkflowErrorDetails },
    AgentRun { executor_id: String, response: Value },
    AgentRunUpdate { executor_id: String, update: Value },
    RequestInfo { request_id: String, source_id: String, request_type_tag: String, payload: Value },
    WorkflowCompleted { output: Option<Value> },
    WorkflowFailed { error: WorkflowErrorDetails },
    WorkflowWarning { message: String },
}

/// Lifecycle state of a workflow run, mirroring the original's
/// `WorkflowRunState` enum (`_events.py`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowRunState {
    /// The run has been dispatched to the start executor but no superstep
    /// has completed yet.
    Started,
    /// At least one superstep has run and more messages are pending.
    InProgress,
    /// A superstep is pending but the run also has outstanding
    /// `RequestInfo` requests awaiting a response.
    InProgressPendingRequests,
    /// No messages are pending and there are no outstanding requests; the
    /// run is quiescent but not necessarily finished (a response could
    /// still arrive later via `send_responses`).
    Idle,
    /// No messages are pending, but one or more `RequestInfo` requests are
    /// still outstanding.
    IdleWithPendingRequests,
    /// The run finished: no pending messages, no pending requests, and a
    /// `WorkflowCompleted` event was emitted.
    Completed,
    /// The run ended in an unrecoverable error.
    Failed,
    /// The run was cancelled by its caller.
    Cancelled,
}

impl WorkflowEvent {
    /// Whether this event marks the end of a run (success or failure).
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowEvent::WorkflowCompleted { .. } | WorkflowEvent::WorkflowFailed { .. })
    }
}
