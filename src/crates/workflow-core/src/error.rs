//! Error taxonomy for the workflow engine.
//!
//! Each failure domain named in `spec.md` §7 gets its own variant so callers
//! can match on `WorkflowError` without string-sniffing. `ValidationError`
//! is kept separate because it is raised at build time, before a `Workflow`
//! exists, and carries its own sub-kinds.

use serde_json::Value;
use thiserror::Error;

use crate::types::PayloadType;

/// Structured error record surfaced via `ExecutorFailed`/`WorkflowFailed`,
/// mirroring the original's `WorkflowErrorDetails.from_exception`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct WorkflowErrorDetails {
    pub error_type: String,
    pub message: String,
    pub trace: Option<String>,
    pub executor_id: Option<String>,
    pub extra: Option<Value>,
}

impl WorkflowErrorDetails {
    pub fn from_error(error_type: impl Into<String>, err: &(dyn std::error::Error + 'static), executor_id: Option<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: err.to_string(),
            trace: None,
            executor_id,
            extra: None,
        }
    }

    pub fn new(error_type: impl Into<String>, message: impl Into<String>, executor_id: Option<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            trace: None,
            executor_id,
            extra: None,
        }
    }
}

/// Errors raised while assembling a workflow graph (`WorkflowBuilder::build`).
///
/// These are all fatal: a workflow that fails validation is never
/// constructed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("duplicate edge detected: {0}. each edge in the workflow must be unique")]
    EdgeDuplication(String),

    #[error(
        "type incompatibility between executors '{source_executor_id}' -> '{target_executor_id}': \
         source outputs {source_types:?} but target only accepts {target_types:?}"
    )]
    TypeCompatibility {
        source_executor_id: String,
        target_executor_id: String,
        source_types: Vec<PayloadType>,
        target_types: Vec<PayloadType>,
    },

    #[error("graph connectivity error: {0}")]
    GraphConnectivity(String),

    #[error("starting executor must be set before building the workflow")]
    MissingStartExecutor,

    #[error("switch-case edge group must declare exactly one default case, found {0}")]
    SwitchCaseDefaultCount(usize),
}

/// Runtime errors surfaced while a workflow is executing.
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("workflow validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("no handler on executor '{executor_id}' accepts payload '{payload_tag}'")]
    Dispatch { executor_id: String, payload_tag: String },

    #[error("executor '{}' handler failed: {}", .0.executor_id.as_deref().unwrap_or("?"), .0.message)]
    Handler(WorkflowErrorDetails),

    #[error("workflow did not converge after {max_iterations} iterations")]
    Convergence { max_iterations: u64 },

    #[error("fan-out selector on executor '{executor_id}' returned targets outside the declared set: {invalid_targets:?}")]
    Selection { executor_id: String, invalid_targets: Vec<String> },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("unknown request id: {0}")]
    UnknownRequestId(String),

    #[error("shared state hold is not reentrant: a hold is already active on this task")]
    NestedHold,

    #[error("executor with id '{0}' not found")]
    UnknownExecutor(String),

    #[error("a run is already in progress; workflows are re-runnable but not concurrently runnable")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
