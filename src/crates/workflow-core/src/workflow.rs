//! The public facade: `WorkflowBuilder` assembles a graph, `Workflow` runs it.
//!
//! Grounded on the original's `Workflow`/`WorkflowBuilder` (`_workflow.py`).
//! `Workflow` owns a single long-lived `Runner`; every `run*` call resets
//! its transient buffers and drives it to quiescence rather than
//! constructing a new one, which is what makes `run_from_checkpoint`
//! possible without re-validating the graph.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;
use workflow_checkpoint::CheckpointStorage;

use crate::edge::{Case, Edge, EdgeGroup};
use crate::edge_runner::EdgeRunner;
use crate::error::{Result, ValidationError, WorkflowError};
use crate::events::{WorkflowEvent, WorkflowRunState};
use crate::executor::Executor;
use crate::message::{Message, Payload};
use crate::request_info::{RequestInfoExecutor, REQUEST_INFO_EXECUTOR_ID, REQUEST_INFO_PAYLOAD_TAG, RequestInfoMessage};
use crate::runner::Runner;
use crate::runner_context::{CheckpointState, InProcRunnerContext, RunnerContext};
use crate::shared_state::SharedState;
use crate::validator::GraphValidator;

/// Every event produced by a `run`/`run_from_checkpoint` call, in emission
/// order. Thin wrapper with the same convenience accessors as the
/// original's `WorkflowRunResult`.
#[derive(Debug, Clone)]
pub struct WorkflowRunResult {
    events: Vec<WorkflowEvent>,
}

impl WorkflowRunResult {
    pub fn new(events: Vec<WorkflowEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<WorkflowEvent> {
        self.events
    }

    /// The output carried by this run's `WorkflowCompleted` event, if any.
    pub fn completed_event(&self) -> Option<&WorkflowEvent> {
        self.events.iter().find(|e| matches!(e, WorkflowEvent::WorkflowCompleted { .. }))
    }

    /// Every `RequestInfo` event raised during this run, in emission order.
    pub fn request_info_events(&self) -> Vec<&WorkflowEvent> {
        self.events.iter().filter(|e| matches!(e, WorkflowEvent::RequestInfo { .. })).collect()
    }

    pub fn failed_event(&self) -> Option<&WorkflowEvent> {
        self.events.iter().find(|e| matches!(e, WorkflowEvent::WorkflowFailed { .. }))
    }
}

/// A validated, runnable workflow graph.
pub struct Workflow {
    workflow_id: String,
    start_executor: Arc<Executor>,
    request_info: Arc<RequestInfoExecutor>,
    shared_state: SharedState,
    runner_context: Arc<InProcRunnerContext>,
    runner: Runner,
}

/// Source id stamped on the one message each run injects by hand: the
/// initial input delivered to the start executor. Never matches a real
/// executor id, so it can never be mistaken for a message an executor
/// emitted.
const WORKFLOW_INPUT_SOURCE: &str = "__workflow_input";

impl Workflow {
    async fn drive_to_convergence(&self, streaming: bool) -> std::result::Result<Vec<WorkflowEvent>, WorkflowEvent> {
        self.runner.set_streaming(streaming);
        match self.runner.run_until_convergence().await {
            Ok(mut events) => {
                let has_pending = self.request_info.pending_count() > 0;
                if has_pending {
                    events.push(WorkflowEvent::WorkflowStatus { state: WorkflowRunState::IdleWithPendingRequests });
                } else {
                    events.push(WorkflowEvent::WorkflowStatus { state: WorkflowRunState::Completed });
                    events.push(WorkflowEvent::WorkflowCompleted { output: None });
                }
                Ok(events)
            }
            Err(err) => {
                let details = crate::error::WorkflowErrorDetails::new(
                    error_type_name(&err),
                    err.to_string(),
                    None,
                );
                Err(WorkflowEvent::WorkflowFailed { error: details })
            }
        }
    }

    async fn run_from(&self, start_payload: Payload, streaming: bool) -> WorkflowRunResult {
        self.runner.reset_for_new_run().await;
        let mut events = vec![
            WorkflowEvent::WorkflowStarted,
            WorkflowEvent::WorkflowStatus { state: WorkflowRunState::InProgress },
        ];

        // Targeted directly at the start executor rather than routed
        // through an edge group: the start executor has no upstream edge
        // of its own, so this is the one message every run injects by hand.
        self.runner
            .inject(Message::targeted(start_payload, WORKFLOW_INPUT_SOURCE, self.start_executor.id().to_string()))
            .await;

        match self.drive_to_convergence(streaming).await {
            Ok(mut produced) => events.append(&mut produced),
            Err(failed_event) => events.push(failed_event),
        }

        WorkflowRunResult::new(events)
    }

    pub async fn run(&self, input: Payload) -> WorkflowRunResult {
        self.run_from(input, false).await
    }

    pub async fn run_streaming(&self, input: Payload) -> WorkflowRunResult {
        self.run_from(input, true).await
    }

    async fn send_responses_from(&self, responses: HashMap<String, Value>, streaming: bool) -> WorkflowRunResult {
        let mut events = vec![WorkflowEvent::WorkflowStatus { state: WorkflowRunState::InProgress }];

        for (request_id, response) in responses {
            match self.request_info.resolve_response(&request_id, response) {
                Ok((target_id, payload)) => {
                    self.runner
                        .inject(Message::targeted(payload, REQUEST_INFO_EXECUTOR_ID, target_id))
                        .await;
                }
                Err(err) => {
                    warn!(request_id, error = %err, "send_responses: unknown or already-resolved request id");
                }
            }
        }

        match self.drive_to_convergence(streaming).await {
            Ok(mut produced) => events.append(&mut produced),
            Err(failed_event) => events.push(failed_event),
        }

        WorkflowRunResult::new(events)
    }

    pub async fn send_responses(&self, responses: HashMap<String, Value>) -> WorkflowRunResult {
        self.send_responses_from(responses, false).await
    }

    pub async fn send_responses_streaming(&self, responses: HashMap<String, Value>) -> WorkflowRunResult {
        self.send_responses_from(responses, true).await
    }

    async fn run_from_checkpoint_impl(
        &self,
        checkpoint_id: &str,
        responses: Option<HashMap<String, Value>>,
        streaming: bool,
    ) -> Result<WorkflowRunResult> {
        let state = self.runner_context.restore_from_checkpoint(checkpoint_id).await?;
        self.transfer_restored_state(state).await;
        self.runner_context.mark_resumed();

        let mut events = vec![
            WorkflowEvent::WorkflowStarted,
            WorkflowEvent::WorkflowStatus { state: WorkflowRunState::InProgress },
        ];

        if let Some(responses) = responses {
            for (request_id, response) in responses {
                if let Ok((target_id, payload)) = self.request_info.resolve_response(&request_id, response) {
                    self.runner
                        .inject(Message::targeted(payload, REQUEST_INFO_EXECUTOR_ID, target_id))
                        .await;
                }
            }
        }

        match self.drive_to_convergence(streaming).await {
            Ok(mut produced) => events.append(&mut produced),
            Err(failed_event) => events.push(failed_event),
        }

        Ok(WorkflowRunResult::new(events))
    }

    /// Transfer a restored checkpoint's state into this workflow's live
    /// context: shared state under a `hold()`, per-executor states, and
    /// pending messages re-injected as targeted sends. Works whether the
    /// checkpoint was saved by this workflow's own storage (native restore)
    /// or a different one entirely (foreign restore) — both paths funnel
    /// through the same `CheckpointState` value.
    async fn transfer_restored_state(&self, state: CheckpointState) {
        {
            let mut guard = self.shared_state.hold().await.expect("no handler runs during restore");
            guard.replace_all(state.shared_state);
        }

        for (executor_id, executor_state) in state.executor_states {
            if executor_id == REQUEST_INFO_EXECUTOR_ID {
                self.request_info.executor().restore_state(executor_state.clone());
            }
            self.runner_context.set_state(&executor_id, executor_state).await;
        }

        for (source_id, messages) in state.messages {
            for m in messages {
                let message = Message {
                    payload: m.payload,
                    source_id: source_id.clone(),
                    target_id: m.target_id,
                    trace_contexts: m.trace_contexts,
                    source_span_ids: m.source_span_ids,
                };
                self.runner.inject(message).await;
            }
        }

        self.runner_context.set_iteration_count(state.iteration_count);
        self.runner_context.set_max_iterations(state.max_iterations);
    }

    pub async fn run_from_checkpoint(&self, checkpoint_id: &str) -> Result<WorkflowRunResult> {
        self.run_from_checkpoint_impl(checkpoint_id, None, false).await
    }

    pub async fn run_streaming_from_checkpoint(&self, checkpoint_id: &str) -> Result<WorkflowRunResult> {
        self.run_from_checkpoint_impl(checkpoint_id, None, true).await
    }

    pub async fn run_from_checkpoint_with_responses(
        &self,
        checkpoint_id: &str,
        responses: HashMap<String, Value>,
    ) -> Result<WorkflowRunResult> {
        self.run_from_checkpoint_impl(checkpoint_id, Some(responses), false).await
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn start_executor_id(&self) -> &str {
        self.start_executor.id()
    }

    /// State most recently persisted by the named executor via
    /// `WorkflowContext::set_state`, if any. Useful for inspecting the
    /// effect of a run without routing the answer back through a message.
    pub async fn executor_state(&self, executor_id: &str) -> Option<Value> {
        self.runner_context.get_state(executor_id).await
    }
}

fn error_type_name(err: &WorkflowError) -> &'static str {
    match err {
        WorkflowError::Validation(_) => "ValidationError",
        WorkflowError::Dispatch { .. } => "DispatchError",
        WorkflowError::Handler(_) => "HandlerError",
        WorkflowError::Convergence { .. } => "NO_CONVERGENCE",
        WorkflowError::Selection { .. } => "SelectionError",
        WorkflowError::Checkpoint(_) => "CheckpointError",
        WorkflowError::UnknownRequestId(_) => "UnknownRequestId",
        WorkflowError::NestedHold => "NestedHold",
        WorkflowError::UnknownExecutor(_) => "UnknownExecutor",
        WorkflowError::AlreadyRunning => "AlreadyRunning",
    }
}

/// Builds a [`Workflow`] from an edge topology, validating it before
/// construction.
pub struct WorkflowBuilder {
    workflow_id: Option<String>,
    start_executor: Option<Arc<Executor>>,
    executors: HashMap<String, Arc<Executor>>,
    edge_groups: Vec<EdgeGroup>,
    max_iterations: u64,
    checkpoint_storage: Option<Arc<dyn CheckpointStorage>>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            workflow_id: None,
            start_executor: None,
            executors: HashMap::new(),
            edge_groups: Vec::new(),
            max_iterations: 100,
            checkpoint_storage: None,
        }
    }

    pub fn with_workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn set_start_executor(mut self, executor: Arc<Executor>) -> Self {
        self.executors.insert(executor.id().to_string(), executor.clone());
        self.start_executor = Some(executor);
        self
    }

    fn register(&mut self, executor: &Arc<Executor>) {
        self.executors.entry(executor.id().to_string()).or_insert_with(|| executor.clone());
    }

    pub fn add_edge(mut self, source: Arc<Executor>, target: Arc<Executor>) -> Self {
        self.register(&source);
        self.register(&target);
        self.edge_groups.push(EdgeGroup::Single(Edge::new(source, target)));
        self
    }

    pub fn add_edge_with_gate<F: Fn(&Value) -> bool + Send + Sync + 'static>(
        mut self,
        source: Arc<Executor>,
        target: Arc<Executor>,
        gate: F,
    ) -> Self {
        self.register(&source);
        self.register(&target);
        self.edge_groups.push(EdgeGroup::Single(Edge::new(source, target).with_gate(gate)));
        self
    }

    pub fn add_fan_out_edges(mut self, source: Arc<Executor>, targets: Vec<Arc<Executor>>) -> Self {
        self.register(&source);
        for t in &targets {
            self.register(t);
        }
        self.edge_groups.push(EdgeGroup::FanOut { source, targets, selector: None });
        self
    }

    pub fn add_fan_out_edges_with_selector<F: Fn(&Value) -> Vec<String> + Send + Sync + 'static>(
        mut self,
        source: Arc<Executor>,
        targets: Vec<Arc<Executor>>,
        selector: F,
    ) -> Self {
        self.register(&source);
        for t in &targets {
            self.register(t);
        }
        self.edge_groups.push(EdgeGroup::FanOut { source, targets, selector: Some(Arc::new(selector)) });
        self
    }

    pub fn add_switch_case_edges(mut self, source: Arc<Executor>, cases: Vec<Case>) -> Self {
        self.register(&source);
        for c in &cases {
            self.register(&c.target);
        }
        self.edge_groups.push(EdgeGroup::SwitchCase { source, cases });
        self
    }

    pub fn add_fan_in_edges(mut self, sources: Vec<Arc<Executor>>, target: Arc<Executor>) -> Self {
        for s in &sources {
            self.register(s);
        }
        self.register(&target);
        self.edge_groups.push(EdgeGroup::FanIn { sources, target });
        self
    }

    /// Convenience for a straight-line sequence of single edges.
    pub fn add_chain(mut self, executors: Vec<Arc<Executor>>) -> Self {
        for pair in executors.windows(2) {
            self.register(&pair[0]);
            self.register(&pair[1]);
            self.edge_groups.push(EdgeGroup::Single(Edge::new(pair[0].clone(), pair[1].clone())));
        }
        self
    }

    pub fn set_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_checkpointing(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.checkpoint_storage = Some(storage);
        self
    }

    pub fn build(self) -> Result<Workflow> {
        let start_executor = self.start_executor.ok_or(ValidationError::MissingStartExecutor)?;
        let all_executor_ids: Vec<String> = self.executors.keys().cloned().collect();

        GraphValidator::new(&self.edge_groups, start_executor.id(), &all_executor_ids).validate()?;

        let edge_runners: Vec<EdgeRunner> = self.edge_groups.into_iter().map(EdgeRunner::new).collect();

        let workflow_id = self.workflow_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let shared_state = SharedState::new();
        let runner_context = Arc::new(InProcRunnerContext::new(self.checkpoint_storage));
        runner_context.set_workflow_id(&workflow_id);
        runner_context.set_max_iterations(self.max_iterations);
        let request_info = Arc::new(RequestInfoExecutor::new());

        let runner = Runner::new(
            self.executors,
            request_info.clone(),
            edge_runners,
            shared_state.clone(),
            runner_context.clone() as Arc<dyn RunnerContext>,
        );

        Ok(Workflow {
            workflow_id,
            start_executor,
            request_info,
            shared_state,
            runner_context,
            runner,
        })
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a `RequestInfoMessage` payload ready for `WorkflowContext::send_message`,
/// addressed to the built-in request/response executor.
pub fn request_info_payload(request_type_tag: impl Into<String>, payload: Value) -> Payload {
    let message = RequestInfoMessage {
        request_id: String::new(),
        request_type_tag: request_type_tag.into(),
        payload,
    };
    Payload::from_serializable(REQUEST_INFO_PAYLOAD_TAG, &message).expect("RequestInfoMessage always serializes")
}
