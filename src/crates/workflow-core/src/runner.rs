//! The superstep loop: drain, dispatch, collect, checkpoint, repeat.
//!
//! Grounded on the original's `Runner.run_until_convergence` (`_runner.py`).
//! Unlike the teacher's Pregel engine, there is only one logical scheduler:
//! iteration `N+1` never starts while any handler from iteration `N` is
//! still in flight, and within an iteration every dispatch fires
//! concurrently via `futures::future::join_all` (`spec.md` §5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument};
use workflow_checkpoint::CheckpointMetadata;

use crate::context::WorkflowContext;
use crate::edge_runner::EdgeRunner;
use crate::error::{Result, WorkflowError};
use crate::events::WorkflowEvent;
use crate::executor::Executor;
use crate::message::Message;
use crate::request_info::{RequestInfoExecutor, REQUEST_INFO_EXECUTOR_ID};
use crate::runner_context::RunnerContext;
use crate::shared_state::SharedState;

/// Runs a workflow's edge topology to quiescence, one superstep per
/// iteration.
pub struct Runner {
    executors: HashMap<String, Arc<Executor>>,
    request_info: Arc<RequestInfoExecutor>,
    edge_runners: Vec<EdgeRunner>,
    shared_state: SharedState,
    runner_context: Arc<dyn RunnerContext>,
    is_streaming: AtomicBool,
}

impl Runner {
    pub fn new(
        executors: HashMap<String, Arc<Executor>>,
        request_info: Arc<RequestInfoExecutor>,
        edge_runners: Vec<EdgeRunner>,
        shared_state: SharedState,
        runner_context: Arc<dyn RunnerContext>,
    ) -> Self {
        Self {
            executors,
            request_info,
            edge_runners,
            shared_state,
            runner_context,
            is_streaming: AtomicBool::new(false),
        }
    }

    /// Marks whether the run currently in progress was started through a
    /// streaming entry point; read by `WorkflowContext::is_streaming`.
    pub fn set_streaming(&self, streaming: bool) {
        self.is_streaming.store(streaming, Ordering::SeqCst);
    }

    fn resolve_executor(&self, id: &str) -> Option<Arc<Executor>> {
        if id == REQUEST_INFO_EXECUTOR_ID {
            Some(Arc::new(self.request_info.executor().clone()))
        } else {
            self.executors.get(id).cloned()
        }
    }

    /// Drive the graph from whatever messages are currently buffered in the
    /// runner context until no more messages are produced (or `max_iterations`
    /// is exceeded), collecting every event produced along the way.
    /// Checkpointing, if configured, happens after each superstep.
    #[instrument(skip(self))]
    pub async fn run_until_convergence(&self) -> Result<Vec<WorkflowEvent>> {
        let mut all_events = self.runner_context.drain_events().await;
        while let Some(events) = self.step().await? {
            all_events.extend(events);
        }
        Ok(all_events)
    }

    /// Run exactly one superstep. Returns `None` (without advancing the
    /// iteration counter) if there is nothing buffered to deliver, i.e. the
    /// run has converged. Used directly by [`crate::workflow::Workflow`]'s
    /// streaming entry points so events can be surfaced superstep by
    /// superstep rather than only once the whole run finishes.
    #[instrument(skip(self))]
    pub async fn step(&self) -> Result<Option<Vec<WorkflowEvent>>> {
        if !self.runner_context.has_messages().await {
            return Ok(None);
        }

        let iteration = self.runner_context.iteration_count() + 1;
        let max_iterations = self.runner_context.max_iterations();
        if max_iterations > 0 && iteration > max_iterations {
            return Err(WorkflowError::Convergence { max_iterations });
        }
        self.runner_context.set_iteration_count(iteration);

        let drained = self.runner_context.drain_messages().await;
        debug!(iteration, sources = drained.len(), "running superstep");

        // Split into topology-routed messages (no explicit target;
        // handled by the edge groups) and targeted ones (request/response
        // injection, foreign checkpoint restore replay), which bypass
        // edge routing entirely and go straight to their named executor.
        let mut routed: HashMap<String, Vec<Message>> = HashMap::new();
        let mut targeted = Vec::new();
        for (source, msgs) in drained {
            for m in msgs {
                if m.target_id.is_some() {
                    targeted.push(m);
                } else {
                    routed.entry(source.clone()).or_default().push(m);
                }
            }
        }

        let mut dispatch_plan = Vec::new();
        let mut claimed_by_source: HashMap<String, usize> = HashMap::new();
        for edge_runner in &self.edge_runners {
            let outcome = edge_runner.route(&routed)?;
            for (source, count) in outcome.claimed {
                let entry = claimed_by_source.entry(source).or_insert(0);
                *entry = (*entry).max(count);
            }
            dispatch_plan.extend(outcome.dispatches);
        }

        // A message whose source has no outgoing edge group at all, or
        // that every group claiming its source rejected (failed every
        // gate/selector/case), is undeliverable rather than silently
        // dropped (spec.md §4.3/§4.4).
        for (source, msgs) in &routed {
            let claimed = claimed_by_source.get(source).copied().unwrap_or(0);
            if claimed < msgs.len() {
                let dropped = msgs.len() - claimed;
                self.runner_context
                    .add_event(WorkflowEvent::WorkflowWarning {
                        message: format!(
                            "{dropped} message(s) from executor '{source}' were not delivered: no edge group claimed them"
                        ),
                    })
                    .await;
            }
        }

        for m in targeted {
            let target_id = m.target_id.as_deref().expect("filtered to Some above");
            if let Some(target) = self.resolve_executor(target_id) {
                dispatch_plan.push(crate::edge_runner::Dispatch {
                    target,
                    payload: m.payload,
                    source_ids: vec![m.source_id],
                });
            }
        }

        let invocations = dispatch_plan.into_iter().map(|dispatch| {
            let ctx = WorkflowContext::new(
                dispatch.target.id().to_string(),
                dispatch.source_ids,
                self.shared_state.clone(),
                self.runner_context.clone(),
                self.is_streaming.load(Ordering::SeqCst),
            );
            async move { dispatch.target.execute(dispatch.payload, ctx).await }
        });

        let results = join_all(invocations).await;
        for result in results {
            result?;
            }

        let events = self.runner_context.drain_events().await;

        if self.runner_context.has_checkpointing() {
            // The checkpoint taken right after the initial dispatch (the
            // first superstep of a fresh, non-resumed run) is distinguished
            // from ordinary superstep checkpoints, mirroring the original's
            // `checkpoint_category` split. A run resumed from a checkpoint
            // never re-takes an initial checkpoint even if its first
            // superstep back happens to land on iteration 1.
            let metadata = if iteration == 1 && !self.runner_context.is_resumed() {
                CheckpointMetadata::initial()
            } else {
                CheckpointMetadata::superstep(iteration)
            };
            let shared_snapshot = self.shared_state.snapshot().await;
            self.runner_context.create_checkpoint(shared_snapshot, metadata).await?;
        }

        Ok(Some(events))
    }

    /// Inject a single targeted message directly into the message buffer,
    /// bypassing the edge topology. Used both for starting a run (dispatch
    /// to the start executor) and for request/response injection.
    pub async fn inject(&self, message: Message) {
        self.runner_context.send_message(message).await;
    }

    /// Reset per-run state so a fresh `run`/`run_streaming` call never sees
    /// another run's leftovers: pending messages, events, shared state,
    /// per-executor state, the iteration counter, and any incomplete
    /// fan-in joins. Checkpoint storage itself is left alone.
    pub async fn reset_for_new_run(&self) {
        self.runner_context.reset_for_new_run().await;
        self.shared_state.replace_all(HashMap::new()).await;
        for edge_runner in &self.edge_runners {
            edge_runner.reset();
        }
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    pub fn runner_context(&self) -> &Arc<dyn RunnerContext> {
        &self.runner_context
    }
}
