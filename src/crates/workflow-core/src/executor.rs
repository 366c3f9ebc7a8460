//! Executors: the nodes of a workflow graph.
//!
//! The original models an executor as a base class with `@handler`-decorated
//! methods discovered via reflection. `spec.md` §9's redesign note replaces
//! that with a closed registration table built at construction time: an
//! `Executor` is a bag of `(accepted type, optional structural matcher,
//! handler closure)` triples, assembled through [`ExecutorBuilder`]. Runtime
//! state a handler needs across invocations lives in an `Arc<Mutex<_>>`
//! captured by its closures, not in fields on `Executor` itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::context::WorkflowContext;
use crate::error::{Result, WorkflowError, WorkflowErrorDetails};
use crate::events::WorkflowEvent;
use crate::message::Payload;
use crate::shared_state::with_reentrancy_guard;
use crate::types::PayloadType;

type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<(), String>> + Send>>;
type HandlerFn = Arc<dyn Fn(Value, WorkflowContext) -> HandlerFuture + Send + Sync>;
type MatcherFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type SnapshotFn = Arc<dyn Fn() -> Value + Send + Sync>;
type RestoreFn = Arc<dyn Fn(Value) + Send + Sync>;

struct HandlerSpec {
    accepts: PayloadType,
    matcher: Option<MatcherFn>,
    emits: Vec<PayloadType>,
    func: HandlerFn,
}

/// A node in the workflow graph: an id plus a closed table of handlers.
#[derive(Clone)]
pub struct Executor {
    id: String,
    handlers: Arc<Vec<HandlerSpec>>,
    snapshot_fn: Option<SnapshotFn>,
    restore_fn: Option<RestoreFn>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Executor {
    pub fn builder(id: impl Into<String>) -> ExecutorBuilder {
        ExecutorBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// All payload types this executor declares a handler for (exact tags
    /// only; matcher-only handlers are not representable as a finite type
    /// and are reported as `Any` to the validator).
    pub fn accepted_types(&self) -> Vec<PayloadType> {
        self.handlers.iter().map(|h| h.accepts.clone()).collect()
    }

    pub fn emitted_types(&self) -> Vec<PayloadType> {
        self.handlers.iter().flat_map(|h| h.emits.clone()).collect()
    }

    /// Whether any registered handler accepts this tag, by exact match or
    /// structural matcher.
    pub fn can_handle(&self, payload: &Payload) -> bool {
        self.find_handler(payload).is_some()
    }

    fn find_handler(&self, payload: &Payload) -> Option<&HandlerSpec> {
        self.handlers
            .iter()
            .find(|h| matches!(&h.accepts, PayloadType::Concrete(tag) if tag == &payload.type_tag))
            .or_else(|| self.handlers.iter().find(|h| h.matcher.as_ref().is_some_and(|m| m(&payload.value))))
    }

    /// Dispatch `payload` to the first matching handler, emitting
    /// `ExecutorInvoke` before and `ExecutorCompleted`/`ExecutorFailed`
    /// after. Wrapped in the shared-state reentrancy scope so a nested
    /// `hold()` inside the handler is caught rather than deadlocking.
    #[instrument(skip(self, payload, ctx), fields(executor_id = %self.id))]
    pub async fn execute(&self, payload: Payload, ctx: WorkflowContext) -> Result<()> {
        let handler = self
            .find_handler(&payload)
            .ok_or_else(|| WorkflowError::Dispatch {
                executor_id: self.id.clone(),
                payload_tag: payload.type_tag.clone(),
            })?
            .func
            .clone();

        ctx.runner_context().add_event(WorkflowEvent::ExecutorInvoke { executor_id: self.id.clone() }).await;

        let value = payload.value;
        let ctx_for_handler = ctx.clone();
        let result = with_reentrancy_guard(|| handler(value, ctx_for_handler)).await;

        match result {
            Ok(()) => {
                ctx.commit_staged().await;
                ctx.runner_context().add_event(WorkflowEvent::ExecutorCompleted { executor_id: self.id.clone() }).await;
                Ok(())
            }
            Err(message) => {
                ctx.discard_staged();
                let details = WorkflowErrorDetails::new("HandlerError", message, Some(self.id.clone()));
                ctx.runner_context()
                    .add_event(WorkflowEvent::ExecutorFailed {
                        executor_id: self.id.clone(),
                        error: details.clone(),
                    })
                    .await;
                Err(WorkflowError::Handler(details))
            }
        }
    }

    pub fn snapshot_state(&self) -> Option<Value> {
        self.snapshot_fn.as_ref().map(|f| f())
    }

    pub fn restore_state(&self, state: Value) {
        if let Some(f) = &self.restore_fn {
            f(state);
        }
    }
}

/// Builds an [`Executor`] by registering one or more handlers.
pub struct ExecutorBuilder {
    id: String,
    handlers: Vec<HandlerSpec>,
    snapshot_fn: Option<SnapshotFn>,
    restore_fn: Option<RestoreFn>,
}

impl ExecutorBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handlers: Vec::new(),
            snapshot_fn: None,
            restore_fn: None,
        }
    }

    /// Register a handler for an exact payload tag. `accepts` should
    /// ordinarily be `PayloadType::Concrete(tag)` matching the tag the
    /// handler is keyed on.
    pub fn handler<F, Fut>(mut self, accepts: PayloadType, emits: Vec<PayloadType>, f: F) -> Self
    where
        F: Fn(Value, WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), String>> + Send + 'static,
    {
        self.handlers.push(HandlerSpec {
            accepts,
            matcher: None,
            emits,
            func: Arc::new(move |v, ctx| Box::pin(f(v, ctx))),
        });
        self
    }

    /// Register a handler behind a structural matcher (list/set/tuple/map
    /// shapes the closed tag table can't express exactly), mirroring the
    /// original's `is_instance_of` fallback.
    pub fn matcher_handler<M, F, Fut>(mut self, accepts: PayloadType, matcher: M, emits: Vec<PayloadType>, f: F) -> Self
    where
        M: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn(Value, WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), String>> + Send + 'static,
    {
        self.handlers.push(HandlerSpec {
            accepts,
            matcher: Some(Arc::new(matcher)),
            emits,
            func: Arc::new(move |v, ctx| Box::pin(f(v, ctx))),
        });
        self
    }

    /// Attach snapshot/restore hooks for checkpointing, backed by closures
    /// that close over the executor's own `Arc<Mutex<_>>` state.
    pub fn with_snapshot<S, R>(mut self, snapshot: S, restore: R) -> Self
    where
        S: Fn() -> Value + Send + Sync + 'static,
        R: Fn(Value) + Send + Sync + 'static,
    {
        self.snapshot_fn = Some(Arc::new(snapshot));
        self.restore_fn = Some(Arc::new(restore));
        self
    }

    pub fn build(self) -> Executor {
        warn_duplicate_handlers(&self.id, &self.handlers);
        Executor {
            id: self.id,
            handlers: Arc::new(self.handlers),
            snapshot_fn: self.snapshot_fn,
            restore_fn: self.restore_fn,
        }
    }
}

/// Two handlers keyed on the same exact tag means the first one registered
/// always wins and the second is dead code; this only catches exact-tag
/// collisions, since matcher handlers can't be compared for overlap.
fn warn_duplicate_handlers(executor_id: &str, handlers: &[HandlerSpec]) {
    let mut seen = std::collections::HashSet::new();
    for h in handlers {
        if let PayloadType::Concrete(tag) = &h.accepts {
            if !seen.insert(tag.clone()) {
                tracing::warn!(executor_id, tag, "duplicate handler registered for the same payload tag; only the first will ever run");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner_context::InProcRunnerContext;
    use crate::shared_state::SharedState;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn test_ctx(executor_id: &str) -> (WorkflowContext, Arc<InProcRunnerContext>) {
        let runner_ctx = Arc::new(InProcRunnerContext::new(None));
        let ctx = WorkflowContext::new(executor_id, vec!["upstream".into()], SharedState::new(), runner_ctx.clone(), false);
        (ctx, runner_ctx)
    }

    #[tokio::test]
    async fn dispatches_to_matching_handler_by_exact_tag() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let executor = Executor::builder("echo")
            .handler(PayloadType::concrete("Ping"), vec![], move |_v, _ctx| {
                let ran = ran_clone.clone();
                async move {
                    ran.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build();

        let (ctx, _rc) = test_ctx("echo");
        let payload = Payload::new("Ping", json!({}));
        executor.execute(payload, ctx).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unmatched_tag_is_a_dispatch_error() {
        let executor = Executor::builder("echo")
            .handler(PayloadType::concrete("Ping"), vec![], |_v, _ctx| async { Ok(()) })
            .build();

        let (ctx, _rc) = test_ctx("echo");
        let payload = Payload::new("Other", json!({}));
        let result = executor.execute(payload, ctx).await;
        assert!(matches!(result, Err(WorkflowError::Dispatch { .. })));
    }

    #[tokio::test]
    async fn handler_error_becomes_handler_error_variant() {
        let executor = Executor::builder("bad")
            .handler(PayloadType::concrete("Ping"), vec![], |_v, _ctx| async { Err("boom".to_string()) })
            .build();

        let (ctx, _rc) = test_ctx("bad");
        let payload = Payload::new("Ping", json!({}));
        let result = executor.execute(payload, ctx).await;
        match result {
            Err(WorkflowError::Handler(details)) => assert_eq!(details.message, "boom"),
            other => panic!("expected Handler error, got {other:?}"),
        }
    }
}
