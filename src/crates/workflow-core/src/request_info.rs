//! The built-in human-in-the-loop suspension point.
//!
//! Grounded on the original's `RequestInfoExecutor` (`_executor.py` /
//! `_workflow.py`). Any executor can emit a [`RequestInfoMessage`] targeted
//! at the fixed id [`REQUEST_INFO_EXECUTOR_ID`]; this executor records the
//! request (keyed by a generated id), surfaces a `RequestInfo` event for the
//! caller to act on out of band, and waits. A response is delivered back not
//! by walking an edge — the workflow graph has no edge out of this executor
//! for that — but by [`Workflow::send_responses`] injecting a targeted
//! message at the original requester. This keeps "suspend for external
//! input" from being modeled as a graph cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::executor::Executor;
use crate::message::Payload;
use crate::types::PayloadType;

pub const REQUEST_INFO_EXECUTOR_ID: &str = "request_info";
pub const REQUEST_INFO_PAYLOAD_TAG: &str = "__request_info_message";

/// The payload wrapper an executor sends to request external input.
/// `request_type_tag` distinguishes different kinds of requests the same
/// workflow might raise, standing in for the original's subclass hierarchy
/// of request message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestInfoMessage {
    pub request_id: String,
    pub request_type_tag: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingRequest {
    source_id: String,
    request_type_tag: String,
    payload: Value,
}

/// The built-in request/response node plus a handle to resolve its pending
/// requests. There is exactly one of these per workflow, registered under
/// [`REQUEST_INFO_EXECUTOR_ID`].
#[derive(Clone)]
pub struct RequestInfoExecutor {
    executor: Executor,
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
}

impl RequestInfoExecutor {
    pub fn new() -> Self {
        let pending: Arc<Mutex<HashMap<String, PendingRequest>>> = Arc::new(Mutex::new(HashMap::new()));

        let pending_for_handler = pending.clone();
        let pending_for_snapshot = pending.clone();
        let pending_for_restore = pending.clone();

        let executor = Executor::builder(REQUEST_INFO_EXECUTOR_ID)
            .handler(
                PayloadType::concrete(REQUEST_INFO_PAYLOAD_TAG),
                vec![],
                move |value, ctx| {
                    let pending = pending_for_handler.clone();
                    async move {
                        let request: RequestInfoMessage = serde_json::from_value(value).map_err(|e| e.to_string())?;
                        let source_id = ctx.source_executor_id().unwrap_or_default().to_string();
                        let request_id = if request.request_id.is_empty() {
                            Uuid::new_v4().to_string()
                        } else {
                            request.request_id.clone()
                        };

                        pending.lock().unwrap().insert(
                            request_id.clone(),
                            PendingRequest {
                                source_id: source_id.clone(),
                                request_type_tag: request.request_type_tag.clone(),
                                payload: request.payload.clone(),
                            },
                        );

                        ctx.add_event(crate::events::WorkflowEvent::RequestInfo {
                            request_id,
                            source_id,
                            request_type_tag: request.request_type_tag,
                            payload: request.payload,
                        })
                        .await;

                        Ok(())
                    }
                },
            )
            .with_snapshot(
                move || serde_json::to_value(&*pending_for_snapshot.lock().unwrap()).unwrap_or(Value::Null),
                move |state| {
                    if let Ok(restored) = serde_json::from_value::<HashMap<String, PendingRequest>>(state) {
                        *pending_for_restore.lock().unwrap() = restored;
                    }
                },
            )
            .build();

        Self { executor, pending }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Resolve a pending request by id, returning the original requester's
    /// id and a targeted `Payload` to send back to it. Removes the request
    /// from the pending table; a second call with the same id is an
    /// `UnknownRequestId` error.
    pub fn resolve_response(&self, request_id: &str, response: Value) -> crate::error::Result<(String, Payload)> {
        let mut guard = self.pending.lock().unwrap();
        let entry = guard
            .remove(request_id)
            .ok_or_else(|| crate::error::WorkflowError::UnknownRequestId(request_id.to_string()))?;
        Ok((entry.source_id, Payload::new(format!("{}_response", entry.request_type_tag), response)))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl Default for RequestInfoExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkflowContext;
    use crate::runner_context::InProcRunnerContext;
    use crate::shared_state::SharedState;
    use serde_json::json;

    #[tokio::test]
    async fn records_pending_request_and_emits_event() {
        let request_info = RequestInfoExecutor::new();
        let runner_ctx = Arc::new(InProcRunnerContext::new(None));
        let ctx = WorkflowContext::new(
            REQUEST_INFO_EXECUTOR_ID,
            vec!["approver_gate".into()],
            SharedState::new(),
            runner_ctx.clone(),
            false,
        );

        let request = RequestInfoMessage {
            request_id: "".into(),
            request_type_tag: "Approval".into(),
            payload: json!({"amount": 42}),
        };
        let payload = Payload::from_serializable(REQUEST_INFO_PAYLOAD_TAG, &request).unwrap();
        request_info.executor().execute(payload, ctx).await.unwrap();

        let events = runner_ctx.drain_events().await;
        let request_info_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, crate::events::WorkflowEvent::RequestInfo { .. }))
            .collect();
        assert_eq!(request_info_events.len(), 1);
        match request_info_events[0] {
            crate::events::WorkflowEvent::RequestInfo { source_id, request_type_tag, .. } => {
                assert_eq!(source_id, "approver_gate");
                assert_eq!(request_type_tag, "Approval");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(request_info.pending_count(), 1);
    }

    #[tokio::test]
    async fn resolve_response_removes_pending_entry_and_targets_requester() {
        let request_info = RequestInfoExecutor::new();
        let runner_ctx = Arc::new(InProcRunnerContext::new(None));
        let ctx = WorkflowContext::new(
            REQUEST_INFO_EXECUTOR_ID,
            vec!["approver_gate".into()],
            SharedState::new(),
            runner_ctx.clone(),
            false,
        );

        let request = RequestInfoMessage {
            request_id: "req-1".into(),
            request_type_tag: "Approval".into(),
            payload: json!({"amount": 42}),
        };
        let payload = Payload::from_serializable(REQUEST_INFO_PAYLOAD_TAG, &request).unwrap();
        request_info.executor().execute(payload, ctx).await.unwrap();

        let (target, response_payload) = request_info.resolve_response("req-1", json!("approved")).unwrap();
        assert_eq!(target, "approver_gate");
        assert_eq!(response_payload.type_tag, "Approval_response");
        assert_eq!(request_info.pending_count(), 0);

        assert!(matches!(
            request_info.resolve_response("req-1", json!("again")),
            Err(crate::error::WorkflowError::UnknownRequestId(_))
        ));
    }
}
