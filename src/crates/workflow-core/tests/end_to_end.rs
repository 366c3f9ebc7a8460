//! End-to-end scenarios exercising the public `Workflow`/`WorkflowBuilder` facade.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use workflow_checkpoint::InMemoryCheckpointStorage;
use workflow_core::{
    request_info_payload, Case, Executor, Payload, PayloadType, WorkflowBuilder, WorkflowEvent, WorkflowRunState,
};

fn text_executor(id: &str, transform: impl Fn(String) -> String + Send + Sync + 'static) -> Arc<Executor> {
    Arc::new(
        Executor::builder(id)
            .handler(PayloadType::concrete("Text"), vec![PayloadType::concrete("Text")], move |value, ctx| {
                let out = transform(value.as_str().unwrap_or_default().to_string());
                async move {
                    ctx.send_message(Payload::new("Text", json!(out)), None).await;
                    Ok(())
                }
            })
            .build(),
    )
}

#[tokio::test]
async fn linear_chain_appends_each_executors_letter() {
    let a = text_executor("a", |s| format!("{s} B"));
    let b = text_executor("b", |s| format!("{s} C"));
    let sink = Arc::new(Executor::builder("sink").handler(PayloadType::concrete("Text"), vec![], |_v, _ctx| async { Ok(()) }).build());

    let workflow = WorkflowBuilder::new()
        .set_start_executor(a.clone())
        .add_chain(vec![a, b, sink])
        .build()
        .unwrap();

    let result = workflow.run(Payload::new("Text", json!("hello"))).await;
    assert!(result.completed_event().is_some());
    assert!(result.failed_event().is_none());
}

#[tokio::test]
async fn fan_out_fan_in_sums_both_branches() {
    let source = Arc::new(
        Executor::builder("source")
            .handler(PayloadType::concrete("Number"), vec![PayloadType::concrete("Number")], |value, ctx| async move {
                ctx.send_message(Payload::new("Number", value), None).await;
                Ok(())
            })
            .build(),
    );
    let double = Arc::new(
        Executor::builder("double")
            .handler(PayloadType::concrete("Number"), vec![PayloadType::concrete("Number")], |value, ctx| async move {
                let n = value.as_i64().unwrap_or(0);
                ctx.send_message(Payload::new("Number", json!(n * 2)), None).await;
                Ok(())
            })
            .build(),
    );
    let triple = Arc::new(
        Executor::builder("triple")
            .handler(PayloadType::concrete("Number"), vec![PayloadType::concrete("Number")], |value, ctx| async move {
                let n = value.as_i64().unwrap_or(0);
                ctx.send_message(Payload::new("Number", json!(n * 3)), None).await;
                Ok(())
            })
            .build(),
    );
    let join = Arc::new(
        Executor::builder("join")
            .matcher_handler(
                PayloadType::list_of(PayloadType::Any),
                |v| v.is_array(),
                vec![],
                |value, ctx| async move {
                    let sum: i64 = value.as_array().unwrap().iter().filter_map(|v| v.as_i64()).sum();
                    ctx.set_state(json!(sum)).await;
                    Ok(())
                },
            )
            .build(),
    );

    let workflow = WorkflowBuilder::new()
        .set_start_executor(source.clone())
        .add_fan_out_edges(source, vec![double.clone(), triple.clone()])
        .add_fan_in_edges(vec![double, triple], join.clone())
        .build()
        .unwrap();

    let result = workflow.run(Payload::new("Number", json!(9))).await;
    assert!(result.completed_event().is_some(), "{:?}", result.events());
}

#[tokio::test]
async fn switch_case_routes_by_sign() {
    let classify = Arc::new(
        Executor::builder("classify")
            .handler(PayloadType::concrete("Number"), vec![PayloadType::concrete("Number")], |value, ctx| async move {
                ctx.send_message(Payload::new("Number", value), None).await;
                Ok(())
            })
            .build(),
    );
    let make_label = |label: &'static str| {
        Arc::new(
            Executor::builder(label)
                .handler(PayloadType::concrete("Number"), vec![], move |_v, ctx| async move {
                    ctx.set_state(json!(label)).await;
                    Ok(())
                })
                .build(),
        )
    };
    let negative = make_label("N");
    let zero = make_label("Z");
    let positive = make_label("P");

    let cases = vec![
        Case::when(negative.clone(), |v| v.as_i64().unwrap_or(0) < 0),
        Case::when(zero.clone(), |v| v.as_i64().unwrap_or(1) == 0),
        Case::default(positive.clone()),
    ];

    let workflow = WorkflowBuilder::new()
        .set_start_executor(classify.clone())
        .add_switch_case_edges(classify, cases)
        .build()
        .unwrap();

    for (input, expected) in [(-5, "N"), (0, "Z"), (5, "P")] {
        let result = workflow.run(Payload::new("Number", json!(input))).await;
        assert!(result.completed_event().is_some());
        for label in ["N", "Z", "P"] {
            let state = workflow.executor_state(label).await;
            if label == expected {
                assert_eq!(state, Some(json!(label)), "expected '{label}' to have run for input {input}");
            } else {
                assert_eq!(state, None, "'{label}' should not have run for input {input}");
            }
        }
    }
}

#[tokio::test]
async fn request_response_suspends_and_resumes_with_an_answer() {
    let gate = Arc::new(
        Executor::builder("approver_gate")
            .handler(PayloadType::concrete("Request"), vec![], |value, ctx| async move {
                ctx.send_message(request_info_payload("Approval", value), Some("request_info".to_string())).await;
                Ok(())
            })
            .handler(PayloadType::concrete("Approval_response"), vec![], |value, ctx| async move {
                ctx.set_state(value).await;
                Ok(())
            })
            .build(),
    );

    let workflow = WorkflowBuilder::new().set_start_executor(gate.clone()).build().unwrap();

    let result = workflow.run(Payload::new("Request", json!({"amount": 100}))).await;
    let pending = result.request_info_events();
    assert_eq!(pending.len(), 1);
    let request_id = match pending[0] {
        WorkflowEvent::RequestInfo { request_id, .. } => request_id.clone(),
        other => panic!("expected RequestInfo, got {other:?}"),
    };
    assert!(result
        .events()
        .iter()
        .any(|e| matches!(e, WorkflowEvent::WorkflowStatus { state: WorkflowRunState::IdleWithPendingRequests })));

    let mut responses = HashMap::new();
    responses.insert(request_id, json!("approved"));
    let resumed = workflow.send_responses(responses).await;
    assert!(resumed.completed_event().is_some());
}

#[tokio::test]
async fn checkpoint_resume_replays_pending_state() {
    let storage = Arc::new(InMemoryCheckpointStorage::new());
    let a = text_executor("a", |s| format!("{s} B"));
    let b = text_executor("b", |s| format!("{s} C"));

    let workflow = WorkflowBuilder::new()
        .set_start_executor(a.clone())
        .add_chain(vec![a, b])
        .with_checkpointing(storage.clone())
        .build()
        .unwrap();

    let result = workflow.run(Payload::new("Text", json!("hello"))).await;
    assert!(result.completed_event().is_some());

    let checkpoint_ids = storage.list_checkpoints(workflow.workflow_id()).await.unwrap();
    assert!(!checkpoint_ids.is_empty());

    let resumed = workflow.run_from_checkpoint(checkpoint_ids.last().unwrap()).await.unwrap();
    assert!(resumed.events().iter().any(|e| matches!(e, WorkflowEvent::WorkflowStarted)));
    assert!(resumed.completed_event().is_some(), "{:?}", resumed.events());
}

#[tokio::test]
async fn non_convergent_loop_reports_no_convergence() {
    let bouncer = Arc::new(
        Executor::builder("bouncer")
            .handler(PayloadType::concrete("Text"), vec![PayloadType::concrete("Text")], |value, ctx| async move {
                ctx.send_message(Payload::new("Text", value), None).await;
                Ok(())
            })
            .build(),
    );

    let workflow = WorkflowBuilder::new()
        .set_start_executor(bouncer.clone())
        .add_edge(bouncer.clone(), bouncer.clone())
        .set_max_iterations(3)
        .build()
        .unwrap();

    let result = workflow.run(Payload::new("Text", json!("bounce"))).await;
    match result.failed_event() {
        Some(WorkflowEvent::WorkflowFailed { error }) => assert_eq!(error.error_type, "NO_CONVERGENCE"),
        other => panic!("expected WorkflowFailed, got {other:?}"),
    }
}
