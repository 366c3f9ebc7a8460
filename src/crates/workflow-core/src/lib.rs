//! # workflow-core — a message-passing graph engine for multi-agent pipelines
//!
//! A workflow is a graph of [`Executor`]s connected by [`Edge`]s, grouped
//! into [`EdgeGroup`]s that describe how messages move between supersteps:
//! a straight pipe (`Single`), a broadcast or selector-driven spray
//! (`FanOut`), an ordered conditional (`SwitchCase`), or a synchronized join
//! (`FanIn`). A [`Runner`] drives the graph in rounds — drain the buffered
//! messages, dispatch every resulting handler invocation concurrently,
//! collect their output, checkpoint if configured, repeat — until no
//! messages remain. [`Workflow`] is the façade most callers actually touch:
//! build one with [`WorkflowBuilder`], then call `run`/`run_streaming` to
//! drive it, or `send_responses` to answer a suspended `RequestInfo`.
//!
//! ## Core concepts
//!
//! 1. **Executors** (`executor.rs`) are bags of handlers keyed by a closed
//!    payload type tag, built with [`ExecutorBuilder`] rather than
//!    discovered through reflection.
//! 2. **Messages** (`message.rs`) carry an opaque, JSON-serializable
//!    [`Payload`] plus routing metadata; they never need to know their own
//!    Rust type once emitted.
//! 3. **Edges and edge groups** (`edge.rs`, `edge_runner.rs`) are the static
//!    topology and its per-superstep delivery semantics, respectively.
//! 4. **Shared state** (`shared_state.rs`) is a mutual-exclusion region
//!    visible to every executor in a run, with a `hold()` guard for atomic
//!    multi-key updates.
//! 5. **Checkpoints** (`workflow_checkpoint`, used via [`RunnerContext`])
//!    snapshot pending messages, shared state, and per-executor state after
//!    any superstep, and can be resumed against a different storage handle
//!    than the one that saved them.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use workflow_core::{Executor, Payload, PayloadType, WorkflowBuilder};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let uppercase = Arc::new(
//!     Executor::builder("uppercase")
//!         .handler(PayloadType::concrete("Text"), vec![PayloadType::concrete("Text")], |value, ctx| async move {
//!             let text = value.as_str().unwrap_or_default().to_uppercase();
//!             ctx.send_message(Payload::new("Text", json!(text)), None).await;
//!             Ok(())
//!         })
//!         .build(),
//! );
//!
//! let workflow = WorkflowBuilder::new()
//!     .set_start_executor(uppercase)
//!     .build()
//!     .unwrap();
//!
//! let result = workflow.run(Payload::new("Text", json!("hello"))).await;
//! assert!(result.completed_event().is_some());
//! # }
//! ```
//!
//! ## Request/response suspension
//!
//! An executor that needs external input sends a
//! [`workflow::request_info_payload`] targeted at the built-in
//! `request_info` executor. The run goes idle with a `RequestInfo` event
//! outstanding; the caller answers it with [`Workflow::send_responses`],
//! keyed by the request id from that event, which injects the response
//! straight back at the original requester — never as a graph edge.
//!
//! ## Checkpointing and resume
//!
//! Configure `with_checkpointing(storage)` on the builder, then call
//! [`Workflow::run_from_checkpoint`] with a checkpoint id obtained from
//! that storage (directly, or via `workflow_checkpoint::CheckpointStorage::list_checkpoints`).
//! Restoring transfers shared state, per-executor state, and pending
//! messages into the live run, whether or not the storage handle used to
//! resume is the same one that saved the checkpoint.

pub mod codec;
pub mod context;
pub mod edge;
pub mod edge_runner;
pub mod error;
pub mod events;
pub mod executor;
pub mod message;
pub mod request_info;
pub mod runner;
pub mod runner_context;
pub mod shared_state;
pub mod types;
pub mod validator;
pub mod visualization;
pub mod workflow;

pub use codec::{BincodeCodec, Codec, CodecError, JsonCodec};
pub use context::WorkflowContext;
pub use edge::{Case, Edge, EdgeGroup};
pub use edge_runner::{Dispatch, EdgeRunner, RouteOutcome};
pub use error::{Result, ValidationError, WorkflowError, WorkflowErrorDetails};
pub use events::{WorkflowEvent, WorkflowRunState};
pub use executor::{Executor, ExecutorBuilder};
pub use message::{Message, Payload, TraceContext};
pub use request_info::{RequestInfoExecutor, RequestInfoMessage, REQUEST_INFO_EXECUTOR_ID};
pub use runner::Runner;
pub use runner_context::{CheckpointState, InProcRunnerContext, RunnerContext};
pub use shared_state::{SharedState, SharedStateGuard};
pub use types::{assignable, PayloadType};
pub use validator::GraphValidator;
pub use visualization::WorkflowViz;
pub use workflow::{request_info_payload, Workflow, WorkflowBuilder, WorkflowRunResult};

pub use workflow_checkpoint::{CheckpointMetadata, CheckpointStorage, CheckpointType, InMemoryCheckpointStorage, WorkflowCheckpoint};
