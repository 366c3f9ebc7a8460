//! Checkpoint storage for the workflow engine.
//!
//! A workflow run can be snapshotted after any superstep: pending messages,
//! shared state, per-executor state, and the iteration counters are bundled
//! into a [`WorkflowCheckpoint`] and handed to a [`CheckpointStorage`]
//! backend. Resuming later — possibly from a *different* storage handle
//! than the one that saved it — reproduces the run from that point on.
//!
//! This crate is deliberately small: it only knows about the checkpoint
//! payload shape and the storage trait. The runner and workflow facade that
//! decide *when* to checkpoint and how to fold a restored snapshot back into
//! a live run live in the workflow engine crate.
//!
//! ```
//! use workflow_checkpoint::{CheckpointStorage, InMemoryCheckpointStorage, WorkflowCheckpoint, CheckpointMetadata};
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let storage = InMemoryCheckpointStorage::new();
//! let checkpoint = WorkflowCheckpoint::new(
//!     "wf-1",
//!     HashMap::new(),
//!     HashMap::new(),
//!     HashMap::new(),
//!     1,
//!     100,
//!     CheckpointMetadata::superstep(1),
//! );
//! let id = storage.save_checkpoint(checkpoint).await.unwrap();
//! assert!(storage.load_checkpoint(&id).await.unwrap().is_some());
//! # }
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod traits;

pub use checkpoint::{CheckpointMetadata, CheckpointType, CheckpointedMessage, WorkflowCheckpoint};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStorage;
pub use traits::CheckpointStorage;
