//! The message envelope carried across edges between executors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque carrier for whatever data an executor emits.
///
/// `type_tag` is the closed dispatch key handlers register against (see
/// `spec.md` §9's redesign note); `value` is the JSON-serializable payload
/// itself, kept as a `serde_json::Value` so it survives a checkpoint
/// round-trip without the engine needing to know its Rust type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    pub type_tag: String,
    pub value: Value,
}

impl Payload {
    pub fn new(type_tag: impl Into<String>, value: Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            value,
        }
    }

    /// Build a payload from any `Serialize` type, tagging it with `type_tag`.
    pub fn from_serializable<T: Serialize>(type_tag: impl Into<String>, value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(type_tag, serde_json::to_value(value)?))
    }

    pub fn deserialize<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.value.clone())
    }
}

/// Opaque linkage to an external trace, carried but never interpreted by the
/// engine itself (see `SPEC_FULL.md` §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

/// One hop of data between executors: the payload plus routing metadata.
///
/// `source_id` is always the emitting executor's id; `target_id` is `None`
/// for a broadcast-style send (the edge group decides delivery) and
/// `Some(id)` for a targeted send (used for request/response injection and
/// checkpoint-restore replay).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub payload: Payload,
    pub source_id: String,
    pub target_id: Option<String>,
    #[serde(default)]
    pub trace_contexts: Vec<TraceContext>,
    #[serde(default)]
    pub source_span_ids: Vec<String>,
}

impl Message {
    pub fn new(payload: Payload, source_id: impl Into<String>) -> Self {
        Self {
            payload,
            source_id: source_id.into(),
            target_id: None,
            trace_contexts: Vec::new(),
            source_span_ids: Vec::new(),
        }
    }

    pub fn targeted(payload: Payload, source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            payload,
            source_id: source_id.into(),
            target_id: Some(target_id.into()),
            trace_contexts: Vec::new(),
            source_span_ids: Vec::new(),
        }
    }
}
