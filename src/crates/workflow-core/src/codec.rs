//! Encoding boundary between in-memory payloads and bytes.
//!
//! Checkpoint storage and any future wire transport only ever see encoded
//! bytes; the engine itself only ever sees `serde_json::Value`. Swapping
//! `JsonCodec` for a binary codec changes nothing about dispatch or
//! validation, only how a [`crate::message::Payload`] is serialized at rest.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary codec error: {0}")]
    Binary(#[from] bincode::Error),
}

pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// Default codec: plain UTF-8 JSON. Used by the in-memory checkpoint
/// backend and anywhere a human-readable checkpoint or log line matters
/// more than size.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary codec for storage backends where checkpoint size matters
/// more than readability.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec;
        let value = json!({"a": 1, "b": [1, 2, 3]});
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn bincode_codec_round_trips() {
        let codec = BincodeCodec;
        let value = json!({"a": 1, "b": "text"});
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }
}
