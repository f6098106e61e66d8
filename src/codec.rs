// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Codec
//!
//! Pluggable parse/serialize hooks for message payloads. The default codec is
//! JSON; a consumer or publisher can swap in any implementation of [`Codec`],
//! mirroring the `parse` option of the original API.

use crate::errors::AmqpError;
use serde_json::Value;

/// Decodes received payloads and encodes published ones.
pub trait Codec: Send + Sync {
    /// Content type stamped on published messages.
    fn content_type(&self) -> &str;

    /// Parses raw bytes into a structured value.
    fn decode(&self, raw: &[u8]) -> Result<Value, AmqpError>;

    /// Serializes a structured value into raw bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, AmqpError>;
}

/// The default JSON codec.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, AmqpError> {
        serde_json::from_slice(raw).map_err(|err| AmqpError::ParsePayloadError(err.to_string()))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(value).map_err(|err| AmqpError::SerializePayloadError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_valid_json() {
        let value = JsonCodec.decode(br#"{"name":"Sally"}"#).unwrap();

        assert_eq!(value, json!({"name": "Sally"}));
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        let err = JsonCodec.decode(b"dsadasd").unwrap_err();

        assert!(matches!(err, AmqpError::ParsePayloadError(_)));
    }

    #[test]
    fn encodes_round_trippable_bytes() {
        let bytes = JsonCodec.encode(&json!({"name": "Fred"})).unwrap();

        assert_eq!(JsonCodec.decode(&bytes).unwrap(), json!({"name": "Fred"}));
    }
}
