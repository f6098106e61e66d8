// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handler Surface
//!
//! The envelope handed to consumer handlers and the handler trait itself.
//!
//! A received payload is decoded before the handler runs, and the outcome is
//! carried explicitly: [`DecodeResult::Parsed`] holds the structured value,
//! [`DecodeResult::Malformed`] records the codec failure. A malformed payload
//! still reaches the handler (with no parsed value) and is then acknowledged,
//! so a poison message is never retried indefinitely.

use crate::errors::AmqpError;
use async_trait::async_trait;
use serde_json::Value;

/// Outcome of decoding a received payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    Parsed(Value),
    Malformed(String),
}

impl DecodeResult {
    /// The parsed value, when decoding succeeded.
    pub fn value(&self) -> Option<&Value> {
        match self {
            DecodeResult::Parsed(value) => Some(value),
            DecodeResult::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, DecodeResult::Malformed(_))
    }
}

/// One received message plus its delivery metadata and decoded payload.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Broker-assigned delivery tag.
    pub delivery_tag: u64,
    /// Whether the broker flagged the delivery as redelivered.
    pub redelivered: bool,
    /// Raw payload bytes.
    pub data: Vec<u8>,
    /// Payload as decoded by the consumer's codec.
    pub payload: DecodeResult,
}

/// Processes deliveries for one consumer registration.
///
/// Handler failures are reported through the returned error; the session layer
/// translates them into a negative acknowledgement or a failure-queue
/// republish, depending on the consumer's retry policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<(), AmqpError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parsed_payload_exposes_its_value() {
        let payload = DecodeResult::Parsed(json!({"name": "Sally"}));

        assert_eq!(payload.value(), Some(&json!({"name": "Sally"})));
        assert!(!payload.is_malformed());
    }

    #[test]
    fn malformed_payload_has_no_value() {
        let payload = DecodeResult::Malformed("expected value".to_owned());

        assert_eq!(payload.value(), None);
        assert!(payload.is_malformed());
    }
}
