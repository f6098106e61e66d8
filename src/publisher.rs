// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publishing
//!
//! Confirm-channel publishing: every publish resolves only after the broker
//! acknowledges receipt, and a broker nack surfaces as an error. Payloads are
//! either raw bytes, passed through untouched, or structured values encoded by
//! the configured codec. Messages are persistent unless overridden, and their
//! properties carry the codec content type, a generated message id, the
//! caller's headers and the current trace context.

use crate::{
    codec::{Codec, JsonCodec},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    otel,
    queue::QueueDefinition,
};
use lapin::{
    options::BasicPublishOptions,
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel,
};
use serde::Serialize;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tracing::error;

/// Per-message publish options.
#[derive(Debug, Clone)]
pub struct MessageOptions {
    pub(crate) persistent: bool,
    pub(crate) headers: BTreeMap<ShortString, AMQPValue>,
}

impl Default for MessageOptions {
    fn default() -> Self {
        MessageOptions {
            persistent: true,
            headers: BTreeMap::default(),
        }
    }
}

impl MessageOptions {
    /// Marks the message non-persistent.
    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }

    /// Adds a message header, used by header-match exchange kinds.
    pub fn header(mut self, key: &str, value: AMQPValue) -> Self {
        self.headers.insert(ShortString::from(key), value);
        self
    }
}

/// A payload to publish: raw bytes or a value for the codec.
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Vec<u8>),
    Value(Value),
}

impl Payload {
    /// Builds a payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Payload, AmqpError> {
        serde_json::to_value(value)
            .map(Payload::Value)
            .map_err(|err| AmqpError::SerializePayloadError(err.to_string()))
    }

    pub(crate) fn into_bytes(self, codec: &dyn Codec) -> Result<Vec<u8>, AmqpError> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Value(value) => codec.encode(&value),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

/// Configuration for publish and send-to-queue calls.
///
/// `publish` requires an exchange and optionally asserts a queue alongside it;
/// `send_to_queue` requires only the queue.
pub struct PublishOptions {
    pub(crate) exchange: Option<ExchangeDefinition>,
    pub(crate) queue: Option<QueueDefinition>,
    pub(crate) message_options: MessageOptions,
    pub(crate) codec: Arc<dyn Codec>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        PublishOptions {
            exchange: None,
            queue: None,
            message_options: MessageOptions::default(),
            codec: Arc::new(JsonCodec),
        }
    }
}

impl PublishOptions {
    pub fn new() -> Self {
        PublishOptions::default()
    }

    /// Sets the target exchange.
    pub fn exchange(mut self, exchange: ExchangeDefinition) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Sets the queue to assert alongside the exchange, or the target queue
    /// for send-to-queue.
    pub fn queue(mut self, queue: QueueDefinition) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Overrides the default message options.
    pub fn message_options(mut self, message_options: MessageOptions) -> Self {
        self.message_options = message_options;
        self
    }

    /// Swaps in an alternate payload codec.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }
}

/// Emits a message to `exchange` with confirm semantics.
pub(crate) async fn publish(
    channel: &Channel,
    options: &PublishOptions,
    exchange: &str,
    routing_key: &str,
    payload: Payload,
) -> Result<(), AmqpError> {
    let data = payload.into_bytes(options.codec.as_ref())?;
    let properties = build_properties(&options.message_options, options.codec.as_ref());

    confirm_publish(channel, exchange, routing_key, &data, properties).await
}

/// Emits a message directly to `queue` with confirm semantics.
pub(crate) async fn send_to_queue(
    channel: &Channel,
    options: &PublishOptions,
    queue: &str,
    payload: Payload,
) -> Result<(), AmqpError> {
    let data = payload.into_bytes(options.codec.as_ref())?;
    let properties = build_properties(&options.message_options, options.codec.as_ref());

    confirm_publish(channel, "", queue, &data, properties).await
}

async fn confirm_publish(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    data: &[u8],
    properties: BasicProperties,
) -> Result<(), AmqpError> {
    let confirm = channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            data,
            properties,
        )
        .await
        .map_err(|err| {
            error!(error = err.to_string(), "error publishing message");
            AmqpError::PublishingError(err.to_string())
        })?;

    match confirm.await.map_err(|err| {
        error!(error = err.to_string(), "error awaiting publish confirm");
        AmqpError::PublishingError(err.to_string())
    })? {
        Confirmation::Nack(_) => {
            error!("message was nacked by the broker");
            Err(AmqpError::PublishNotConfirmed)
        }
        _ => Ok(()),
    }
}

fn build_properties(options: &MessageOptions, codec: &dyn Codec) -> BasicProperties {
    let mut headers = options.headers.clone();
    otel::inject_context(&mut headers);

    BasicProperties::default()
        .with_content_type(ShortString::from(codec.content_type()))
        .with_message_id(ShortString::from(uuid::Uuid::new_v4().to_string()))
        .with_delivery_mode(if options.persistent { 2 } else { 1 })
        .with_headers(FieldTable::from(headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Cat {
        name: String,
    }

    #[test]
    fn raw_bytes_pass_through_unserialized() {
        let bytes = Payload::from(br#"{ "name": "Sally" }"#.as_slice())
            .into_bytes(&JsonCodec)
            .unwrap();

        assert_eq!(bytes, br#"{ "name": "Sally" }"#.to_vec());
    }

    #[test]
    fn structured_values_go_through_the_codec() {
        let bytes = Payload::from(json!({"name": "Fred"}))
            .into_bytes(&JsonCodec)
            .unwrap();

        assert_eq!(bytes, br#"{"name":"Fred"}"#.to_vec());
    }

    #[test]
    fn serializable_values_become_payloads() {
        let payload = Payload::json(&Cat {
            name: "Sally".to_owned(),
        })
        .unwrap();

        assert_eq!(
            payload.into_bytes(&JsonCodec).unwrap(),
            br#"{"name":"Sally"}"#.to_vec()
        );
    }

    #[test]
    fn messages_are_persistent_by_default() {
        let props = build_properties(&MessageOptions::default(), &JsonCodec);

        assert_eq!(props.delivery_mode(), &Some(2));
        assert_eq!(
            props.content_type(),
            &Some(ShortString::from("application/json"))
        );
        assert!(props.message_id().is_some());
    }

    #[test]
    fn transient_messages_use_delivery_mode_one() {
        let props = build_properties(&MessageOptions::default().transient(), &JsonCodec);

        assert_eq!(props.delivery_mode(), &Some(1));
    }

    #[test]
    fn caller_headers_are_kept() {
        let options = MessageOptions::default()
            .header("color", AMQPValue::LongString("blue".into()));
        let props = build_properties(&options, &JsonCodec);

        let headers = props.headers().clone().unwrap_or_default();
        assert_eq!(
            headers.inner().get(&ShortString::from("color")),
            Some(&AMQPValue::LongString("blue".into()))
        );
    }
}
