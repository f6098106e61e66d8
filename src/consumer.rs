// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Processing
//!
//! Per-delivery control flow for consumer sessions: decode the payload, run
//! the handler inside a consumer trace span, then settle the delivery.
//!
//! Settlement follows the delivery's disposition:
//! - handler success acknowledges the message;
//! - handler failure with retry disabled negatively acknowledges without
//!   requeue, dropping the message from the queue;
//! - handler failure with retry enabled republishes the message to the
//!   failure queue (after the configured delay, when set) and then
//!   acknowledges it on the primary queue, so a failing message never loops
//!   hot on its own queue;
//! - a malformed payload is logged and acknowledged no matter what the
//!   handler returns, so a poison message is never retried indefinitely.

use crate::{
    codec::Codec,
    dispatcher::RetrySettings,
    errors::AmqpError,
    handler::{ConsumerHandler, DecodeResult, Envelope},
    otel,
};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions},
    Channel,
};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::borrow::Cow;
use tracing::{error, warn};

/// How a processed delivery must be settled.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Disposition<'rt> {
    Ack,
    Discard,
    DeadLetter(&'rt RetrySettings),
}

/// Runs the handler and decides the settlement for one envelope.
pub(crate) async fn dispatch<'rt>(
    envelope: &Envelope,
    handler: &dyn ConsumerHandler,
    retry: Option<&'rt RetrySettings>,
) -> Disposition<'rt> {
    let result = handler.handle(envelope).await;

    if envelope.payload.is_malformed() {
        // Poison-message policy: the malformed delivery is considered
        // processed regardless of the handler outcome.
        if let Err(err) = result {
            warn!(
                error = err.to_string(),
                "handler failed on a malformed payload, removing it from the queue"
            );
        }
        return Disposition::Ack;
    }

    match result {
        Ok(()) => Disposition::Ack,
        Err(err) => match retry {
            Some(settings) => {
                warn!(
                    error = err.to_string(),
                    fail_queue = settings.fail_queue,
                    "handler failed, moving message to the failure queue"
                );
                Disposition::DeadLetter(settings)
            }
            None => {
                warn!(error = err.to_string(), "handler failed, dropping message");
                Disposition::Discard
            }
        },
    }
}

/// Processes one delivery end to end: decode, handle, settle.
pub(crate) async fn process_delivery(
    tracer: &BoxedTracer,
    delivery: Delivery,
    channel: &Channel,
    handler: &dyn ConsumerHandler,
    codec: &dyn Codec,
    retry: Option<&RetrySettings>,
) -> Result<(), AmqpError> {
    let mut span = otel::consumer_span(&delivery.properties, tracer, delivery.routing_key.as_str());

    let payload = match codec.decode(&delivery.data) {
        Ok(value) => DecodeResult::Parsed(value),
        Err(err) => {
            error!(
                error = err.to_string(),
                "error deserializing message content"
            );
            DecodeResult::Malformed(err.to_string())
        }
    };

    let envelope = Envelope {
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        delivery_tag: delivery.delivery_tag,
        redelivered: delivery.redelivered,
        data: delivery.data.clone(),
        payload,
    };

    let result = match dispatch(&envelope, handler, retry).await {
        Disposition::Ack => delivery
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            }),
        Disposition::Discard => delivery
            .nack(BasicNackOptions {
                multiple: false,
                requeue: false,
            })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling nack msg");
                AmqpError::NackMessageError
            }),
        Disposition::DeadLetter(settings) => dead_letter(&delivery, channel, settings).await,
    };

    match &result {
        Ok(()) => span.set_status(Status::Ok),
        Err(err) => {
            span.record_error(err);
            span.set_status(Status::Error {
                description: Cow::from(err.to_string()),
            });
        }
    }

    result
}

/// Moves a failed delivery onto its failure queue, then acknowledges it on the
/// primary queue. The message keeps its original properties.
async fn dead_letter(
    delivery: &Delivery,
    channel: &Channel,
    settings: &RetrySettings,
) -> Result<(), AmqpError> {
    if let Some(delay) = settings.delay {
        tokio::time::sleep(delay).await;
    }

    let confirm = channel
        .basic_publish(
            "",
            &settings.fail_queue,
            BasicPublishOptions::default(),
            &delivery.data,
            delivery.properties.clone(),
        )
        .await
        .map_err(|err| {
            error!(error = err.to_string(), "error whiling sending to failure queue");
            AmqpError::DeadLetterError(settings.fail_queue.clone())
        })?;

    confirm.await.map_err(|err| {
        error!(error = err.to_string(), "error whiling sending to failure queue");
        AmqpError::DeadLetterError(settings.fail_queue.clone())
    })?;

    delivery
        .ack(BasicAckOptions { multiple: false })
        .await
        .map_err(|err| {
            error!(error = err.to_string(), "error whiling ack msg after move");
            AmqpError::AckMessageError
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockConsumerHandler;
    use serde_json::json;

    fn envelope(payload: DecodeResult) -> Envelope {
        Envelope {
            exchange: "cat".to_owned(),
            routing_key: "found.tawny".to_owned(),
            delivery_tag: 1,
            redelivered: false,
            data: br#"{"name":"Sally"}"#.to_vec(),
            payload,
        }
    }

    fn retry_settings() -> RetrySettings {
        RetrySettings {
            fail_queue: "found_cats.failure".to_owned(),
            delay: None,
        }
    }

    #[tokio::test]
    async fn successful_handler_acks() {
        let mut handler = MockConsumerHandler::new();
        handler.expect_handle().times(1).returning(|_| Ok(()));

        let settings = retry_settings();
        let disposition = dispatch(
            &envelope(DecodeResult::Parsed(json!({"name": "Sally"}))),
            &handler,
            Some(&settings),
        )
        .await;

        assert_eq!(disposition, Disposition::Ack);
    }

    #[tokio::test]
    async fn failed_handler_with_retry_moves_to_the_failure_queue() {
        let mut handler = MockConsumerHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Err(AmqpError::HandlerError("boom".to_owned())));

        let settings = retry_settings();
        let disposition = dispatch(
            &envelope(DecodeResult::Parsed(json!({"name": "Sally"}))),
            &handler,
            Some(&settings),
        )
        .await;

        assert_eq!(disposition, Disposition::DeadLetter(&settings));
    }

    #[tokio::test]
    async fn failed_handler_without_retry_discards() {
        let mut handler = MockConsumerHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Err(AmqpError::HandlerError("boom".to_owned())));

        let disposition = dispatch(
            &envelope(DecodeResult::Parsed(json!({"name": "Sally"}))),
            &handler,
            None,
        )
        .await;

        assert_eq!(disposition, Disposition::Discard);
    }

    #[tokio::test]
    async fn malformed_payload_still_reaches_the_handler_and_acks() {
        let mut handler = MockConsumerHandler::new();
        handler
            .expect_handle()
            .times(1)
            .withf(|envelope: &Envelope| envelope.payload.is_malformed())
            .returning(|_| Ok(()));

        let settings = retry_settings();
        let disposition = dispatch(
            &envelope(DecodeResult::Malformed("expected value".to_owned())),
            &handler,
            Some(&settings),
        )
        .await;

        assert_eq!(disposition, Disposition::Ack);
    }

    #[tokio::test]
    async fn malformed_payload_acks_even_when_the_handler_fails() {
        let mut handler = MockConsumerHandler::new();
        handler
            .expect_handle()
            .times(1)
            .returning(|_| Err(AmqpError::HandlerError("boom".to_owned())));

        let settings = retry_settings();
        let disposition = dispatch(
            &envelope(DecodeResult::Malformed("expected value".to_owned())),
            &handler,
            Some(&settings),
        )
        .await;

        assert_eq!(disposition, Disposition::Ack);
    }
}
