// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Session Layer
//!
//! This module provides the error taxonomy for the crate. Configuration errors
//! (`ExchangeRequired`, `QueueRequired`, `InvalidEndpoint`) are raised before any
//! broker I/O; every other variant maps a failed broker operation.

use thiserror::Error;

/// Represents errors that can occur during AMQP operations.
///
/// The enum covers connection and channel lifecycle failures, topology
/// declaration failures, publish/confirm failures, payload codec failures and
/// consumer acknowledgement failures. Variants are cloneable so that a failed
/// lazy initialization can be observed by every caller sharing it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// The endpoint URI could not be parsed
    #[error("invalid endpoint uri `{0}`")]
    InvalidEndpoint(String),

    /// Error establishing a connection to the broker
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}`")]
    BindQueueError(String, String),

    /// A publish was attempted without a target exchange
    #[error("an exchange is required to publish")]
    ExchangeRequired,

    /// A send-to-queue was attempted without a target queue
    #[error("a queue is required to send to a queue")]
    QueueRequired,

    /// Error publishing a message
    #[error("failure to publish: {0}")]
    PublishingError(String),

    /// The broker refused to confirm a published message
    #[error("message was nacked by the broker")]
    PublishNotConfirmed,

    /// Error serializing a payload with the configured codec
    #[error("failure to serialize payload: {0}")]
    SerializePayloadError(String),

    /// Error parsing a message payload with the configured codec
    #[error("failure to parse payload: {0}")]
    ParsePayloadError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error republishing a failed message to its failure queue
    #[error("failure to publish to failure queue `{0}`")]
    DeadLetterError(String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos: {0}")]
    QoSDeclarationError(String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer on queue `{0}`")]
    BindingConsumerError(String),

    /// Error cancelling a running consumer
    #[error("failure to cancel consumer `{0}`")]
    CancelConsumerError(String),

    /// Error produced by a consumer handler
    #[error("handler failure: {0}")]
    HandlerError(String),
}
