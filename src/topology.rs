// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Assertion
//!
//! Idempotent declaration of exchanges, queues and bindings. Declarations use
//! assert semantics: the broker creates the resource if it is absent and
//! validates compatibility if it is present. Every consume and publish path
//! asserts its topology before any traffic flows.

use crate::{
    dispatcher::ConsumeOptions, errors::AmqpError, exchange::ExchangeDefinition,
    queue::QueueDefinition,
};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, ShortString},
    Channel,
};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Declares an exchange on the given channel.
pub async fn declare_exchange(
    channel: &Channel,
    def: &ExchangeDefinition,
) -> Result<(), AmqpError> {
    debug!("declaring exchange: {}", def.name);

    match channel
        .exchange_declare(
            &def.name,
            def.kind.clone().try_into()?,
            ExchangeDeclareOptions {
                passive: def.passive,
                durable: def.durable,
                auto_delete: def.delete,
                internal: def.internal,
                nowait: def.no_wait,
            },
            FieldTable::from(def.params.clone()),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = def.name,
                "error to declare the exchange"
            );
            Err(AmqpError::DeclareExchangeError(def.name.clone()))
        }
        _ => {
            debug!("exchange: {} was declared", def.name);
            Ok(())
        }
    }
}

/// Declares a queue on the given channel.
pub async fn declare_queue(
    channel: &Channel,
    def: &QueueDefinition,
) -> Result<(), AmqpError> {
    debug!("declaring queue: {}", def.name);

    match channel
        .queue_declare(
            &def.name,
            QueueDeclareOptions {
                passive: def.passive,
                durable: def.durable,
                exclusive: def.exclusive,
                auto_delete: def.delete,
                nowait: def.no_wait,
            },
            FieldTable::from(def.arguments()),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = def.name,
                "error to declare the queue"
            );
            Err(AmqpError::DeclareQueueError(def.name.clone()))
        }
        _ => {
            debug!("queue: {} was declared", def.name);
            Ok(())
        }
    }
}

/// Binds a queue to an exchange with one topic pattern and optional
/// binding arguments (used by header-match exchange kinds).
pub async fn bind_queue(
    channel: &Channel,
    queue: &str,
    exchange: &str,
    pattern: &str,
    arguments: &BTreeMap<ShortString, AMQPValue>,
) -> Result<(), AmqpError> {
    debug!(
        "binding queue: {} to the exchange: {} with the pattern: {}",
        queue, exchange, pattern
    );

    match channel
        .queue_bind(
            queue,
            exchange,
            pattern,
            QueueBindOptions { nowait: false },
            FieldTable::from(arguments.clone()),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error to bind queue to exchange");
            Err(AmqpError::BindQueueError(
                exchange.to_owned(),
                queue.to_owned(),
            ))
        }
        _ => Ok(()),
    }
}

/// Asserts the full consume-side topology: the exchange (when configured), the
/// primary queue, the failure queue (when retry is enabled, with the primary
/// queue's options) and one binding per topic pattern. Without an exchange
/// there is nothing to bind against, so bindings are skipped.
pub(crate) async fn install_consume(
    channel: &Channel,
    options: &ConsumeOptions,
) -> Result<(), AmqpError> {
    if let Some(exchange) = &options.exchange {
        declare_exchange(channel, exchange).await?;
    }

    declare_queue(channel, &options.queue).await?;

    if let Some(retry) = options.resolved_retry() {
        declare_queue(channel, &options.queue.renamed(&retry.fail_queue)).await?;
    }

    if let Some(exchange) = &options.exchange {
        for pattern in options.binding_topics() {
            bind_queue(
                channel,
                options.queue.name(),
                exchange.name(),
                &pattern,
                &options.arguments,
            )
            .await?;
        }
    }

    Ok(())
}
