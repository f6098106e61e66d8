// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Sessions
//!
//! This module drives one consumer registration from configuration to a
//! running delivery loop. Each session opens a fresh channel (never cached),
//! applies the caller's prefetch, asserts its topology, registers the consumer
//! and spawns the delivery loop, handing back a [`ConsumerHandle`] whose
//! `cancel` stops new deliveries.
//!
//! Retry is enabled unless explicitly disabled: failed deliveries are moved to
//! the configured failure queue (`<queue>.failure` by default) instead of being
//! requeued onto the primary queue.

use crate::{
    codec::{Codec, JsonCodec},
    consumer,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    handler::ConsumerHandler,
    queue::QueueDefinition,
    topology,
};
use futures_util::StreamExt;
use lapin::{
    options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions},
    types::{AMQPValue, FieldTable, ShortString},
    Channel, Connection,
};
use opentelemetry::global;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{debug, error};
use uuid::Uuid;

/// Retry policy for a consumer registration.
///
/// The default moves failed messages to the queue's default failure queue with
/// no delay. `Enabled` customizes the failure queue and an optional fixed delay
/// before the move; `Disabled` negatively acknowledges failures without
/// requeue, dropping them from the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    Default,
    Disabled,
    Enabled {
        fail_queue: Option<String>,
        delay: Option<Duration>,
    },
}

/// Resolved retry routing for one queue/failure-queue pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetrySettings {
    pub(crate) fail_queue: String,
    pub(crate) delay: Option<Duration>,
}

/// Configuration for one consumer registration.
pub struct ConsumeOptions {
    pub(crate) exchange: Option<ExchangeDefinition>,
    pub(crate) queue: QueueDefinition,
    pub(crate) topics: Vec<String>,
    pub(crate) arguments: BTreeMap<ShortString, AMQPValue>,
    pub(crate) prefetch: u16,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) retry: RetryPolicy,
}

impl ConsumeOptions {
    /// Creates consume options for the given queue with the defaults: no
    /// exchange, no topics, prefetch 1, JSON codec, retry enabled.
    pub fn new(queue: QueueDefinition) -> ConsumeOptions {
        ConsumeOptions {
            exchange: None,
            queue,
            topics: vec![],
            arguments: BTreeMap::default(),
            prefetch: 1,
            codec: Arc::new(JsonCodec),
            retry: RetryPolicy::Default,
        }
    }

    /// Sets the exchange to declare and bind the queue to.
    pub fn exchange(mut self, exchange: ExchangeDefinition) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Adds a topic pattern to bind the queue with.
    pub fn topic(mut self, pattern: &str) -> Self {
        self.topics.push(pattern.to_owned());
        self
    }

    /// Adds a binding argument, used by header-match exchange kinds.
    pub fn argument(mut self, key: &str, value: AMQPValue) -> Self {
        self.arguments.insert(ShortString::from(key), value);
        self
    }

    /// Bounds the count of unacknowledged deliveries held by the channel.
    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Swaps in an alternate payload codec.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Disables retry: handler failures are dropped from the queue.
    pub fn no_retry(mut self) -> Self {
        self.retry = RetryPolicy::Disabled;
        self
    }

    /// Resolves the retry policy against the queue name.
    pub(crate) fn resolved_retry(&self) -> Option<RetrySettings> {
        match &self.retry {
            RetryPolicy::Disabled => None,
            RetryPolicy::Default => Some(RetrySettings {
                fail_queue: self.queue.default_failure_queue(),
                delay: None,
            }),
            RetryPolicy::Enabled { fail_queue, delay } => Some(RetrySettings {
                fail_queue: fail_queue
                    .clone()
                    .unwrap_or_else(|| self.queue.default_failure_queue()),
                delay: *delay,
            }),
        }
    }

    /// Topic patterns to bind, defaulting to a single empty pattern.
    pub(crate) fn binding_topics(&self) -> Vec<String> {
        if self.topics.is_empty() {
            vec!["".to_owned()]
        } else {
            self.topics.clone()
        }
    }
}

/// Correlates a running consumer to its cancellation capability.
///
/// Cancellation is cooperative: it stops new deliveries but does not abort a
/// handler already in flight. The handle is consumed by `cancel`, so it cannot
/// be cancelled twice.
pub struct ConsumerHandle {
    channel: Channel,
    consumer_tag: String,
}

impl ConsumerHandle {
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Issues a channel-level consumer cancellation.
    pub async fn cancel(self) -> Result<(), AmqpError> {
        debug!("cancelling consumer: {}", self.consumer_tag);

        self.channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to cancel the consumer");
                AmqpError::CancelConsumerError(self.consumer_tag.clone())
            })
    }
}

/// Opens a fresh channel on `connection`, asserts the consumer topology and
/// spawns the delivery loop.
pub(crate) async fn start(
    connection: &Connection,
    options: ConsumeOptions,
    handler: Arc<dyn ConsumerHandler>,
) -> Result<ConsumerHandle, AmqpError> {
    debug!("creating consumer channel...");
    let channel = connection.create_channel().await.map_err(|err| {
        error!(error = err.to_string(), "error to create the channel");
        AmqpError::ChannelError(err.to_string())
    })?;

    channel
        .basic_qos(options.prefetch, BasicQosOptions::default())
        .await
        .map_err(|err| {
            error!(error = err.to_string(), "error to configure qos");
            AmqpError::QoSDeclarationError(err.to_string())
        })?;

    topology::install_consume(&channel, &options).await?;

    let consumer_tag = format!("{}-{}", options.queue.name(), Uuid::new_v4());

    let mut deliveries = channel
        .basic_consume(
            options.queue.name(),
            &consumer_tag,
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|err| {
            error!(error = err.to_string(), "error to create the consumer");
            AmqpError::BindingConsumerError(options.queue.name().to_owned())
        })?;

    let retry = options.resolved_retry();
    let codec = Arc::clone(&options.codec);
    let delivery_channel = channel.clone();

    tokio::spawn(async move {
        let tracer = global::tracer("amqp consumer");

        while let Some(result) = deliveries.next().await {
            match result {
                Ok(delivery) => {
                    if let Err(err) = consumer::process_delivery(
                        &tracer,
                        delivery,
                        &delivery_channel,
                        handler.as_ref(),
                        codec.as_ref(),
                        retry.as_ref(),
                    )
                    .await
                    {
                        error!(error = err.to_string(), "error to process delivery");
                    }
                }
                Err(err) => error!(error = err.to_string(), "error receiving delivery"),
            }
        }

        debug!("consumer stream ended");
    });

    Ok(ConsumerHandle {
        channel,
        consumer_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ConsumeOptions {
        ConsumeOptions::new(QueueDefinition::new("found_cats"))
    }

    #[test]
    fn defaults_match_the_consume_contract() {
        let options = options();

        assert_eq!(options.prefetch, 1);
        assert!(options.exchange.is_none());
        assert_eq!(options.retry, RetryPolicy::Default);
        assert_eq!(options.codec.content_type(), "application/json");
    }

    #[test]
    fn retry_is_enabled_by_default_with_the_derived_failure_queue() {
        let retry = options().resolved_retry().unwrap();

        assert_eq!(retry.fail_queue, "found_cats.failure");
        assert_eq!(retry.delay, None);
    }

    #[test]
    fn retry_settings_can_be_customized() {
        let retry = options()
            .retry(RetryPolicy::Enabled {
                fail_queue: Some("dead_cats".to_owned()),
                delay: Some(Duration::from_millis(250)),
            })
            .resolved_retry()
            .unwrap();

        assert_eq!(retry.fail_queue, "dead_cats");
        assert_eq!(retry.delay, Some(Duration::from_millis(250)));
    }

    #[test]
    fn enabled_retry_without_a_queue_falls_back_to_the_derived_name() {
        let retry = options()
            .retry(RetryPolicy::Enabled {
                fail_queue: None,
                delay: None,
            })
            .resolved_retry()
            .unwrap();

        assert_eq!(retry.fail_queue, "found_cats.failure");
    }

    #[test]
    fn disabled_retry_resolves_to_none() {
        assert_eq!(options().no_retry().resolved_retry(), None);
    }

    #[test]
    fn binding_topics_default_to_a_single_empty_pattern() {
        assert_eq!(options().binding_topics(), vec!["".to_owned()]);
        assert_eq!(
            options().topic("found.*").topic("lost.*").binding_topics(),
            vec!["found.*".to_owned(), "lost.*".to_owned()]
        );
    }
}
