// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publish Channel Management
//!
//! This module owns the cache of confirm channels used for outbound publishing:
//! one channel per broker endpoint, created lazily over the shared connection
//! cache and put into confirm mode so each publish is acknowledged by the
//! broker before it is reported to the caller.
//!
//! The cache self-heals. When the transport reports a channel-level error, the
//! channel's own error callback evicts its cache slot, so the next publisher
//! transparently creates a fresh channel. Publishes already in flight on the
//! dying channel surface their failures to their callers; nothing is retried.

use crate::{
    connection::{ConnectionManager, Endpoint},
    errors::AmqpError,
    registry::{EndpointCache, SharedInit},
};
use futures_util::FutureExt;
use lapin::{options::ConfirmSelectOptions, Channel};
use std::sync::Arc;
use tracing::{debug, error};

/// Endpoint-keyed registry of confirm channels for publishing.
#[derive(Clone)]
pub struct PublishChannelManager {
    connections: ConnectionManager,
    cache: Arc<EndpointCache<Channel>>,
}

impl PublishChannelManager {
    pub fn new(connections: ConnectionManager) -> Self {
        PublishChannelManager {
            connections,
            cache: Arc::new(EndpointCache::new()),
        }
    }

    /// Returns the cached confirm channel for `endpoint`, creating it (and the
    /// underlying connection, if needed) on first use.
    ///
    /// A cached channel the broker has already closed is evicted and recreated
    /// once, keeping the invariant that a cached channel is usable or absent.
    pub async fn get(&self, endpoint: &Endpoint) -> Result<Channel, AmqpError> {
        for _ in 0..2 {
            let channel = self.slot(endpoint)?.await?;

            if channel.status().connected() {
                return Ok(channel);
            }

            debug!("cached publish channel is closed, evicting it");
            self.cache.remove(endpoint.key());
        }

        Err(AmqpError::ChannelError(
            "publish channel is not usable".to_owned(),
        ))
    }

    fn slot(&self, endpoint: &Endpoint) -> Result<SharedInit<Channel>, AmqpError> {
        let key = endpoint.key().to_owned();
        let endpoint = endpoint.clone();
        let connections = self.connections.clone();
        let cache = Arc::clone(&self.cache);
        let evict_key = key.clone();

        self.cache.get_or_init(&key, move || {
            async move {
                let connection = connections.connect(&endpoint).await?;

                debug!("creating confirm channel...");
                let channel = connection.create_channel().await.map_err(|err| {
                    error!(error = err.to_string(), "error to create the channel");
                    AmqpError::ChannelError(err.to_string())
                })?;

                channel
                    .confirm_select(ConfirmSelectOptions::default())
                    .await
                    .map_err(|err| {
                        error!(error = err.to_string(), "error to enable confirms");
                        AmqpError::ChannelError(err.to_string())
                    })?;

                // The channel reports its own demise; the manager owns the
                // authoritative cache and clears the slot.
                channel.on_error(move |err| {
                    error!(
                        error = err.to_string(),
                        "publish channel failed, evicting it from the cache"
                    );
                    cache.remove(&evict_key);
                });

                debug!("confirm channel created");
                Ok(channel)
            }
            .boxed()
        })
    }

    /// Drops every cached channel. Invoked when the connection cache is torn
    /// down; the channels die with their connections.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}
