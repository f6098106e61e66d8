// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! Types for declaring AMQP exchanges. Exchanges default to the topic kind and
//! to durability, matching the defaults applied to every consume and publish
//! call; the delayed kind is available for brokers running the
//! `x-delayed-message` plugin.

use crate::errors::AmqpError;
use lapin::types::{AMQPValue, LongString, ShortString};
use std::collections::BTreeMap;

/// Constant for the header field used to specify the delayed exchange type
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";

/// Represents the kinds of exchanges available in AMQP.
///
/// - Direct: routes on an exact routing-key match
/// - Fanout: broadcasts to all bound queues
/// - Topic: routes on wildcard pattern matching of routing keys (the default)
/// - Headers: routes on message header values via binding arguments
/// - XMessageDelayed: delayed delivery extension (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    #[default]
    Topic,
    Headers,
    XMessageDelayed,
}

impl TryInto<lapin::ExchangeKind> for ExchangeKind {
    type Error = AmqpError;

    fn try_into(self) -> Result<lapin::ExchangeKind, AmqpError> {
        match self {
            ExchangeKind::Direct => Ok(lapin::ExchangeKind::Direct),
            ExchangeKind::Fanout => Ok(lapin::ExchangeKind::Fanout),
            ExchangeKind::Headers => Ok(lapin::ExchangeKind::Headers),
            ExchangeKind::Topic => Ok(lapin::ExchangeKind::Topic),
            ExchangeKind::XMessageDelayed => {
                Ok(lapin::ExchangeKind::Custom("x-delayed-message".to_owned()))
            }
        }
    }
}

/// Definition of an exchange with its declaration options.
///
/// Built with the builder pattern. New definitions are durable topic exchanges;
/// every option can be overridden before the definition is declared.
#[derive(Debug, Clone)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) passive: bool,
    pub(crate) internal: bool,
    pub(crate) no_wait: bool,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
}

impl ExchangeDefinition {
    /// Creates a durable topic exchange definition with the given name.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Topic,
            durable: true,
            delete: false,
            passive: false,
            internal: false,
            no_wait: false,
            params: BTreeMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the exchange kind.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the exchange kind to Direct.
    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    /// Sets the exchange kind to Fanout.
    pub fn fanout(mut self) -> Self {
        self.kind = ExchangeKind::Fanout;
        self
    }

    /// Sets the exchange kind to Headers.
    pub fn headers(mut self) -> Self {
        self.kind = ExchangeKind::Headers;
        self
    }

    /// Creates a delayed exchange routing as the given underlying kind.
    ///
    /// Requires the `x-delayed-message` plugin on the broker.
    pub fn delayed(mut self, routed_as: &str) -> Self {
        self.kind = ExchangeKind::XMessageDelayed;
        self.params.insert(
            ShortString::from(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE),
            AMQPValue::LongString(LongString::from(routed_as)),
        );
        self
    }

    /// Makes the exchange non-durable.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the declaration passive, checking existence without creating.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    /// Makes the exchange internal, preventing direct publishing.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Sets the no_wait flag, making the declaration non-blocking.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Adds a single declaration parameter.
    pub fn param(mut self, key: ShortString, value: AMQPValue) -> Self {
        self.params.insert(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_definitions_are_durable_topic_exchanges() {
        let def = ExchangeDefinition::new("cat");

        assert_eq!(def.name(), "cat");
        assert_eq!(def.kind, ExchangeKind::Topic);
        assert!(def.durable);
        assert!(!def.passive);
    }

    #[test]
    fn delayed_exchanges_carry_the_routed_as_param() {
        let def = ExchangeDefinition::new("cat").delayed("fanout");

        assert_eq!(def.kind, ExchangeKind::XMessageDelayed);
        assert_eq!(
            def.params
                .get(&ShortString::from(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE)),
            Some(&AMQPValue::LongString(LongString::from("fanout")))
        );
    }

    #[test]
    fn kinds_map_to_lapin_kinds() {
        let delayed: lapin::ExchangeKind = ExchangeKind::XMessageDelayed.try_into().unwrap();
        let topic: lapin::ExchangeKind = ExchangeKind::Topic.try_into().unwrap();

        assert_eq!(
            delayed,
            lapin::ExchangeKind::Custom("x-delayed-message".to_owned())
        );
        assert_eq!(topic, lapin::ExchangeKind::Topic);
    }
}
