// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Endpoint-keyed single-flight cache.
//!
//! Both the connection cache and the publish-channel cache share the same
//! shape: a map from endpoint key to an in-progress-or-completed future. The
//! first caller for a key installs the initialization future; concurrent
//! callers await the same shared result instead of racing their own. A
//! completed slot stays cached (including a failed one) until it is removed.

use crate::errors::AmqpError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::{collections::HashMap, sync::Mutex};

pub(crate) type SharedInit<T> = Shared<BoxFuture<'static, Result<T, AmqpError>>>;

pub(crate) struct EndpointCache<T>
where
    T: Clone,
{
    slots: Mutex<HashMap<String, SharedInit<T>>>,
}

impl<T> EndpointCache<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new() -> Self {
        EndpointCache {
            slots: Mutex::new(HashMap::default()),
        }
    }

    /// Returns the shared future for `key`, installing the one produced by
    /// `init` if the slot is empty. The lock is only held to look at the map;
    /// initialization itself runs when the returned future is first polled.
    pub(crate) fn get_or_init<F>(&self, key: &str, init: F) -> Result<SharedInit<T>, AmqpError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, AmqpError>>,
    {
        let mut slots = self.slots.lock().map_err(|_| AmqpError::InternalError)?;

        let slot = slots
            .entry(key.to_owned())
            .or_insert_with(|| init().shared());

        Ok(slot.clone())
    }

    /// Evicts one slot. Used by the channel-error callback, so it must never
    /// panic: a poisoned lock leaves the slot in place.
    pub(crate) fn remove(&self, key: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(key);
        }
    }

    /// Empties the cache, handing every slot back to the caller.
    pub(crate) fn drain(&self) -> Result<Vec<SharedInit<T>>, AmqpError> {
        let mut slots = self.slots.lock().map_err(|_| AmqpError::InternalError)?;

        Ok(slots.drain().map(|(_, slot)| slot).collect())
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn counting_init(
        counter: &Arc<AtomicUsize>,
        value: Result<usize, AmqpError>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<usize, AmqpError>> {
        let counter = Arc::clone(counter);
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                value
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initialization() {
        let cache = EndpointCache::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_init("amqp://localhost", counting_init(&calls, Ok(7)))
            .unwrap();
        let second = cache
            .get_or_init("amqp://localhost", counting_init(&calls, Ok(13)))
            .unwrap();

        let (a, b) = tokio::join!(first, second);

        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn removed_slot_is_reinitialized() {
        let cache = EndpointCache::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_init("amqp://localhost", counting_init(&calls, Ok(1)))
            .unwrap()
            .await
            .unwrap();

        cache.remove("amqp://localhost");

        let second = cache
            .get_or_init("amqp://localhost", counting_init(&calls, Ok(2)))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_initialization_stays_cached_until_removed() {
        let cache = EndpointCache::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_init(
                "amqp://localhost",
                counting_init(&calls, Err(AmqpError::ConnectionError("refused".into()))),
            )
            .unwrap()
            .await;

        let second = cache
            .get_or_init("amqp://localhost", counting_init(&calls, Ok(9)))
            .unwrap()
            .await;

        assert_eq!(
            first.unwrap_err(),
            AmqpError::ConnectionError("refused".into())
        );
        assert_eq!(
            second.unwrap_err(),
            AmqpError::ConnectionError("refused".into())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_empties_the_cache() {
        let cache = EndpointCache::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_init("amqp://a", counting_init(&calls, Ok(1)))
            .unwrap();
        cache
            .get_or_init("amqp://b", counting_init(&calls, Ok(2)))
            .unwrap();

        let drained = cache.drain().unwrap();

        assert_eq!(drained.len(), 2);
        assert_eq!(cache.len(), 0);
    }
}
