use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::warn;

use crate::market_data::types::PriceUpdate;
use crate::metrics::prometheus::record_listener_error;

pub type Listener = Box<dyn FnMut(&PriceUpdate) -> anyhow::Result<()> + Send + Sync>;

/// Set of feed listeners, shared between the feed task and subscribers.
///
/// A listener entry stays locked for the duration of its call, so an
/// `unsubscribe` that has returned is never followed by another call.
/// Listeners must not unsubscribe themselves from inside their own call.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<DashMap<u64, Listener>>,
    next_id: Arc<AtomicU64>,
    emptied: Arc<Notify>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&PriceUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Box::new(listener));
        Subscription {
            id,
            registry: Some(self.clone()),
        }
    }

    /// Delivers one update to every listener. A listener that errors or
    /// panics is logged and skipped; the rest still receive the update.
    ///
    /// Returns how many listeners accepted the update.
    pub fn dispatch(&self, update: &PriceUpdate) -> usize {
        let mut delivered = 0;
        for mut entry in self.listeners.iter_mut() {
            let listener_id = *entry.key();
            let listener = entry.value_mut();
            match catch_unwind(AssertUnwindSafe(|| listener(update))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    record_listener_error();
                    warn!(listener_id, token_id = %update.id, error = %err, "feed listener failed");
                }
                Err(_) => {
                    record_listener_error();
                    warn!(listener_id, token_id = %update.id, "feed listener panicked");
                }
            }
        }
        delivered
    }

    /// Removes one listener. Removing the last one wakes [`Self::emptied`].
    pub fn remove(&self, id: u64) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed && self.listeners.is_empty() {
            self.emptied.notify_one();
        }
        removed
    }

    /// Resolves once the last listener has been removed. A removal that
    /// happened before the call is not lost.
    pub async fn emptied(&self) {
        self.emptied.notified().await;
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Handle to one registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Option<ListenerRegistry>,
}

impl Subscription {
    /// A subscription to a producer that will never emit.
    pub fn detached() -> Self {
        Self {
            id: u64::MAX,
            registry: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .as_ref()
            .is_some_and(|registry| registry.listeners.contains_key(&self.id))
    }

    /// Removes the listener. No call to it starts after this returns.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&PriceUpdate) -> anyhow::Result<()> + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |update: &PriceUpdate| {
            sink.lock().unwrap().push(update.id.to_string());
            Ok(())
        })
    }

    #[test]
    fn delivers_to_every_listener() {
        let registry = ListenerRegistry::new();
        let (first, l1) = recorder();
        let (second, l2) = recorder();
        let _s1 = registry.subscribe(l1);
        let _s2 = registry.subscribe(l2);

        assert_eq!(registry.dispatch(&PriceUpdate::new("a")), 2);
        assert_eq!(*first.lock().unwrap(), vec!["a"]);
        assert_eq!(*second.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let registry = ListenerRegistry::new();
        let _bad = registry.subscribe(|_| anyhow::bail!("boom"));
        let _panicky = registry.subscribe(|_| panic!("listener bug"));
        let (seen, good) = recorder();
        let _good = registry.subscribe(good);

        assert_eq!(registry.dispatch(&PriceUpdate::new("a")), 1);
        assert_eq!(registry.dispatch(&PriceUpdate::new("b")), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn unsubscribe_and_drop_stop_delivery() {
        let registry = ListenerRegistry::new();
        let (seen, listener) = recorder();
        let sub = registry.subscribe(listener);
        assert!(sub.is_active());

        registry.dispatch(&PriceUpdate::new("a"));
        sub.unsubscribe();
        registry.dispatch(&PriceUpdate::new("b"));
        assert_eq!(*seen.lock().unwrap(), vec!["a"]);

        let (_, other) = recorder();
        drop(registry.subscribe(other));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn removing_the_last_listener_signals_emptied() {
        let registry = ListenerRegistry::new();
        let first = registry.subscribe(|_| Ok(()));
        let second = registry.subscribe(|_| Ok(()));

        first.unsubscribe();
        assert!(timeout(Duration::from_millis(20), registry.emptied()).await.is_err());

        second.unsubscribe();
        timeout(Duration::from_millis(20), registry.emptied())
            .await
            .unwrap();
    }

    #[test]
    fn detached_subscription_is_inert() {
        let sub = Subscription::detached();
        assert!(!sub.is_active());
        sub.unsubscribe();
    }
}
