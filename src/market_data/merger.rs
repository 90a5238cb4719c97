use tracing::{debug, warn};

use crate::market_data::types::PriceUpdate;
use crate::metrics::prometheus::{record_update_applied, record_update_dropped};
use crate::state::token::Token;
use crate::state::token_store::{TokenChange, TokenStore};

/// Store mutation, as published to store listeners.
#[derive(Debug)]
pub enum StoreEvent<'a> {
    /// The whole collection was swapped out.
    Replaced,
    /// One token was patched in place.
    Changed(&'a TokenChange),
}

/// Observer of store mutations. Errors are logged and do not stop
/// notification of other listeners.
pub trait StoreListener: Send {
    fn name(&self) -> &'static str;

    fn on_store_event(&mut self, event: &StoreEvent<'_>, store: &TokenStore) -> anyhow::Result<()>;
}

/// Sole writer of the token store.
///
/// Updates are applied one at a time in arrival order; every successful
/// mutation is published to the registered listeners before the next one.
#[derive(Default)]
pub struct UpdateMerger {
    store: TokenStore,
    listeners: Vec<Box<dyn StoreListener>>,
}

impl UpdateMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn add_listener(&mut self, listener: Box<dyn StoreListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn replace_all(&mut self, tokens: Vec<Token>) {
        self.store.replace_all(tokens);
        debug!(count = self.store.len(), "store replaced");
        self.publish(&StoreEvent::Replaced);
    }

    /// Applies one partial update. Unknown ids are dropped silently.
    pub fn apply(&mut self, update: &PriceUpdate) -> Option<TokenChange> {
        let Some(change) = self.store.apply_partial(update) else {
            record_update_dropped();
            debug!(token_id = %update.id, "update for unknown token dropped");
            return None;
        };

        record_update_applied();
        debug!(
            token_id = %change.id(),
            price = change.current.price,
            previous_price = change.previous.price,
            "update applied"
        );
        self.publish(&StoreEvent::Changed(&change));
        Some(change)
    }

    fn publish(&mut self, event: &StoreEvent<'_>) {
        for listener in &mut self.listeners {
            if let Err(err) = listener.on_store_event(event, &self.store) {
                warn!(listener = listener.name(), error = %err, "store listener failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::token_store::tests::token;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl StoreListener for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn on_store_event(&mut self, event: &StoreEvent<'_>, store: &TokenStore) -> anyhow::Result<()> {
            let entry = match event {
                StoreEvent::Replaced => format!("replaced:{}", store.len()),
                StoreEvent::Changed(change) => format!("changed:{}", change.id()),
            };
            self.0.lock().unwrap().push(entry);
            Ok(())
        }
    }

    struct Broken;

    impl StoreListener for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn on_store_event(&mut self, _: &StoreEvent<'_>, _: &TokenStore) -> anyhow::Result<()> {
            anyhow::bail!("listener bug")
        }
    }

    #[test]
    fn publishes_every_successful_mutation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut merger = UpdateMerger::new();
        merger.add_listener(Box::new(Broken));
        merger.add_listener(Box::new(Recorder(seen.clone())));

        merger.replace_all(vec![token("a", 10.0), token("b", 2.0)]);
        assert!(merger.apply(&PriceUpdate::new("a").with_price(12.0)).is_some());
        assert!(merger.apply(&PriceUpdate::new("z").with_price(5.0)).is_none());

        assert_eq!(*seen.lock().unwrap(), vec!["replaced:2", "changed:a"]);
        assert_eq!(merger.store().get("a").unwrap().price, 12.0);
    }

    #[test]
    fn stale_updates_after_replace_are_absorbed() {
        let mut merger = UpdateMerger::new();
        merger.replace_all(vec![token("a", 10.0)]);
        merger.replace_all(vec![token("b", 3.0)]);

        assert!(merger.apply(&PriceUpdate::new("a").with_price(11.0)).is_none());
        assert_eq!(merger.store().len(), 1);
        assert_eq!(merger.store().get("b").unwrap().price, 3.0);
    }

    #[test]
    fn repeated_deltas_compound() {
        let mut merger = UpdateMerger::new();
        merger.replace_all(vec![token("a", 10.0)]);
        for _ in 0..3 {
            let price = merger.store().get("a").unwrap().price * 1.1;
            merger.apply(&PriceUpdate::new("a").with_price(price));
        }
        assert!((merger.store().get("a").unwrap().price - 13.31).abs() < 1e-9);
    }
}
