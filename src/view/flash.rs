//! Per-token price flash, keyed by id.
//!
//! Lives beside the projection rather than in rows, so a flash survives its
//! row being scrolled out of the window and back. It is reset only when the
//! token leaves the store or a caller calls [`FlashTracker::forget`] (e.g. a
//! renderer that tears down and recreates its row state).

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::state::token::TokenId;
use crate::state::token_store::TokenStore;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlashState {
    #[default]
    Idle,
    Up,
    Down,
}

#[derive(Clone, Copy, Debug)]
struct RowFlash {
    last_price: f64,
    state: FlashState,
    expires_at: Option<Instant>,
}

impl RowFlash {
    fn state_at(&self, now: Instant) -> FlashState {
        match self.expires_at {
            Some(expiry) if now < expiry => self.state,
            _ => FlashState::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlashTracker {
    decay: Duration,
    rows: HashMap<TokenId, RowFlash>,
}

impl FlashTracker {
    pub fn new(decay: Duration) -> Self {
        Self {
            decay,
            rows: HashMap::new(),
        }
    }

    pub fn decay(&self) -> Duration {
        self.decay
    }

    /// Records an observed price. The first observation only sets the
    /// baseline; a different price starts (or restarts) a flash in the
    /// direction of the move; an equal price changes nothing.
    pub fn observe(&mut self, id: &TokenId, price: f64, now: Instant) -> FlashState {
        let Some(row) = self.rows.get_mut(id) else {
            self.rows.insert(
                id.clone(),
                RowFlash {
                    last_price: price,
                    state: FlashState::Idle,
                    expires_at: None,
                },
            );
            return FlashState::Idle;
        };

        if price != row.last_price {
            row.state = if price > row.last_price {
                FlashState::Up
            } else {
                FlashState::Down
            };
            row.expires_at = Some(now + self.decay);
            row.last_price = price;
        }
        row.state_at(now)
    }

    pub fn state(&self, id: &str, now: Instant) -> FlashState {
        self.rows
            .get(id)
            .map(|row| row.state_at(now))
            .unwrap_or_default()
    }

    pub fn last_price(&self, id: &str) -> Option<f64> {
        self.rows.get(id).map(|row| row.last_price)
    }

    /// Reverts expired flashes to idle and returns the affected ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<TokenId> {
        let mut reverted = Vec::new();
        for (id, row) in &mut self.rows {
            if row.expires_at.is_some_and(|expiry| expiry <= now) {
                row.state = FlashState::Idle;
                row.expires_at = None;
                reverted.push(id.clone());
            }
        }
        reverted
    }

    /// Earliest pending expiry, for scheduling the next sweep.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.rows.values().filter_map(|row| row.expires_at).min()
    }

    /// Drops state for ids no longer in the store and records a baseline
    /// for the rest.
    pub fn sync_with(&mut self, store: &TokenStore, now: Instant) {
        self.rows.retain(|id, _| store.contains(id.as_str()));
        for token in store.iter() {
            self.observe(&token.id, token.price, now);
        }
    }

    pub fn forget(&mut self, id: &str) {
        self.rows.remove(id);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::token_store::tests::token;

    const DECAY: Duration = Duration::from_millis(650);

    fn id(s: &str) -> TokenId {
        TokenId::from(s)
    }

    #[test]
    fn first_observation_only_sets_baseline() {
        let mut flash = FlashTracker::new(DECAY);
        let now = Instant::now();
        assert_eq!(flash.observe(&id("a"), 10.0, now), FlashState::Idle);
        assert_eq!(flash.last_price("a"), Some(10.0));
        assert!(flash.next_expiry().is_none());
    }

    #[test]
    fn flash_follows_sign_of_delta_and_decays() {
        let mut flash = FlashTracker::new(DECAY);
        let t0 = Instant::now();
        flash.observe(&id("a"), 10.0, t0);

        assert_eq!(flash.observe(&id("a"), 12.0, t0), FlashState::Up);
        assert_eq!(flash.state("a", t0 + Duration::from_millis(649)), FlashState::Up);
        assert_eq!(flash.state("a", t0 + DECAY), FlashState::Idle);

        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(flash.observe(&id("a"), 11.0, t1), FlashState::Down);
    }

    #[test]
    fn unchanged_price_does_not_transition() {
        let mut flash = FlashTracker::new(DECAY);
        let t0 = Instant::now();
        flash.observe(&id("a"), 10.0, t0);
        flash.observe(&id("a"), 12.0, t0);

        let later = t0 + Duration::from_millis(400);
        assert_eq!(flash.observe(&id("a"), 12.0, later), FlashState::Up);
        assert_eq!(flash.next_expiry(), Some(t0 + DECAY));

        let idle_later = t0 + Duration::from_secs(2);
        assert_eq!(flash.observe(&id("a"), 12.0, idle_later), FlashState::Idle);
    }

    #[test]
    fn new_move_restarts_the_timer() {
        let mut flash = FlashTracker::new(DECAY);
        let t0 = Instant::now();
        flash.observe(&id("a"), 10.0, t0);
        flash.observe(&id("a"), 12.0, t0);

        let t1 = t0 + Duration::from_millis(500);
        assert_eq!(flash.observe(&id("a"), 11.0, t1), FlashState::Down);
        assert_eq!(flash.state("a", t0 + Duration::from_millis(900)), FlashState::Down);
        assert_eq!(flash.state("a", t1 + DECAY), FlashState::Idle);
    }

    #[test]
    fn sweep_reverts_expired_rows() {
        let mut flash = FlashTracker::new(DECAY);
        let t0 = Instant::now();
        for (name, price) in [("a", 1.0), ("b", 1.0)] {
            flash.observe(&id(name), price, t0);
        }
        flash.observe(&id("a"), 2.0, t0);
        flash.observe(&id("b"), 0.5, t0 + Duration::from_millis(300));

        let reverted = flash.sweep(t0 + DECAY);
        assert_eq!(reverted, vec![id("a")]);
        assert_eq!(flash.next_expiry(), Some(t0 + Duration::from_millis(950)));
    }

    #[test]
    fn sync_prunes_tokens_that_left_the_store() {
        let mut flash = FlashTracker::new(DECAY);
        let now = Instant::now();
        flash.observe(&id("gone"), 1.0, now);
        flash.observe(&id("a"), 1.0, now);

        let store = TokenStore::from_tokens(vec![token("a", 1.0), token("b", 3.0)]);
        flash.sync_with(&store, now);

        assert_eq!(flash.len(), 2);
        assert!(flash.last_price("gone").is_none());
        assert_eq!(flash.state("a", now), FlashState::Idle);
        assert_eq!(flash.last_price("b"), Some(3.0));
    }
}
