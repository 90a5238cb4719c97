use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::market_data::subscription::{ListenerRegistry, Subscription};
use crate::market_data::types::PriceUpdate;
use crate::metrics::prometheus::record_feed_events;
use crate::state::token::{PRICE_FLOOR, Token, TokenId, round_dp};

/// Largest relative price move per emitted update.
const MAX_PRICE_MOVE: f64 = 0.02;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("cannot simulate a feed over an empty token set")]
    NoTokens,
}

/// Per-token state the simulator evolves independently of the store.
#[derive(Debug, Clone)]
struct SimulatedToken {
    id: TokenId,
    price: f64,
    base_change: f64,
    base_volume: u64,
}

/// Endless generator of correlated price/change/volume updates.
///
/// Iterating yields one tick (a non-empty batch of updates) per call and
/// never ends. It cannot be rewound; build a new simulator for a new token
/// set.
pub struct FeedSimulator {
    tokens: Vec<SimulatedToken>,
    burst_fraction: f64,
    rng: StdRng,
}

impl FeedSimulator {
    pub fn new(tokens: &[Token], config: &FeedConfig) -> Result<Self, FeedError> {
        if tokens.is_empty() {
            return Err(FeedError::NoTokens);
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let tokens = tokens
            .iter()
            .map(|t| SimulatedToken {
                id: t.id.clone(),
                price: t.price,
                base_change: t.change24h,
                base_volume: t.volume24h,
            })
            .collect();

        Ok(Self {
            tokens,
            burst_fraction: config.burst_fraction,
            rng,
        })
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Upper bound on updates per tick: `max(1, ceil(fraction * n))`.
    pub fn max_burst(&self) -> usize {
        let scaled = (self.burst_fraction * self.tokens.len() as f64).ceil() as usize;
        scaled.max(1)
    }

    /// Produces the updates for one tick. Picks may repeat a token; each pick
    /// builds on the price emitted by the previous one.
    pub fn next_tick(&mut self) -> Vec<PriceUpdate> {
        let count = self.rng.gen_range(1..=self.max_burst());
        let timestamp_ms = unix_millis();
        (0..count)
            .map(|_| {
                let slot = self.rng.gen_range(0..self.tokens.len());
                let mut update = self.step(slot);
                update.timestamp_ms = Some(timestamp_ms);
                update
            })
            .collect()
    }

    fn step(&mut self, slot: usize) -> PriceUpdate {
        let pct = self.rng.gen_range(-MAX_PRICE_MOVE..MAX_PRICE_MOVE);
        let drift_weight = self.rng.gen_range(0.0..0.5);
        let volume_jitter = self.rng.gen_range(0.0..1.0);

        let token = &mut self.tokens[slot];
        let current = token.price;
        let price = round_dp((current * (1.0 + pct)).max(PRICE_FLOOR), 6).max(PRICE_FLOOR);
        token.price = price;

        let delta_pct = round_dp((price - current) / current.max(1.0) * 100.0, 4);
        let change24h = round_dp(token.base_change + delta_pct * drift_weight, 2);

        let base = token.base_volume as f64;
        let jitter = (base * 0.02 * volume_jitter).round();
        let volume24h = (base + jitter + delta_pct.abs() * 50.0).round().max(0.0) as u64;

        PriceUpdate::new(token.id.clone())
            .with_price(price)
            .with_change24h(change24h)
            .with_volume24h(volume24h)
    }

    /// Next tick delay: `base` plus up to `jitter`.
    pub fn next_delay(&mut self, base: Duration, jitter: Duration) -> Duration {
        if jitter.is_zero() {
            return base;
        }
        let extra = self.rng.gen_range(0..=jitter.as_millis() as u64);
        base + Duration::from_millis(extra)
    }
}

impl Iterator for FeedSimulator {
    type Item = Vec<PriceUpdate>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_tick())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Running feed. Stops when `stop` is called or the handle is dropped.
pub struct FeedHandle {
    listeners: ListenerRegistry,
    stopped: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// A producer that never emits; used when no simulator could be built.
    pub fn idle() -> Self {
        Self {
            listeners: ListenerRegistry::new(),
            stopped: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Builds and starts a feed over `tokens`, degrading to an idle producer
    /// when the simulator cannot be constructed.
    pub fn start(tokens: &[Token], config: &FeedConfig) -> Self {
        match FeedSimulator::new(tokens, config) {
            Ok(simulator) => spawn_feed(simulator, config),
            Err(err) => {
                warn!(error = %err, "feed simulator unavailable, no live updates");
                Self::idle()
            }
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&PriceUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if self.is_stopped() {
            return Subscription::detached();
        }
        self.listeners.subscribe(listener)
    }

    pub fn is_idle(&self) -> bool {
        self.task.is_none()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Whether the tick task has ended (always true for an idle feed).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Stops ticking and drops every listener. Nothing is delivered after
    /// this returns.
    pub fn stop(&mut self) {
        let was_stopped = self.stopped.swap(true, Ordering::AcqRel);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.listeners.clear();
        if !was_stopped {
            info!("feed stopped");
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives `simulator` on a tokio task, one tick per jittered interval.
pub fn spawn_feed(mut simulator: FeedSimulator, config: &FeedConfig) -> FeedHandle {
    let listeners = ListenerRegistry::new();
    let stopped = Arc::new(AtomicBool::new(false));
    let interval = config.interval;
    let jitter = config.jitter;

    info!(
        tokens = simulator.token_count(),
        max_burst = simulator.max_burst(),
        interval_ms = interval.as_millis() as u64,
        "feed started"
    );

    let task = tokio::spawn({
        let listeners = listeners.clone();
        let stopped = stopped.clone();
        async move {
            loop {
                let delay = simulator.next_delay(interval, jitter);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = listeners.emptied() => {
                        stopped.store(true, Ordering::Release);
                        info!("last feed listener detached, feed stopped");
                        return;
                    }
                }
                let updates = simulator.next_tick();
                record_feed_events(updates.len());
                debug!(count = updates.len(), "feed tick");
                for update in &updates {
                    if stopped.load(Ordering::Acquire) {
                        return;
                    }
                    listeners.dispatch(update);
                }
            }
        }
    });

    FeedHandle {
        listeners,
        stopped,
        task: Some(task),
    }
}
