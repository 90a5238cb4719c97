use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::config::{Config, FeedConfig};
use crate::market_data::feed::FeedHandle;
use crate::market_data::loader::{AUTO_RETRIES, fetch_with_retry};
use crate::market_data::merger::StoreListener;
use crate::market_data::source::{FetchError, TokenSource};
use crate::market_data::subscription::Subscription;
use crate::market_data::types::PriceUpdate;
use crate::state::token::Token;
use crate::table::intent::TableIntent;
use crate::table::{IntentOutcome, TableView, TokenTable};

/// Engine input buffer. Feed bursts beyond this are dropped at the
/// listener rather than back-pressuring the feed task.
const ENGINE_INPUT_BUFFER: usize = 4_096;

enum EngineInput {
    /// Tagged with the feed generation that produced it.
    Update { feed: u64, update: PriceUpdate },
    Intent(TableIntent),
    /// Tagged with the load generation that started the fetch.
    Loaded {
        load: u64,
        result: Result<Vec<Token>, FetchError>,
    },
    Shutdown,
}

/// Caller side of a running engine.
pub struct EngineHandle {
    inputs: mpsc::Sender<EngineInput>,
    views: watch::Receiver<Arc<TableView>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl EngineHandle {
    pub async fn send(&self, intent: TableIntent) -> anyhow::Result<()> {
        self.inputs
            .send(EngineInput::Intent(intent))
            .await
            .map_err(|_| anyhow!("engine stopped"))
    }

    /// A receiver that sees every published snapshot (latest wins).
    pub fn views(&self) -> watch::Receiver<Arc<TableView>> {
        self.views.clone()
    }

    pub fn latest(&self) -> Arc<TableView> {
        self.views.borrow().clone()
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        // A closed channel means the engine already exited; join reports why.
        let _ = self.inputs.send(EngineInput::Shutdown).await;
        self.task.await.context("engine task panicked")?
    }
}

pub fn spawn_engine(config: &Config, source: Arc<dyn TokenSource>) -> EngineHandle {
    spawn_engine_with(config, source, Vec::new())
}

/// Starts the engine task. It loads the token list, runs the feed over it
/// and publishes a [`TableView`] after every input it processes.
pub fn spawn_engine_with(
    config: &Config,
    source: Arc<dyn TokenSource>,
    listeners: Vec<Box<dyn StoreListener>>,
) -> EngineHandle {
    let (inputs_tx, inputs_rx) = mpsc::channel(ENGINE_INPUT_BUFFER);
    let (views_tx, views_rx) = watch::channel(Arc::new(TableView::empty()));

    let mut table = TokenTable::new(&config.view);
    for listener in listeners {
        table.add_store_listener(listener);
    }

    let engine = Engine {
        table,
        source,
        feed_config: config.feed.clone(),
        feed: FeedHandle::idle(),
        subscription: None,
        feed_generation: 0,
        load_generation: 0,
        inputs: inputs_tx.downgrade(),
        views: views_tx,
    };
    let task = tokio::spawn(engine.run(inputs_rx));

    EngineHandle {
        inputs: inputs_tx,
        views: views_rx,
        task,
    }
}

/// Exclusive owner of the table. Everything that mutates it arrives
/// through the input channel and is handled in order.
struct Engine {
    table: TokenTable,
    source: Arc<dyn TokenSource>,
    feed_config: FeedConfig,
    feed: FeedHandle,
    subscription: Option<Subscription>,
    feed_generation: u64,
    load_generation: u64,
    // Weak so dropping the EngineHandle closes the channel.
    inputs: mpsc::WeakSender<EngineInput>,
    views: watch::Sender<Arc<TableView>>,
}

impl Engine {
    async fn run(mut self, mut inputs: mpsc::Receiver<EngineInput>) -> anyhow::Result<()> {
        info!("engine started");
        self.start_load();
        self.publish();

        loop {
            let next_expiry = self.table.next_flash_expiry();
            tokio::select! {
                input = inputs.recv() => {
                    let Some(input) = input else {
                        info!("engine inputs closed");
                        break;
                    };
                    if !self.handle(input) {
                        break;
                    }
                }
                _ = flash_deadline(next_expiry) => {
                    self.table.sweep_flashes(Instant::now());
                }
            }
            self.publish();
        }

        self.stop_feed();
        info!("engine stopped");
        Ok(())
    }

    /// Returns false once the engine should exit.
    fn handle(&mut self, input: EngineInput) -> bool {
        let now = Instant::now();
        match input {
            EngineInput::Update { feed, update } => {
                if feed != self.feed_generation {
                    debug!(token_id = %update.id, "dropping update from a stopped feed");
                    return true;
                }
                self.table.apply_update(&update, now);
            }
            EngineInput::Intent(intent) => {
                if self.table.handle_intent(intent) == IntentOutcome::ReloadRequested {
                    self.stop_feed();
                    self.start_load();
                }
            }
            EngineInput::Loaded { load, result } => {
                if load != self.load_generation {
                    debug!(load, "ignoring superseded load");
                    return true;
                }
                match result {
                    Ok(tokens) => {
                        self.table.load_succeeded(tokens, now);
                        self.start_feed();
                    }
                    Err(err) => {
                        self.stop_feed();
                        self.table.load_failed(err, now);
                    }
                }
            }
            EngineInput::Shutdown => return false,
        }
        true
    }

    fn start_load(&mut self) {
        self.load_generation += 1;
        let load = self.load_generation;
        let source = self.source.clone();
        let inputs = self.inputs.clone();

        tokio::spawn(async move {
            let result = fetch_with_retry(source.as_ref(), AUTO_RETRIES).await;
            if let Some(inputs) = inputs.upgrade() {
                // Engine gone: nothing left to deliver to.
                let _ = inputs.send(EngineInput::Loaded { load, result }).await;
            }
        });
    }

    fn start_feed(&mut self) {
        self.stop_feed();
        let feed = self.feed_generation;
        self.feed = FeedHandle::start(self.table.store().tokens(), &self.feed_config);

        let inputs = self.inputs.clone();
        self.subscription = Some(self.feed.subscribe(move |update: &PriceUpdate| {
            let inputs = inputs.upgrade().ok_or_else(|| anyhow!("engine gone"))?;
            inputs
                .try_send(EngineInput::Update {
                    feed,
                    update: update.clone(),
                })
                .map_err(|err| anyhow!("engine input rejected update: {err}"))
        }));
    }

    fn stop_feed(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.feed.stop();
        // Anything the old feed already queued is now stale.
        self.feed_generation += 1;
    }

    fn publish(&self) {
        if self.views.receiver_count() == 0 {
            return;
        }
        self.views
            .send_replace(Arc::new(self.table.view(Instant::now())));
    }
}

async fn flash_deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::loader::LoadState;
    use crate::market_data::loader::tests::ScriptedSource;
    use crate::state::token_store::tests::token;
    use crate::view::projection::{SortDirection, SortKey, SortSpec};
    use std::sync::atomic::Ordering;

    fn tokens(n: usize) -> Vec<Token> {
        (0..n).map(|i| token(&format!("t{i}"), 1.0 + i as f64)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn loads_then_streams_updates() {
        let source = Arc::new(ScriptedSource::new(0, tokens(30)));
        let engine = spawn_engine(&Config::default(), source);
        let mut views = engine.views();

        let ready = views.wait_for(|view| view.load.is_ready()).await.unwrap().clone();
        assert_eq!(ready.total_rows, 30);
        assert_eq!(ready.rows.first().unwrap().key.as_str(), "t0");

        let version = ready.store_version;
        views
            .wait_for(|view| view.store_version > version)
            .await
            .unwrap();

        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failure_surfaces_then_retry_recovers() {
        let source = Arc::new(ScriptedSource::new(2, tokens(5)));
        let engine = spawn_engine(&Config::default(), source.clone());
        let mut views = engine.views();

        let failed = views
            .wait_for(|view| matches!(view.load, LoadState::Failed { .. }))
            .await
            .unwrap()
            .clone();
        assert!(failed.rows.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        engine.send(TableIntent::Retry).await.unwrap();
        let ready = views.wait_for(|view| view.load.is_ready()).await.unwrap().clone();
        assert_eq!(ready.total_rows, 5);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn intents_are_reflected_in_published_views() {
        let source = Arc::new(ScriptedSource::new(0, tokens(10)));
        let engine = spawn_engine(&Config::default(), source);
        let mut views = engine.views();
        views.wait_for(|view| view.load.is_ready()).await.unwrap();

        engine.send(TableIntent::ToggleSort(SortKey::Price)).await.unwrap();
        engine.send(TableIntent::ActivateIndex(0)).await.unwrap();

        let view = views
            .wait_for(|view| view.detail.open)
            .await
            .unwrap()
            .clone();
        assert_eq!(view.sort, SortSpec::new(SortKey::Price, SortDirection::Desc));
        let top = view.rows.first().unwrap().key.clone();
        assert_eq!(view.detail.token_id, Some(top));

        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_engine() {
        let source = Arc::new(ScriptedSource::new(0, tokens(3)));
        let engine = spawn_engine(&Config::default(), source);
        let mut views = engine.views();
        views.wait_for(|view| view.load.is_ready()).await.unwrap();

        drop(engine);
        while views.changed().await.is_ok() {}
        assert!(views.has_changed().is_err());
    }
}
