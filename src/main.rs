use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use token_feed_engine::config::Config;
use token_feed_engine::market_data::merger::{StoreEvent, StoreListener};
use token_feed_engine::market_data::source::source_from_config;
use token_feed_engine::metrics::init_metrics_server;
use token_feed_engine::state::token_store::TokenStore;
use token_feed_engine::table::TableView;
use token_feed_engine::table::intent::TableIntent;
use token_feed_engine::table::runtime::{EngineHandle, spawn_engine_with};

/// Single-update moves at or above this percentage are logged at info.
const LARGE_MOVE_PCT: f64 = 1.5;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

struct LargeMoveLogger;

impl StoreListener for LargeMoveLogger {
    fn name(&self) -> &'static str {
        "large-move-logger"
    }

    fn on_store_event(&mut self, event: &StoreEvent<'_>, store: &TokenStore) -> Result<()> {
        match event {
            StoreEvent::Replaced => info!(tokens = store.len(), "token list replaced"),
            StoreEvent::Changed(change) => {
                let before = change.previous.price;
                let after = change.current.price;
                let pct = (after - before) / before * 100.0;
                if pct.abs() >= LARGE_MOVE_PCT {
                    info!(
                        symbol = %change.current.symbol,
                        before,
                        after,
                        pct = format!("{pct:+.2}"),
                        "large price move"
                    );
                }
            }
        }
        Ok(())
    }
}

fn log_view(view: &TableView) {
    let rows: Vec<String> = view
        .rows
        .iter()
        .filter(|row| (view.range.visible_start..view.range.visible_end).contains(&row.index))
        .map(|row| {
            format!(
                "{:>3} {:<6} {:>14} {:>8} {:?}",
                row.index, row.symbol, row.price_display, row.change_display, row.flash
            )
        })
        .collect();

    info!(
        load = ?view.load,
        filter = %view.filter,
        sort = ?view.sort.active(),
        total = view.total_rows,
        window = ?(view.range.start..view.range.end),
        "view\n{}",
        rows.join("\n")
    );
    if view.detail.open {
        info!(
            title = %view.detail.title,
            price = %view.detail.price,
            change = %view.detail.change,
            volume = %view.detail.volume,
            liquidity = %view.detail.liquidity,
            status = %view.detail.status,
            "detail"
        );
    }
}

/// Logs the latest view every couple of seconds, when it changed.
async fn run_view_logger(engine: &EngineHandle) -> Result<()> {
    let mut views = engine.views();
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(2));
    loop {
        ticker.tick().await;
        if !views.has_changed()? {
            continue;
        }
        let view = views.borrow_and_update().clone();
        log_view(&view);
    }
}

/// Reads text commands from stdin and forwards them as intents.
async fn run_command_reader(engine: &EngineHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<TableIntent>() {
            Ok(intent) => engine.send(intent).await?,
            Err(err) => warn!(error = %err, command = %line.trim(), "invalid command"),
        }
    }
    info!("stdin closed, commands disabled");
    std::future::pending().await
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    if let Some(addr) = config.metrics_addr {
        init_metrics_server(addr)?;
        info!(%addr, "metrics exporter listening");
    }

    info!(
        tokens = config.fetch.token_count,
        feed_interval_ms = config.feed.interval.as_millis() as u64,
        "token-feed-engine starting"
    );

    let source = source_from_config(&config.fetch);
    let engine = spawn_engine_with(&config, source, vec![Box::new(LargeMoveLogger)]);

    tokio::select! {
        res = run_command_reader(&engine) => {
            if let Err(err) = res {
                warn!(error = %err, "command reader returned error");
            }
        }
        res = run_view_logger(&engine) => {
            if let Err(err) = res {
                warn!(error = %err, "view logger returned error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    engine.shutdown().await
}
