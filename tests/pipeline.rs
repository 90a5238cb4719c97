use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::Instant;

use token_feed_engine::config::{Config, FeedConfig, ViewConfig};
use token_feed_engine::market_data::feed::FeedSimulator;
use token_feed_engine::market_data::loader::LoadState;
use token_feed_engine::market_data::source::{MockTokenSource, generate_mock_tokens};
use token_feed_engine::state::token::TokenStatus;
use token_feed_engine::table::intent::TableIntent;
use token_feed_engine::table::runtime::spawn_engine;
use token_feed_engine::table::{IntentOutcome, TokenTable};
use token_feed_engine::view::flash::FlashState;
use token_feed_engine::view::projection::{Filter, Projection, SortDirection, SortKey, SortSpec};

fn seeded_feed() -> FeedConfig {
    FeedConfig {
        seed: Some(7),
        burst_fraction: 0.2,
        ..FeedConfig::default()
    }
}

/// Every projection row must be in filter and sort order after each update.
fn assert_ordered(table: &TokenTable) {
    let store = table.store();
    let projection = table.projection();
    let rows: Vec<_> = (0..projection.len())
        .map(|i| projection.token_at(i, store).unwrap())
        .collect();

    for token in &rows {
        assert!(projection.filter().matches(token));
    }
    if let Some((key, direction)) = projection.sort().active() {
        for pair in rows.windows(2) {
            let ordering = key.compare(pair[0], pair[1]);
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            assert!(ordering.is_le(), "{} before {}", pair[0].id, pair[1].id);
        }
    }

    let mut rebuilt = Projection::new(projection.filter(), projection.sort());
    rebuilt.rebuild(store);
    assert_eq!(rebuilt.slots(), projection.slots());
}

#[tokio::test]
async fn simulated_feed_keeps_the_projection_consistent() {
    let mut rng = StdRng::seed_from_u64(42);
    let tokens = generate_mock_tokens(80, &mut rng);
    let mut simulator = FeedSimulator::new(&tokens, &seeded_feed()).unwrap();

    let mut table = TokenTable::new(&ViewConfig::default());
    let now = Instant::now();
    table.load_succeeded(tokens, now);
    table.handle_intent(TableIntent::SetFilter(Filter::Status(TokenStatus::Migrated)));
    table.handle_intent(TableIntent::ToggleSort(SortKey::Price));
    assert_eq!(table.projection().len(), 26);

    let mut flashed = 0;
    for update in simulator.by_ref().take(200).flatten() {
        assert!(table.apply_update(&update, now));
        if table.flash_state(update.id.as_str(), now) != FlashState::Idle {
            flashed += 1;
        }
        assert_ordered(&table);
    }
    assert!(flashed > 0);

    table.handle_intent(TableIntent::ToggleSort(SortKey::Volume24h));
    table.handle_intent(TableIntent::SetFilter(Filter::All));
    assert_eq!(
        table.projection().sort(),
        SortSpec::new(SortKey::Volume24h, SortDirection::Desc)
    );
    for update in simulator.take(50).flatten() {
        table.apply_update(&update, now);
        assert_ordered(&table);
    }
}

#[tokio::test]
async fn window_tracks_scrolling_over_the_sorted_projection() {
    let mut rng = StdRng::seed_from_u64(1);
    let tokens = generate_mock_tokens(80, &mut rng);
    let mut table = TokenTable::new(&ViewConfig::default());
    let now = Instant::now();
    table.load_succeeded(tokens, now);
    table.handle_intent(TableIntent::ToggleSort(SortKey::Change24h));

    table.handle_intent(TableIntent::ScrollToIndex(79));
    let rows = table.visible_rows(now);
    let last = rows.last().unwrap();
    assert_eq!(last.index, 79);
    assert_eq!(last.offset, 79.0 * 64.0);

    let expected: Vec<_> = table.ordered_ids()[rows[0].index..=79].to_vec();
    let keys: Vec<_> = rows.iter().map(|row| row.key.clone()).collect();
    assert_eq!(keys, expected);

    assert_eq!(table.handle_intent(TableIntent::Scroll(-50.0)), IntentOutcome::Applied);
    assert_eq!(table.viewport().scroll_offset, 0.0);
    assert_eq!(table.window().start, 0);
}

#[tokio::test(start_paused = true)]
async fn engine_runs_over_the_mock_source() {
    let mut config = Config::default();
    config.fetch.seed = Some(3);
    config.fetch.token_count = 40;
    config.feed = seeded_feed();

    let source = Arc::new(MockTokenSource::new(&config.fetch));
    let engine = spawn_engine(&config, source);
    let mut views = engine.views();

    assert_eq!(engine.latest().load, LoadState::Loading);
    let ready = views
        .wait_for(|view| view.load.is_ready())
        .await
        .unwrap()
        .clone();
    assert_eq!(ready.total_rows, 40);
    assert_eq!(ready.total_height, 40.0 * 64.0);
    assert_eq!(ready.range.visible_end, 10);

    engine
        .send(TableIntent::SetFilter(Filter::Status(TokenStatus::New)))
        .await
        .unwrap();
    let filtered = views
        .wait_for(|view| view.filter == Filter::Status(TokenStatus::New))
        .await
        .unwrap()
        .clone();
    assert_eq!(filtered.total_rows, 14);
    assert!(filtered.rows.iter().all(|row| row.status == TokenStatus::New));

    let version = filtered.store_version;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(engine.latest().store_version > version);

    engine.shutdown().await.unwrap();
}
