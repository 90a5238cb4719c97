//! The live token table: store, projection, window, flashes and selection
//! owned together and driven by feed updates and user intents.

pub mod intent;
pub mod runtime;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ViewConfig;
use crate::market_data::loader::LoadState;
use crate::market_data::merger::{StoreListener, UpdateMerger};
use crate::market_data::types::PriceUpdate;
use crate::state::token::{Token, TokenId, TokenStatus, format_grouped, format_percent, format_price};
use crate::state::token_store::TokenStore;
use crate::view::flash::{FlashState, FlashTracker};
use crate::view::projection::{Filter, Projection, SortSpec};
use crate::view::selection::{DetailView, Selection};
use crate::view::virtualizer::{Viewport, Virtualizer, WindowRange};

use intent::TableIntent;

/// What the caller must do after an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    /// Nothing to do in the current state.
    Ignored,
    /// The table entered `Loading`; the caller must start a fetch.
    ReloadRequested,
}

/// One materialized row, keyed by token id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowView {
    pub key: TokenId,
    pub index: usize,
    /// Absolute top offset in pixels.
    pub offset: f64,
    pub symbol: String,
    pub name: String,
    pub pair: String,
    pub status: TokenStatus,
    pub price: f64,
    pub change24h: f64,
    pub volume24h: u64,
    pub liquidity: u64,
    pub price_display: String,
    pub change_display: String,
    pub volume_display: String,
    pub change_up: bool,
    pub flash: FlashState,
}

impl RowView {
    fn render(token: &Token, index: usize, offset: f64, flash: FlashState) -> Self {
        Self {
            key: token.id.clone(),
            index,
            offset,
            symbol: token.symbol.clone(),
            name: token.name.clone(),
            pair: token.pair.clone(),
            status: token.status,
            price: token.price,
            change24h: token.change24h,
            volume24h: token.volume24h,
            liquidity: token.liquidity,
            price_display: format!("${}", format_price(token.price)),
            change_display: format_percent(token.change24h),
            volume_display: format_grouped(token.volume24h),
            change_up: token.change24h >= 0.0,
            flash,
        }
    }
}

/// Immutable snapshot handed to the presentation side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub load: LoadState,
    pub filter: Filter,
    pub sort: SortSpec,
    pub total_rows: usize,
    pub total_height: f64,
    pub viewport: Viewport,
    pub range: WindowRange,
    pub rows: Vec<RowView>,
    pub detail: DetailView,
    pub store_version: u64,
}

impl TableView {
    pub fn empty() -> Self {
        Self {
            load: LoadState::Loading,
            filter: Filter::All,
            sort: SortSpec::NONE,
            total_rows: 0,
            total_height: 0.0,
            viewport: Viewport::new(0.0, 0.0),
            range: WindowRange::default(),
            rows: Vec::new(),
            detail: DetailView::render(None, false),
            store_version: 0,
        }
    }
}

pub struct TokenTable {
    merger: UpdateMerger,
    projection: Projection,
    virtualizer: Virtualizer,
    viewport: Viewport,
    flash: FlashTracker,
    selection: Selection,
    load: LoadState,
}

impl TokenTable {
    pub fn new(config: &ViewConfig) -> Self {
        Self {
            merger: UpdateMerger::new(),
            projection: Projection::default(),
            virtualizer: Virtualizer::new(config.row_height, config.overscan),
            viewport: Viewport::new(0.0, config.viewport_height),
            flash: FlashTracker::new(config.flash_decay),
            selection: Selection::default(),
            load: LoadState::Loading,
        }
    }

    pub fn add_store_listener(&mut self, listener: Box<dyn StoreListener>) {
        self.merger.add_listener(listener);
    }

    /// Installs a freshly fetched collection, replacing everything before it.
    pub fn load_succeeded(&mut self, tokens: Vec<Token>, now: Instant) {
        self.merger.replace_all(tokens);
        self.after_replace(now);
        self.load = LoadState::Ready;
        info!(tokens = self.store().len(), "token table ready");
    }

    /// Enters the error state. Previously loaded tokens are discarded.
    pub fn load_failed(&mut self, error: impl ToString, now: Instant) {
        let error = error.to_string();
        warn!(%error, "token table failed to load");
        self.merger.replace_all(Vec::new());
        self.after_replace(now);
        self.load = LoadState::Failed { error };
    }

    fn after_replace(&mut self, now: Instant) {
        self.projection.rebuild(self.merger.store());
        self.flash.sync_with(self.merger.store(), now);
        self.clamp_viewport();
    }

    /// Merges one feed update; returns whether the store changed.
    pub fn apply_update(&mut self, update: &PriceUpdate, now: Instant) -> bool {
        let Some(change) = self.merger.apply(update) else {
            return false;
        };
        self.projection.on_token_changed(&change, self.merger.store());
        self.flash.observe(change.id(), change.current.price, now);
        true
    }

    pub fn handle_intent(&mut self, intent: TableIntent) -> IntentOutcome {
        debug!(?intent, "intent");
        match intent {
            TableIntent::ToggleSort(key) => self.set_sort(self.projection.sort().toggled(key)),
            TableIntent::SetSort(sort) => self.set_sort(sort),
            TableIntent::ClearSort => self.set_sort(SortSpec::NONE),
            TableIntent::ToggleDirection => {
                self.set_sort(self.projection.sort().with_toggled_direction())
            }
            TableIntent::SetFilter(filter) => {
                self.projection.set_filter(filter, self.merger.store());
                self.clamp_viewport();
            }
            TableIntent::Scroll(offset) => {
                self.viewport.scroll_offset = offset;
                self.clamp_viewport();
            }
            TableIntent::Resize(height) => {
                self.viewport.height = height.max(0.0);
                self.clamp_viewport();
            }
            TableIntent::ScrollToIndex(index) => {
                self.viewport.scroll_offset =
                    self.virtualizer
                        .scroll_to_index(index, self.projection.len(), self.viewport);
            }
            TableIntent::ActivateRow(id) => self.activate(id),
            TableIntent::ActivateIndex(index) => {
                if !self.load.is_ready() {
                    return IntentOutcome::Ignored;
                }
                let Some(token) = self.projection.token_at(index, self.merger.store()) else {
                    return IntentOutcome::Ignored;
                };
                let id = token.id.clone();
                self.activate(id);
            }
            TableIntent::Select(id) => self.selection.select(id),
            TableIntent::OpenDetail => self.selection.open_detail(),
            TableIntent::CloseDetail => self.selection.close_detail(),
            TableIntent::ToggleDetail => self.selection.toggle_detail(),
            TableIntent::Dismiss => {
                self.selection.close_detail();
                self.selection.select(None);
            }
            TableIntent::Retry => {
                if self.load.is_loading() {
                    return IntentOutcome::Ignored;
                }
                self.load = LoadState::Loading;
                return IntentOutcome::ReloadRequested;
            }
        }
        IntentOutcome::Applied
    }

    fn set_sort(&mut self, sort: SortSpec) {
        self.projection.set_sort(sort, self.merger.store());
    }

    fn activate(&mut self, id: TokenId) {
        self.selection.select(Some(id));
        self.selection.open_detail();
    }

    fn clamp_viewport(&mut self) {
        self.viewport.scroll_offset = self
            .virtualizer
            .clamp_offset(self.projection.len(), self.viewport);
    }

    /// Reverts expired flashes; returns whether any row changed.
    pub fn sweep_flashes(&mut self, now: Instant) -> bool {
        !self.flash.sweep(now).is_empty()
    }

    pub fn next_flash_expiry(&self) -> Option<Instant> {
        self.flash.next_expiry()
    }

    pub fn window(&self) -> WindowRange {
        self.virtualizer.range(self.projection.len(), self.viewport)
    }

    /// Rows to materialize for the current viewport.
    pub fn visible_rows(&self, now: Instant) -> Vec<RowView> {
        if !self.load.is_ready() {
            return Vec::new();
        }
        let store = self.merger.store();
        self.virtualizer
            .items(self.projection.len(), self.viewport)
            .filter_map(|(index, offset)| {
                let token = self.projection.token_at(index, store)?;
                Some(RowView::render(
                    token,
                    index,
                    offset,
                    self.flash.state(token.id.as_str(), now),
                ))
            })
            .collect()
    }

    pub fn detail(&self) -> DetailView {
        DetailView::render(
            self.selection.resolve(self.merger.store()),
            self.selection.is_detail_open(),
        )
    }

    pub fn view(&self, now: Instant) -> TableView {
        let ready = self.load.is_ready();
        let total_rows = if ready { self.projection.len() } else { 0 };
        TableView {
            load: self.load.clone(),
            filter: self.projection.filter(),
            sort: self.projection.sort(),
            total_rows,
            total_height: self.virtualizer.total_height(total_rows),
            viewport: self.viewport,
            range: if ready { self.window() } else { WindowRange::default() },
            rows: self.visible_rows(now),
            detail: self.detail(),
            store_version: self.merger.store().version(),
        }
    }

    pub fn store(&self) -> &TokenStore {
        self.merger.store()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn ordered_ids(&self) -> Vec<TokenId> {
        self.projection.ids(self.merger.store()).cloned().collect()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn flash_state(&self, id: &str, now: Instant) -> FlashState {
        self.flash.state(id, now)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }
}
