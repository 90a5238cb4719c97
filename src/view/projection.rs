//! Filtered, sorted ordering of the token store.
//!
//! The projection holds store slots rather than tokens, so rows always read
//! the live snapshot. A single-token update repositions at most that token;
//! filter, sort and full-store changes rebuild.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::prometheus::record_projection;
use crate::state::token::{Token, TokenId, TokenStatus};
use crate::state::token_store::{TokenChange, TokenStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Price,
    Change24h,
    Volume24h,
    Liquidity,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "price" => Some(SortKey::Price),
            "change24h" | "change" => Some(SortKey::Change24h),
            "volume24h" | "volume" => Some(SortKey::Volume24h),
            "liquidity" => Some(SortKey::Liquidity),
            _ => None,
        }
    }

    /// Compares two tokens on this key alone, ascending.
    pub fn compare(self, a: &Token, b: &Token) -> Ordering {
        match self {
            SortKey::Price => a.price.total_cmp(&b.price),
            SortKey::Change24h => a.change24h.total_cmp(&b.change24h),
            SortKey::Volume24h => a.volume24h.cmp(&b.volume24h),
            SortKey::Liquidity => a.liquidity.cmp(&b.liquidity),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Requested ordering. Sorting only applies when both parts are set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: Option<SortKey>,
    pub direction: Option<SortDirection>,
}

impl SortSpec {
    pub const NONE: SortSpec = SortSpec {
        key: None,
        direction: None,
    };

    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self {
            key: Some(key),
            direction: Some(direction),
        }
    }

    pub fn active(&self) -> Option<(SortKey, SortDirection)> {
        Some((self.key?, self.direction?))
    }

    /// Column-header click: a new key starts descending, the active key
    /// flips direction.
    pub fn toggled(self, key: SortKey) -> Self {
        match self.active() {
            Some((current, direction)) if current == key => Self::new(key, direction.flipped()),
            _ => Self::new(key, SortDirection::Desc),
        }
    }

    /// Flips direction, keeping the key. No direction becomes ascending.
    pub fn with_toggled_direction(self) -> Self {
        Self {
            key: self.key,
            direction: Some(match self.direction {
                Some(SortDirection::Asc) => SortDirection::Desc,
                _ => SortDirection::Asc,
            }),
        }
    }
}

/// Status tab the list is restricted to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    #[default]
    All,
    Status(TokenStatus),
}

impl Filter {
    pub const TABS: [Filter; 4] = [
        Filter::All,
        Filter::Status(TokenStatus::New),
        Filter::Status(TokenStatus::FinalStretch),
        Filter::Status(TokenStatus::Migrated),
    ];

    pub fn parse(s: &str) -> Option<Self> {
        if s == "all" {
            return Some(Filter::All);
        }
        TokenStatus::parse(s).map(Filter::Status)
    }

    pub fn matches(self, token: &Token) -> bool {
        match self {
            Filter::All => true,
            Filter::Status(status) => token.status == status,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Filter::All => "All",
            Filter::Status(TokenStatus::New) => "New pairs",
            Filter::Status(TokenStatus::FinalStretch) => "Final Stretch",
            Filter::Status(TokenStatus::Migrated) => "Migrated",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => f.write_str("all"),
            Filter::Status(status) => f.write_str(status.as_str()),
        }
    }
}

/// Total order for sorted projections: key in the requested direction, then
/// store position ascending so equal keys keep their store order.
fn order(key: SortKey, direction: SortDirection, a: (usize, &Token), b: (usize, &Token)) -> Ordering {
    let by_key = key.compare(a.1, b.1);
    let by_key = match direction {
        SortDirection::Asc => by_key,
        SortDirection::Desc => by_key.reverse(),
    };
    by_key.then(a.0.cmp(&b.0))
}

#[derive(Debug, Clone, Default)]
pub struct Projection {
    filter: Filter,
    sort: SortSpec,
    slots: Vec<usize>,
}

impl Projection {
    pub fn new(filter: Filter, sort: SortSpec) -> Self {
        Self {
            filter,
            sort,
            slots: Vec::new(),
        }
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn set_filter(&mut self, filter: Filter, store: &TokenStore) {
        self.filter = filter;
        self.rebuild(store);
    }

    pub fn set_sort(&mut self, sort: SortSpec, store: &TokenStore) {
        self.sort = sort;
        self.rebuild(store);
    }

    /// Recomputes the whole ordering from the store.
    pub fn rebuild(&mut self, store: &TokenStore) {
        let filter = self.filter;
        self.slots = store
            .iter()
            .enumerate()
            .filter(|(_, token)| filter.matches(token))
            .map(|(slot, _)| slot)
            .collect();

        if let Some((key, direction)) = self.sort.active() {
            let tokens = store.tokens();
            self.slots
                .sort_by(|&a, &b| order(key, direction, (a, &tokens[a]), (b, &tokens[b])));
        }

        record_projection("rebuild");
        debug!(filter = %self.filter, sort = ?self.sort, rows = self.slots.len(), "projection rebuilt");
    }

    /// Moves the changed token to its new position, if it has one.
    pub fn on_token_changed(&mut self, change: &TokenChange, store: &TokenStore) {
        let was_member = self.filter.matches(&change.previous);
        let is_member = self.filter.matches(&change.current);
        if !was_member && !is_member {
            return;
        }

        let Some((key, direction)) = self.sort.active() else {
            if was_member != is_member {
                self.rebuild(store);
            }
            return;
        };
        if was_member && is_member && key.compare(&change.previous, &change.current).is_eq() {
            return;
        }

        let tokens = store.tokens();
        let moved = change.slot;

        if was_member {
            let found = self.slots.binary_search_by(|&slot| {
                if slot == moved {
                    Ordering::Equal
                } else {
                    order(key, direction, (slot, &tokens[slot]), (moved, &change.previous))
                }
            });
            match found {
                Ok(position) if self.slots[position] == moved => {
                    self.slots.remove(position);
                }
                _ => {
                    self.rebuild(store);
                    return;
                }
            }
        }

        if is_member {
            let position = self.slots.partition_point(|&slot| {
                order(key, direction, (slot, &tokens[slot]), (moved, &change.current)).is_lt()
            });
            self.slots.insert(position, moved);
        }
        record_projection("reposition");
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store slots in projection order.
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn token_at<'a>(&self, index: usize, store: &'a TokenStore) -> Option<&'a Token> {
        self.slots.get(index).and_then(|&slot| store.by_slot(slot))
    }

    pub fn ids<'a>(&'a self, store: &'a TokenStore) -> impl Iterator<Item = &'a TokenId> + 'a {
        self.slots
            .iter()
            .filter_map(|&slot| store.by_slot(slot))
            .map(|token| &token.id)
    }

    pub fn position_of(&self, id: &str, store: &TokenStore) -> Option<usize> {
        let slot = store.slot_of(id)?;
        self.slots.iter().position(|&s| s == slot)
    }
}
