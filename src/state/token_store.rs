use std::collections::HashMap;

use crate::market_data::types::PriceUpdate;
use crate::state::token::{Token, TokenId, clamp_price};

/// Canonical keyed store of token snapshots.
///
/// Tokens keep the order in which the last full load delivered them; that
/// order is the fallback order of the projection and its sort tie-break.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    tokens: Vec<Token>,
    index: HashMap<TokenId, usize>,
    /// Bumped on every successful mutation.
    version: u64,
}

/// Result of applying one partial update in place.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenChange {
    /// Position of the token in store order.
    pub slot: usize,
    pub previous: Token,
    pub current: Token,
}

impl TokenChange {
    pub fn id(&self) -> &TokenId {
        &self.current.id
    }

    pub fn price_changed(&self) -> bool {
        self.previous.price != self.current.price
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a freshly fetched collection. Later duplicates of
    /// an id are dropped so ids stay unique.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        let mut store = Self::new();
        store.replace_all(tokens);
        store
    }

    /// Atomically swaps in a whole new collection, discarding every prior
    /// token.
    pub fn replace_all(&mut self, tokens: Vec<Token>) {
        let mut index = HashMap::with_capacity(tokens.len());
        let mut kept = Vec::with_capacity(tokens.len());
        for mut token in tokens {
            if index.contains_key(&token.id) {
                continue;
            }
            token.price = clamp_price(token.price);
            index.insert(token.id.clone(), kept.len());
            kept.push(token);
        }
        self.tokens = kept;
        self.index = index;
        self.version += 1;
    }

    /// Merges the fields present in `update` into the matching token.
    ///
    /// Returns `None` when the id is unknown; updates never create tokens.
    pub fn apply_partial(&mut self, update: &PriceUpdate) -> Option<TokenChange> {
        let slot = *self.index.get(&update.id)?;
        let token = &mut self.tokens[slot];
        let previous = token.clone();

        if let Some(price) = update.price.filter(|p| p.is_finite()) {
            token.price = clamp_price(price);
        }
        if let Some(change) = update.change24h.filter(|c| c.is_finite()) {
            token.change24h = change;
        }
        if let Some(volume) = update.volume24h {
            token.volume24h = volume;
        }

        let current = token.clone();
        self.version += 1;
        Some(TokenChange {
            slot,
            previous,
            current,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Token> {
        self.index.get(id).map(|&slot| &self.tokens[slot])
    }

    pub fn slot_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn by_slot(&self, slot: usize) -> Option<&Token> {
        self.tokens.get(slot)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Tokens in store order.
    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
