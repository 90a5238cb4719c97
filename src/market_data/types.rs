use serde::{Deserialize, Serialize};

use crate::state::token::TokenId;

/// Sparse patch to one token's numeric fields.
///
/// Absent fields leave the target token unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub id: TokenId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change24h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume24h: Option<u64>,
    /// Unix milliseconds at which the feed produced the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl PriceUpdate {
    pub fn new(id: impl Into<TokenId>) -> Self {
        Self {
            id: id.into(),
            price: None,
            change24h: None,
            volume24h: None,
            timestamp_ms: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_change24h(mut self, change24h: f64) -> Self {
        self.change24h = Some(change24h);
        self
    }

    pub fn with_volume24h(mut self, volume24h: u64) -> Self {
        self.volume24h = Some(volume24h);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.change24h.is_none() && self.volume24h.is_none()
    }
}
