use std::borrow::Borrow;
use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Opaque, immutable token identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TokenId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TokenId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TokenId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle category a token is listed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenStatus {
    New,
    FinalStretch,
    Migrated,
}

impl TokenStatus {
    pub const ALL: [TokenStatus; 3] = [
        TokenStatus::New,
        TokenStatus::FinalStretch,
        TokenStatus::Migrated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TokenStatus::New => "new",
            TokenStatus::FinalStretch => "final-stretch",
            TokenStatus::Migrated => "migrated",
        }
    }

    /// Label used on the status badge in the detail view.
    pub fn badge_label(self) -> &'static str {
        match self {
            TokenStatus::New => "New",
            TokenStatus::FinalStretch => "Final Stretch",
            TokenStatus::Migrated => "Migrated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current snapshot of a single listed token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    pub symbol: String,
    pub name: String,
    /// Display pair, e.g. "TKN1/USDC".
    pub pair: String,
    pub price: f64,
    /// Percent change over 24h.
    pub change24h: f64,
    pub volume24h: u64,
    pub liquidity: u64,
    pub status: TokenStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// Smallest price a token may carry.
pub const PRICE_FLOOR: f64 = 0.000_001;

pub fn clamp_price(price: f64) -> f64 {
    if price.is_finite() && price > PRICE_FLOOR {
        price
    } else {
        PRICE_FLOOR
    }
}

/// Rounds half away from zero at `dp` decimal places, in decimal arithmetic.
/// Values `Decimal` cannot represent are returned unchanged.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Row-style price: 4 decimals at or above 1, 6 below.
pub fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("{price:.4}")
    } else {
        format!("{price:.6}")
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

/// Integer with `,` thousands separators.
pub fn format_grouped(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&TokenStatus::FinalStretch).unwrap();
        assert_eq!(json, "\"final-stretch\"");
        assert_eq!(TokenStatus::parse("migrated"), Some(TokenStatus::Migrated));
        assert_eq!(TokenStatus::parse("old"), None);
    }

    #[test]
    fn token_decodes_camel_case_payload() {
        let json = r#"{
            "id": "abc", "symbol": "TKN1", "name": "Token 1", "pair": "TKN1/USDC",
            "price": 1.5, "change24h": -3.25, "volume24h": 1200, "liquidity": 90,
            "status": "new"
        }"#;
        let token: Token = serde_json::from_str(json).unwrap();
        assert_eq!(token.id.as_str(), "abc");
        assert_eq!(token.change24h, -3.25);
        assert_eq!(token.status, TokenStatus::New);
        assert!(token.logo.is_none());
    }

    #[test]
    fn price_is_clamped_to_floor() {
        assert_eq!(clamp_price(-2.0), PRICE_FLOOR);
        assert_eq!(clamp_price(0.0), PRICE_FLOOR);
        assert_eq!(clamp_price(f64::NAN), PRICE_FLOOR);
        assert_eq!(clamp_price(3.0), 3.0);
    }

    #[test]
    fn rounds_in_decimal() {
        assert_eq!(round_dp(1.23456789, 6), 1.234568);
        assert_eq!(round_dp(2.5, 0), 3.0);
        assert_eq!(round_dp(-0.125, 2), -0.13);
        assert!(round_dp(f64::INFINITY, 2).is_infinite());
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(format_price(12.5), "12.5000");
        assert_eq!(format_price(0.5), "0.500000");
        assert_eq!(format_percent(-1.234), "-1.23%");
        assert_eq!(format_grouped(0), "0");
        assert_eq!(format_grouped(999), "999");
        assert_eq!(format_grouped(1_000), "1,000");
        assert_eq!(format_grouped(4_999_999), "4,999,999");
    }
}
