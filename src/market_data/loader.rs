use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::market_data::source::{FetchError, TokenSource};
use crate::metrics::prometheus::{record_fetch_attempt, record_fetch_latency_ms};
use crate::state::token::Token;

/// Automatic retries after a failed fetch before surfacing the error.
pub const AUTO_RETRIES: u32 = 1;

/// Where the token list is in its load lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LoadState {
    Loading,
    Ready,
    /// Terminal until the user asks for a retry.
    Failed { error: String },
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready)
    }
}

/// Fetches the full token list, retrying up to `retries` extra times.
pub async fn fetch_with_retry(
    source: &dyn TokenSource,
    retries: u32,
) -> Result<Vec<Token>, FetchError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let started = Instant::now();
        let result = source.fetch_tokens().await;
        record_fetch_latency_ms(started.elapsed().as_secs_f64() * 1_000.0);

        match result {
            Ok(tokens) => {
                record_fetch_attempt("ok");
                info!(source = source.name(), attempt, count = tokens.len(), "tokens fetched");
                return Ok(tokens);
            }
            Err(err) => {
                record_fetch_attempt("error");
                warn!(source = source.name(), attempt, error = %err, "token fetch failed");
                if attempt > retries {
                    return Err(err);
                }
            }
        }
    }
}
