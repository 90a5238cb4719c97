use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::config::FetchConfig;
use crate::state::token::{Token, TokenId, TokenStatus, round_dp};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient fetch failure: {0}")]
    Transient(String),
    #[error("failed to decode token payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Asynchronous provider of the full token list.
///
/// Each call returns a complete, ordered collection; callers replace their
/// store with it rather than merging.
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_tokens(&self) -> Result<Vec<Token>, FetchError>;
}

/// Generates `count` plausible tokens. Statuses cycle through
/// new / final-stretch / migrated by position.
pub fn generate_mock_tokens(count: usize, rng: &mut impl Rng) -> Vec<Token> {
    (0..count)
        .map(|i| {
            let n = i + 1;
            let base = 1.0 + rng.gen_range(0.0..20.0);
            let price = round_dp(base * (1.0 + rng.gen_range(-0.06..0.06)), 6);
            Token {
                id: TokenId::random(),
                symbol: format!("TKN{n}"),
                name: format!("Token {n}"),
                pair: format!("TKN{n}/USDC"),
                price,
                change24h: round_dp(rng.gen_range(-20.0..20.0), 2),
                volume24h: rng.gen_range(0..1_000_000),
                liquidity: rng.gen_range(0..5_000_000),
                status: TokenStatus::ALL[i % TokenStatus::ALL.len()],
                logo: None,
            }
        })
        .collect()
}

/// In-process source with simulated latency and optional failures.
pub struct MockTokenSource {
    count: usize,
    min_delay: Duration,
    max_delay: Duration,
    failure_rate: f64,
    seed: Option<u64>,
    calls: AtomicU64,
}

impl MockTokenSource {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            count: config.token_count,
            min_delay: config.min_delay,
            max_delay: config.max_delay,
            failure_rate: config.failure_rate,
            seed: config.seed,
            calls: AtomicU64::new(0),
        }
    }

    fn rng(&self) -> StdRng {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(call)),
            None => StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_tokens(&self) -> Result<Vec<Token>, FetchError> {
        let mut rng = self.rng();
        let delay = if self.max_delay > self.min_delay {
            rng.gen_range(self.min_delay..self.max_delay)
        } else {
            self.min_delay
        };
        let fails = rng.gen_bool(self.failure_rate.clamp(0.0, 1.0));
        let tokens = generate_mock_tokens(self.count, &mut rng);

        tokio::time::sleep(delay).await;
        if fails {
            return Err(FetchError::Transient("simulated network error".to_string()));
        }
        Ok(tokens)
    }
}

/// Fetches a JSON array of tokens from an HTTP endpoint.
pub struct HttpTokenSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_tokens(&self) -> Result<Vec<Token>, FetchError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

pub fn source_from_config(config: &FetchConfig) -> Arc<dyn TokenSource> {
    match &config.tokens_url {
        Some(url) => Arc::new(HttpTokenSource::new(url.clone())),
        None => Arc::new(MockTokenSource::new(config)),
    }
}
