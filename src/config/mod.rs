use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub fetch: FetchConfig,
    pub feed: FeedConfig,
    pub view: ViewConfig,
    pub metrics_addr: Option<SocketAddr>,
}

/// Initial token load.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub token_count: usize,
    /// Fetch over HTTP instead of generating mock tokens.
    pub tokens_url: Option<String>,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Probability in `[0, 1]` that a mock fetch fails.
    pub failure_rate: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub interval: Duration,
    /// Upper bound of the random delay added to each tick.
    pub jitter: Duration,
    /// Fraction of the token count bounding how many updates a tick emits.
    pub burst_fraction: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub row_height: f64,
    pub overscan: usize,
    pub viewport_height: f64,
    pub flash_decay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            token_count: 80,
            tokens_url: None,
            min_delay: Duration::from_millis(350),
            max_delay: Duration::from_millis(900),
            failure_rate: 0.0,
            seed: None,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(900),
            jitter: Duration::from_millis(100),
            burst_fraction: 0.03,
            seed: None,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            row_height: 64.0,
            overscan: 8,
            viewport_height: 600.0,
            flash_decay: Duration::from_millis(650),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            fetch: FetchConfig::default(),
            feed: FeedConfig::default(),
            view: ViewConfig::default(),
            metrics_addr: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults
    /// for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let seed = parse(&lookup, "FEED_SEED")?;

        let config = Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            fetch: FetchConfig {
                token_count: parse(&lookup, "TOKEN_COUNT")?.unwrap_or(defaults.fetch.token_count),
                tokens_url: lookup("TOKENS_URL").filter(|url| !url.trim().is_empty()),
                min_delay: parse_millis(&lookup, "FETCH_MIN_DELAY_MS")?
                    .unwrap_or(defaults.fetch.min_delay),
                max_delay: parse_millis(&lookup, "FETCH_MAX_DELAY_MS")?
                    .unwrap_or(defaults.fetch.max_delay),
                failure_rate: parse(&lookup, "FETCH_FAILURE_RATE")?
                    .unwrap_or(defaults.fetch.failure_rate),
                seed,
            },
            feed: FeedConfig {
                interval: parse_millis(&lookup, "FEED_INTERVAL_MS")?
                    .unwrap_or(defaults.feed.interval),
                jitter: parse_millis(&lookup, "FEED_JITTER_MS")?.unwrap_or(defaults.feed.jitter),
                burst_fraction: parse(&lookup, "FEED_BURST_FRACTION")?
                    .unwrap_or(defaults.feed.burst_fraction),
                seed,
            },
            view: ViewConfig {
                row_height: parse(&lookup, "ROW_HEIGHT")?.unwrap_or(defaults.view.row_height),
                overscan: parse(&lookup, "OVERSCAN")?.unwrap_or(defaults.view.overscan),
                viewport_height: parse(&lookup, "VIEWPORT_HEIGHT")?
                    .unwrap_or(defaults.view.viewport_height),
                flash_decay: parse_millis(&lookup, "FLASH_DECAY_MS")?
                    .unwrap_or(defaults.view.flash_decay),
            },
            metrics_addr: parse(&lookup, "METRICS_ADDR")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.view.row_height > 0.0) {
            bail!("ROW_HEIGHT must be positive, got {}", self.view.row_height);
        }
        if self.view.viewport_height < 0.0 {
            bail!("VIEWPORT_HEIGHT must not be negative");
        }
        if self.fetch.min_delay > self.fetch.max_delay {
            bail!("FETCH_MIN_DELAY_MS must not exceed FETCH_MAX_DELAY_MS");
        }
        if !(0.0..=1.0).contains(&self.fetch.failure_rate) {
            bail!("FETCH_FAILURE_RATE must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.feed.burst_fraction) {
            bail!("FEED_BURST_FRACTION must be within [0, 1]");
        }
        if self.feed.interval.is_zero() {
            bail!("FEED_INTERVAL_MS must be positive");
        }
        Ok(())
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
    }
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<Duration>> {
    Ok(parse::<u64>(lookup, key)?.map(Duration::from_millis))
}
