/// Panel configuration, read from the environment with defaults
use std::{path::PathBuf, str::FromStr, time::Duration};

use markets_data::{AdapterConfig, ExchangeId};
use tracing::warn;

/// Default auto-refresh interval
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(8000);

/// Markets panel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    /// Exchange selected at startup
    pub exchange: ExchangeId,
    /// Auto-refresh interval
    pub refresh_interval: Duration,
    /// Whether auto-refresh starts enabled
    pub auto_refresh: bool,
    /// Durable storage file for favourites
    pub store_path: PathBuf,
    /// Log file (the terminal is owned by the UI)
    pub log_file: PathBuf,
    /// Adapter tuning passed to every exchange adapter
    pub adapter: AdapterConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeId::BinanceFuturesUsd,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            auto_refresh: true,
            store_path: PathBuf::from("markets-panel.json"),
            log_file: PathBuf::from("markets-panel.log"),
            adapter: AdapterConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Build the configuration from `MARKETS_*` environment variables
    pub fn from_env() -> Self {
        Self::default()
            .with_exchange(get_exchange())
            .with_refresh_interval(get_refresh_interval())
            .with_auto_refresh(get_auto_refresh())
            .with_top_n(get_top_n())
            .with_funding_batch(get_funding_batch_size(), get_funding_batch_delay())
            .with_store_path(get_store_path())
            .with_log_file(get_log_file())
    }

    /// Set the startup exchange
    pub fn with_exchange(mut self, exchange: ExchangeId) -> Self {
        self.exchange = exchange;
        self
    }

    /// Set the auto-refresh interval (minimum 1s)
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval.max(Duration::from_secs(1));
        self
    }

    /// Enable or disable auto-refresh at startup
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Set the number of symbols kept per snapshot
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.adapter = self.adapter.with_top_n(top_n);
        self
    }

    /// Set how per-symbol funding requests are batched
    pub fn with_funding_batch(mut self, size: usize, delay: Duration) -> Self {
        self.adapter = self
            .adapter
            .with_funding_batch_size(size)
            .with_funding_batch_delay(delay);
        self
    }

    /// Set the favourites storage file
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Set the log file
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(name, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Get exchange from MARKETS_EXCHANGE env var (default: binance)
fn get_exchange() -> ExchangeId {
    parse_var("MARKETS_EXCHANGE", ExchangeId::BinanceFuturesUsd)
}

/// Get refresh interval from MARKETS_REFRESH_MS env var (default: 8000)
fn get_refresh_interval() -> Duration {
    Duration::from_millis(parse_var("MARKETS_REFRESH_MS", 8000))
}

/// Get auto-refresh flag from MARKETS_AUTO_REFRESH env var (default: true)
fn get_auto_refresh() -> bool {
    std::env::var("MARKETS_AUTO_REFRESH")
        .map(|raw| parse_flag(&raw))
        .unwrap_or(true)
}

/// Get top-N from MARKETS_TOP_N env var (default: 100)
fn get_top_n() -> usize {
    parse_var("MARKETS_TOP_N", 100)
}

/// Get funding batch size from MARKETS_FUNDING_BATCH_SIZE env var (default: 10)
fn get_funding_batch_size() -> usize {
    parse_var("MARKETS_FUNDING_BATCH_SIZE", 10)
}

/// Get funding batch delay from MARKETS_FUNDING_BATCH_DELAY_MS env var (default: 200)
fn get_funding_batch_delay() -> Duration {
    Duration::from_millis(parse_var("MARKETS_FUNDING_BATCH_DELAY_MS", 200))
}

/// Get storage path from MARKETS_STORE_PATH env var (default: markets-panel.json)
fn get_store_path() -> PathBuf {
    std::env::var("MARKETS_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("markets-panel.json"))
}

/// Get log file from MARKETS_LOG_FILE env var (default: markets-panel.log)
fn get_log_file() -> PathBuf {
    std::env::var("MARKETS_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("markets-panel.log"))
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
