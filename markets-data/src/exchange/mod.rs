use crate::{
    error::DataError,
    http::{DEFAULT_HTTP_TIMEOUT, RestClient},
    model::{FundingRates, MarketTicker, dedup_symbols},
};
use async_trait::async_trait;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{cmp::Reverse, str::FromStr, sync::Arc, time::Duration};

/// [`BinanceFuturesUsd`](binance::BinanceFuturesUsd) REST adapter.
pub mod binance;

/// [`BybitPerpetualsUsd`](bybit::BybitPerpetualsUsd) REST adapter.
pub mod bybit;

/// Unique identifier for every supported exchange.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum ExchangeId {
    #[display("binance")]
    BinanceFuturesUsd,
    #[display("bybit")]
    BybitPerpetualsUsd,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 2] = [
        ExchangeId::BinanceFuturesUsd,
        ExchangeId::BybitPerpetualsUsd,
    ];

    /// Static description of this exchange's REST endpoints.
    pub fn descriptor(&self) -> &'static ExchangeDescriptor {
        match self {
            ExchangeId::BinanceFuturesUsd => &binance::DESCRIPTOR,
            ExchangeId::BybitPerpetualsUsd => &bybit::DESCRIPTOR,
        }
    }

    /// Cache key for this exchange's ticker snapshot.
    pub fn ticker_cache_key(&self) -> String {
        format!("{self}:ticker")
    }

    /// Cache key for this exchange's funding snapshot.
    pub fn funding_cache_key(&self) -> String {
        format!("{self}:funding")
    }

    /// Next exchange in selector order, wrapping around.
    pub fn next(&self) -> Self {
        let index = Self::ALL.iter().position(|id| id == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    /// Previous exchange in selector order, wrapping around.
    pub fn previous(&self) -> Self {
        let index = Self::ALL.iter().position(|id| id == self).unwrap_or(0);
        Self::ALL[(index + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl FromStr for ExchangeId {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" | "binance_futures_usd" | "binancefuturesusd" => {
                Ok(ExchangeId::BinanceFuturesUsd)
            }
            "bybit" | "bybit_perpetuals_usd" | "bybitperpetualsusd" => {
                Ok(ExchangeId::BybitPerpetualsUsd)
            }
            _ => Err(DataError::UnknownExchange(s.to_string())),
        }
    }
}

/// Static, immutable description of one exchange's REST surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDescriptor {
    pub id: ExchangeId,
    pub name: &'static str,
    pub ticker_endpoint: &'static str,
    pub funding_endpoint: Option<&'static str>,
}

/// Adapter tuning shared by every exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Settlement asset that every retained pair is quoted in.
    pub quote_asset: String,
    /// Maximum number of symbols kept per snapshot, by quote volume.
    pub top_n: usize,
    /// Symbols per batch when funding must be fetched one symbol at a time.
    pub funding_batch_size: usize,
    /// Pause between funding batches.
    pub funding_batch_delay: Duration,
    pub http_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            top_n: 100,
            funding_batch_size: 10,
            funding_batch_delay: Duration::from_millis(200),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl AdapterConfig {
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_funding_batch_size(mut self, size: usize) -> Self {
        self.funding_batch_size = size.max(1);
        self
    }

    pub fn with_funding_batch_delay(mut self, delay: Duration) -> Self {
        self.funding_batch_delay = delay;
        self
    }
}

/// Fetches raw exchange data and normalises it into [`MarketTicker`]s.
#[async_trait]
pub trait MarketAdapter: Send + Sync {
    fn id(&self) -> ExchangeId;

    fn descriptor(&self) -> &'static ExchangeDescriptor {
        self.id().descriptor()
    }

    /// Fetch the bounded, normalised ticker list. Funding is left as the sentinel.
    async fn fetch_ticker(&self) -> Result<Vec<MarketTicker>, DataError>;

    /// Fetch funding rates, optionally only for `symbols`.
    async fn fetch_funding(&self, symbols: &[String]) -> Result<FundingRates, DataError>;
}

/// Construct the REST adapter for `exchange`.
pub fn adapter_for(exchange: ExchangeId, config: AdapterConfig) -> Arc<dyn MarketAdapter> {
    let client = RestClient::new(config.http_timeout);
    match exchange {
        ExchangeId::BinanceFuturesUsd => Arc::new(binance::BinanceFuturesUsd::new(client, config)),
        ExchangeId::BybitPerpetualsUsd => Arc::new(bybit::BybitPerpetualsUsd::new(client, config)),
    }
}

/// Keep pairs quoted in `quote`, order by quote volume descending, cap at `top_n` and drop
/// duplicate symbols. Unparsable quote volumes rank last.
pub fn select_top_by_quote_volume(
    tickers: Vec<MarketTicker>,
    quote: &str,
    top_n: usize,
) -> Vec<MarketTicker> {
    let mut tickers = tickers
        .into_iter()
        .filter(|ticker| ticker.symbol.ends_with(quote))
        .collect::<Vec<_>>();

    tickers.sort_by_key(|ticker| Reverse(Decimal::from_str(&ticker.quote_volume).ok()));

    let mut tickers = dedup_symbols(tickers);
    tickers.truncate(top_n);
    tickers
}
