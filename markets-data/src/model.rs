//! Normalised market data shared by every exchange adapter.

use fnv::FnvHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Funding rate shown when an exchange did not provide one for a symbol.
pub const FUNDING_UNAVAILABLE: &str = "-";

/// Funding rate per symbol, as the raw decimal string the exchange returned.
pub type FundingRates = FnvHashMap<String, String>;

/// Normalised 24h ticker for one perpetual contract.
///
/// Numeric fields stay decimal strings until display so no precision is lost between the
/// exchange payload and the screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct MarketTicker {
    /// Exchange symbol, eg/ "BTCUSDT".
    pub symbol: String,
    pub last_price: String,
    /// 24h volume in the base asset.
    pub volume: String,
    /// 24h volume in the quote asset.
    pub quote_volume: String,
    /// 24h change, already scaled to percent (eg/ "2.45" is +2.45%).
    pub price_change_percent: Option<String>,
    /// Raw funding rate fraction, or [`FUNDING_UNAVAILABLE`].
    pub funding_rate: String,
}

impl MarketTicker {
    /// Construct a ticker with the funding rate not yet known.
    pub fn new(
        symbol: impl Into<String>,
        last_price: impl Into<String>,
        volume: impl Into<String>,
        quote_volume: impl Into<String>,
        price_change_percent: Option<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            last_price: last_price.into(),
            volume: volume.into(),
            quote_volume: quote_volume.into(),
            price_change_percent,
            funding_rate: FUNDING_UNAVAILABLE.to_string(),
        }
    }

    pub fn has_funding(&self) -> bool {
        self.funding_rate != FUNDING_UNAVAILABLE
    }

    /// Symbol with the quote asset suffix removed, eg/ "BTCUSDT" -> "BTC".
    pub fn base_asset<'a>(&'a self, quote: &str) -> &'a str {
        self.symbol.strip_suffix(quote).unwrap_or(&self.symbol)
    }
}

/// Attach funding rates to tickers. Symbols without a rate get [`FUNDING_UNAVAILABLE`].
pub fn merge_funding(tickers: Vec<MarketTicker>, funding: &FundingRates) -> Vec<MarketTicker> {
    tickers
        .into_iter()
        .map(|mut ticker| {
            ticker.funding_rate = funding
                .get(&ticker.symbol)
                .cloned()
                .unwrap_or_else(|| FUNDING_UNAVAILABLE.to_string());
            ticker
        })
        .collect()
}

/// Drop repeated symbols, keeping the first occurrence.
pub fn dedup_symbols(tickers: Vec<MarketTicker>) -> Vec<MarketTicker> {
    tickers
        .into_iter()
        .unique_by(|ticker| ticker.symbol.clone())
        .collect()
}
