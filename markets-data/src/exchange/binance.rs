use super::{
    AdapterConfig, ExchangeDescriptor, ExchangeId, MarketAdapter, select_top_by_quote_volume,
};
use crate::{
    error::DataError,
    http::RestClient,
    model::{FundingRates, MarketTicker},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Binance USD-M futures REST endpoints.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api>
pub const DESCRIPTOR: ExchangeDescriptor = ExchangeDescriptor {
    id: ExchangeId::BinanceFuturesUsd,
    name: "Binance",
    ticker_endpoint: "https://fapi.binance.com/fapi/v1/ticker/24hr",
    funding_endpoint: Some("https://fapi.binance.com/fapi/v1/premiumIndex"),
};

/// Subset of the `/fapi/v1/ticker/24hr` fields used by the panel.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceTicker24h {
    pub symbol: String,
    pub last_price: String,
    pub volume: String,
    pub quote_volume: String,
    #[serde(default)]
    pub price_change_percent: Option<String>,
}

impl From<BinanceTicker24h> for MarketTicker {
    fn from(raw: BinanceTicker24h) -> Self {
        MarketTicker::new(
            raw.symbol,
            raw.last_price,
            raw.volume,
            raw.quote_volume,
            raw.price_change_percent,
        )
    }
}

/// Subset of the `/fapi/v1/premiumIndex` fields used by the panel.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePremiumIndex {
    pub symbol: String,
    #[serde(default)]
    pub last_funding_rate: Option<String>,
}

/// Binance USD-M perpetual futures adapter. Funding is available from one bulk endpoint.
#[derive(Debug, Clone)]
pub struct BinanceFuturesUsd {
    client: RestClient,
    config: AdapterConfig,
}

impl BinanceFuturesUsd {
    pub fn new(client: RestClient, config: AdapterConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl MarketAdapter for BinanceFuturesUsd {
    fn id(&self) -> ExchangeId {
        ExchangeId::BinanceFuturesUsd
    }

    async fn fetch_ticker(&self) -> Result<Vec<MarketTicker>, DataError> {
        let raw = self
            .client
            .get_json::<Vec<BinanceTicker24h>>(DESCRIPTOR.ticker_endpoint)
            .await?;

        Ok(normalise_tickers(raw, &self.config))
    }

    async fn fetch_funding(&self, _: &[String]) -> Result<FundingRates, DataError> {
        let Some(endpoint) = DESCRIPTOR.funding_endpoint else {
            return Ok(FundingRates::default());
        };

        let raw = self
            .client
            .get_json::<Vec<BinancePremiumIndex>>(endpoint)
            .await?;

        let funding = funding_rates(raw);
        debug!(exchange = %self.id(), rates = funding.len(), "fetched funding rates");
        Ok(funding)
    }
}

/// Normalise the raw 24h ticker listing into the bounded panel snapshot.
pub fn normalise_tickers(raw: Vec<BinanceTicker24h>, config: &AdapterConfig) -> Vec<MarketTicker> {
    let tickers = raw.into_iter().map(MarketTicker::from).collect();
    select_top_by_quote_volume(tickers, &config.quote_asset, config.top_n)
}

/// Map premium index entries to `symbol -> lastFundingRate`, skipping empty rates.
pub fn funding_rates(raw: Vec<BinancePremiumIndex>) -> FundingRates {
    raw.into_iter()
        .filter_map(|entry| match entry.last_funding_rate {
            Some(rate) if !rate.trim().is_empty() => Some((entry.symbol, rate)),
            _ => None,
        })
        .collect()
}
