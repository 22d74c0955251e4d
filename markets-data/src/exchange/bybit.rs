use super::{
    AdapterConfig, ExchangeDescriptor, ExchangeId, MarketAdapter, select_top_by_quote_volume,
};
use crate::{
    error::DataError,
    http::RestClient,
    model::{FundingRates, MarketTicker},
};
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::{future::Future, str::FromStr, time::Duration};
use tracing::{debug, warn};

/// Bybit V5 linear perpetual REST endpoints.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/tickers>
pub const DESCRIPTOR: ExchangeDescriptor = ExchangeDescriptor {
    id: ExchangeId::BybitPerpetualsUsd,
    name: "Bybit",
    ticker_endpoint: "https://api.bybit.com/v5/market/tickers?category=linear",
    funding_endpoint: Some("https://api.bybit.com/v5/market/funding/history"),
};

/// Generic Bybit V5 REST envelope.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitResponse<T> {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

impl<T> BybitResponse<T> {
    /// Unwrap the `result`, treating a non-zero `retCode` or a missing result as an API error.
    pub fn into_result(self) -> Result<T, DataError> {
        match (self.ret_code, self.result) {
            (0, Some(result)) => Ok(result),
            (code, _) => Err(DataError::Api {
                code,
                message: self.ret_msg,
            }),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct BybitList<T> {
    pub list: Vec<T>,
}

/// Subset of [`tickers`](https://bybit-exchange.github.io/docs/v5/market/tickers) fields.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitTicker {
    pub symbol: String,
    pub last_price: String,
    pub volume_24h: String,
    /// 24h change as a fraction, eg/ "0.0245" is +2.45%.
    pub price_24h_pcnt: String,
}

/// Subset of [`funding history`](https://bybit-exchange.github.io/docs/v5/market/history-fund-rate) fields.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitFundingHistory {
    pub symbol: String,
    pub funding_rate: String,
}

impl TryFrom<BybitTicker> for MarketTicker {
    type Error = rust_decimal::Error;

    fn try_from(raw: BybitTicker) -> Result<Self, Self::Error> {
        let price = Decimal::from_str(&raw.last_price)?;
        let volume = Decimal::from_str(&raw.volume_24h)?;
        let change_fraction = Decimal::from_str(&raw.price_24h_pcnt)?;

        let quote_volume = volume
            .checked_mul(price)
            .ok_or(rust_decimal::Error::ExceedsMaximumPossibleValue)?
            .normalize();
        let mut change_percent = change_fraction
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(rust_decimal::Error::ExceedsMaximumPossibleValue)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        change_percent.rescale(2);

        Ok(MarketTicker::new(
            raw.symbol,
            raw.last_price,
            raw.volume_24h,
            quote_volume.to_string(),
            Some(change_percent.to_string()),
        ))
    }
}

/// Bybit linear perpetual adapter. Funding is only available one symbol at a time, so it is
/// fetched in bounded batches.
#[derive(Debug, Clone)]
pub struct BybitPerpetualsUsd {
    client: RestClient,
    config: AdapterConfig,
}

impl BybitPerpetualsUsd {
    pub fn new(client: RestClient, config: AdapterConfig) -> Self {
        Self { client, config }
    }

    async fn fetch_symbol_funding(&self, symbol: String) -> Result<Option<String>, DataError> {
        let Some(endpoint) = DESCRIPTOR.funding_endpoint else {
            return Ok(None);
        };

        let response = self
            .client
            .get_json_with::<BybitResponse<BybitList<BybitFundingHistory>>>(
                endpoint,
                &[("category", "linear"), ("symbol", symbol.as_str()), ("limit", "1")],
            )
            .await?;

        Ok(response
            .into_result()?
            .list
            .into_iter()
            .next()
            .map(|entry| entry.funding_rate))
    }
}

#[async_trait]
impl MarketAdapter for BybitPerpetualsUsd {
    fn id(&self) -> ExchangeId {
        ExchangeId::BybitPerpetualsUsd
    }

    async fn fetch_ticker(&self) -> Result<Vec<MarketTicker>, DataError> {
        let response = self
            .client
            .get_json::<BybitResponse<BybitList<BybitTicker>>>(DESCRIPTOR.ticker_endpoint)
            .await?;

        Ok(normalise_tickers(response.into_result()?.list, &self.config))
    }

    async fn fetch_funding(&self, symbols: &[String]) -> Result<FundingRates, DataError> {
        let funding = fetch_in_batches(
            symbols,
            self.config.funding_batch_size,
            self.config.funding_batch_delay,
            |symbol| self.fetch_symbol_funding(symbol),
        )
        .await?;

        debug!(
            exchange = %self.id(),
            requested = symbols.len(),
            rates = funding.len(),
            "fetched funding rates"
        );
        Ok(funding)
    }
}

/// Normalise the raw linear ticker listing into the bounded panel snapshot. Rows whose
/// numeric fields cannot be parsed are dropped.
pub fn normalise_tickers(raw: Vec<BybitTicker>, config: &AdapterConfig) -> Vec<MarketTicker> {
    let tickers = raw
        .into_iter()
        .filter(|raw| raw.symbol.ends_with(&config.quote_asset))
        .filter_map(|raw| {
            let symbol = raw.symbol.clone();
            MarketTicker::try_from(raw)
                .inspect_err(|error| debug!(%symbol, %error, "dropping unparsable Bybit ticker"))
                .ok()
        })
        .collect();

    select_top_by_quote_volume(tickers, &config.quote_asset, config.top_n)
}

/// Run `fetch` for every symbol, `batch_size` concurrent requests at a time with `delay`
/// between batches. Failed or empty symbols are logged and left out of the result.
///
/// Fails with the last error if every request failed.
pub async fn fetch_in_batches<F, Fut>(
    symbols: &[String],
    batch_size: usize,
    delay: Duration,
    fetch: F,
) -> Result<FundingRates, DataError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Option<String>, DataError>>,
{
    let mut funding = FundingRates::default();
    let mut failures = 0;
    let mut last_error = None;

    for (index, batch) in symbols.chunks(batch_size.max(1)).enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let results = join_all(batch.iter().map(|symbol| {
            let request = fetch(symbol.clone());
            async move { (symbol, request.await) }
        }))
        .await;

        for (symbol, result) in results {
            match result {
                Ok(Some(rate)) => {
                    funding.insert(symbol.clone(), rate);
                }
                Ok(None) => debug!(%symbol, "no funding history returned"),
                Err(error) => {
                    warn!(%symbol, %error, "failed to fetch funding rate");
                    failures += 1;
                    last_error = Some(error);
                }
            }
        }
    }

    match last_error {
        Some(error) if failures == symbols.len() => Err(error),
        _ => Ok(funding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn raw(symbol: &str, last_price: &str, volume: &str, pcnt: &str) -> BybitTicker {
        BybitTicker {
            symbol: symbol.to_string(),
            last_price: last_price.to_string(),
            volume_24h: volume.to_string(),
            price_24h_pcnt: pcnt.to_string(),
        }
    }

    #[test]
    fn test_de_bybit_tickers_response() {
        let input = json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "linear",
                "list": [
                    {
                        "symbol": "BTCUSDT",
                        "lastPrice": "99850.10",
                        "indexPrice": "99860.00",
                        "markPrice": "99851.20",
                        "prevPrice24h": "97500.00",
                        "price24hPcnt": "0.024103",
                        "highPrice24h": "100200.00",
                        "lowPrice24h": "97000.00",
                        "volume24h": "81234.512",
                        "turnover24h": "8110452385.2",
                        "fundingRate": "0.0001"
                    }
                ]
            },
            "time": 1735689600000u64
        });

        let actual = serde_json::from_value::<BybitResponse<BybitList<BybitTicker>>>(input)
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(
            actual.list,
            vec![raw("BTCUSDT", "99850.10", "81234.512", "0.024103")]
        );
    }

    #[test]
    fn test_into_result_non_zero_ret_code() {
        let input = json!({ "retCode": 10001, "retMsg": "params error", "result": {} });
        let response =
            serde_json::from_value::<BybitResponse<serde_json::Value>>(input).unwrap();

        assert_eq!(
            response.into_result(),
            Err(DataError::Api {
                code: 10001,
                message: "params error".to_string()
            })
        );
    }

    #[test]
    fn test_bybit_ticker_normalisation() {
        struct TestCase {
            input: BybitTicker,
            expected_quote_volume: &'static str,
            expected_change: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: fraction scaled to percent, rounded to 2dp
                input: raw("BTCUSDT", "100.5", "2", "0.024567"),
                expected_quote_volume: "201",
                expected_change: "2.46",
            },
            TestCase {
                // TC1: negative change keeps sign, sub-cent price keeps precision
                input: raw("PEPEUSDT", "0.00001234", "1000000", "-0.1"),
                expected_quote_volume: "12.34",
                expected_change: "-10.00",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = MarketTicker::try_from(test.input).unwrap();
            assert_eq!(actual.quote_volume, test.expected_quote_volume, "TC{} failed", index);
            assert_eq!(
                actual.price_change_percent.as_deref(),
                Some(test.expected_change),
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_normalise_tickers_drops_unparsable_and_non_usdt() {
        let tickers = normalise_tickers(
            vec![
                raw("BTCUSDT", "100", "5", "0.01"),
                raw("ETHUSDT", "10", "100", "0.02"),
                raw("ETHBTC", "0.05", "100000", "0"),
                raw("BADUSDT", "", "1", "0"),
            ],
            &AdapterConfig::default(),
        );

        let symbols = tickers.iter().map(|t| t.symbol.as_str()).collect::<Vec<_>>();
        assert_eq!(symbols, vec!["ETHUSDT", "BTCUSDT"]);
    }

    #[tokio::test]
    async fn test_fetch_in_batches_bounds_concurrency() {
        let symbols = (0..25).map(|i| format!("S{i}USDT")).collect::<Vec<_>>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let funding = fetch_in_batches(&symbols, 10, Duration::ZERO, |symbol| {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(current, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);

                if symbol == "S3USDT" {
                    Err(DataError::Http("timeout".to_string()))
                } else if symbol == "S4USDT" {
                    Ok(None)
                } else {
                    Ok(Some("0.0001".to_string()))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 10);
        assert_eq!(funding.len(), 23);
        assert!(!funding.contains_key("S3USDT"));
        assert!(!funding.contains_key("S4USDT"));
    }

    #[tokio::test]
    async fn test_fetch_in_batches_fails_when_every_symbol_fails() {
        struct TestCase {
            symbols: Vec<String>,
            expected: Result<usize, DataError>,
        }

        let symbols = |count: usize| (0..count).map(|i| format!("S{i}USDT")).collect::<Vec<_>>();
        let tests = vec![
            TestCase {
                // TC0: full outage
                symbols: symbols(12),
                expected: Err(DataError::Http("connection reset".to_string())),
            },
            TestCase {
                // TC1: nothing requested
                symbols: vec![],
                expected: Ok(0),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = fetch_in_batches(&test.symbols, 10, Duration::ZERO, |_| async {
                Err::<Option<String>, _>(DataError::Http("connection reset".to_string()))
            })
            .await
            .map(|funding| funding.len());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_bybit_ticker_overflow_is_an_error() {
        let actual = MarketTicker::try_from(raw(
            "BTCUSDT",
            "79228162514264337593543950335",
            "2",
            "0.01",
        ));

        assert!(actual.is_err());
    }
}
