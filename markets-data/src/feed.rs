//! One refresh cycle for one exchange: cache check, ticker fetch, funding fetch, merge.

use crate::{
    cache::{DEFAULT_FUNDING_TTL, DEFAULT_TICKER_TTL, ResponseCache},
    error::DataError,
    exchange::{ExchangeId, MarketAdapter},
    model::{FundingRates, MarketTicker, merge_funding},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Values held by the [`ResponseCache`] on behalf of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedResponse {
    Tickers(Vec<MarketTicker>),
    Funding(FundingRates),
}

/// Response cache shared between concurrent refresh tasks.
pub type SharedCache = Arc<Mutex<ResponseCache<CachedResponse>>>;

/// Failure of one data category within a refresh cycle.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FetchError {
    /// Fatal for the cycle: no partial ticker list is produced.
    #[error("failed to fetch {exchange} ticker data: {source}")]
    Ticker {
        exchange: ExchangeId,
        source: DataError,
    },

    /// Non-fatal: tickers are still delivered with the funding sentinel.
    #[error("failed to fetch {exchange} funding rates: {source}")]
    Funding {
        exchange: ExchangeId,
        source: DataError,
    },
}

/// TTLs applied when storing fresh responses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CacheTtl {
    pub ticker: Duration,
    pub funding: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            ticker: DEFAULT_TICKER_TTL,
            funding: DEFAULT_FUNDING_TTL,
        }
    }
}

/// Result of a successful refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub exchange: ExchangeId,
    /// Tickers with funding merged in, one row per unique symbol.
    pub tickers: Vec<MarketTicker>,
    /// Set when funding could not be fetched and every row carries the sentinel.
    pub funding_error: Option<FetchError>,
    pub time_received: DateTime<Utc>,
}

/// How a refresh cycle treats responses already held in the cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CachePolicy {
    /// Serve both tickers and funding from the cache while live.
    UseCached,
    /// Always fetch tickers; funding may still be served from the cache.
    RefreshTickers,
    /// Ignore every cached response.
    Bypass,
}

impl CachePolicy {
    fn cached_tickers(&self) -> bool {
        matches!(self, CachePolicy::UseCached)
    }

    fn cached_funding(&self) -> bool {
        !matches!(self, CachePolicy::Bypass)
    }
}

/// Fetches, caches and merges ticker and funding data.
#[derive(Debug, Clone, Default)]
pub struct MarketFeed {
    cache: SharedCache,
    ttl: CacheTtl,
}

impl MarketFeed {
    pub fn new(cache: SharedCache, ttl: CacheTtl) -> Self {
        Self { cache, ttl }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Remove every cached response, for every exchange. Responses still in flight from
    /// before the clear are not stored when they arrive.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Current cache generation. Capture it when a refresh is requested and pass it to
    /// [`Self::refresh_from`] if the refresh itself starts later.
    pub fn generation(&self) -> u64 {
        self.cache.lock().generation()
    }

    /// Run one refresh cycle against `adapter`. Fresh responses are always stored, unless
    /// the cache was cleared while they were in flight.
    pub async fn refresh(
        &self,
        adapter: &dyn MarketAdapter,
        policy: CachePolicy,
    ) -> Result<MarketSnapshot, FetchError> {
        let generation = self.generation();
        self.refresh_from(generation, adapter, policy).await
    }

    /// [`Self::refresh`] for a request made at cache `generation`: if the cache has been
    /// cleared since, responses are returned but not stored.
    pub async fn refresh_from(
        &self,
        generation: u64,
        adapter: &dyn MarketAdapter,
        policy: CachePolicy,
    ) -> Result<MarketSnapshot, FetchError> {
        let exchange = adapter.id();
        let tickers = self.tickers(adapter, policy, generation).await?;

        let (funding, funding_error) =
            match self.funding(adapter, &tickers, policy, generation).await {
                Ok(funding) => (funding, None),
                Err(error) => {
                    warn!(%exchange, %error, "funding unavailable, rows show the sentinel");
                    (FundingRates::default(), Some(error))
                }
            };

        Ok(MarketSnapshot {
            exchange,
            tickers: merge_funding(tickers, &funding),
            funding_error,
            time_received: Utc::now(),
        })
    }

    async fn tickers(
        &self,
        adapter: &dyn MarketAdapter,
        policy: CachePolicy,
        generation: u64,
    ) -> Result<Vec<MarketTicker>, FetchError> {
        let exchange = adapter.id();
        let key = exchange.ticker_cache_key();

        if policy.cached_tickers() {
            let cached = self.cache.lock().get(&key);
            if let Some(CachedResponse::Tickers(tickers)) = cached {
                debug!(%exchange, rows = tickers.len(), "serving tickers from cache");
                return Ok(tickers);
            }
        }

        let tickers = adapter.fetch_ticker().await.map_err(|source| {
            error!(
                %exchange,
                error = %source,
                malformed = source.is_malformed(),
                "ticker fetch failed"
            );
            FetchError::Ticker { exchange, source }
        })?;

        self.cache.lock().set_in_generation(
            generation,
            key,
            CachedResponse::Tickers(tickers.clone()),
            self.ttl.ticker,
        );

        Ok(tickers)
    }

    async fn funding(
        &self,
        adapter: &dyn MarketAdapter,
        tickers: &[MarketTicker],
        policy: CachePolicy,
        generation: u64,
    ) -> Result<FundingRates, FetchError> {
        let exchange = adapter.id();
        let key = exchange.funding_cache_key();

        if policy.cached_funding() {
            let cached = self.cache.lock().get(&key);
            if let Some(CachedResponse::Funding(funding)) = cached {
                debug!(%exchange, rates = funding.len(), "serving funding from cache");
                return Ok(funding);
            }
        }

        let symbols = tickers
            .iter()
            .map(|ticker| ticker.symbol.clone())
            .collect::<Vec<_>>();

        let funding = adapter.fetch_funding(&symbols).await.map_err(|source| {
            debug!(
                %exchange,
                error = %source,
                malformed = source.is_malformed(),
                "funding fetch failed"
            );
            FetchError::Funding { exchange, source }
        })?;

        // Partial funding expires with the tickers
        let missing = symbols.iter().filter(|symbol| !funding.contains_key(*symbol)).count();
        let ttl = if missing == 0 {
            self.ttl.funding
        } else {
            debug!(%exchange, missing, "caching partial funding with ticker ttl");
            self.ttl.ticker
        };

        self.cache.lock().set_in_generation(
            generation,
            key,
            CachedResponse::Funding(funding.clone()),
            ttl,
        );

        Ok(funding)
    }
}


#[cfg(test)]
mod tests {
    use super::{test_utils::MockAdapter, *};
    use crate::model::FUNDING_UNAVAILABLE;
    use std::{collections::HashSet, time::Instant};

    fn tickers() -> Vec<MarketTicker> {
        vec![
            MarketTicker::new("BTCUSDT", "100", "10", "1000", Some("1.00".to_string())),
            MarketTicker::new("ETHUSDT", "10", "50", "500", Some("-2.00".to_string())),
        ]
    }

    #[tokio::test]
    async fn test_refresh_merges_funding() {
        let mut funding = FundingRates::default();
        funding.insert("BTCUSDT".to_string(), "0.0001".to_string());
        let adapter =
            MockAdapter::new(ExchangeId::BinanceFuturesUsd, tickers()).with_funding(Ok(funding));

        let snapshot = MarketFeed::default()
            .refresh(&adapter, CachePolicy::UseCached)
            .await
            .unwrap();

        assert_eq!(snapshot.tickers[0].funding_rate, "0.0001");
        assert_eq!(snapshot.tickers[1].funding_rate, FUNDING_UNAVAILABLE);
        assert!(snapshot.funding_error.is_none());

        let symbols = snapshot
            .tickers
            .iter()
            .map(|t| t.symbol.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(symbols.len(), snapshot.tickers.len());
    }

    #[tokio::test]
    async fn test_funding_failure_degrades_to_sentinel() {
        let adapter = MockAdapter::new(ExchangeId::BybitPerpetualsUsd, tickers())
            .with_funding(Err(DataError::Http("connection reset".to_string())));

        let snapshot = MarketFeed::default()
            .refresh(&adapter, CachePolicy::UseCached)
            .await
            .unwrap();

        assert_eq!(snapshot.tickers.len(), 2);
        assert!(snapshot.tickers.iter().all(|t| t.funding_rate == FUNDING_UNAVAILABLE));
        assert_eq!(
            snapshot.funding_error,
            Some(FetchError::Funding {
                exchange: ExchangeId::BybitPerpetualsUsd,
                source: DataError::Http("connection reset".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_ticker_failure_is_fatal() {
        let adapter = MockAdapter::new(ExchangeId::BinanceFuturesUsd, vec![]).with_tickers(Err(
            DataError::HttpStatus {
                url: "https://fapi.binance.com/fapi/v1/ticker/24hr".to_string(),
                status: 500,
            },
        ));

        let result = MarketFeed::default().refresh(&adapter, CachePolicy::UseCached).await;

        assert!(matches!(result, Err(FetchError::Ticker { .. })));
        assert_eq!(adapter.funding_calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_serves_until_forced() {
        let feed = MarketFeed::default();
        let adapter = MockAdapter::new(ExchangeId::BinanceFuturesUsd, tickers());

        feed.refresh(&adapter, CachePolicy::UseCached).await.unwrap();
        feed.refresh(&adapter, CachePolicy::UseCached).await.unwrap();
        assert_eq!(adapter.ticker_calls(), 1);
        assert_eq!(adapter.funding_calls(), 1);

        feed.refresh(&adapter, CachePolicy::Bypass).await.unwrap();
        assert_eq!(adapter.ticker_calls(), 2);
        assert_eq!(adapter.funding_calls(), 2);
    }

    #[tokio::test]
    async fn test_funding_failure_is_not_cached() {
        let feed = MarketFeed::default();
        let adapter = MockAdapter::new(ExchangeId::BybitPerpetualsUsd, tickers())
            .with_funding(Err(DataError::Http("timeout".to_string())));

        feed.refresh(&adapter, CachePolicy::UseCached).await.unwrap();

        let cache = feed.cache().lock();
        assert!(cache.contains_key("bybit:ticker"));
        assert!(!cache.contains_key("bybit:funding"));
    }

    #[tokio::test]
    async fn test_clear_cache_drops_previous_exchange_entries() {
        let feed = MarketFeed::default();
        let binance = MockAdapter::new(ExchangeId::BinanceFuturesUsd, tickers());
        feed.refresh(&binance, CachePolicy::UseCached).await.unwrap();
        assert!(feed.cache().lock().contains_key("binance:ticker"));

        feed.clear_cache();

        assert!(!feed.cache().lock().contains_key("binance:ticker"));
        assert!(!feed.cache().lock().contains_key("binance:funding"));
        feed.refresh(&binance, CachePolicy::UseCached).await.unwrap();
        assert_eq!(binance.ticker_calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_tickers_policy_keeps_cached_funding() {
        let feed = MarketFeed::default();
        let adapter = MockAdapter::new(ExchangeId::BinanceFuturesUsd, tickers());

        feed.refresh(&adapter, CachePolicy::UseCached).await.unwrap();
        feed.refresh(&adapter, CachePolicy::RefreshTickers).await.unwrap();
        feed.refresh(&adapter, CachePolicy::RefreshTickers).await.unwrap();

        assert_eq!(adapter.ticker_calls(), 3);
        assert_eq!(adapter.funding_calls(), 1);
    }

    #[tokio::test]
    async fn test_funding_ttl_depends_on_coverage() {
        struct TestCase {
            rates: Vec<&'static str>,
            expected_live_after_ticker_ttl: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: every symbol has a rate
                rates: vec!["BTCUSDT", "ETHUSDT"],
                expected_live_after_ticker_ttl: true,
            },
            TestCase {
                // TC1: partial funding expires with the tickers
                rates: vec!["BTCUSDT"],
                expected_live_after_ticker_ttl: false,
            },
            TestCase {
                // TC2: no rates at all
                rates: vec![],
                expected_live_after_ticker_ttl: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let funding = test
                .rates
                .iter()
                .map(|symbol| (symbol.to_string(), "0.0001".to_string()))
                .collect::<FundingRates>();
            let adapter = MockAdapter::new(ExchangeId::BybitPerpetualsUsd, tickers())
                .with_funding(Ok(funding));
            let feed = MarketFeed::default();

            feed.refresh(&adapter, CachePolicy::UseCached).await.unwrap();

            let later = Instant::now() + DEFAULT_TICKER_TTL + Duration::from_secs(1);
            let actual = feed.cache().lock().get_at("bybit:funding", later).is_some();
            assert_eq!(actual, test.expected_live_after_ticker_ttl, "TC{} failed", index);
        }
    }

    #[tokio::test]
    async fn test_response_arriving_after_clear_is_not_cached() {
        let feed = MarketFeed::default();
        let binance = MockAdapter::new(ExchangeId::BinanceFuturesUsd, tickers())
            .with_delay(Duration::from_millis(50));

        let (result, _) = tokio::join!(feed.refresh(&binance, CachePolicy::Bypass), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            feed.clear_cache();
        });

        assert!(result.is_ok());
        let cache = feed.cache().lock();
        assert!(!cache.contains_key("binance:ticker"));
        assert!(!cache.contains_key("binance:funding"));
    }

    #[tokio::test]
    async fn test_refresh_from_cleared_generation_returns_but_does_not_store() {
        let feed = MarketFeed::default();
        let binance = MockAdapter::new(ExchangeId::BinanceFuturesUsd, tickers());
        let requested_at = feed.generation();

        feed.clear_cache();
        let snapshot = feed
            .refresh_from(requested_at, &binance, CachePolicy::UseCached)
            .await
            .unwrap();

        assert_eq!(snapshot.tickers.len(), 2);
        assert!(feed.cache().lock().is_empty());
    }
}
