#![warn(unused, clippy::cloned_instead_of_copied, missing_debug_implementations)]

//! # Markets-Data
//! Polled REST integration for perpetual-futures market data. Every supported exchange is
//! normalised into the same [`MarketTicker`] model:
//! * 24h ticker snapshot (last price, volumes, percentage change), capped to the top pairs by
//!   quote volume.
//! * Funding rates, merged into the ticker rows when available.
//! * TTL [`ResponseCache`] so repeated polls inside the TTL do not hit the exchange.
//!
//! ## Supported exchanges
//! * Binance USD-M futures ([`BinanceFuturesUsd`](exchange::binance::BinanceFuturesUsd))
//! * Bybit linear perpetuals ([`BybitPerpetualsUsd`](exchange::bybit::BybitPerpetualsUsd))

/// TTL keyed response cache.
pub mod cache;

/// All [`Error`](std::error::Error)s generated in Markets-Data.
pub mod error;

/// [`ExchangeId`](exchange::ExchangeId), the [`MarketAdapter`](exchange::MarketAdapter) trait
/// and one adapter per exchange.
pub mod exchange;

/// One refresh cycle: cache lookup, ticker fetch, funding fetch and merge.
pub mod feed;

/// JSON over HTTP GET client.
pub mod http;

/// Normalised market data model.
pub mod model;

pub use cache::ResponseCache;
pub use error::DataError;
pub use exchange::{AdapterConfig, ExchangeId, MarketAdapter, adapter_for};
pub use feed::{CachePolicy, CacheTtl, FetchError, MarketFeed, MarketSnapshot, SharedCache};
pub use model::{FUNDING_UNAVAILABLE, FundingRates, MarketTicker};
