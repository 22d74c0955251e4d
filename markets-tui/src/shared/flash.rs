/// Per-cell change highlighting
///
/// Remembers the last numeric value seen for every `(symbol, field)` and raises a short
/// directional flash on the exact cell whose value changed.
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use markets_data::MarketTicker;

/// How long a changed cell stays highlighted
pub const FLASH_DURATION: Duration = Duration::from_millis(400);

/// Ticker fields that flash on change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickerField {
    LastPrice,
    QuoteVolume,
    PriceChangePercent,
    FundingRate,
}

impl TickerField {
    pub const ALL: [TickerField; 4] = [
        TickerField::LastPrice,
        TickerField::QuoteVolume,
        TickerField::PriceChangePercent,
        TickerField::FundingRate,
    ];

    pub fn value<'a>(&self, ticker: &'a MarketTicker) -> Option<&'a str> {
        match self {
            TickerField::LastPrice => Some(&ticker.last_price),
            TickerField::QuoteVolume => Some(&ticker.quote_volume),
            TickerField::PriceChangePercent => ticker.price_change_percent.as_deref(),
            TickerField::FundingRate => Some(&ticker.funding_rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    Increased,
    Decreased,
}

type CellKey = (String, TickerField);

#[derive(Debug, Clone)]
pub struct FlashTracker {
    duration: Duration,
    previous: FnvHashMap<CellKey, f64>,
    active: FnvHashMap<CellKey, (Flash, Instant)>,
}

impl Default for FlashTracker {
    fn default() -> Self {
        Self::new(FLASH_DURATION)
    }
}

impl FlashTracker {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            previous: FnvHashMap::default(),
            active: FnvHashMap::default(),
        }
    }

    /// Record every flashing field of every ticker in a freshly applied snapshot.
    pub fn observe_all<'a>(
        &mut self,
        tickers: impl IntoIterator<Item = &'a MarketTicker>,
        now: Instant,
    ) {
        for ticker in tickers {
            for field in TickerField::ALL {
                if let Some(raw) = field.value(ticker) {
                    self.observe(&ticker.symbol, field, raw, now);
                }
            }
        }
    }

    /// Record one cell value, starting a flash if it differs from the previous observation.
    /// The first observation never flashes; unparsable values are ignored entirely.
    pub fn observe(
        &mut self,
        symbol: &str,
        field: TickerField,
        raw: &str,
        now: Instant,
    ) -> Option<Flash> {
        let value = raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())?;
        let key = (symbol.to_string(), field);

        let flash = match self.previous.insert(key.clone(), value) {
            Some(previous) if value > previous => Flash::Increased,
            Some(previous) if value < previous => Flash::Decreased,
            _ => return None,
        };

        self.active.insert(key, (flash, now + self.duration));
        Some(flash)
    }

    /// Active flash for a cell, if it has not expired at `now`.
    pub fn flash(&self, symbol: &str, field: TickerField, now: Instant) -> Option<Flash> {
        self.active
            .get(&(symbol.to_string(), field))
            .filter(|(_, until)| now < *until)
            .map(|(flash, _)| *flash)
    }

    /// Drop expired flashes. Returns true if any flash is still running.
    pub fn prune(&mut self, now: Instant) -> bool {
        self.active.retain(|_, (_, until)| now < *until);
        !self.active.is_empty()
    }

    /// Forget every previous value, eg/ when the exchange changes.
    pub fn reset(&mut self) {
        self.previous.clear();
        self.active.clear();
    }
}
