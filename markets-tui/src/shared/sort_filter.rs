/// Search, sort and favourites filtering of a ticker snapshot
///
/// Every function here is pure: inputs are never mutated and the output borrows from them.
use std::{cmp::Ordering, fmt};

use fnv::FnvHashSet;
use markets_data::MarketTicker;

/// Sortable table columns, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortColumn {
    Symbol,
    LastPrice,
    QuoteVolume,
    PriceChangePercent,
    FundingRate,
}

impl SortColumn {
    pub const ALL: [SortColumn; 5] = [
        SortColumn::Symbol,
        SortColumn::LastPrice,
        SortColumn::QuoteVolume,
        SortColumn::PriceChangePercent,
        SortColumn::FundingRate,
    ];

    /// Column for a 1-based hotkey index
    pub fn from_hotkey(key: char) -> Option<Self> {
        let index = key.to_digit(10)?.checked_sub(1)? as usize;
        Self::ALL.get(index).copied()
    }

    pub fn title(&self) -> &'static str {
        match self {
            SortColumn::Symbol => "Symbol",
            SortColumn::LastPrice => "Price",
            SortColumn::QuoteVolume => "24h Volume",
            SortColumn::PriceChangePercent => "24h Change",
            SortColumn::FundingRate => "Funding",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            SortDirection::Asc => "↑",
            SortDirection::Desc => "↓",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortFilterConfig {
    pub column: SortColumn,
    pub direction: SortDirection,
    pub search_text: String,
}

impl Default for SortFilterConfig {
    fn default() -> Self {
        Self {
            column: SortColumn::QuoteVolume,
            direction: SortDirection::Desc,
            search_text: String::new(),
        }
    }
}

impl SortFilterConfig {
    /// Header click semantics: a new column sorts descending, the active column flips.
    pub fn toggle_column(&mut self, column: SortColumn) {
        if self.column == column {
            self.direction = self.direction.flip();
        } else {
            self.column = column;
            self.direction = SortDirection::Desc;
        }
    }

    pub fn with_search(mut self, search_text: impl Into<String>) -> Self {
        self.search_text = search_text.into();
        self
    }
}

/// Numeric sort key. Unparsable values, including the funding sentinel, sort as -inf.
pub fn numeric_key(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| !value.is_nan())
        .unwrap_or(f64::NEG_INFINITY)
}

fn compare(a: &MarketTicker, b: &MarketTicker, column: SortColumn) -> Ordering {
    let numeric = |a: &str, b: &str| numeric_key(a).total_cmp(&numeric_key(b));

    match column {
        SortColumn::Symbol => a.symbol.cmp(&b.symbol),
        SortColumn::LastPrice => numeric(&a.last_price, &b.last_price),
        SortColumn::QuoteVolume => numeric(&a.quote_volume, &b.quote_volume),
        SortColumn::PriceChangePercent => numeric(
            a.price_change_percent.as_deref().unwrap_or_default(),
            b.price_change_percent.as_deref().unwrap_or_default(),
        ),
        SortColumn::FundingRate => numeric(&a.funding_rate, &b.funding_rate),
    }
}

/// Case-insensitive symbol search followed by a stable sort on the configured column.
pub fn apply<'a>(tickers: &'a [MarketTicker], config: &SortFilterConfig) -> Vec<&'a MarketTicker> {
    let needle = config.search_text.trim().to_lowercase();

    let mut rows = tickers
        .iter()
        .filter(|ticker| needle.is_empty() || ticker.symbol.to_lowercase().contains(&needle))
        .collect::<Vec<_>>();

    rows.sort_by(|a, b| {
        let ordering = compare(a, b, config.column);
        match config.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    rows
}

/// Keep only favourite rows, preserving order.
pub fn favorites_only<'a>(
    rows: Vec<&'a MarketTicker>,
    favorites: &FnvHashSet<String>,
) -> Vec<&'a MarketTicker> {
    rows.into_iter()
        .filter(|ticker| favorites.contains(&ticker.symbol))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, quote_volume: &str, change: Option<&str>) -> MarketTicker {
        MarketTicker::new(symbol, "1", "1", quote_volume, change.map(str::to_string))
    }

    fn symbols<'a>(rows: &[&'a MarketTicker]) -> Vec<&'a str> {
        rows.iter().map(|ticker| ticker.symbol.as_str()).collect()
    }

    #[test]
    fn test_apply_sorts_and_filters() {
        struct TestCase {
            config: SortFilterConfig,
            expected: Vec<&'static str>,
        }

        let tickers = vec![
            ticker("BTCUSDT", "100", Some("2.5")),
            ticker("ETHUSDT", "300", Some("-1.0")),
            ticker("SOLUSDT", "200", Some("10")),
        ];

        let tests = vec![
            TestCase {
                // TC0: default is quote volume descending
                config: SortFilterConfig::default(),
                expected: vec!["ETHUSDT", "SOLUSDT", "BTCUSDT"],
            },
            TestCase {
                // TC1: search is case-insensitive substring
                config: SortFilterConfig::default().with_search("eth"),
                expected: vec!["ETHUSDT"],
            },
            TestCase {
                // TC2: symbol ascending
                config: SortFilterConfig {
                    column: SortColumn::Symbol,
                    direction: SortDirection::Asc,
                    search_text: String::new(),
                },
                expected: vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"],
            },
            TestCase {
                // TC3: change descending
                config: SortFilterConfig {
                    column: SortColumn::PriceChangePercent,
                    direction: SortDirection::Desc,
                    search_text: String::new(),
                },
                expected: vec!["SOLUSDT", "BTCUSDT", "ETHUSDT"],
            },
            TestCase {
                // TC4: no match
                config: SortFilterConfig::default().with_search("doge"),
                expected: vec![],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let rows = apply(&tickers, &test.config);
            assert_eq!(symbols(&rows), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_search_then_sort_by_change() {
        let tickers = vec![
            ticker("BTCUSDT", "1", Some("2.5")),
            ticker("ETHUSDT", "1", Some("-1.0")),
            ticker("SOLUSDT", "1", Some("10")),
        ];
        let config = SortFilterConfig {
            column: SortColumn::PriceChangePercent,
            direction: SortDirection::Desc,
            search_text: "usdt".to_string(),
        };

        let rows = apply(&tickers, &config);

        assert_eq!(symbols(&rows), vec!["SOLUSDT", "BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn test_unparsable_funding_sorts_last_descending() {
        let mut a = ticker("AUSDT", "1", None);
        a.funding_rate = "0.0001".to_string();
        let b = ticker("BUSDT", "1", None);
        let mut c = ticker("CUSDT", "1", None);
        c.funding_rate = "-0.0002".to_string();
        let tickers = vec![a, b, c];

        let mut config = SortFilterConfig::default();
        config.toggle_column(SortColumn::FundingRate);
        assert_eq!(symbols(&apply(&tickers, &config)), vec!["AUSDT", "CUSDT", "BUSDT"]);

        config.toggle_column(SortColumn::FundingRate);
        assert_eq!(symbols(&apply(&tickers, &config)), vec!["BUSDT", "CUSDT", "AUSDT"]);
    }

    #[test]
    fn test_apply_is_idempotent_and_stable() {
        let tickers = vec![
            ticker("AUSDT", "5", None),
            ticker("BUSDT", "5", None),
            ticker("CUSDT", "7", None),
            ticker("DUSDT", "5", None),
        ];
        let before = tickers.clone();
        let config = SortFilterConfig::default();

        let once = apply(&tickers, &config)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        let twice = apply(&once, &config);

        assert_eq!(symbols(&twice), vec!["CUSDT", "AUSDT", "BUSDT", "DUSDT"]);
        assert_eq!(symbols(&twice), symbols(&apply(&tickers, &config)));
        assert_eq!(tickers, before);
    }

    #[test]
    fn test_toggle_column() {
        let mut config = SortFilterConfig::default();

        config.toggle_column(SortColumn::QuoteVolume);
        assert_eq!(config.direction, SortDirection::Asc);

        config.toggle_column(SortColumn::LastPrice);
        assert_eq!(config.column, SortColumn::LastPrice);
        assert_eq!(config.direction, SortDirection::Desc);
    }

    #[test]
    fn test_from_hotkey() {
        assert_eq!(SortColumn::from_hotkey('1'), Some(SortColumn::Symbol));
        assert_eq!(SortColumn::from_hotkey('5'), Some(SortColumn::FundingRate));
        assert_eq!(SortColumn::from_hotkey('0'), None);
        assert_eq!(SortColumn::from_hotkey('6'), None);
    }

    #[test]
    fn test_favorites_only() {
        let tickers = vec![ticker("BTCUSDT", "2", None), ticker("ETHUSDT", "1", None)];
        let favourites = ["ETHUSDT".to_string()].into_iter().collect::<FnvHashSet<_>>();

        let rows = favorites_only(apply(&tickers, &SortFilterConfig::default()), &favourites);

        assert_eq!(symbols(&rows), vec!["ETHUSDT"]);
    }
}
