/// Display formatting for ticker cells
///
/// All helpers take the raw decimal strings carried by [`MarketTicker`](markets_data::MarketTicker)
/// and render `-` for anything unparsable.
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// Placeholder for missing or unparsable values
pub const PLACEHOLDER: &str = "-";

fn parse(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Round half away from zero to exactly `dp` decimal places.
fn fixed(value: Decimal, dp: u32) -> Decimal {
    let mut value = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(dp);
    if value.is_zero() {
        value.set_sign_positive(true);
    }
    value
}

/// Insert thousands separators into the integer part.
fn group_thousands(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(formatted.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Last price: below 0.01 shows 6 dp, below 1 shows 4 dp, otherwise 2 dp with separators.
pub fn format_price(raw: &str) -> String {
    let Some(price) = parse(raw) else {
        return PLACEHOLDER.to_string();
    };

    let magnitude = price.abs();
    if magnitude < Decimal::new(1, 2) {
        fixed(price, 6).to_string()
    } else if magnitude < Decimal::ONE {
        fixed(price, 4).to_string()
    } else {
        group_thousands(&fixed(price, 2).to_string())
    }
}

/// Volume with K/M/B suffix above one thousand.
pub fn format_compact(raw: &str) -> String {
    let Some(value) = parse(raw) else {
        return PLACEHOLDER.to_string();
    };

    let thresholds = [
        (Decimal::from(1_000_000_000u64), "B"),
        (Decimal::from(1_000_000u64), "M"),
        (Decimal::ONE_THOUSAND, "K"),
    ];

    thresholds
        .into_iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(threshold, suffix)| format!("{}{suffix}", fixed(value / threshold, 2)))
        .unwrap_or_else(|| value.round_dp(2).normalize().to_string())
}

fn signed_percent(value: Decimal, dp: u32, plus_on_zero: bool) -> String {
    let value = fixed(value, dp);
    let sign = if value.is_sign_positive() && (plus_on_zero || !value.is_zero()) {
        "+"
    } else {
        ""
    };
    format!("{sign}{value}%")
}

/// 24h change, already in percent: 2 dp, explicit `+` when positive.
pub fn format_change_percent(raw: Option<&str>) -> String {
    raw.and_then(parse)
        .map(|value| signed_percent(value, 2, false))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Funding rate fraction shown as percent with 4 dp and a sign, eg/ "0.0001" -> "+0.0100%".
pub fn format_funding_rate(raw: &str) -> String {
    parse(raw)
        .map(|value| signed_percent(value * Decimal::ONE_HUNDRED, 4, true))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}
