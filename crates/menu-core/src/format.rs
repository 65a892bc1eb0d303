//! Display formatting for prices and timestamps (Czech conventions).
//!
//! All functions are pure. Date formatters take `now` explicitly and
//! evaluate calendar comparisons in `now`'s time zone.

use crate::price::Price;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::RoundingStrategy;
use std::fmt;

/// Thousands separator used by the Czech locale (no-break space).
pub const GROUP_SEPARATOR: char = '\u{a0}';

/// Decimal separator used by the Czech locale.
pub const DECIMAL_SEPARATOR: char = ',';

const MAX_FRACTION_DIGITS: u32 = 2;

/// Format a price with its currency.
///
/// - `12 CZK` → `12 Kč`
/// - `4.2 EUR` → `4,2 €`
/// - `1234 CZK` → `1 234 Kč` (no-break space between groups)
/// - other currencies render as `{number} {code}`
pub fn format_price(value: Price, currency: &str) -> String {
    let number = format_number(value);
    match currency {
        "CZK" => format!("{number} Kč"),
        "EUR" => format!("{number} €"),
        other => format!("{number} {other}"),
    }
}

/// Format a number with 0..2 fraction digits, grouped integer part and
/// a decimal comma.
pub fn format_number(value: Price) -> String {
    let rounded = value
        .inner()
        .round_dp_with_strategy(MAX_FRACTION_DIGITS, RoundingStrategy::MidpointAwayFromZero)
        .normalize();

    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = rounded.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut out = String::with_capacity(text.len() + 4);
    if negative {
        out.push('-');
    }
    out.push_str(&group_digits(int_part));
    if let Some(frac) = frac_part {
        out.push(DECIMAL_SEPARATOR);
        out.push_str(frac);
    }
    out
}

fn group_digits(digits: &str) -> String {
    if digits.len() < 4 {
        return digits.to_string();
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let lead = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - lead) % 3 == 0 {
            out.push(GROUP_SEPARATOR);
        }
        out.push(ch);
    }
    out
}

/// Format an item's creation date relative to `now`.
///
/// Same day: `HH:MM`. Same year: `DD.MM.`. Otherwise `DD.MM.YYYY`.
pub fn format_creation_date<Tz>(date: &DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format_relative(date, now, "%H:%M")
}

/// Format an item's last update relative to `now`.
///
/// Same day: `HH:MM:SS`. Otherwise as `format_creation_date`.
pub fn format_last_update<Tz>(date: &DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format_relative(date, now, "%H:%M:%S")
}

fn format_relative<Tz>(date: &DateTime<Utc>, now: &DateTime<Tz>, today_fmt: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let local = date.with_timezone(&now.timezone());

    if local.date_naive() == now.date_naive() {
        return local.format(today_fmt).to_string();
    }
    if local.year() == now.year() {
        return local.format("%d.%m.").to_string();
    }
    local.format("%d.%m.%Y").to_string()
}
