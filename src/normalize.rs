//! Normalization of the portal's displayed dates and amounts into matching keys.
//!
//! Every function here is pure. The two key normalizers are idempotent:
//! applying them to their own output returns it unchanged.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

/// Currency markers the portal prints in front of amounts, longest first.
pub const CURRENCY_MARKERS: [&str; 2] = ["S/.", "S/"];

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d[.,]\d").expect("static amount pattern"))
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(^|\D)(19|20)\d{2}(\D|$)").expect("static year pattern"))
}

/// Date-only part of a displayed timestamp: "01/02/2025 10:00" -> "01/02/2025".
pub fn normalize_date(raw: &str) -> String {
    raw.split_whitespace().next().unwrap_or_default().to_string()
}

/// Amount with currency markers and all whitespace removed: "S/. 150.00" -> "150.00".
pub fn normalize_amount(raw: &str) -> String {
    let mut value: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    // Removing one marker can splice a new one together ("SS/./."), so repeat to a fixpoint.
    loop {
        let stripped = CURRENCY_MARKERS
            .iter()
            .fold(value.clone(), |acc, marker| acc.replace(marker, ""));
        if stripped == value {
            return value;
        }
        value = stripped;
    }
}

/// True when the text carries a currency marker.
pub fn has_currency_marker(raw: &str) -> bool {
    CURRENCY_MARKERS.iter().any(|marker| raw.contains(marker))
}

/// Heuristic used when a table has no usable headers: a currency marker or a
/// digit-separator-digit run ("150.00", "1,200").
pub fn looks_like_amount(cell: &str) -> bool {
    has_currency_marker(cell) || amount_pattern().is_match(cell)
}

/// A tax period is written either as "MM/YYYY" or contains a bare year.
pub fn looks_like_period(cell: &str) -> bool {
    cell.contains('/') || year_pattern().is_match(cell)
}

/// Numeric value of a displayed amount, thousands separators dropped.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let value = normalize_amount(raw).replace(',', "");
    if value.is_empty() {
        return None;
    }
    Decimal::from_str(&value).ok()
}
