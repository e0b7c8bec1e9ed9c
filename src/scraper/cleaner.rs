use crate::models::{RawListingRow, Row};
use thiserror::Error;

/// Placeholder the listing renders in place of a missing figure.
pub const NO_DATA: &str = "—";

/// The same glyph when UTF-8 bytes were decoded as Windows-1252.
const NO_DATA_MOJIBAKE: &str = "â€”";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CleanError {
    #[error("{field}: cannot parse {value:?} as a number")]
    InvalidNumber { field: &'static str, value: String },
}

// ── Parsers ───────────────────────────────────────────────────────────────────

/// "1 234,56" → 1234.56 | "12,5" → 12.5 | "—" → 0.0 | "+1,20%" → 1.2
pub fn parse_locale_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .replace(NO_DATA_MOJIBAKE, "0")
        .replace(NO_DATA, "0")
        .replace(',', ".")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim_end_matches('%');
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok().filter(|v: &f64| v.is_finite())
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn session_high_reference(high: f64, discount: f64) -> f64 {
    round2(high * discount)
}

fn number(field: &'static str, value: &str) -> Result<f64, CleanError> {
    parse_locale_number(value).ok_or_else(|| CleanError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

// ── Raw cells → Row ───────────────────────────────────────────────────────────

pub fn clean_listing_row(raw: &RawListingRow, high_discount: f64) -> Result<Row, CleanError> {
    let high = number("session_high", &raw.high)?;
    Ok(Row {
        company_name: raw.name.trim().to_string(),
        value_change: number("value_change", &raw.change)?,
        end_day_value: number("end_day_value", &raw.close)?,
        // Volume renders as a plain figure; anything after a decimal point is dropped.
        trading_value: number("trading_value", &raw.volume)? as i64,
        session_high_reference: session_high_reference(high, high_discount),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
