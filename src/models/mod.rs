use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Every snapshot segment is named `stock_data_<DD>_<MM>_<YYYY>`.
pub const SEGMENT_PREFIX: &str = "stock_data_";

// ── Date key ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn table_name(&self) -> String {
        format!("{}{}", SEGMENT_PREFIX, self.0.format("%d_%m_%Y"))
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        let suffix = name.strip_prefix(SEGMENT_PREFIX)?;
        NaiveDate::parse_from_str(suffix, "%d_%m_%Y").ok().map(Self)
    }

    pub fn query_value(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

// ── Listing row ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Row {
    pub company_name: String,
    pub value_change: f64,
    pub end_day_value: f64,
    pub trading_value: i64,
    /// Discounted session high, the "closed near the high" trigger.
    pub session_high_reference: f64,
}

/// Cell texts exactly as rendered by the listing (Polish locale).
#[derive(Debug, Clone, Default)]
pub struct RawListingRow {
    pub name: String,
    pub change: String,
    pub close: String,
    pub volume: String,
    pub high: String,
}

// ── Candidate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Candidate {
    pub company_name: String,
    pub end_day_value: f64,
    pub trading_value: i64,
    pub momentum: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_round_trip() {
        let key = DateKey::new(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
        assert_eq!(key.table_name(), "stock_data_08_03_2024");
        assert_eq!(DateKey::from_table_name("stock_data_08_03_2024"), Some(key));
        assert_eq!(DateKey::from_table_name("daily_bars"), None);
    }

    #[test]
    fn test_query_value() {
        let key = DateKey::new(NaiveDate::from_ymd_opt(2024, 2, 23).unwrap());
        assert_eq!(key.query_value(), "2024-02-23");
        assert_eq!(key.to_string(), "2024-02-23");
    }
}
