//! Three-day trading window. Holidays are not modelled.

use crate::models::DateKey;
use chrono::{Datelike, Local, NaiveDate, TimeDelta, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    pub today: DateKey,
    pub prev_trading_day: DateKey,
    pub day_before_that: DateKey,
}

impl TradingWindow {
    /// Newest first, the order days are ingested and joined in.
    pub fn keys(&self) -> [DateKey; 3] {
        [self.today, self.prev_trading_day, self.day_before_that]
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn resolve_window(clock: NaiveDate) -> TradingWindow {
    let anchor = match clock.weekday() {
        Weekday::Sat => clock - TimeDelta::days(1),
        Weekday::Sun => clock - TimeDelta::days(2),
        _ => clock,
    };

    let (prev_offset, before_offset) = match anchor.weekday() {
        Weekday::Mon => (3, 4),
        Weekday::Tue => (1, 4),
        _ => (1, 2),
    };

    TradingWindow {
        today: DateKey::new(anchor),
        prev_trading_day: DateKey::new(anchor - TimeDelta::days(prev_offset)),
        day_before_that: DateKey::new(anchor - TimeDelta::days(before_offset)),
    }
}

pub fn resolve_today() -> TradingWindow {
    resolve_window(Local::now().date_naive())
}

/// Accepts `YYYY-MM-DD` or `YYYY_MM_DD`.
pub fn parse_date_arg(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y_%m_%d"))
        .ok()
}
