//! Three-day momentum screen: liquidity filter, join, candidate test, rank.

use crate::calendar::TradingWindow;
use crate::config::AnalysisConfig;
use crate::models::{Candidate, Row};
use crate::scraper::cleaner::round2;
use crate::storage::{SnapshotStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

// ── Join ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Same index in each filtered list is the same company. FRAGILE: a
    /// listing change shifts every later triple. Truncates to the shortest list.
    #[default]
    Positional,

    ByCompanyName,
}

#[derive(Debug, Clone, Copy)]
pub struct Triple<'a> {
    pub today: &'a Row,
    pub prev: &'a Row,
    pub before: &'a Row,
}

impl Triple<'_> {
    pub fn momentum(&self) -> f64 {
        self.today.value_change + self.prev.value_change + self.before.value_change
    }

    pub fn is_candidate(&self) -> bool {
        self.today.value_change > 0.0
            && self.prev.value_change > 0.0
            && self.before.value_change > 0.0
            && self.today.end_day_value >= self.today.session_high_reference
    }
}

impl JoinStrategy {
    pub fn join<'a>(&self, today: &'a [Row], prev: &'a [Row], before: &'a [Row]) -> Vec<Triple<'a>> {
        match self {
            JoinStrategy::Positional => {
                if today.len() != prev.len() || prev.len() != before.len() {
                    warn!(
                        "Positional join over lists of {}/{}/{} rows; triples past the first mismatch may pair different companies",
                        today.len(),
                        prev.len(),
                        before.len()
                    );
                }
                today
                    .iter()
                    .zip(prev)
                    .zip(before)
                    .map(|((today, prev), before)| Triple { today, prev, before })
                    .collect()
            }
            JoinStrategy::ByCompanyName => {
                let prev = index_by_name(prev);
                let before = index_by_name(before);
                today
                    .iter()
                    .filter_map(|t| {
                        let name = t.company_name.as_str();
                        Some(Triple {
                            today: t,
                            prev: prev.get(name).copied()?,
                            before: before.get(name).copied()?,
                        })
                    })
                    .collect()
            }
        }
    }
}

fn index_by_name(rows: &[Row]) -> HashMap<&str, &Row> {
    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        map.entry(row.company_name.as_str()).or_insert(row);
    }
    map
}

// ── Analyzer ──────────────────────────────────────────────────────────────────

pub struct MomentumAnalyzer {
    min_trading_value: i64,
    join: JoinStrategy,
}

impl MomentumAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            min_trading_value: config.min_trading_value,
            join: config.join,
        }
    }

    fn liquid(&self, rows: Vec<Row>) -> Vec<Row> {
        rows.into_iter()
            .filter(|r| r.trading_value > self.min_trading_value)
            .collect()
    }

    pub fn select(&self, today: Vec<Row>, prev: Vec<Row>, before: Vec<Row>) -> Vec<Candidate> {
        let (today, prev, before) = (self.liquid(today), self.liquid(prev), self.liquid(before));

        let mut candidates: Vec<Candidate> = self
            .join
            .join(&today, &prev, &before)
            .into_iter()
            .filter(|t| t.is_candidate())
            .map(|t| Candidate {
                company_name: t.today.company_name.clone(),
                end_day_value: t.today.end_day_value,
                trading_value: t.today.trading_value,
                momentum: t.momentum(),
            })
            .collect();

        candidates.sort_by(|a, b| b.momentum.total_cmp(&a.momentum));
        candidates
    }

    pub fn analyze(&self, store: &SnapshotStore, window: &TradingWindow) -> StoreResult<Vec<Candidate>> {
        let today = store.rows(window.today)?;
        let prev = store.rows(window.prev_trading_day)?;
        let before = store.rows(window.day_before_that)?;
        info!(
            "Analysing {} ({} rows) / {} ({} rows) / {} ({} rows)",
            window.today,
            today.len(),
            window.prev_trading_day,
            prev.len(),
            window.day_before_that,
            before.len()
        );

        let candidates = self.select(today, prev, before);
        info!("{} candidates", candidates.len());
        Ok(candidates)
    }
}

// ── Formatting ────────────────────────────────────────────────────────────────

pub fn format_candidate(c: &Candidate) -> String {
    format!(
        "Think to buy: {:<26} | {:>7.2}  |  {:>8}  |  {:.2}",
        c.company_name,
        c.end_day_value,
        c.trading_value,
        round2(c.momentum)
    )
}

pub fn message_body(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(format_candidate)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, change: f64, close: f64, high_ref: f64, volume: i64) -> Row {
        Row {
            company_name: name.to_string(),
            value_change: change,
            end_day_value: close,
            trading_value: volume,
            session_high_reference: high_ref,
        }
    }

    fn analyzer(join: JoinStrategy) -> MomentumAnalyzer {
        MomentumAnalyzer::new(&AnalysisConfig {
            min_trading_value: 100_000,
            join,
        })
    }

    #[test]
    fn test_three_rising_days_with_strong_close_selected() {
        let a = analyzer(JoinStrategy::Positional);
        let picked = a.select(
            vec![row("ALLEGRO", 1.0, 100.0, 99.0, 200_000)],
            vec![row("ALLEGRO", 2.0, 98.0, 97.0, 200_000)],
            vec![row("ALLEGRO", 3.0, 96.0, 95.0, 200_000)],
        );
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].company_name, "ALLEGRO");
        assert_eq!(picked[0].momentum, 6.0);
    }

    #[test]
    fn test_any_non_positive_day_excludes() {
        let a = analyzer(JoinStrategy::Positional);
        for changes in [(0.0, 2.0, 3.0), (1.0, -2.0, 3.0), (1.0, 2.0, 0.0)] {
            let picked = a.select(
                vec![row("X", changes.0, 100.0, 99.0, 200_000)],
                vec![row("X", changes.1, 100.0, 99.0, 200_000)],
                vec![row("X", changes.2, 100.0, 99.0, 200_000)],
            );
            assert!(picked.is_empty(), "{:?} should be excluded", changes);
        }
    }

    #[test]
    fn test_weak_close_excludes() {
        let a = analyzer(JoinStrategy::Positional);
        let picked = a.select(
            vec![row("X", 1.0, 98.9, 99.0, 200_000)],
            vec![row("X", 1.0, 100.0, 99.0, 200_000)],
            vec![row("X", 1.0, 100.0, 99.0, 200_000)],
        );
        assert!(picked.is_empty());
    }

    #[test]
    fn test_ranked_by_summed_change() {
        let a = analyzer(JoinStrategy::Positional);
        let picked = a.select(
            vec![row("FIVE", 1.0, 10.0, 9.0, 200_000), row("SEVEN", 3.0, 10.0, 9.0, 200_000)],
            vec![row("FIVE", 2.0, 10.0, 9.0, 200_000), row("SEVEN", 2.0, 10.0, 9.0, 200_000)],
            vec![row("FIVE", 2.0, 10.0, 9.0, 200_000), row("SEVEN", 2.0, 10.0, 9.0, 200_000)],
        );
        let names: Vec<_> = picked.iter().map(|c| c.company_name.as_str()).collect();
        assert_eq!(names, vec!["SEVEN", "FIVE"]);
    }

    #[test]
    fn test_ties_keep_join_order() {
        let a = analyzer(JoinStrategy::Positional);
        let day = vec![row("A", 1.0, 10.0, 9.0, 200_000), row("B", 1.0, 10.0, 9.0, 200_000)];
        let picked = a.select(day.clone(), day.clone(), day);
        let names: Vec<_> = picked.iter().map(|c| c.company_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_liquidity_threshold_is_strict() {
        let a = analyzer(JoinStrategy::Positional);
        let picked = a.select(
            vec![row("X", 1.0, 10.0, 9.0, 100_000)],
            vec![row("X", 1.0, 10.0, 9.0, 200_000)],
            vec![row("X", 1.0, 10.0, 9.0, 200_000)],
        );
        assert!(picked.is_empty());
    }

    #[test]
    fn test_positional_join_pairs_by_index_after_filtering() {
        // GAMMA sits between ALFA and BETA on the earlier days only, so the
        // positional join pairs today's BETA with GAMMA.
        let today = vec![row("ALFA", 1.0, 10.0, 9.0, 200_000), row("BETA", 1.0, 10.0, 9.0, 200_000)];
        let prev = vec![
            row("ALFA", 1.0, 10.0, 9.0, 200_000),
            row("GAMMA", -5.0, 10.0, 9.0, 200_000),
            row("BETA", 1.0, 10.0, 9.0, 200_000),
        ];
        let before = prev.clone();

        let positional = analyzer(JoinStrategy::Positional).select(today.clone(), prev.clone(), before.clone());
        let names: Vec<_> = positional.iter().map(|c| c.company_name.as_str()).collect();
        assert_eq!(names, vec!["ALFA"]);

        let keyed = analyzer(JoinStrategy::ByCompanyName).select(today, prev, before);
        let names: Vec<_> = keyed.iter().map(|c| c.company_name.as_str()).collect();
        assert_eq!(names, vec!["ALFA", "BETA"]);
    }

    #[test]
    fn test_positional_join_truncates_to_shortest() {
        let long = vec![row("A", 1.0, 1.0, 1.0, 1), row("B", 1.0, 1.0, 1.0, 1)];
        let short = vec![row("A", 1.0, 1.0, 1.0, 1)];
        assert_eq!(JoinStrategy::Positional.join(&long, &short, &long).len(), 1);
    }

    #[test]
    fn test_message_body_lines() {
        let body = message_body(&[
            Candidate {
                company_name: "ALLEGRO".into(),
                end_day_value: 31.05,
                trading_value: 1_204_331,
                momentum: 6.123,
            },
            Candidate {
                company_name: "KGHM".into(),
                end_day_value: 118.4,
                trading_value: 402_118,
                momentum: 3.0,
            },
        ]);
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "Think to buy: ALLEGRO                    |   31.05  |   1204331  |  6.12"
        );
        assert!(lines[1].starts_with("Think to buy: KGHM "));
        assert!(lines[1].ends_with("|  3.00"));
        assert_eq!(message_body(&[]), "");
    }
}
