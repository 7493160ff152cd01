//! Trend semantics - rank and compare named series
//!
//! Derives series-level signals used alongside the pivot:
//! - Volatility ranking (which subjects swing the most)
//! - Top series by total volume
//! - Topic shift (leading series in the first vs. second half of the window)
//!
//! Global invariants enforced:
//! - Derived on every refresh, never stored
//! - Volatility ties break by key ascending; total ties keep input order

use crate::metrics::volatility;
use crate::series::{CalendarDate, NamedSeries};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Series considered for volatility ranking by default
pub const DEFAULT_VOLATILITY_LIMIT: usize = 4;

/// Volatility of one series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SeriesVolatility {
    pub key: String,
    pub volatility: f64,
}

/// Total volume of one series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SeriesTotal {
    pub key: String,
    pub total: f64,
}

/// Leading series before and after the window midpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TopicShift {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl TopicShift {
    pub fn shifted(&self) -> bool {
        matches!((&self.from, &self.to), (Some(from), Some(to)) if from != to)
    }
}

/// Complete trends view over a set of named series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TrendsAnalysis {
    pub volatility: Vec<SeriesVolatility>,
    pub totals: Vec<SeriesTotal>,
    pub topic_shift: TopicShift,
}

impl TrendsAnalysis {
    pub fn to_json(&self) -> anyhow::Result<String> {
        use anyhow::Context;
        serde_json::to_string_pretty(self).context("failed to serialize trends analysis to JSON")
    }

    pub fn render_text(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("{:<24} {:>12}\n", "SERIES", "VOLATILITY"));
        for entry in &self.volatility {
            output.push_str(&format!("{:<24} {:>12.2}\n", entry.key, entry.volatility));
        }
        output.push('\n');
        output.push_str(&format!("{:<24} {:>12}\n", "SERIES", "TOTAL"));
        for entry in &self.totals {
            output.push_str(&format!("{:<24} {:>12}\n", entry.key, entry.total));
        }
        output.push('\n');
        output.push_str(&format!(
            "Topic shift: {} -> {}\n",
            self.topic_shift.from.as_deref().unwrap_or("--"),
            self.topic_shift.to.as_deref().unwrap_or("--")
        ));
        output
    }
}

/// Volatility of the first `limit` series, most volatile first.
///
/// Volatility is computed over each series' recorded points only.
pub fn rank_volatility(series: &[NamedSeries], limit: usize) -> Vec<SeriesVolatility> {
    let mut ranked: Vec<SeriesVolatility> = series
        .iter()
        .take(limit)
        .map(|s| SeriesVolatility {
            key: s.key.clone(),
            volatility: volatility(&s.points.counts()),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.volatility
            .partial_cmp(&a.volatility)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    ranked
}

/// Series ordered by total volume, largest first
pub fn top_series(series: &[NamedSeries]) -> Vec<SeriesTotal> {
    let mut totals: Vec<SeriesTotal> = series
        .iter()
        .map(|s| SeriesTotal {
            key: s.key.clone(),
            total: s.points.total(),
        })
        .collect();
    totals.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(std::cmp::Ordering::Equal));
    totals
}

/// Compare the leading series of the two halves of the sorted date union.
///
/// The first half holds `floor(n / 2)` dates. A half where no series has a
/// positive total has no leader.
pub fn topic_shift(series: &[NamedSeries]) -> TopicShift {
    let dates: Vec<CalendarDate> = series
        .iter()
        .flat_map(|s| s.points.dates())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let (first, second) = dates.split_at(dates.len() / 2);

    TopicShift {
        from: leader(series, first),
        to: leader(series, second),
    }
}

fn leader(series: &[NamedSeries], bucket: &[CalendarDate]) -> Option<String> {
    let bucket: HashSet<CalendarDate> = bucket.iter().copied().collect();
    let mut best: Option<(&str, f64)> = None;
    for s in series {
        let sum: f64 = s
            .points
            .points()
            .iter()
            .filter(|p| bucket.contains(&p.date))
            .map(|p| p.count)
            .sum();
        if sum > 0.0 && best.map_or(true, |(_, top)| sum > top) {
            best = Some((s.key.as_str(), sum));
        }
    }
    best.map(|(key, _)| key.to_string())
}

/// Run every trend derivation
pub fn analyze_trends(series: &[NamedSeries], volatility_limit: usize) -> TrendsAnalysis {
    TrendsAnalysis {
        volatility: rank_volatility(series, volatility_limit),
        totals: top_series(series),
        topic_shift: topic_shift(series),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{DailySeries, TimePoint};

    fn named(key: &str, points: &[(&str, f64)]) -> NamedSeries {
        NamedSeries::new(
            key,
            DailySeries::from_points(
                points
                    .iter()
                    .map(|(d, c)| TimePoint::new(CalendarDate::parse(d).unwrap(), *c)),
            ),
        )
    }

    #[test]
    fn test_volatility_ranking() {
        let series = vec![
            named("steady", &[("2024-06-01", 5.0), ("2024-06-02", 5.0)]),
            named("spiky", &[("2024-06-01", 0.0), ("2024-06-02", 10.0)]),
            named("mild", &[("2024-06-01", 4.0), ("2024-06-02", 6.0)]),
            named("ignored", &[("2024-06-01", 0.0), ("2024-06-02", 100.0)]),
        ];
        let ranked = rank_volatility(&series, 3);
        let keys: Vec<&str> = ranked.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["spiky", "mild", "steady"]);
        assert_eq!(ranked[0].volatility, 5.0);
        assert_eq!(ranked[2].volatility, 0.0);
    }

    #[test]
    fn test_volatility_ties_break_by_key() {
        let series = vec![
            named("zinc", &[("2024-06-01", 1.0), ("2024-06-02", 3.0)]),
            named("argon", &[("2024-06-01", 3.0), ("2024-06-02", 1.0)]),
        ];
        let keys: Vec<String> = rank_volatility(&series, 5).into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["argon", "zinc"]);
    }

    #[test]
    fn test_top_series_stable_on_ties() {
        let series = vec![
            named("b", &[("2024-06-01", 2.0)]),
            named("a", &[("2024-06-01", 2.0)]),
            named("c", &[("2024-06-01", 9.0)]),
        ];
        let keys: Vec<String> = top_series(&series).into_iter().map(|t| t.key).collect();
        assert_eq!(keys, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_topic_shift() {
        let series = vec![
            named("algebra", &[("2024-06-01", 5.0), ("2024-06-02", 4.0), ("2024-06-04", 1.0)]),
            named("botany", &[("2024-06-03", 6.0), ("2024-06-04", 3.0)]),
        ];
        let shift = topic_shift(&series);
        assert_eq!(shift.from.as_deref(), Some("algebra"));
        assert_eq!(shift.to.as_deref(), Some("botany"));
        assert!(shift.shifted());
    }

    #[test]
    fn test_topic_shift_empty() {
        assert_eq!(topic_shift(&[]), TopicShift::default());
        let single = vec![named("a", &[("2024-06-01", 3.0)])];
        let shift = topic_shift(&single);
        assert_eq!(shift.from, None);
        assert_eq!(shift.to.as_deref(), Some("a"));
        assert!(!shift.shifted());
    }
}
