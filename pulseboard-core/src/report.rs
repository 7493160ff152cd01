//! Dashboard report - derived metrics assembled for display
//!
//! Global invariants enforced:
//! - Rebuilt from scratch on every refresh (no incremental merge)
//! - Metric order is fixed, so output is byte-identical for identical input
//! - Every numeric value in the report is finite

use crate::clock::Zone;
use crate::goals::{GoalState, CONFIDENCE, SAVED_PAPERS, WEEKLY_QUERIES};
use crate::metrics::{
    drift, format_delta_pct, growth_rate, is_anomalous, mean, period_delta, quality_score, retention_rate,
    volatility, week_over_week, AnomalyContext, Direction, RetentionSnapshot, StatusBreakdown,
};
use crate::series::{
    bucket_by_day, event_instants, hourly_histogram, lenient_averages, lenient_counts, lenient_optional_number,
    session_spans, DailySeries, SessionSpans,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// Raw dashboard payload as supplied by the API layer. Every field is
/// optional and tolerant of malformed records.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardInput {
    #[serde(deserialize_with = "lenient_context")]
    pub context: AnomalyContext,
    #[serde(deserialize_with = "lenient_counts")]
    pub usage_daily: DailySeries,
    #[serde(deserialize_with = "lenient_averages")]
    pub confidence_daily: DailySeries,
    #[serde(deserialize_with = "lenient_optional_number")]
    pub avg_confidence: Option<f64>,
    #[serde(deserialize_with = "lenient_optional_number")]
    pub saved_papers: Option<f64>,
    #[serde(deserialize_with = "lenient_retention")]
    pub retention: Vec<RetentionSnapshot>,
    #[serde(deserialize_with = "lenient_status")]
    pub status: StatusBreakdown,
    /// `{created_at, ...}` records; bucketed into usage when `usage_daily` is empty
    #[serde(deserialize_with = "lenient_events")]
    pub events: Vec<Value>,
}

/// Unknown or non-string contexts fall back to the operational dashboard
fn lenient_context<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AnomalyContext, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value.clone()).unwrap_or_else(|_| {
        debug!(context = %value, "unknown anomaly context, using operational");
        AnomalyContext::default()
    }))
}

/// Snapshots that are not objects are dropped
fn lenient_retention<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<RetentionSnapshot>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn lenient_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StatusBreakdown, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(StatusBreakdown::default());
    }
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_events<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items),
        _ => Ok(Vec::new()),
    }
}

impl DashboardInput {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse dashboard input JSON")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Count,
    Ratio,
    Score,
}

/// A scalar indicator with a displayable direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Metric {
    pub key: String,
    pub label: String,
    pub value: MetricValue,
    pub direction: Direction,
    pub unit: MetricUnit,
}

impl Metric {
    fn number(key: &str, label: &str, value: f64, direction: Direction, unit: MetricUnit) -> Self {
        Metric {
            key: key.to_string(),
            label: label.to_string(),
            value: MetricValue::Number(if value.is_finite() { value } else { 0.0 }),
            direction,
            unit,
        }
    }

    fn text(key: &str, label: &str, value: String, direction: Direction) -> Self {
        Metric {
            key: key.to_string(),
            label: label.to_string(),
            value: MetricValue::Text(value),
            direction,
            unit: MetricUnit::Ratio,
        }
    }

    pub fn display_value(&self) -> String {
        match (&self.value, self.unit) {
            (MetricValue::Text(text), _) => text.clone(),
            (MetricValue::Number(n), MetricUnit::Count) if n.fract() == 0.0 => format!("{:.0}", n),
            (MetricValue::Number(n), MetricUnit::Count) => format!("{:.2}", n),
            (MetricValue::Number(n), MetricUnit::Ratio) => format!("{:.1}%", n * 100.0),
            (MetricValue::Number(n), MetricUnit::Score) => format!("{:.1}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GoalProgress {
    pub metric_key: String,
    pub value: f64,
    pub target: f64,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DashboardReport {
    pub context: AnomalyContext,
    pub metrics: Vec<Metric>,
    pub anomaly: bool,
    pub quality_score: f64,
    pub goals: Vec<GoalProgress>,
    pub hourly: [u32; 24],
    pub sessions: SessionSpans,
}

impl DashboardReport {
    pub fn metric(&self, key: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.key == key)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize dashboard report to JSON")
    }

    pub fn render_text(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("{:<24} {:>12} {}\n", "METRIC", "VALUE", "TREND"));
        for metric in &self.metrics {
            output.push_str(&format!(
                "{:<24} {:>12} {}\n",
                metric.label,
                metric.display_value(),
                metric.direction.as_str()
            ));
        }

        output.push('\n');
        output.push_str(&format!(
            "Anomaly ({:?}): {}\n",
            self.context,
            if self.anomaly { "yes" } else { "no" }
        ));

        if !self.goals.is_empty() {
            output.push('\n');
            output.push_str(&format!("{:<24} {:>12} {:>12} {:>8}\n", "GOAL", "VALUE", "TARGET", "PROGRESS"));
            for goal in &self.goals {
                output.push_str(&format!(
                    "{:<24} {:>12.2} {:>12} {:>7.0}%\n",
                    goal.metric_key,
                    goal.value,
                    goal.target,
                    goal.progress * 100.0
                ));
            }
        }

        if let Some((hour, count)) = peak_hour(&self.hourly) {
            output.push('\n');
            output.push_str(&format!("Busiest hour: {:02}:00 ({} events)\n", hour, count));
        }
        output
    }
}

/// Earliest hour with the highest non-zero count
fn peak_hour(hourly: &[u32; 24]) -> Option<(usize, u32)> {
    hourly
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, count)| *count > 0)
        .fold(None, |best, (hour, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((hour, count)),
        })
}

/// Derive the full report for one refresh
pub fn build_report(input: &DashboardInput, goals: &GoalState, zone: Zone) -> DashboardReport {
    let instants = event_instants(&input.events, zone);
    let usage = if input.usage_daily.is_empty() {
        bucket_by_day(&instants, zone)
    } else {
        input.usage_daily.clone()
    };

    let counts = usage.counts();
    let confidence = input.confidence_daily.counts();
    let avg_confidence = input.avg_confidence.unwrap_or_else(|| mean(&confidence));

    let growth = growth_rate(&counts);
    let period = period_delta(&counts);
    let confidence_drift = drift(&confidence);
    let retention = retention_rate(&input.retention);
    let quality = quality_score(avg_confidence, confidence_drift.delta, retention);
    let week = week_over_week(&counts);
    let error_rate = input.status.error_rate();
    let week_direction = if week.delta >= 0.0 { Direction::Up } else { Direction::Down };

    let metrics = vec![
        Metric::number("total", "Total", usage.total(), Direction::of(week.delta), MetricUnit::Count),
        Metric::number("avg_daily", "Avg daily", usage.average(), Direction::Flat, MetricUnit::Count),
        Metric::number("peak", "Peak day", usage.peak(), Direction::Flat, MetricUnit::Count),
        Metric::number("active_days", "Active days", usage.active_days() as f64, Direction::Flat, MetricUnit::Count),
        Metric::number(
            "current_streak",
            "Current streak",
            usage.current_streak() as f64,
            Direction::Flat,
            MetricUnit::Count,
        ),
        Metric::number("growth", "Growth", growth, Direction::of(growth), MetricUnit::Ratio),
        Metric::number("period_delta", "Period delta", period, Direction::of(period), MetricUnit::Ratio),
        Metric::number("drift", "Confidence drift", confidence_drift.delta, confidence_drift.trend, MetricUnit::Ratio),
        Metric::number("volatility", "Volatility", volatility(&counts), Direction::Flat, MetricUnit::Count),
        Metric::number("retention", "Retention", retention, Direction::Flat, MetricUnit::Ratio),
        Metric::number("quality_score", "Quality score", quality, Direction::Flat, MetricUnit::Score),
        Metric::text(
            "week_over_week",
            "Week over week",
            format_delta_pct(week.delta * 100.0),
            week_direction,
        ),
        Metric::number(
            "error_rate",
            "Error rate",
            error_rate,
            Direction::classify(error_rate - input.context.error_threshold(), 0.0),
            MetricUnit::Ratio,
        ),
    ];

    let observed = [
        (WEEKLY_QUERIES, Some(week.last7)),
        (CONFIDENCE, Some(avg_confidence)),
        (SAVED_PAPERS, input.saved_papers),
    ];
    let goal_progress = goals
        .goals()
        .iter()
        .filter_map(|goal| {
            let value = observed
                .iter()
                .find(|(key, _)| *key == goal.metric_key)
                .and_then(|(_, value)| *value)?;
            Some(GoalProgress {
                metric_key: goal.metric_key.clone(),
                value,
                target: goal.target,
                progress: goals.progress(&goal.metric_key, value).unwrap_or(0.0),
            })
        })
        .collect();

    DashboardReport {
        context: input.context,
        metrics,
        anomaly: is_anomalous(input.context, error_rate, &counts),
        quality_score: quality,
        goals: goal_progress,
        hourly: hourly_histogram(&instants, zone),
        sessions: session_spans(&instants, zone),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(json: &str) -> DashboardInput {
        DashboardInput::from_json(json).unwrap()
    }

    #[test]
    fn test_empty_input_is_neutral() {
        let report = build_report(&input("{}"), &GoalState::defaults(), Zone::default());
        assert!(!report.anomaly);
        assert_eq!(report.quality_score, 0.0);
        assert_eq!(report.metric("growth").unwrap().value, MetricValue::Number(0.0));
        assert_eq!(
            report.metric("week_over_week").unwrap().value,
            MetricValue::Text("+0.0%".into())
        );
        assert_eq!(report.hourly, [0; 24]);
        // saved_papers has no observed value
        assert_eq!(report.goals.len(), 2);
        for metric in &report.metrics {
            if let MetricValue::Number(n) = metric.value {
                assert!(n.is_finite(), "{} not finite", metric.key);
            }
        }
    }

    #[test]
    fn test_tolerates_malformed_records() {
        let report = build_report(
            &input(
                r#"{
                    "usage_daily": [
                        {"date": "2024-06-01", "count": "4"},
                        {"date": null, "count": 9},
                        {"date": "2024-13-40", "count": 9},
                        {"date": "2024-06-02"},
                        "garbage"
                    ],
                    "status": {"2xx": "90", "4xx": 5, "5xx": null}
                }"#,
            ),
            &GoalState::defaults(),
            Zone::default(),
        );
        assert_eq!(report.metric("total").unwrap().value, MetricValue::Number(4.0));
        assert_eq!(report.metric("active_days").unwrap().value, MetricValue::Number(1.0));
        let error_rate = report.metric("error_rate").unwrap();
        assert_eq!(error_rate.display_value(), "5.3%");
    }

    #[test]
    fn test_garbage_in_every_section_still_reports() {
        let parsed = input(
            r#"{
                "context": "weekend",
                "usage_daily": null,
                "retention": [null, 7, "x", {"new_users": 20, "active_users": "15"}],
                "status": null,
                "events": null
            }"#,
        );
        assert_eq!(parsed.context, AnomalyContext::Operational);
        assert_eq!(parsed.retention.len(), 1);
        assert_eq!(parsed.status, StatusBreakdown::default());
        assert!(parsed.events.is_empty());

        let report = build_report(&parsed, &GoalState::defaults(), Zone::default());
        assert_eq!(report.metric("retention").unwrap().value, MetricValue::Number(0.75));

        let odd = input(r#"{"context": 3, "retention": {"new_users": 1}, "status": [1, 2], "events": "e"}"#);
        assert!(odd.retention.is_empty());
        assert_eq!(odd.status.total(), 0.0);
        assert!(odd.events.is_empty());
    }

    #[test]
    fn test_quality_and_anomaly() {
        let report = build_report(
            &input(
                r#"{
                    "context": "personal",
                    "usage_daily": [
                        {"date": "2024-06-01", "count": 2},
                        {"date": "2024-06-02", "count": 2},
                        {"date": "2024-06-03", "count": 10}
                    ],
                    "avg_confidence": 0.9,
                    "retention": [{"new_users": 10, "active_users": 5}],
                    "status": {"2xx": 100}
                }"#,
            ),
            &GoalState::defaults(),
            Zone::default(),
        );
        // 0.9*100 - 0 + 0.5*10
        assert_eq!(report.quality_score, 95.0);
        // 10 > mean(2,2,10) * 1.6
        assert!(report.anomaly);
        let confidence_goal = report.goals.iter().find(|g| g.metric_key == CONFIDENCE).unwrap();
        assert_eq!(confidence_goal.progress, 1.0);
    }

    #[test]
    fn test_events_bucketed_when_no_daily_usage() {
        let report = build_report(
            &input(
                r#"{"events": [
                    {"created_at": "2024-06-01T09:15:00+05:30"},
                    {"created_at": "2024-06-01T10:15:00+05:30"},
                    {"created_at": "2024-06-02T09:00:00+05:30"},
                    {"created_at": "not a time"},
                    {}
                ]}"#,
            ),
            &GoalState::defaults(),
            Zone::default(),
        );
        assert_eq!(report.metric("total").unwrap().value, MetricValue::Number(3.0));
        assert_eq!(report.hourly[9], 2);
        assert_eq!(report.hourly[10], 1);
        assert_eq!(report.sessions.max_ms, 3_600_000);
        assert!(report.render_text().contains("Busiest hour: 09:00 (2 events)"));
    }

    #[test]
    fn test_json_output_is_stable() {
        let payload = input(r#"{"usage_daily": [{"date": "2024-06-01", "count": 1}]}"#);
        let a = build_report(&payload, &GoalState::defaults(), Zone::default()).to_json().unwrap();
        let b = build_report(&payload, &GoalState::defaults(), Zone::default()).to_json().unwrap();
        assert_eq!(a, b);
        let parsed: Value = serde_json::from_str(&a).unwrap();
        assert_eq!(parsed["metrics"][0]["key"], "total");
        assert_eq!(parsed["metrics"][0]["direction"], "flat");
    }

    #[test]
    fn test_peak_hour_prefers_earliest() {
        let mut hourly = [0u32; 24];
        hourly[7] = 3;
        hourly[18] = 3;
        assert_eq!(peak_hour(&hourly), Some((7, 3)));
        assert_eq!(peak_hour(&[0; 24]), None);
    }
}
