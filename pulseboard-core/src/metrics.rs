//! Derived health metrics over daily series
//!
//! Every function here is total: empty, single-point, all-zero, and constant
//! inputs all produce a finite, documented value. Ratios whose denominator is
//! zero yield 0 rather than NaN or infinity, since the results feed
//! percentage-formatted display strings directly.

use crate::series::{lenient_number, lenient_string};
use serde::{Deserialize, Serialize};

/// `|delta|` below this reads as flat drift
pub const DRIFT_DEADBAND: f64 = 0.01;

/// Error-rate anomaly threshold for the operational (platform-wide) view
pub const OPERATIONAL_ANOMALY_THRESHOLD: f64 = 0.05;

/// Error-rate anomaly threshold for the personal (single-user) view
pub const PERSONAL_ANOMALY_THRESHOLD: f64 = 0.2;

/// Latest daily value above `avg * SPIKE_FACTOR` is a traffic spike
pub const SPIKE_FACTOR: f64 = 1.6;

// Quality score weights and bounds
const QUALITY_CONFIDENCE_WEIGHT: f64 = 100.0;
const QUALITY_DRIFT_PENALTY: f64 = 4.0;
const QUALITY_RETENTION_WEIGHT: f64 = 10.0;
const QUALITY_MIN: f64 = 0.0;
const QUALITY_MAX: f64 = 100.0;

/// Displayable direction of a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    /// Classify `delta`, reading anything within `deadband` of zero as flat
    pub fn classify(delta: f64, deadband: f64) -> Self {
        if !delta.is_finite() || delta.abs() < deadband {
            Direction::Flat
        } else if delta > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// Strict sign classification (zero is flat)
    pub fn of(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Up
        } else if delta < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Flat => "flat",
        }
    }
}

/// Signed fractional change with a qualitative trend label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Drift {
    pub delta: f64,
    pub trend: Direction,
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        0.0
    } else {
        finite_or_zero(numerator / denominator)
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        finite_or_zero(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// `(last - first) / first`; 0 when empty or `first == 0`
pub fn growth_rate(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) => ratio(last - first, first),
        _ => 0.0,
    }
}

/// Relative change between the averages of the two halves of `values`.
///
/// The first half holds `floor(n / 2)` points and the second half the rest.
/// 0 when the first half is empty or averages to zero.
pub fn period_delta(values: &[f64]) -> f64 {
    let (prev, next) = values.split_at(values.len() / 2);
    let prev_avg = mean(prev);
    let next_avg = mean(next);
    ratio(next_avg - prev_avg, prev_avg)
}

/// Period delta over a confidence-like average series, labeled with a trend
pub fn drift(values: &[f64]) -> Drift {
    let delta = period_delta(values);
    Drift {
        delta,
        trend: Direction::classify(delta, DRIFT_DEADBAND),
    }
}

/// Population standard deviation; 0 for fewer than two points
pub fn volatility(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    finite_or_zero(variance.sqrt())
}

/// New vs. active users for one snapshot period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionSnapshot {
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub new_users: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub active_users: f64,
}

/// `active / new` for the most recent snapshot; 0 when absent or `new == 0`
pub fn retention_rate(snapshots: &[RetentionSnapshot]) -> f64 {
    snapshots
        .last()
        .map_or(0.0, |latest| ratio(latest.active_users, latest.new_users))
}

/// Composite quality score clamped to [0, 100]:
/// `avg_confidence*100 - |drift*100|*4 + retention_rate*10`
pub fn quality_score(avg_confidence: f64, drift_delta: f64, retention_rate: f64) -> f64 {
    let raw = finite_or_zero(avg_confidence) * QUALITY_CONFIDENCE_WEIGHT
        - (finite_or_zero(drift_delta) * 100.0).abs() * QUALITY_DRIFT_PENALTY
        + finite_or_zero(retention_rate) * QUALITY_RETENTION_WEIGHT;
    finite_or_zero(raw).clamp(QUALITY_MIN, QUALITY_MAX)
}

/// Response counts by HTTP status class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    #[serde(rename = "2xx", default, deserialize_with = "lenient_number")]
    pub success: f64,
    #[serde(rename = "4xx", default, deserialize_with = "lenient_number")]
    pub client_error: f64,
    #[serde(rename = "5xx", default, deserialize_with = "lenient_number")]
    pub server_error: f64,
}

impl StatusBreakdown {
    pub fn total(&self) -> f64 {
        self.success + self.client_error + self.server_error
    }

    /// `(4xx + 5xx) / total`; 0 when there is no traffic
    pub fn error_rate(&self) -> f64 {
        ratio(self.client_error + self.server_error, self.total())
    }
}

/// Which dashboard an anomaly check runs for. The two views use different
/// error-rate thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyContext {
    #[default]
    Operational,
    Personal,
}

impl AnomalyContext {
    pub fn error_threshold(&self) -> f64 {
        match self {
            AnomalyContext::Operational => OPERATIONAL_ANOMALY_THRESHOLD,
            AnomalyContext::Personal => PERSONAL_ANOMALY_THRESHOLD,
        }
    }
}

/// Error rate above the context threshold, or the latest day spiking above
/// `SPIKE_FACTOR` times the daily average
pub fn is_anomalous(context: AnomalyContext, error_rate: f64, daily: &[f64]) -> bool {
    let avg = mean(daily);
    let latest = daily.last().copied().unwrap_or(0.0);
    error_rate > context.error_threshold() || (avg > 0.0 && latest > avg * SPIKE_FACTOR)
}

/// Sum of the last seven points against the seven before them
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekCompare {
    pub last7: f64,
    pub prev7: f64,
    pub delta: f64,
}

pub fn week_over_week(values: &[f64]) -> WeekCompare {
    let n = values.len();
    let last7: f64 = values[n.saturating_sub(7)..].iter().sum();
    let prev7: f64 = values[n.saturating_sub(14)..n.saturating_sub(7)].iter().sum();
    WeekCompare {
        last7,
        prev7,
        delta: ratio(last7 - prev7, prev7),
    }
}

/// Trailing moving average; windows of 0 or 1 return the input unchanged
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| mean(&values[(i + 1).saturating_sub(window)..=i]))
        .collect()
}

/// Scale `value` into [0, 1] over `[min, max]`; 0 for an empty range
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return 0.0;
    }
    finite_or_zero((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Format a percentage delta badge: `+12.3%`, `-4.0%`. Non-finite reads as 0.
pub fn format_delta_pct(percent: f64) -> String {
    // adding +0.0 folds -0.0 into +0.0
    let pct = finite_or_zero(percent) + 0.0;
    if pct >= 0.0 {
        format!("+{:.1}%", pct)
    } else {
        format!("{:.1}%", pct)
    }
}
