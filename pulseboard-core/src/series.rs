//! Time-stamped series - calendar dates, daily series, named series
//!
//! Raw records arrive from an external API layer and may be sparse or
//! malformed. Ingestion here is tolerant by contract:
//! - points whose date is missing or not a valid `YYYY-MM-DD` day are dropped
//! - missing, null, or non-numeric counts become 0
//! - events without a parseable `created_at` are skipped
//!
//! Series are ephemeral and rebuilt from scratch on every refresh.

use crate::clock::Zone;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A calendar day in the canonical zone, keyed as `YYYY-MM-DD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Parse a strict `YYYY-MM-DD` key. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let bytes = raw.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return None;
        }
        NaiveDate::parse_from_str(raw, Self::FORMAT).ok().map(Self)
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    /// ISO weekday index, Monday = 0 .. Sunday = 6
    pub fn weekday_index(&self) -> u32 {
        self.0.weekday().num_days_from_monday()
    }

    pub fn add_days(&self, days: u32) -> Option<Self> {
        self.0.checked_add_days(Days::new(u64::from(days))).map(Self)
    }

    pub fn sub_days(&self, days: u32) -> Option<Self> {
        self.0.checked_sub_days(Days::new(u64::from(days))).map(Self)
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for CalendarDate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| anyhow::anyhow!("invalid calendar date (want YYYY-MM-DD): {}", s))
    }
}

impl Serialize for CalendarDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid calendar date: {raw}")))
    }
}

/// One day's count
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub date: CalendarDate,
    pub count: f64,
}

impl TimePoint {
    pub fn new(date: CalendarDate, count: f64) -> Self {
        Self { date, count }
    }
}

/// Ascending, date-unique sequence of points. Missing days mean 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TimePoint>", into = "Vec<TimePoint>")]
pub struct DailySeries {
    points: Vec<TimePoint>,
}

impl DailySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from points in any order. A repeated date keeps its last count;
    /// non-finite counts become 0.
    pub fn from_points<I: IntoIterator<Item = TimePoint>>(points: I) -> Self {
        let mut by_date: BTreeMap<CalendarDate, f64> = BTreeMap::new();
        for point in points {
            let count = if point.count.is_finite() { point.count } else { 0.0 };
            by_date.insert(point.date, count);
        }
        Self {
            points: by_date
                .into_iter()
                .map(|(date, count)| TimePoint { date, count })
                .collect(),
        }
    }

    /// Build from raw records, reading each record's count
    pub fn from_raw(records: &[RawPoint]) -> Self {
        Self::from_raw_with(records, |record| record.count)
    }

    /// Build from raw records with a custom value picker (e.g. daily averages)
    pub fn from_raw_with<F: Fn(&RawPoint) -> f64>(records: &[RawPoint], pick: F) -> Self {
        let mut dropped = 0usize;
        let points: Vec<TimePoint> = records
            .iter()
            .filter_map(|record| {
                let date = record.date.as_deref().and_then(CalendarDate::parse);
                if date.is_none() {
                    dropped += 1;
                }
                date.map(|date| TimePoint::new(date, pick(record)))
            })
            .collect();
        if dropped > 0 {
            debug!(dropped, "skipped points with missing or malformed dates");
        }
        Self::from_points(points)
    }

    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Count on `date`, if the series has a point there
    pub fn get(&self, date: CalendarDate) -> Option<f64> {
        self.points
            .binary_search_by(|p| p.date.cmp(&date))
            .ok()
            .map(|idx| self.points[idx].count)
    }

    pub fn dates(&self) -> impl Iterator<Item = CalendarDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn counts(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.count).collect()
    }

    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.count).sum()
    }

    pub fn average(&self) -> f64 {
        if self.points.is_empty() {
            0.0
        } else {
            self.total() / self.points.len() as f64
        }
    }

    pub fn peak(&self) -> f64 {
        self.points.iter().map(|p| p.count).fold(0.0, f64::max)
    }

    /// Number of points with a positive count
    pub fn active_days(&self) -> usize {
        self.points.iter().filter(|p| p.count > 0.0).count()
    }

    /// Consecutive trailing points with a positive count
    pub fn current_streak(&self) -> usize {
        self.points
            .iter()
            .rev()
            .take_while(|p| p.count > 0.0)
            .count()
    }
}

impl From<Vec<TimePoint>> for DailySeries {
    fn from(points: Vec<TimePoint>) -> Self {
        Self::from_points(points)
    }
}

impl From<DailySeries> for Vec<TimePoint> {
    fn from(series: DailySeries) -> Self {
        series.points
    }
}

/// A labeled series (one subject, endpoint, status class, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub key: String,
    pub points: DailySeries,
}

impl NamedSeries {
    pub fn new(key: impl Into<String>, points: DailySeries) -> Self {
        Self {
            key: key.into(),
            points,
        }
    }
}

/// A raw `{date, count}` record as supplied by the API layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub count: f64,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub avg: Option<f64>,
}

/// Coerce a JSON value into a finite number (numeric strings allowed), else 0
pub fn coerce_number(value: &Value) -> f64 {
    coerce_optional_number(value).unwrap_or(0.0)
}

fn coerce_optional_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// Deserialize any JSON value as a number, falling back to 0
pub fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_number(&value))
}

/// Deserialize any JSON value as an optional number
pub fn lenient_optional_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_optional_number(&value))
}

pub fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// Decode raw records from a JSON array, skipping elements that are not objects
pub fn raw_points_from_value(value: &Value) -> Vec<RawPoint> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(_) => serde_json::from_value(item.clone()).ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Deserialize a tolerant daily count series from a JSON array
pub fn lenient_counts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DailySeries, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(DailySeries::from_raw(&raw_points_from_value(&value)))
}

/// Deserialize a tolerant daily average series (`avg`, falling back to `count`)
pub fn lenient_averages<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DailySeries, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(DailySeries::from_raw_with(
        &raw_points_from_value(&value),
        |record| record.avg.unwrap_or(record.count),
    ))
}

/// Parse a daily series document: either a bare array of `{date, count}`
/// records or an object with a `daily` array.
pub fn parse_daily_json(json: &str) -> Result<DailySeries> {
    let value: Value = serde_json::from_str(json).context("failed to parse daily series JSON")?;
    let records = match &value {
        Value::Array(_) => raw_points_from_value(&value),
        Value::Object(map) => match map.get("daily") {
            Some(daily @ Value::Array(_)) => raw_points_from_value(daily),
            _ => anyhow::bail!("expected an array of points or an object with a `daily` array"),
        },
        _ => anyhow::bail!("expected an array of points or an object with a `daily` array"),
    };
    Ok(DailySeries::from_raw(&records))
}

/// Parse named series: either an object mapping key to point array (key
/// order preserved) or an array of `{key, points}` objects.
pub fn parse_named_json(json: &str) -> Result<Vec<NamedSeries>> {
    let value: Value = serde_json::from_str(json).context("failed to parse named series JSON")?;
    match value {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, points)| {
                NamedSeries::new(key.clone(), DailySeries::from_raw(&raw_points_from_value(points)))
            })
            .collect()),
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| {
                let key = item.get("key")?.as_str()?;
                let points = item.get("points").cloned().unwrap_or(Value::Null);
                Some(NamedSeries::new(
                    key,
                    DailySeries::from_raw(&raw_points_from_value(&points)),
                ))
            })
            .collect()),
        _ => anyhow::bail!("expected an object of key -> points or an array of {{key, points}}"),
    }
}

/// Extract `created_at` instants from raw event records, skipping bad ones
pub fn event_instants(events: &[Value], zone: Zone) -> Vec<DateTime<Utc>> {
    let instants: Vec<DateTime<Utc>> = events
        .iter()
        .filter_map(|event| event.get("created_at")?.as_str())
        .filter_map(|raw| zone.parse_timestamp(raw))
        .collect();
    if instants.len() < events.len() {
        debug!(
            skipped = events.len() - instants.len(),
            "skipped events without a parseable created_at"
        );
    }
    instants
}

/// Count events per canonical-zone day
pub fn bucket_by_day(instants: &[DateTime<Utc>], zone: Zone) -> DailySeries {
    let mut counts: BTreeMap<CalendarDate, f64> = BTreeMap::new();
    for instant in instants {
        *counts.entry(CalendarDate::new(zone.date_of(*instant))).or_insert(0.0) += 1.0;
    }
    DailySeries::from_points(counts.into_iter().map(|(date, count)| TimePoint::new(date, count)))
}

/// Count events per canonical-zone hour of day
pub fn hourly_histogram(instants: &[DateTime<Utc>], zone: Zone) -> [u32; 24] {
    let mut buckets = [0u32; 24];
    for instant in instants {
        let hour = zone.hour_of(*instant) as usize;
        if let Some(bucket) = buckets.get_mut(hour) {
            *bucket = bucket.saturating_add(1);
        }
    }
    buckets
}

/// First-to-last activity span statistics over days with two or more events
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSpans {
    pub max_ms: i64,
    pub avg_ms: f64,
}

pub fn session_spans(instants: &[DateTime<Utc>], zone: Zone) -> SessionSpans {
    let mut by_day: HashMap<NaiveDate, (DateTime<Utc>, DateTime<Utc>, usize)> = HashMap::new();
    for instant in instants {
        let entry = by_day
            .entry(zone.date_of(*instant))
            .or_insert((*instant, *instant, 0));
        entry.0 = entry.0.min(*instant);
        entry.1 = entry.1.max(*instant);
        entry.2 += 1;
    }

    let spans: Vec<i64> = by_day
        .values()
        .filter(|(_, _, events)| *events >= 2)
        .map(|(first, last, _)| (*last - *first).num_milliseconds())
        .collect();

    if spans.is_empty() {
        return SessionSpans::default();
    }
    SessionSpans {
        max_ms: spans.iter().copied().max().unwrap_or(0),
        avg_ms: spans.iter().sum::<i64>() as f64 / spans.len() as f64,
    }
}
