//! Clock and canonical time zone capabilities
//!
//! Every date key in pulseboard is computed in one canonical fixed offset.
//! Neither the offset nor "now" is ambient: callers pass a [`Zone`] and a
//! [`Clock`] so tests can pin both.

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc};

/// Default canonical offset in minutes east of UTC (+05:30)
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;

/// Source of the current instant
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }

    /// Clock pinned to local noon of `date` in `zone`
    pub fn at_local_noon(date: NaiveDate, zone: Zone) -> Self {
        let local_noon = date.and_time(Default::default()) + Duration::hours(12);
        Self::new(zone.to_utc(local_noon))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

/// Canonical time zone used for all date-key math
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    offset: FixedOffset,
}

impl Zone {
    /// Build a zone from minutes east of UTC
    pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| anyhow::anyhow!("utc offset out of range: {} minutes", minutes))?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    /// Calendar day `instant` falls on in this zone
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Hour of day (0..24) `instant` falls on in this zone
    pub fn hour_of(&self, instant: DateTime<Utc>) -> u32 {
        instant.with_timezone(&self.offset).hour()
    }

    pub fn today(&self, clock: &dyn Clock) -> NaiveDate {
        self.date_of(clock.now())
    }

    /// Interpret a zone-local wall time as a UTC instant
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let shifted = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&shifted)
    }

    /// Parse an event timestamp.
    ///
    /// RFC 3339 strings carry their own offset. Naive `YYYY-MM-DDTHH:MM:SS`
    /// (optionally with fractional seconds, or a space instead of `T`) is read
    /// as wall time in this zone. Anything else yields `None`.
    pub fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|local| self.to_utc(local))
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self::from_offset_minutes(DEFAULT_UTC_OFFSET_MINUTES).unwrap_or_else(|_| Self::utc())
    }
}
