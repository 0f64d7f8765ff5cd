use std::convert::TryFrom;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::error::MetricsApiError;

pub const DEFAULT_HOURS: u32 = 24;
pub const MAX_HOURS: u32 = 720;

/// Look-back window length, always within `1..=MAX_HOURS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hours(u32);

impl Hours {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for Hours {
    fn default() -> Self {
        Hours(DEFAULT_HOURS)
    }
}

impl TryFrom<i64> for Hours {
    type Error = MetricsApiError;

    fn try_from(hours: i64) -> Result<Self, Self::Error> {
        if hours < 1 || hours > i64::from(MAX_HOURS) {
            return Err(MetricsApiError::validation(format!(
                "Hours parameter must be between 1 and {}",
                MAX_HOURS
            )));
        }
        Ok(Hours(u32::try_from(hours)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    #[serde(serialize_with = "serialize_iso")]
    pub start: DateTime<Utc>,
    #[serde(serialize_with = "serialize_iso")]
    pub end: DateTime<Utc>,
    #[serde(serialize_with = "serialize_hours")]
    pub hours: Hours,
}

impl TimeRange {
    pub fn ending_at(end: DateTime<Utc>, hours: Hours) -> Self {
        TimeRange {
            start: end - Duration::hours(i64::from(hours.get())),
            end,
            hours,
        }
    }

    pub fn ending_now(hours: Hours) -> Self {
        Self::ending_at(Utc::now(), hours)
    }

    /// CloudWatch period matching the window: finer for short windows,
    /// daily beyond a week.
    pub fn period_seconds(&self) -> i64 {
        match self.hours.get() {
            0..=3 => 60,
            4..=24 => 300,
            25..=168 => 3600,
            _ => 86400,
        }
    }

    pub fn start_param(&self) -> String {
        self.start.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

pub fn iso_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn serialize_iso<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_timestamp(at))
}

fn serialize_hours<S: Serializer>(hours: &Hours, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u32(hours.get())
}
