use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// A single check result as returned by the results endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub checked_on: String,
    /// Outer `None`: key absent. `Some(None)`: explicit `null`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_time: Option<Option<f64>>,
    #[serde(default)]
    pub status_code: Option<i64>,
}

impl ObservationRecord {
    /// Milliseconds since the epoch, or `None` when `checked_on` does not parse.
    pub fn timestamp_millis(&self) -> Option<i64> {
        parse_checked_on(&self.checked_on)
    }

    /// Response time in milliseconds. An explicit `null` counts as zero, an
    /// absent key has no value.
    pub fn response_millis(&self) -> Option<f64> {
        match self.response_time {
            None => None,
            Some(None) => Some(0.0),
            Some(Some(secs)) => Some(secs * 1000.0),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status_code.is_some_and(|code| code > 299)
    }
}

// Only called when the key is present, so `null` lands in the inner option.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TimelineResponse {
    pub results: Vec<ObservationRecord>,
}

/// One plotted `(timestamp, value)` pair. A missing timestamp marks an invalid
/// point, a missing value a gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp_millis: Option<i64>,
    pub value: Option<f64>,
}

impl SeriesPoint {
    pub fn new(timestamp_millis: Option<i64>, value: Option<f64>) -> Self {
        Self {
            timestamp_millis,
            value,
        }
    }

    /// The point when it can be drawn at all.
    pub fn drawable(&self) -> Option<(i64, f64)> {
        match (self.timestamp_millis, self.value) {
            (Some(ts), Some(v)) if v.is_finite() => Some((ts, v)),
            _ => None,
        }
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a `checked_on` value. RFC 3339 first, then naive forms read as UTC.
pub fn parse_checked_on(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .map(|naive| naive.and_utc().timestamp_millis())
    })
}
