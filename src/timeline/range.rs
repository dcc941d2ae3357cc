use chrono::{DateTime, Duration, Utc};

use crate::error::TimelineError;

/// A `start`/`end` window sent to the results endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window ending at `now` and reaching `offset_hours` back.
    pub fn last_hours(offset_hours: f64, now: DateTime<Utc>) -> Result<Self, TimelineError> {
        if !offset_hours.is_finite() {
            return Err(TimelineError::InvalidRange(format!(
                "Timeframe must be a number of hours, got {offset_hours}"
            )));
        }
        let offset_ms = (offset_hours * 3_600_000.0).round() as i64;
        let start = Duration::try_milliseconds(offset_ms)
            .and_then(|offset| now.checked_sub_signed(offset))
            .ok_or_else(|| {
                TimelineError::InvalidRange(format!("Timeframe of {offset_hours} hours is out of range"))
            })?;
        Ok(Self { start, end: now })
    }

    /// Checks the window against the endpoint's filter rules.
    pub fn validate(&self, max_span: Duration) -> Result<(), TimelineError> {
        if self.start > self.end {
            return Err(TimelineError::InvalidRange(
                "End date must be greater than start date.".to_string(),
            ));
        }
        if self.end - self.start > max_span {
            return Err(TimelineError::InvalidRange(format!(
                "Start to end must be less than {} hour(s).",
                max_span.num_hours()
            )));
        }
        Ok(())
    }

    pub fn query_params(&self) -> [(&'static str, String); 2] {
        [("start", format_bound(&self.start)), ("end", format_bound(&self.end))]
    }
}

/// `YYYY-MM-DD HH:MM:SS ` in UTC: ISO form with the `T` replaced by a space,
/// sub-second digits dropped and a trailing space.
pub fn format_bound(ts: &DateTime<Utc>) -> String {
    format!("{} ", ts.format("%Y-%m-%d %H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap() + Duration::milliseconds(987)
    }

    #[test]
    fn test_format_bound_strips_subseconds() {
        assert_eq!(format_bound(&noon()), "2024-03-10 12:00:00 ");
    }

    #[test]
    fn test_last_hours() {
        let range = TimeRange::last_hours(6.0, noon()).unwrap();
        assert_eq!(range.end, noon());
        assert_eq!(range.start, noon() - Duration::hours(6));
        let [(start_key, start), (end_key, end)] = range.query_params();
        assert_eq!((start_key, start.as_str()), ("start", "2024-03-10 06:00:00 "));
        assert_eq!((end_key, end.as_str()), ("end", "2024-03-10 12:00:00 "));
    }

    #[test]
    fn test_fractional_hours() {
        let range = TimeRange::last_hours(0.5, noon()).unwrap();
        assert_eq!(range.end - range.start, Duration::minutes(30));
    }

    #[test]
    fn test_non_finite_offset() {
        assert!(matches!(
            TimeRange::last_hours(f64::NAN, noon()),
            Err(TimelineError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_validate() {
        let day = Duration::hours(24);
        assert!(TimeRange::last_hours(24.0, noon()).unwrap().validate(day).is_ok());
        assert!(TimeRange::last_hours(25.0, noon()).unwrap().validate(day).is_err());
        let reversed = TimeRange::new(noon(), noon() - Duration::hours(1));
        let err = reversed.validate(day).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid time range: End date must be greater than start date."
        );
    }

    #[test]
    fn test_negative_offset_is_reversed_window() {
        let range = TimeRange::last_hours(-1.0, noon()).unwrap();
        assert!(range.validate(Duration::hours(24)).is_err());
    }
}
