use super::models::{ObservationRecord, SeriesPoint};

/// The two series plotted on a response-time chart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSeries {
    /// Response time in milliseconds for every record.
    pub all: Vec<SeriesPoint>,
    /// Response time in milliseconds for error records only, `None` elsewhere.
    pub errors: Vec<SeriesPoint>,
}

/// Maps records to both series. One point per record in input order; records
/// are neither sorted nor validated.
pub fn build_series(records: &[ObservationRecord]) -> ResponseSeries {
    let mut series = ResponseSeries {
        all: Vec::with_capacity(records.len()),
        errors: Vec::with_capacity(records.len()),
    };
    for record in records {
        let timestamp = record.timestamp_millis();
        let millis = record.response_millis();
        series.all.push(SeriesPoint::new(timestamp, millis));
        series
            .errors
            .push(SeriesPoint::new(timestamp, error_value(record, millis)));
    }
    series
}

// A zero, NaN or missing response time on an error record plots as 0.
fn error_value(record: &ObservationRecord, millis: Option<f64>) -> Option<f64> {
    if !record.is_error() {
        return None;
    }
    match millis {
        Some(ms) if ms != 0.0 && !ms.is_nan() => Some(ms),
        _ => Some(0.0),
    }
}
