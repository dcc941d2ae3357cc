use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use super::models::{ObservationRecord, TimelineResponse};
use super::range::TimeRange;
use crate::error::TimelineError;

/// Source of observation records for a chart's data endpoint.
#[async_trait]
pub trait ResultsSource: Send + Sync {
    /// Fetches records. `None` sends no query parameters.
    async fn fetch(
        &self,
        data_url: &str,
        range: Option<&TimeRange>,
    ) -> Result<Vec<ObservationRecord>, TimelineError>;
}

pub struct HttpResultsSource {
    client: reqwest::Client,
    base_url: Option<Url>,
    max_range: chrono::Duration,
}

impl HttpResultsSource {
    pub fn new(
        base_url: Option<&str>,
        max_range_hours: u32,
        request_timeout: Option<Duration>,
    ) -> Result<Self, TimelineError> {
        let base_url = base_url
            .map(|raw| {
                Url::parse(raw).map_err(|e| TimelineError::InvalidUrl(format!("{raw}: {e}")))
            })
            .transpose()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
            max_range: chrono::Duration::hours(i64::from(max_range_hours)),
        })
    }

    /// Absolute URLs are used as-is, anything else is joined onto the base URL.
    pub fn resolve(&self, data_url: &str) -> Result<Url, TimelineError> {
        if let Ok(url) = Url::parse(data_url) {
            return Ok(url);
        }
        let base = self.base_url.as_ref().ok_or_else(|| {
            TimelineError::InvalidUrl(format!(
                "{data_url} is relative and no base_url is configured"
            ))
        })?;
        base.join(data_url)
            .map_err(|e| TimelineError::InvalidUrl(format!("{data_url}: {e}")))
    }
}

#[async_trait]
impl ResultsSource for HttpResultsSource {
    async fn fetch(
        &self,
        data_url: &str,
        range: Option<&TimeRange>,
    ) -> Result<Vec<ObservationRecord>, TimelineError> {
        let url = self.resolve(data_url)?;
        let mut request = self.client.get(url.clone());
        if let Some(range) = range {
            range.validate(self.max_range)?;
            request = request.query(&range.query_params());
        }

        debug!(url = %url, ranged = range.is_some(), "Fetching check results.");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TimelineError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let timeline = response.json::<TimelineResponse>().await?;
        Ok(timeline.results)
    }
}
