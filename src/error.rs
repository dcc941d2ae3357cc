use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid chart options: {0}")]
    ChartOptions(String),
    #[error("Invalid time range: {0}")]
    InvalidRange(String),
    #[error("Invalid data URL: {0}")]
    InvalidUrl(String),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Endpoint returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Plotting failed: {0}")]
    Plot(String),
    #[error("Chart {0} has no timeframe control")]
    NoTimeframe(String),
    #[error("Timeframe listener for chart {0} has stopped")]
    ListenerClosed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for TimelineError {
    fn from(err: toml::de::Error) -> Self {
        TimelineError::Config(format!("TOML parse error: {err}"))
    }
}

impl From<envy::Error> for TimelineError {
    fn from(err: envy::Error) -> Self {
        TimelineError::Config(format!("Failed to load config from environment: {err}"))
    }
}
