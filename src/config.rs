use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::error::TimelineError;
use crate::timeline::options::ChartOptions;

const ENV_PREFIX: &str = "TIMELINE_";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChartConfig {
    pub id: String,
    pub data_url: String,
    /// Render target; defaults to `id`.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub timeframe_hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub base_url: Option<String>,
    pub output_dir: String,
    pub log_dir: String,
    pub chart_options: Option<String>,
    pub max_range_hours: u32,
    pub request_timeout_seconds: Option<u64>,
    pub charts: Vec<ChartConfig>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialDashboardConfig {
    base_url: Option<String>,
    output_dir: Option<String>,
    log_dir: Option<String>,
    chart_options: Option<String>,
    max_range_hours: Option<u32>,
    request_timeout_seconds: Option<u64>,
    #[serde(default)]
    charts: Vec<ChartConfig>,
}

fn default_output_dir() -> String {
    "charts".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_MAX_RANGE_HOURS: u32 = 24;

impl DashboardConfig {
    /// Loads the file (optional), then applies `TIMELINE_*` environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self, TimelineError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|e| {
                    TimelineError::Config(format!("Failed to read config file at {path_str}: {e}"))
                })?;
                toml::from_str::<PartialDashboardConfig>(&contents)?
            }
            Some(path_str) => {
                return Err(TimelineError::Config(format!(
                    "Config file not found at {path_str}"
                )));
            }
            None => PartialDashboardConfig::default(),
        };

        let env_config: PartialDashboardConfig = envy::prefixed(ENV_PREFIX).from_env()?;
        Self::merge(env_config, file_config)
    }

    // Environment overrides file. Charts only come from the file.
    fn merge(
        env_config: PartialDashboardConfig,
        file_config: PartialDashboardConfig,
    ) -> Result<Self, TimelineError> {
        let config = DashboardConfig {
            base_url: env_config.base_url.or(file_config.base_url),
            output_dir: env_config
                .output_dir
                .or(file_config.output_dir)
                .unwrap_or_else(default_output_dir),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            chart_options: env_config.chart_options.or(file_config.chart_options),
            max_range_hours: env_config
                .max_range_hours
                .or(file_config.max_range_hours)
                .unwrap_or(DEFAULT_MAX_RANGE_HOURS),
            request_timeout_seconds: env_config
                .request_timeout_seconds
                .or(file_config.request_timeout_seconds),
            charts: file_config.charts,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), TimelineError> {
        if self.charts.is_empty() {
            return Err(TimelineError::Config("At least one [[charts]] entry is required".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for chart in &self.charts {
            if !seen.insert(chart.id.as_str()) {
                return Err(TimelineError::Config(format!("Duplicate chart id '{}'", chart.id)));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_seconds.map(Duration::from_secs)
    }

    /// Reads and parses the chart options blob once; defaults when none is configured.
    pub fn load_chart_options(&self) -> Result<ChartOptions, TimelineError> {
        let Some(path) = &self.chart_options else {
            info!("No chart options configured, using defaults.");
            return Ok(ChartOptions::default());
        };
        let raw = fs::read_to_string(path).map_err(|e| {
            error!(path = %path, error = %e, "Failed to read chart options.");
            TimelineError::ChartOptions(format!("Failed to read {path}: {e}"))
        })?;
        ChartOptions::from_json(&raw)
    }
}
