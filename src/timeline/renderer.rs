use std::sync::Arc;

use tracing::debug;

use super::models::{ObservationRecord, SeriesPoint};
use super::options::ChartOptions;
use super::series::build_series;
use crate::error::TimelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStyle {
    Line,
    Points,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub points: Vec<SeriesPoint>,
    pub style: SeriesStyle,
    /// Overrides the default line color from the chart options.
    pub color: Option<String>,
}

/// Draws series into a named target. Implementations decide what a target is.
pub trait PlotService: Send + Sync {
    fn plot(
        &self,
        target: &str,
        series: &[PlotSeries],
        options: &ChartOptions,
    ) -> Result<(), TimelineError>;
}

pub struct ChartRenderer {
    options: ChartOptions,
    plotter: Arc<dyn PlotService>,
}

impl ChartRenderer {
    pub fn new(options: ChartOptions, plotter: Arc<dyn PlotService>) -> Self {
        Self { options, plotter }
    }

    /// Plots all response times as a line and error responses as points.
    pub fn render(&self, target: &str, records: &[ObservationRecord]) -> Result<(), TimelineError> {
        let series = build_series(records);
        debug!(target_name = %target, points = series.all.len(), "Rendering response times.");
        let plotted = [
            PlotSeries {
                points: series.all,
                style: SeriesStyle::Line,
                color: None,
            },
            PlotSeries {
                points: series.errors,
                style: SeriesStyle::Points,
                color: Some(self.options.error_color.clone()),
            },
        ];
        self.plotter.plot(target, &plotted, &self.options)
    }
}
