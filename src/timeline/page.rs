use crate::config::ChartConfig;

/// The time-range control attached to a chart; `hours` is its current value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeframeControl {
    pub hours: f64,
}

/// A chart container: where to fetch data and where to draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartContainer {
    pub id: String,
    pub data_url: String,
    pub target: String,
    pub timeframe: Option<TimeframeControl>,
}

/// Enumerates the chart containers on a page.
pub trait PageQuery: Send + Sync {
    fn chart_containers(&self) -> Vec<ChartContainer>;
}

/// A page described by the `[[charts]]` tables of the dashboard config.
pub struct ConfiguredPage {
    charts: Vec<ChartConfig>,
}

impl ConfiguredPage {
    pub fn new(charts: Vec<ChartConfig>) -> Self {
        Self { charts }
    }
}

impl PageQuery for ConfiguredPage {
    fn chart_containers(&self) -> Vec<ChartContainer> {
        self.charts
            .iter()
            .map(|chart| ChartContainer {
                id: chart.id.clone(),
                data_url: chart.data_url.clone(),
                target: chart.target.clone().unwrap_or_else(|| chart.id.clone()),
                timeframe: chart.timeframe_hours.map(|hours| TimeframeControl { hours }),
            })
            .collect()
    }
}
