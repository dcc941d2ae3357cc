//! SVG implementation of [`PlotService`] on top of `plotters`.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::DateTime;
use plotters::prelude::*;
use tracing::{debug, info};

use super::options::{ChartOptions, parse_hex_color};
use super::renderer::{PlotSeries, PlotService, SeriesStyle};
use crate::error::TimelineError;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes each target to `<output_dir>/<target>.svg`.
pub struct SvgPlotService {
    output_dir: PathBuf,
}

impl SvgPlotService {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, TimelineError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn path_for(&self, target: &str) -> Result<PathBuf, TimelineError> {
        let valid = !target.is_empty()
            && target
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !target.starts_with('.');
        if !valid {
            return Err(TimelineError::Plot(format!("Invalid plot target '{target}'")));
        }
        Ok(self.output_dir.join(format!("{target}.svg")))
    }

    // Unique per call, and in the same directory so the rename stays atomic.
    fn temp_path_for(&self, target: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.output_dir
            .join(format!(".{target}.{}.{n}.svg.tmp", std::process::id()))
    }
}

impl PlotService for SvgPlotService {
    fn plot(
        &self,
        target: &str,
        series: &[PlotSeries],
        options: &ChartOptions,
    ) -> Result<(), TimelineError> {
        options.validate()?;
        let path = self.path_for(target)?;
        let temp = self.temp_path_for(target);
        let written = draw_svg(&temp, series, options)
            .map_err(|e| TimelineError::Plot(e.to_string()))
            .and_then(|()| fs::rename(&temp, &path).map_err(TimelineError::from));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp) {
                debug!(path = ?temp, error = %cleanup, "Temporary chart file not removed.");
            }
            return Err(e);
        }
        info!(path = ?path, "Chart written.");
        Ok(())
    }
}

fn rgb(raw: &str) -> Result<RGBColor, TimelineError> {
    let (r, g, b) = parse_hex_color(raw)?;
    Ok(RGBColor(r, g, b))
}

/// Bounds over all drawable points, padded so a flat or empty chart still has
/// a non-empty area.
fn bounds(series: &[PlotSeries]) -> (std::ops::Range<i64>, std::ops::Range<f64>) {
    let drawable = series
        .iter()
        .flat_map(|s| s.points.iter().filter_map(|p| p.drawable()));
    let mut x_min = i64::MAX;
    let mut x_max = i64::MIN;
    let mut y_max = 0f64;
    for (x, y) in drawable {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
    }
    if x_min > x_max {
        return (0..1, 0.0..1.0);
    }
    if x_min == x_max {
        x_max = x_min + 1;
    }
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };
    (x_min..x_max, 0.0..y_max)
}

/// Splits a series at gaps and invalid points into drawable runs.
fn segments(series: &PlotSeries) -> Vec<Vec<(i64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for point in &series.points {
        match point.drawable() {
            Some(p) => current.push(p),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn draw_svg(
    path: &Path,
    series: &[PlotSeries],
    options: &ChartOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&rgb(&options.background)?)?;

    let (x_range, y_range) = bounds(series);
    let font = (options.font_family.as_str(), f64::from(options.font_size));
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range, y_range)?;

    let time_format = options.time_format.as_str();
    let format_x = |ms: &i64| {
        DateTime::from_timestamp_millis(*ms)
            .map(|dt| dt.format(time_format).to_string())
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .x_labels(options.x_labels)
        .y_labels(options.y_labels)
        .x_label_formatter(&format_x)
        .y_desc(options.y_label.as_str())
        .label_style(font)
        .draw()?;

    let default_color = rgb(&options.line_color)?;
    for s in series {
        let color = match &s.color {
            Some(raw) => rgb(raw)?,
            None => default_color,
        };
        match s.style {
            SeriesStyle::Line => {
                for run in segments(s) {
                    chart.draw_series(LineSeries::new(run, &color))?;
                }
            }
            SeriesStyle::Points => {
                let radius = options.point_radius_px()?;
                chart.draw_series(
                    s.points
                        .iter()
                        .filter_map(|p| p.drawable())
                        .map(|(x, y)| Circle::new((x, y), radius, color.filled())),
                )?;
            }
        }
    }

    root.present()?;
    Ok(())
}
