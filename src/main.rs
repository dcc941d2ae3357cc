use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use status_timeline::config::DashboardConfig;
use status_timeline::timeline::dashboard::{ChartHandle, Dashboard};
use status_timeline::timeline::fetcher::HttpResultsSource;
use status_timeline::timeline::page::ConfiguredPage;
use status_timeline::timeline::renderer::ChartRenderer;
use status_timeline::timeline::svg::SvgPlotService;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "status-timeline.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

/// Parses a `<chart-id> <hours>` line typed on stdin.
fn parse_selection(line: &str) -> Option<(&str, f64)> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?;
    let hours = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((id, hours))
}

async fn handle_selections(handles: HashMap<String, ChartHandle>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read from stdin.");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some((id, hours)) = parse_selection(&line) else {
            warn!(input = %line, "Expected '<chart-id> <hours>'.");
            continue;
        };
        match handles.get(id) {
            Some(handle) => {
                if let Err(e) = handle.select_timeframe(hours).await {
                    warn!(chart_id = %id, error = %e, "Timeframe not applied.");
                }
            }
            None => warn!(chart_id = %id, "Unknown chart."),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = DashboardConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!(charts = config.charts.len(), "Starting status timeline.");

    let chart_options = match config.load_chart_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Failed to load chart options: {}", e);
            return Err(e.into());
        }
    };

    let source = Arc::new(HttpResultsSource::new(
        config.base_url.as_deref(),
        config.max_range_hours,
        config.request_timeout(),
    )?);
    let plotter = Arc::new(SvgPlotService::new(&config.output_dir)?);
    let renderer = Arc::new(ChartRenderer::new(chart_options, plotter));
    let dashboard = Dashboard::new(source, renderer);

    let page = ConfiguredPage::new(config.charts.clone());
    let handles: HashMap<String, ChartHandle> = dashboard
        .setup(&page)
        .into_iter()
        .map(|handle| (handle.id.clone(), handle))
        .collect();
    let chart_ids: Vec<String> = handles.keys().cloned().collect();

    tokio::select! {
        _ = handle_selections(handles) => {
            info!("Input closed, waiting for pending renders.");
            for id in dashboard.wait_for_all(&chart_ids, 1, SHUTDOWN_GRACE).await {
                warn!(chart_id = %id, "Chart was never rendered.");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }
    Ok(())
}
