//! Wires chart containers to fetches and renders.
//!
//! Every container gets one unparameterized fetch at setup. Containers with a
//! timeframe control also get a listener task; each selected timeframe spawns
//! its own fetch, and nothing is cancelled, so whichever fetch resolves last
//! is what ends up drawn.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fetcher::ResultsSource;
use super::page::{ChartContainer, PageQuery};
use super::range::TimeRange;
use super::renderer::ChartRenderer;
use crate::error::TimelineError;

const SELECTOR_CHANNEL_CAPACITY: usize = 16;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartState {
    AwaitingData,
    Rendered,
}

#[derive(Debug, Clone, Copy)]
struct ChartStatus {
    state: ChartState,
    renders: u64,
}

#[derive(Clone)]
pub struct Dashboard {
    source: Arc<dyn ResultsSource>,
    renderer: Arc<ChartRenderer>,
    clock: Clock,
    statuses: Arc<DashMap<String, ChartStatus>>,
}

/// Handle to a chart set up by [`Dashboard::setup`].
pub struct ChartHandle {
    pub id: String,
    selector: Option<mpsc::Sender<f64>>,
}

impl ChartHandle {
    pub fn has_timeframe(&self) -> bool {
        self.selector.is_some()
    }

    /// Changes the chart's timeframe control to `hours`.
    pub async fn select_timeframe(&self, hours: f64) -> Result<(), TimelineError> {
        let selector = self
            .selector
            .as_ref()
            .ok_or_else(|| TimelineError::NoTimeframe(self.id.clone()))?;
        selector
            .send(hours)
            .await
            .map_err(|_| TimelineError::ListenerClosed(self.id.clone()))
    }
}

impl Dashboard {
    pub fn new(source: Arc<dyn ResultsSource>, renderer: Arc<ChartRenderer>) -> Self {
        Self {
            source,
            renderer,
            clock: Arc::new(Utc::now),
            statuses: Arc::new(DashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Starts every chart on the page. Must be called inside a tokio runtime.
    pub fn setup(&self, page: &dyn PageQuery) -> Vec<ChartHandle> {
        let containers = page.chart_containers();
        info!(charts = containers.len(), "Setting up charts.");
        containers
            .into_iter()
            .map(|container| self.setup_chart(Arc::new(container)))
            .collect()
    }

    fn setup_chart(&self, container: Arc<ChartContainer>) -> ChartHandle {
        self.statuses.insert(
            container.id.clone(),
            ChartStatus {
                state: ChartState::AwaitingData,
                renders: 0,
            },
        );
        self.spawn_refresh(container.clone(), None);

        let selector = container.timeframe.map(|control| {
            let (tx, rx) = mpsc::channel(SELECTOR_CHANNEL_CAPACITY);
            self.spawn_timeframe_listener(container.clone(), rx);
            // Fire once so the chart starts on the control's filtered view.
            if tx.try_send(control.hours).is_err() {
                warn!(chart_id = %container.id, "Failed to trigger initial timeframe.");
            }
            tx
        });

        ChartHandle {
            id: container.id.clone(),
            selector,
        }
    }

    fn spawn_timeframe_listener(
        &self,
        container: Arc<ChartContainer>,
        mut rx: mpsc::Receiver<f64>,
    ) -> JoinHandle<()> {
        let dashboard = self.clone();
        tokio::spawn(async move {
            while let Some(hours) = rx.recv().await {
                let now = (dashboard.clock)();
                match TimeRange::last_hours(hours, now) {
                    Ok(range) => {
                        debug!(chart_id = %container.id, hours, "Timeframe changed.");
                        dashboard.spawn_refresh(container.clone(), Some(range));
                    }
                    Err(e) => {
                        warn!(chart_id = %container.id, error = %e, "Ignoring timeframe.");
                    }
                }
            }
            debug!(chart_id = %container.id, "Timeframe listener stopped.");
        })
    }

    /// Fetches and renders once. Failures are logged and leave the chart as is.
    fn spawn_refresh(&self, container: Arc<ChartContainer>, range: Option<TimeRange>) -> JoinHandle<()> {
        let dashboard = self.clone();
        tokio::spawn(async move {
            let records = match dashboard.source.fetch(&container.data_url, range.as_ref()).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(chart_id = %container.id, url = %container.data_url, error = %e, "Failed to fetch check results.");
                    return;
                }
            };
            let count = records.len();
            let renderer = dashboard.renderer.clone();
            let target = container.target.clone();
            let rendered = tokio::task::spawn_blocking(move || renderer.render(&target, &records))
                .await
                .unwrap_or_else(|e| Err(TimelineError::Plot(format!("Render task failed: {e}"))));
            if let Err(e) = rendered {
                warn!(chart_id = %container.id, error = %e, "Failed to render chart.");
                return;
            }
            if let Some(mut status) = dashboard.statuses.get_mut(&container.id) {
                status.state = ChartState::Rendered;
                status.renders += 1;
            }
            debug!(chart_id = %container.id, records = count, "Chart rendered.");
        })
    }

    pub fn state(&self, id: &str) -> Option<ChartState> {
        self.statuses.get(id).map(|status| status.state)
    }

    pub fn render_count(&self, id: &str) -> u64 {
        self.statuses.get(id).map(|status| status.renders).unwrap_or(0)
    }

    /// Waits until chart `id` has rendered at least `count` times.
    pub async fn wait_for_renders(&self, id: &str, count: u64, timeout: Duration) -> bool {
        let poll = async {
            while self.render_count(id) < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    /// Waits for every chart in `ids` under one shared deadline. Returns the
    /// ids that had not rendered `count` times when it passed.
    pub async fn wait_for_all(&self, ids: &[String], count: u64, timeout: Duration) -> Vec<String> {
        let pending = || -> Vec<String> {
            ids.iter()
                .filter(|id| self.render_count(id) < count)
                .cloned()
                .collect()
        };
        let poll = async {
            while !pending().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        let _ = tokio::time::timeout(timeout, poll).await;
        pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::models::ObservationRecord;
    use crate::timeline::options::ChartOptions;
    use crate::timeline::page::TimeframeControl;
    use crate::timeline::renderer::tests::RecordingPlotter;
    use crate::timeline::svg::SvgPlotService;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Serves one record per call. Unranged calls resolve after `slow_unranged`.
    #[derive(Default)]
    struct FakeSource {
        calls: Mutex<Vec<(String, Option<TimeRange>)>>,
        slow_unranged: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl ResultsSource for FakeSource {
        async fn fetch(
            &self,
            data_url: &str,
            range: Option<&TimeRange>,
        ) -> Result<Vec<ObservationRecord>, TimelineError> {
            self.calls
                .lock()
                .unwrap()
                .push((data_url.to_string(), range.copied()));
            if self.fail {
                return Err(TimelineError::Status {
                    status: 500,
                    url: data_url.to_string(),
                });
            }
            let response_time = match range {
                Some(_) => 0.5,
                None => {
                    if let Some(delay) = self.slow_unranged {
                        tokio::time::sleep(delay).await;
                    }
                    0.25
                }
            };
            Ok(vec![ObservationRecord {
                checked_on: "2024-01-01T00:00:00Z".to_string(),
                response_time: Some(Some(response_time)),
                status_code: Some(200),
            }])
        }
    }

    struct StaticPage(Vec<ChartContainer>);

    impl PageQuery for StaticPage {
        fn chart_containers(&self) -> Vec<ChartContainer> {
            self.0.clone()
        }
    }

    fn container(id: &str, timeframe: Option<f64>) -> ChartContainer {
        ChartContainer {
            id: id.to_string(),
            data_url: format!("/checks/{id}/timeline/"),
            target: format!("{id}-response-time"),
            timeframe: timeframe.map(|hours| TimeframeControl { hours }),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn dashboard(source: Arc<FakeSource>, plotter: Arc<RecordingPlotter>) -> Dashboard {
        let renderer = Arc::new(ChartRenderer::new(ChartOptions::default(), plotter));
        Dashboard::new(source, renderer).with_clock(Arc::new(fixed_now))
    }

    #[tokio::test]
    async fn test_chart_without_timeframe_fetches_once_unranged() {
        let source = Arc::new(FakeSource::default());
        let plotter = Arc::new(RecordingPlotter::default());
        let dashboard = dashboard(source.clone(), plotter.clone());

        let handles = dashboard.setup(&StaticPage(vec![container("home", None)]));

        assert!(!handles[0].has_timeframe());
        assert!(dashboard.wait_for_renders("home", 1, Duration::from_secs(2)).await);
        assert_eq!(dashboard.state("home"), Some(ChartState::Rendered));
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("/checks/home/timeline/".to_string(), None)]);
        assert_eq!(plotter.calls.lock().unwrap()[0].0, "home-response-time");
    }

    #[tokio::test]
    async fn test_timeframe_triggered_once_at_setup() {
        let source = Arc::new(FakeSource::default());
        let plotter = Arc::new(RecordingPlotter::default());
        let dashboard = dashboard(source.clone(), plotter.clone());

        dashboard.setup(&StaticPage(vec![container("home", Some(6.0))]));

        assert!(dashboard.wait_for_renders("home", 2, Duration::from_secs(2)).await);
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let range = calls
            .iter()
            .find_map(|(_, range)| *range)
            .expect("ranged fetch");
        assert_eq!(range.end, fixed_now());
        assert_eq!(range.start, fixed_now() - chrono::Duration::hours(6));
    }

    #[tokio::test]
    async fn test_select_timeframe_refetches_with_new_bounds() {
        let source = Arc::new(FakeSource::default());
        let plotter = Arc::new(RecordingPlotter::default());
        let dashboard = dashboard(source.clone(), plotter.clone());

        let handles = dashboard.setup(&StaticPage(vec![container("home", Some(6.0))]));
        assert!(dashboard.wait_for_renders("home", 2, Duration::from_secs(2)).await);

        handles[0].select_timeframe(1.0).await.unwrap();
        assert!(dashboard.wait_for_renders("home", 3, Duration::from_secs(2)).await);

        let calls = source.calls.lock().unwrap();
        let (_, last_range) = calls.last().unwrap();
        let last_range = last_range.expect("ranged fetch");
        assert_eq!(last_range.start, fixed_now() - chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_select_timeframe_without_control() {
        let dashboard = dashboard(
            Arc::new(FakeSource::default()),
            Arc::new(RecordingPlotter::default()),
        );
        let handles = dashboard.setup(&StaticPage(vec![container("home", None)]));
        let err = handles[0].select_timeframe(1.0).await.unwrap_err();
        assert!(matches!(err, TimelineError::NoTimeframe(id) if id == "home"));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_chart_awaiting_data() {
        let source = Arc::new(FakeSource {
            fail: true,
            ..Default::default()
        });
        let plotter = Arc::new(RecordingPlotter::default());
        let dashboard = dashboard(source.clone(), plotter.clone());

        dashboard.setup(&StaticPage(vec![container("home", Some(2.0))]));

        assert!(!dashboard.wait_for_renders("home", 1, Duration::from_millis(200)).await);
        assert_eq!(dashboard.state("home"), Some(ChartState::AwaitingData));
        assert_eq!(source.calls.lock().unwrap().len(), 2);
        assert!(plotter.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_resolved_fetch_wins() {
        let source = Arc::new(FakeSource {
            slow_unranged: Some(Duration::from_millis(150)),
            ..Default::default()
        });
        let plotter = Arc::new(RecordingPlotter::default());
        let dashboard = dashboard(source.clone(), plotter.clone());

        dashboard.setup(&StaticPage(vec![container("home", Some(6.0))]));
        assert!(dashboard.wait_for_renders("home", 2, Duration::from_secs(2)).await);

        // The ranged fetch was requested last but the slow unranged one resolved last.
        let calls = plotter.calls.lock().unwrap();
        let (_, series) = calls.last().unwrap();
        assert_eq!(series[0].points[0].value, Some(250.0));
    }

    #[tokio::test]
    async fn test_charts_are_independent() {
        let source = Arc::new(FakeSource::default());
        let plotter = Arc::new(RecordingPlotter::default());
        let dashboard = dashboard(source.clone(), plotter.clone());

        dashboard.setup(&StaticPage(vec![container("home", None), container("api", None)]));

        assert!(dashboard.wait_for_renders("home", 1, Duration::from_secs(2)).await);
        assert!(dashboard.wait_for_renders("api", 1, Duration::from_secs(2)).await);
        assert_eq!(dashboard.state("missing"), None);
        assert_eq!(dashboard.render_count("missing"), 0);
    }

    #[tokio::test]
    async fn test_wait_for_all_shares_one_deadline() {
        let source = Arc::new(FakeSource {
            slow_unranged: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let dashboard = dashboard(source, Arc::new(RecordingPlotter::default()));
        dashboard.setup(&StaticPage(vec![container("home", None), container("api", None)]));
        let ids = vec!["home".to_string(), "api".to_string(), "missing".to_string()];

        let started = tokio::time::Instant::now();
        let pending = dashboard.wait_for_all(&ids, 1, Duration::from_millis(400)).await;

        assert_eq!(pending, vec!["missing".to_string()]);
        // One deadline for all three, not one per chart.
        assert!(started.elapsed() < Duration::from_millis(800));
        assert!(dashboard.wait_for_all(&ids[..2], 1, Duration::ZERO).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_of_one_target_write_whole_files() {
        let dir = tempfile::tempdir().unwrap();
        let plotter = Arc::new(SvgPlotService::new(dir.path()).unwrap());
        let renderer = Arc::new(ChartRenderer::new(ChartOptions::default(), plotter));
        let dashboard = Dashboard::new(Arc::new(FakeSource::default()), renderer)
            .with_clock(Arc::new(fixed_now));
        let mut home = container("home", Some(6.0));
        let mut api = container("api", Some(6.0));
        home.target = "shared".to_string();
        api.target = "shared".to_string();

        let handles = dashboard.setup(&StaticPage(vec![home, api]));
        for hours in [1.0, 2.0, 3.0, 4.0] {
            for handle in &handles {
                handle.select_timeframe(hours).await.unwrap();
            }
        }
        let ids = vec!["home".to_string(), "api".to_string()];
        assert!(dashboard.wait_for_all(&ids, 6, Duration::from_secs(10)).await.is_empty());

        let svg = std::fs::read_to_string(dir.path().join("shared.svg")).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
