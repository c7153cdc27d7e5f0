//! Performance metrics collection with rolling averages.
//!
//! Metrics are stored in-memory and support rolling averages over
//! configurable time windows.
//!
//! ## Architecture
//!
//! The metrics system uses a global singleton (`global_metrics()`) that can be
//! accessed from anywhere in the codebase: the gateway worker thread, index
//! builders and the retrieval path all record to the same collector.
//!
//! ## Metrics Categories
//!
//! - **Indexing metrics**: Per-page embedding and validation time
//! - **Retrieval metrics**: Query embedding, scoring, highlighting, totals
//! - **Answer metrics**: Answer service round trips
//! - **Gateway metrics**: Queue depth, queue wait, inference time

use instant::Instant;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default window size for rolling averages (60 seconds).
/// Used for high-frequency operations like page indexing and gateway requests.
const DEFAULT_WINDOW_SECS: u64 = 60;

/// Window size for retrieval metrics (5 minutes).
/// Queries are less frequent than page embeddings during indexing, so we use
/// a longer window to capture meaningful averages.
const RETRIEVAL_WINDOW_SECS: u64 = 300;

/// Maximum samples to keep per metric (prevents unbounded growth).
const MAX_SAMPLES: usize = 1000;

/// A single timing sample with timestamp.
#[derive(Clone, Debug)]
struct TimingSample {
    /// When this sample was recorded.
    timestamp: Instant,
    /// Duration of the operation in milliseconds.
    duration_ms: f64,
}

/// Rolling statistics for a single metric.
#[derive(Debug, Default)]
struct MetricData {
    /// Recent samples within the rolling window.
    samples: VecDeque<TimingSample>,
    /// Total count since startup.
    total_count: u64,
}

impl MetricData {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            total_count: 0,
        }
    }

    /// Record a new sample.
    fn record(&mut self, duration_ms: f64) {
        self.total_count += 1;
        self.samples.push_back(TimingSample {
            timestamp: Instant::now(),
            duration_ms,
        });

        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// Prune samples older than the window.
    fn prune(&mut self, window: Duration) {
        let Some(cutoff) = Instant::now().checked_sub(window) else {
            // Window extends before process start, keep all samples
            return;
        };

        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn in_window(&self, window: Duration) -> impl Iterator<Item = &TimingSample> {
        let cutoff = Instant::now().checked_sub(window);
        self.samples
            .iter()
            .filter(move |s| cutoff.map_or(true, |c| s.timestamp >= c))
    }

    /// Calculate rolling average over the window.
    fn rolling_avg(&self, window: Duration) -> Option<f64> {
        let (sum, count) = self
            .in_window(window)
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.duration_ms, count + 1));
        if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        }
    }

    /// Get count of samples in the window.
    fn rolling_count(&self, window: Duration) -> usize {
        self.in_window(window).count()
    }

    /// Calculate throughput (samples per second) over the window.
    fn throughput(&self, window: Duration) -> f64 {
        let count = self.rolling_count(window);
        if count == 0 {
            return 0.0;
        }
        count as f64 / window.as_secs_f64()
    }
}

/// Information about the last retrieval (point-in-time, not rolling).
#[derive(Clone, Debug, Default)]
struct LastRetrievalInfo {
    result_count: usize,
    pages_scored: usize,
    top_score: Option<f32>,
    ocr_degraded_count: usize,
}

/// Collected metrics snapshot for display.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    /// Page indexing metrics.
    pub page_indexing_avg_ms: Option<f64>,
    pub page_indexing_count: usize,
    pub page_indexing_throughput: f64,
    /// Lifetime total of pages indexed.
    pub total_pages_indexed: u64,

    /// Answer generation metrics.
    pub answer_avg_ms: Option<f64>,
    pub answer_count: usize,

    /// Retrieval metrics.
    pub retrieval: RetrievalSnapshot,

    /// Gateway metrics.
    pub gateway: GatewaySnapshot,
}

/// Retrieval-specific metrics snapshot.
#[derive(Clone, Debug, Default)]
pub struct RetrievalSnapshot {
    /// Average time to embed the query, including queueing (ms).
    pub query_embed_avg_ms: Option<f64>,
    /// Average MaxSim scoring and selection time (ms).
    pub scoring_avg_ms: Option<f64>,
    /// Average highlight composition time (ms).
    pub highlight_avg_ms: Option<f64>,
    /// Average total retrieval latency (ms).
    pub total_latency_avg_ms: Option<f64>,
    /// Number of retrievals in the rolling window.
    pub query_count: usize,

    /// Last retrieval info (point-in-time).
    pub last_result_count: Option<usize>,
    pub last_pages_scored: Option<usize>,
    pub last_top_score: Option<f32>,
    pub last_ocr_degraded_count: Option<usize>,
}

/// Embedding gateway metrics snapshot.
#[derive(Clone, Debug, Default)]
pub struct GatewaySnapshot {
    /// Current queue depth (pending requests).
    pub queue_depth: usize,
    /// Average queue wait time (ms).
    pub queue_wait_avg_ms: Option<f64>,
    /// Average inference time (ms).
    pub inference_avg_ms: Option<f64>,
    /// Total requests completed.
    pub requests_completed: u64,
}

/// Internal metrics storage.
struct MetricsInner {
    page_indexing: MetricData,
    answer: MetricData,

    retrieval_query_embed: MetricData,
    retrieval_scoring: MetricData,
    retrieval_highlight: MetricData,
    retrieval_total: MetricData,
    last_retrieval: Option<LastRetrievalInfo>,

    gateway_queue_wait: MetricData,
    gateway_inference: MetricData,
    gateway_queue_depth: usize,
    gateway_requests_completed: u64,
}

impl Default for MetricsInner {
    fn default() -> Self {
        Self {
            page_indexing: MetricData::new(),
            answer: MetricData::new(),

            retrieval_query_embed: MetricData::new(),
            retrieval_scoring: MetricData::new(),
            retrieval_highlight: MetricData::new(),
            retrieval_total: MetricData::new(),
            last_retrieval: None,

            gateway_queue_wait: MetricData::new(),
            gateway_inference: MetricData::new(),
            gateway_queue_depth: 0,
            gateway_requests_completed: 0,
        }
    }
}

/// Timings of one retrieval, recorded in a single call.
#[derive(Clone, Debug, Default)]
pub struct RetrievalTimings {
    /// Query embedding, including time queued at the gateway
    pub query_embed_ms: f64,
    /// MaxSim over all pages plus top-k selection
    pub scoring_ms: f64,
    /// Highlight composition for the selected pages
    pub highlight_ms: f64,
    /// Pages returned
    pub result_count: usize,
    /// Pages scored
    pub pages_scored: usize,
    /// Score of the best page, if any
    pub top_score: Option<f32>,
    /// Selected pages whose highlights fell back to patch rectangles
    pub ocr_degraded_count: usize,
}

/// Performance metrics collector.
///
/// Thread-safe collector for timing metrics with rolling averages.
/// Use `record_*` methods to log timings, and `snapshot()` to get
/// current statistics.
///
/// Different metric types use different window sizes:
/// - Indexing and gateway metrics: 60 seconds
/// - Retrieval and answer metrics: 5 minutes
#[derive(Clone)]
pub struct PerformanceMetrics {
    inner: Arc<RwLock<MetricsInner>>,
    /// Window for high-frequency operations.
    window: Duration,
    /// Window for retrieval metrics.
    retrieval_window: Duration,
}

impl PerformanceMetrics {
    /// Create a new metrics collector with default windows.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            retrieval_window: Duration::from_secs(RETRIEVAL_WINDOW_SECS),
        }
    }

    /// Create a new metrics collector with one window for everything (for testing).
    pub fn with_window(window_secs: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
            window: Duration::from_secs(window_secs),
            retrieval_window: Duration::from_secs(window_secs),
        }
    }

    // =========================================================================
    // Indexing and answer metrics
    // =========================================================================

    /// Record the time to embed and validate one page.
    pub fn record_page_indexing(&self, duration_ms: f64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.page_indexing.record(duration_ms);
        }
    }

    /// Record one answer service round trip.
    pub fn record_answer_generation(&self, duration_ms: f64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.answer.record(duration_ms);
        }
    }

    // =========================================================================
    // Retrieval metrics
    // =========================================================================

    /// Record metrics from a completed retrieval.
    pub fn record_retrieval(&self, timings: &RetrievalTimings) {
        if let Ok(mut inner) = self.inner.write() {
            inner.retrieval_query_embed.record(timings.query_embed_ms);
            inner.retrieval_scoring.record(timings.scoring_ms);
            inner.retrieval_highlight.record(timings.highlight_ms);
            inner
                .retrieval_total
                .record(timings.query_embed_ms + timings.scoring_ms + timings.highlight_ms);
            inner.last_retrieval = Some(LastRetrievalInfo {
                result_count: timings.result_count,
                pages_scored: timings.pages_scored,
                top_score: timings.top_score,
                ocr_degraded_count: timings.ocr_degraded_count,
            });
        }
    }

    // =========================================================================
    // Gateway metrics
    // =========================================================================

    /// Record gateway request timing.
    ///
    /// # Arguments
    /// * `queue_wait_ms` - Time spent waiting in queue before processing
    /// * `inference_ms` - Time spent on actual model inference
    pub fn record_gateway_request(&self, queue_wait_ms: f64, inference_ms: f64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.gateway_queue_wait.record(queue_wait_ms);
            inner.gateway_inference.record(inference_ms);
        }
    }

    /// Update gateway state gauges.
    pub fn update_gateway_stats(&self, queue_depth: usize, requests_completed: u64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.gateway_queue_depth = queue_depth;
            inner.gateway_requests_completed = requests_completed;
        }
    }

    // =========================================================================
    // Snapshot and maintenance
    // =========================================================================

    /// Prune old samples outside the window.
    pub fn prune(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.page_indexing.prune(self.window);
            inner.gateway_queue_wait.prune(self.window);
            inner.gateway_inference.prune(self.window);

            inner.answer.prune(self.retrieval_window);
            inner.retrieval_query_embed.prune(self.retrieval_window);
            inner.retrieval_scoring.prune(self.retrieval_window);
            inner.retrieval_highlight.prune(self.retrieval_window);
            inner.retrieval_total.prune(self.retrieval_window);
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = match self.inner.read() {
            Ok(inner) => inner,
            Err(_) => return MetricsSnapshot::default(),
        };
        let last = inner.last_retrieval.as_ref();
        let rw = self.retrieval_window;

        MetricsSnapshot {
            page_indexing_avg_ms: inner.page_indexing.rolling_avg(self.window),
            page_indexing_count: inner.page_indexing.rolling_count(self.window),
            page_indexing_throughput: inner.page_indexing.throughput(self.window),
            total_pages_indexed: inner.page_indexing.total_count,

            answer_avg_ms: inner.answer.rolling_avg(rw),
            answer_count: inner.answer.rolling_count(rw),

            retrieval: RetrievalSnapshot {
                query_embed_avg_ms: inner.retrieval_query_embed.rolling_avg(rw),
                scoring_avg_ms: inner.retrieval_scoring.rolling_avg(rw),
                highlight_avg_ms: inner.retrieval_highlight.rolling_avg(rw),
                total_latency_avg_ms: inner.retrieval_total.rolling_avg(rw),
                query_count: inner.retrieval_total.rolling_count(rw),

                last_result_count: last.map(|r| r.result_count),
                last_pages_scored: last.map(|r| r.pages_scored),
                last_top_score: last.and_then(|r| r.top_score),
                last_ocr_degraded_count: last.map(|r| r.ocr_degraded_count),
            },

            gateway: GatewaySnapshot {
                queue_depth: inner.gateway_queue_depth,
                queue_wait_avg_ms: inner.gateway_queue_wait.rolling_avg(self.window),
                inference_avg_ms: inner.gateway_inference.rolling_avg(self.window),
                requests_completed: inner.gateway_requests_completed,
            },
        }
    }

    /// Get the window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Clear all metrics data.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            *inner = MetricsInner::default();
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// Global metrics instance
use once_cell::sync::Lazy;

static GLOBAL_METRICS: Lazy<PerformanceMetrics> = Lazy::new(PerformanceMetrics::new);

/// Get the global metrics collector.
pub fn global_metrics() -> &'static PerformanceMetrics {
    &GLOBAL_METRICS
}

/// Convenience macro for timing a block and recording to a metric.
///
/// Works with `.await` inside the block when used in an async context.
#[macro_export]
macro_rules! time_operation {
    ($metric:ident, $block:expr) => {{
        let start = instant::Instant::now();
        let result = $block;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        $crate::metrics::global_metrics().$metric(duration_ms);
        result
    }};
}
