use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Request metrics
    pub static ref DETECT_REQUESTS: IntCounter = IntCounter::new(
        "detect_requests_total",
        "Total number of classification requests received"
    ).unwrap();

    pub static ref DETECT_VERDICTS: IntCounterVec = IntCounterVec::new(
        Opts::new("detect_verdicts_total", "Total verdicts returned by label"),
        &["label"]
    ).unwrap();

    // Backend metrics
    pub static ref BACKEND_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("backend_attempts_total", "Total backend attempts by outcome"),
        &["outcome"]
    ).unwrap();

    pub static ref BACKEND_FAILOVERS: IntCounter = IntCounter::new(
        "backend_failovers_total",
        "Total number of failovers to a lower-priority backend"
    ).unwrap();

    // Latency metrics (in seconds)
    pub static ref DETECT_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "detect_duration_seconds",
            "End-to-end classification latency in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY.register(Box::new(DETECT_REQUESTS.clone())).unwrap();
    REGISTRY.register(Box::new(DETECT_VERDICTS.clone())).unwrap();
    REGISTRY.register(Box::new(BACKEND_ATTEMPTS.clone())).unwrap();
    REGISTRY.register(Box::new(BACKEND_FAILOVERS.clone())).unwrap();
    REGISTRY.register(Box::new(DETECT_LATENCY.clone())).unwrap();

    tracing::info!(
        "Metrics registry initialized with {} collectors",
        REGISTRY.gather().len()
    );
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration_seconds(&self, histogram: &Histogram) {
        let duration = self.start.elapsed();
        histogram.observe(duration.as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
