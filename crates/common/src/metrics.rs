//! Metrics collection for Brick
//!
//! This module provides Prometheus metrics for observability.
//! Counters are updated once per stream transition, never per poll.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics registry for Brick
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub streams: StreamMetrics,
    pub lifecycle: LifecycleMetrics,
}

/// Per-call streaming metrics
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    /// Total number of GenerateStream calls
    pub requests_total: IntCounter,

    /// Calls rejected before a stream was opened
    pub requests_rejected: IntCounter,

    /// Streams that reached end-of-stream
    pub streams_completed: IntCounter,

    /// Streams closed with a backend error
    pub streams_failed: IntCounter,

    /// Streams abandoned by the client
    pub streams_cancelled: IntCounter,

    /// Fragments forwarded to clients
    pub fragments_total: IntCounter,

    /// Currently open streams
    pub active_streams: IntGauge,

    /// Stream duration histogram
    pub stream_duration: Histogram,
}

/// Model load and shutdown metrics
#[derive(Debug, Clone)]
pub struct LifecycleMetrics {
    /// Model load duration
    pub model_load_duration: Histogram,

    /// 1 once the model is loaded
    pub model_loaded: IntGauge,

    /// StopServer calls received
    pub stop_requests: IntCounter,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        // Stream metrics
        let requests_total = IntCounter::new(
            "brick_generate_requests_total",
            "Total number of GenerateStream requests"
        ).unwrap();

        let requests_rejected = IntCounter::new(
            "brick_generate_requests_rejected_total",
            "GenerateStream requests rejected before streaming"
        ).unwrap();

        let streams_completed = IntCounter::new(
            "brick_streams_completed_total",
            "Streams that finished cleanly"
        ).unwrap();

        let streams_failed = IntCounter::new(
            "brick_streams_failed_total",
            "Streams closed with a generation error"
        ).unwrap();

        let streams_cancelled = IntCounter::new(
            "brick_streams_cancelled_total",
            "Streams cancelled by the client or by shutdown"
        ).unwrap();

        let fragments_total = IntCounter::new(
            "brick_fragments_total",
            "Total number of fragments forwarded to clients"
        ).unwrap();

        let active_streams = IntGauge::new(
            "brick_active_streams",
            "Current number of open streams"
        ).unwrap();

        let stream_duration = Histogram::with_opts(
            HistogramOpts::new(
                "brick_stream_duration_seconds",
                "Stream duration in seconds"
            ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
        ).unwrap();

        // Lifecycle metrics
        let model_load_duration = Histogram::with_opts(
            HistogramOpts::new(
                "brick_model_load_duration_seconds",
                "Model load duration in seconds"
            ).buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0])
        ).unwrap();

        let model_loaded = IntGauge::new(
            "brick_model_loaded",
            "Whether the model is loaded"
        ).unwrap();

        let stop_requests = IntCounter::new(
            "brick_stop_requests_total",
            "Total number of StopServer requests"
        ).unwrap();

        // Register all metrics
        registry.register(Box::new(requests_total.clone())).unwrap();
        registry.register(Box::new(requests_rejected.clone())).unwrap();
        registry.register(Box::new(streams_completed.clone())).unwrap();
        registry.register(Box::new(streams_failed.clone())).unwrap();
        registry.register(Box::new(streams_cancelled.clone())).unwrap();
        registry.register(Box::new(fragments_total.clone())).unwrap();
        registry.register(Box::new(active_streams.clone())).unwrap();
        registry.register(Box::new(stream_duration.clone())).unwrap();

        registry.register(Box::new(model_load_duration.clone())).unwrap();
        registry.register(Box::new(model_loaded.clone())).unwrap();
        registry.register(Box::new(stop_requests.clone())).unwrap();

        let streams = StreamMetrics {
            requests_total,
            requests_rejected,
            streams_completed,
            streams_failed,
            streams_cancelled,
            fragments_total,
            active_streams,
            stream_duration,
        };

        let lifecycle = LifecycleMetrics {
            model_load_duration,
            model_loaded,
            stop_requests,
        };

        MetricsRegistry {
            registry,
            streams,
            lifecycle,
        }
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper trait for measuring latency
pub trait LatencyTimer {
    /// Run a closure and record how long it took
    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R;
}

impl LatencyTimer for Histogram {
    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = std::time::Instant::now();
        let result = f();
        self.observe(start.elapsed().as_secs_f64());
        result
    }
}
