//! Metrics and observability utilities
//!
//! Prometheus metrics for the ingestion pipeline with standardized
//! naming conventions. Recording is a no-op until a recorder is installed.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Chanfeed metrics
pub const METRICS_PREFIX: &str = "chanfeed";

/// Buckets for per-event processing latency (in seconds)
pub const EVENT_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    5.000,  // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_events_received_total", METRICS_PREFIX),
        Unit::Count,
        "Events pulled from a topic"
    );

    describe_counter!(
        format!("{}_events_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Events (or parts of events) that failed, by topic and stage"
    );

    describe_counter!(
        format!("{}_entities_created_total", METRICS_PREFIX),
        Unit::Count,
        "Rows inserted by the ingestion pipeline, by entity kind"
    );

    describe_histogram!(
        format!("{}_event_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time spent decoding and dispatching one event"
    );

    tracing::info!("Metrics registered");
}

/// Tracks the processing of one event
pub struct EventTimer {
    start: Instant,
    topic: &'static str,
}

impl EventTimer {
    /// Start tracking an event pulled from `topic`
    pub fn start(topic: &'static str) -> Self {
        counter!(
            format!("{}_events_received_total", METRICS_PREFIX),
            "topic" => topic
        )
        .increment(1);

        Self {
            start: Instant::now(),
            topic,
        }
    }

    /// Record completion, whatever the outcome
    pub fn finish(self) {
        histogram!(
            format!("{}_event_duration_seconds", METRICS_PREFIX),
            "topic" => self.topic
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

/// Count a failure at a given stage of event handling
pub fn record_failure(topic: &'static str, stage: &'static str) {
    counter!(
        format!("{}_events_failed_total", METRICS_PREFIX),
        "topic" => topic,
        "stage" => stage
    )
    .increment(1);
}

/// Count an inserted row
pub fn record_entity_created(kind: &'static str) {
    counter!(
        format!("{}_entities_created_total", METRICS_PREFIX),
        "kind" => kind
    )
    .increment(1);
}
