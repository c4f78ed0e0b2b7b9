//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (jobs, external waits)
//! - Sub-orchestrations (imagery, image analysis, relationships)
//! - Deliberation (rounds, verdicts)
//! - External services (work queue, imagery processor, LLM)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Jobs finished, by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stratum_jobs_total", "Total site processing jobs finished"),
        &["outcome"], // "completed", "unsupported", "aborted", "failed", "cancelled"
    )
    .unwrap()
});

/// Instances currently running.
pub static JOBS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "stratum_jobs_in_flight",
        "Site processing instances currently running",
    )
    .unwrap()
});

/// Time spent waiting for the processors' completion event.
pub static EXTERNAL_WAIT_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "stratum_external_wait_seconds",
            "Time between dispatch and the completion event",
        )
        .buckets(vec![
            1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 21600.0,
        ]),
        &["event"],
    )
    .unwrap()
});

/// Completion events raised, by result.
pub static EVENTS_RAISED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stratum_events_raised_total", "Total completion events raised"),
        &["result"], // "delivered", "unknown", "duplicate"
    )
    .unwrap()
});

// =============================================================================
// Sub-orchestration Metrics
// =============================================================================

/// Satellite image generation calls, by kind and result.
pub static IMAGERY_RESULTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stratum_imagery_results_total",
            "Total satellite image generation calls",
        ),
        &["kind", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// Image group analyses, by group and result.
pub static IMAGE_ANALYSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stratum_image_analyses_total", "Total image group analyses"),
        &["group", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// Topography analyses retried with the reduced image set.
pub static TOPOGRAPHY_RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stratum_topography_retries_total",
        "Total topography analyses retried with a reduced image set",
    )
    .unwrap()
});

/// Graph writes that failed during relationship storage.
pub static RELATIONSHIP_WRITE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stratum_relationship_write_failures_total",
        "Total failed graph writes while storing analysis relationships",
    )
    .unwrap()
});

// =============================================================================
// Deliberation Metrics
// =============================================================================

/// Rounds used per deliberation.
pub static DELIBERATION_ROUNDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stratum_deliberation_rounds",
            "Number of panel turns per deliberation",
        )
        .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0]),
    )
    .unwrap()
});

/// Verdicts reached, by verdict.
pub static VERDICTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stratum_verdicts_total", "Total deliberation verdicts"),
        &["verdict"], // "approved", "rejected", "undetermined"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "stratum_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// LLM tokens used.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stratum_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOBS_IN_FLIGHT.clone()),
        Box::new(EXTERNAL_WAIT_SECONDS.clone()),
        Box::new(EVENTS_RAISED.clone()),
        // Sub-orchestrations
        Box::new(IMAGERY_RESULTS_TOTAL.clone()),
        Box::new(IMAGE_ANALYSES_TOTAL.clone()),
        Box::new(TOPOGRAPHY_RETRIES_TOTAL.clone()),
        Box::new(RELATIONSHIP_WRITE_FAILURES.clone()),
        // Deliberation
        Box::new(DELIBERATION_ROUNDS.clone()),
        Box::new(VERDICTS_TOTAL.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(LLM_TOKENS.clone()),
    ]
}
