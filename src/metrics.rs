//! Prometheus metrics for the engine.
//!
//! A single recorder is installed at startup; the helpers below are no-ops
//! until then, which keeps unit tests free of recorder setup.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{EngineError, Result};
use crate::monitor::health::AlertEvent;
use crate::monitor::recovery::RecoveryReport;
use crate::monitor::sampler::MetricSample;

/// Install the Prometheus recorder and describe every metric the engine
/// emits. Call once at startup; the handle renders the scrape payload.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| EngineError::Internal(format!("Failed to install metrics recorder: {}", e)))?;

    describe_counter!(
        "generation_requests_total",
        "Total generation requests admitted"
    );
    describe_counter!(
        "generation_failures_total",
        "Generation requests that completed unsuccessfully"
    );
    describe_counter!(
        "admission_rejections_total",
        "Requests rejected at the admission ceiling"
    );
    describe_histogram!(
        "generation_duration_seconds",
        "End-to-end generation session duration"
    );
    describe_histogram!(
        "step_duration_seconds",
        "Duration of individual pipeline steps"
    );
    describe_counter!("health_alerts_total", "Health alerts raised, by kind");
    describe_counter!(
        "recovery_actions_total",
        "Recovery actions executed, by outcome"
    );
    describe_gauge!("host_memory_percent", "Host memory usage percentage");
    describe_gauge!("host_cpu_percent", "Host CPU usage percentage");
    describe_gauge!(
        "allocator_memory_mb",
        "Allocator-specific memory in MB from the latest sample"
    );
    describe_gauge!("active_jobs", "Generation jobs currently executing");

    Ok(handle)
}

/// Record an admitted generation request.
pub fn record_request() {
    counter!("generation_requests_total").increment(1);
}

/// Record the outcome of one generation session.
pub fn record_generation(duration_secs: f64, success: bool) {
    histogram!("generation_duration_seconds").record(duration_secs);
    if !success {
        counter!("generation_failures_total").increment(1);
    }
}

/// Record one completed pipeline step.
pub fn record_step(step: &str, duration_secs: f64) {
    histogram!("step_duration_seconds", "step" => step.to_string()).record(duration_secs);
}

/// Record a rejection at the admission ceiling.
pub fn record_admission_rejected() {
    counter!("admission_rejections_total").increment(1);
}

/// Record current occupancy of the admission controller.
pub fn record_active_jobs(outstanding: usize) {
    gauge!("active_jobs").set(outstanding as f64);
}

/// Export gauge readings from a fresh metric sample.
pub fn record_sample(sample: &MetricSample) {
    if let Some(percent) = sample.memory_percent {
        gauge!("host_memory_percent").set(percent);
    }
    if let Some(percent) = sample.cpu_percent {
        gauge!("host_cpu_percent").set(percent);
    }
    if let Some(mb) = sample.allocator_memory_mb {
        gauge!("allocator_memory_mb").set(mb);
    }
}

/// Record one raised health alert.
pub fn record_alert(event: &AlertEvent) {
    let kind = format!("{:?}", event.kind);
    counter!("health_alerts_total", "kind" => kind).increment(1);
}

/// Record the outcome of one recovery pass.
pub fn record_recovery(report: &RecoveryReport) {
    counter!("recovery_actions_total", "outcome" => "succeeded")
        .increment(report.succeeded as u64);
    counter!("recovery_actions_total", "outcome" => "failed")
        .increment((report.attempted - report.succeeded) as u64);
}
