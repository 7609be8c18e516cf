//! Core data types shared across the engine boundary.
//!
//! These are the payload types exchanged with the web layer: the generation
//! request and result, plus the status report exposed for health endpoints.
//! Everything here is a plain serde struct; validation and sanitization of the
//! request content happen upstream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time as f64 unix-epoch seconds.
///
/// All exported timestamps use this single representation so serialized
/// records round-trip through JSON without precision loss.
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

/// A content-generation request, validated and sanitized upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Content type to generate, e.g. "image" or "video"
    pub content_type: String,

    /// Generation prompt (opaque to this core)
    pub prompt: String,

    /// Number of outputs requested
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Optional per-request deadline in seconds; falls back to the
    /// configured inference timeout when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Free-form generation parameters, passed through to the backend
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

fn default_batch_size() -> usize {
    1
}

impl GenerationRequest {
    /// Effective inference deadline for this request.
    pub fn deadline(&self, fallback: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(fallback)
    }
}

/// Reference to one produced output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    /// Location of the artifact (path or URI)
    pub uri: String,

    /// Artifact kind, e.g. "image/png"
    pub kind: String,
}

/// Point-in-time resource usage attached to a generation result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Process CPU usage percentage
    pub cpu_percent: Option<f64>,

    /// Process resident memory in MB
    pub memory_mb: Option<f64>,

    /// Accelerator memory in MB, absent when no accelerator is present
    pub accelerator_memory_mb: Option<f64>,

    /// Accelerator utilization percentage, absent when no accelerator is present
    pub accelerator_utilization: Option<f64>,
}

/// The structured result returned to the caller for every request.
///
/// Failures are values, never faults crossing the public boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Whether generation completed successfully
    pub success: bool,

    /// Telemetry session id for this request
    pub session_id: String,

    /// References to produced artifacts (empty on failure)
    pub output_references: Vec<OutputRef>,

    /// Wall-clock processing time in seconds
    pub processing_time: f64,

    /// Resource usage snapshot taken at completion
    pub resource_usage: ResourceUsage,

    /// Error detail when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// High-level engine lifecycle state reported by `system_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Accepting requests
    Running,
    /// A health alert fired recently and recovery ran
    Degraded,
}

/// Admission-controller occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// Configured concurrency ceiling
    pub ceiling: usize,

    /// Reservation tokens currently outstanding
    pub outstanding: usize,

    /// Remaining capacity
    pub free: usize,
}

/// Memory health summary derived from the latest metric sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStatus {
    /// Status label: "ok", "warning", or "no_data"
    pub status: String,

    /// Host memory usage percentage from the latest sample
    pub memory_percent: Option<f64>,

    /// Allocator-specific memory in MB from the latest sample
    pub allocator_memory_mb: Option<f64>,

    /// Whether the latest evaluation flagged a leak
    pub leak_detected: bool,
}

/// Full status report for the health/status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Current engine lifecycle state
    pub engine_state: EngineState,

    /// Memory health summary
    pub memory_status: MemoryStatus,

    /// Admission availability
    pub resource_availability: Availability,

    /// Ids of sessions currently open
    pub active_session_ids: Vec<String>,
}
