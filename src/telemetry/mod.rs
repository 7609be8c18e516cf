//! Per-job telemetry: session/step recording, trend statistics, and export.

pub mod export;
pub mod recorder;
pub mod trends;

pub use recorder::{CompletedSession, StepHandle, StepRecord, TelemetryRecorder};
pub use trends::{DurationStats, PerformanceTrends};
