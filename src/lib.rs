//! On-host execution core for AI content-generation jobs.
//!
//! The engine admits a bounded number of concurrent generation jobs, runs
//! each one through an instrumented step pipeline against a pluggable
//! inference backend, and continuously samples host resources in the
//! background. Health rules evaluate every sample; alerts fan out to
//! subscribers and drive registered recovery actions. Per-session telemetry
//! and the hardware-metric history export to JSON and CSV artifacts.
//!
//! A thin axum HTTP layer exposes generation, status, trends, and Prometheus
//! metrics endpoints.

pub mod admission;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod metrics;
pub mod monitor;
pub mod server;
pub mod shutdown;
pub mod telemetry;
pub mod types;

pub use config::Config;
pub use engine::{GenerationBackend, GenerationEngine, PlaceholderBackend};
pub use error::{EngineError, Result};
pub use types::{GenerationRequest, GenerationResult, SystemStatus};
