//! Custom error types for the aistudio-engine.
//!
//! This module provides a centralized error handling system using the `thiserror` crate
//! to define structured, typed errors with clear messages and proper error conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Primary error type for the engine, covering all possible error cases.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The concurrency ceiling was reached; the caller may retry later.
    #[error("Admission rejected: {reason} (ceiling: {ceiling})")]
    AdmissionRejected { reason: String, ceiling: usize },

    /// A named pipeline step reported failure.
    #[error("Step '{step}' failed: {detail}")]
    StepFailure { step: String, detail: String },

    /// Errors from invalid user input or requests.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Errors from invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeouts in various operations.
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Errors writing export artifacts.
    #[error("Export error: {0}")]
    Export(String),

    /// Errors from the underlying IO system.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal engine errors.
    #[error("Internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Construct the standard admission rejection for a full engine.
    pub fn max_concurrent_jobs(ceiling: usize) -> Self {
        EngineError::AdmissionRejected {
            reason: "MAX_CONCURRENT_JOBS_REACHED".to_string(),
            ceiling,
        }
    }
}

/// Implementation to convert EngineError into an HTTP response for Axum.
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            EngineError::AdmissionRejected { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            EngineError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            EngineError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results with EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to the error.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to the error.
    fn with_static_context(self, context: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::Internal(format!("{}: {}", f(), e)))
    }

    fn with_static_context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| EngineError::Internal(format!("{}: {}", context, e)))
    }
}

/// Standardized async operation with timeout handling.
///
/// This function provides a consistent pattern for async operations that need
/// timeout handling, proper error conversion, and context information.
pub async fn with_timeout<T, E, F>(
    operation: F,
    timeout_duration: Duration,
    context: &'static str,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(timeout_duration, operation).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(EngineError::Internal(format!("{}: {}", context, e))),
        Err(_) => Err(EngineError::Timeout(format!(
            "{}: operation timed out after {:?}",
            context, timeout_duration
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_rejected_message() {
        let err = EngineError::max_concurrent_jobs(4);
        let msg = err.to_string();
        assert!(msg.contains("MAX_CONCURRENT_JOBS_REACHED"));
        assert!(msg.contains('4'));
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<(), io::Error>(())
            },
            Duration::from_millis(5),
            "slow operation",
        )
        .await;

        assert!(matches!(result, Err(EngineError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let result: Result<u32> = with_timeout(
            async { Ok::<u32, io::Error>(7) },
            Duration::from_millis(50),
            "fast operation",
        )
        .await;

        assert_eq!(result.unwrap(), 7);
    }
}
