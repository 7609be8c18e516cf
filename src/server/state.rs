//! Shared application state for the HTTP layer.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::engine::GenerationEngine;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GenerationEngine>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(engine: Arc<GenerationEngine>, metrics: PrometheusHandle) -> Self {
        Self { engine, metrics }
    }
}
