//! The inference boundary.
//!
//! Everything model-specific lives behind [`GenerationBackend`]. The
//! orchestrator neither knows nor cares what produces the artifacts; tests
//! inject scripted backends, and deployments wire a real model runner.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::error::{ErrorContext, Result};
use crate::types::{epoch_secs, GenerationRequest, OutputRef};

/// Produces output artifacts for a generation request.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run inference for one request. The orchestrator applies the deadline;
    /// implementations should simply run to completion or fail.
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<OutputRef>>;

    /// Release any cached model state, reporting whether anything was freed.
    /// Wired as a recovery action; must be safe to call repeatedly.
    fn drop_cached_state(&self) -> bool {
        false
    }
}

fn artifact_kind(content_type: &str) -> (&'static str, &'static str) {
    match content_type {
        "image" => ("image/png", "png"),
        "video" => ("video/mp4", "mp4"),
        "audio" => ("audio/wav", "wav"),
        _ => ("application/octet-stream", "bin"),
    }
}

/// Backend that writes placeholder artifacts to disk.
///
/// Stands in for a real model runner in development and demos; the artifact
/// naming and per-batch file layout match what a real backend produces.
pub struct PlaceholderBackend {
    output_dir: PathBuf,
    warm_state: parking_lot::Mutex<Option<Vec<u8>>>,
    simulated_latency: Duration,
}

impl PlaceholderBackend {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            warm_state: parking_lot::Mutex::new(None),
            simulated_latency: Duration::from_millis(50),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = latency;
        self
    }
}

#[async_trait]
impl GenerationBackend for PlaceholderBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<OutputRef>> {
        // Simulate model warm-up state that recovery can reclaim.
        self.warm_state.lock().get_or_insert_with(|| vec![0u8; 4096]);
        sleep(self.simulated_latency).await;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_static_context("Failed to create output directory")?;

        let (kind, ext) = artifact_kind(&request.content_type);
        let stamp = epoch_secs() as u64;
        let mut outputs = Vec::with_capacity(request.batch_size);

        for index in 0..request.batch_size {
            let path = self.output_dir.join(format!(
                "generated_{}_{}_{}.{}",
                request.content_type, stamp, index, ext
            ));
            tokio::fs::write(&path, format!("placeholder: {}", request.prompt))
                .await
                .with_static_context("Failed to write placeholder artifact")?;
            outputs.push(OutputRef {
                uri: path.to_string_lossy().into_owned(),
                kind: kind.to_string(),
            });
        }

        debug!(count = outputs.len(), content_type = %request.content_type, "Placeholder artifacts written");
        Ok(outputs)
    }

    fn drop_cached_state(&self) -> bool {
        self.warm_state.lock().take().is_some()
    }
}
