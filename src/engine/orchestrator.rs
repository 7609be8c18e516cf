//! The generation orchestrator.
//!
//! [`GenerationEngine`] ties the subsystems together: admission gates entry,
//! every admitted job runs inside a telemetry session with named steps, the
//! inference call carries a deadline, and the reservation is released exactly
//! once on every exit path. Failures past admission surface as structured
//! results, never as errors crossing the public boundary.

use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::admission::{AdmissionController, ReservationToken};
use crate::config::{steps, Config};
use crate::error::{with_timeout, EngineError, Result};
use crate::metrics;
use crate::monitor::health::AlertEvent;
use crate::monitor::recovery::{
    AlertSubscriber, FnRecoveryAction, RecoveryCoordinator, RecoveryReport,
};
use crate::monitor::sampler::{AcceleratorProbe, ResourceProbe};
use crate::monitor::SystemMonitor;
use crate::telemetry::{export, PerformanceTrends, TelemetryRecorder};
use crate::types::{
    EngineState, GenerationRequest, GenerationResult, OutputRef, SystemStatus,
};

use super::backend::GenerationBackend;

/// Releases the admission reservation when dropped, so the slot comes back
/// even if a step unwinds.
struct SlotGuard<'a> {
    admission: &'a AdmissionController,
    token: Option<ReservationToken>,
}

impl<'a> SlotGuard<'a> {
    fn new(admission: &'a AdmissionController, token: ReservationToken) -> Self {
        Self {
            admission,
            token: Some(token),
        }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.admission.release(&token);
        }
    }
}

/// Flips the engine into the degraded state on serious alerts.
struct DegradedStateBridge {
    degraded: Arc<AtomicBool>,
}

impl AlertSubscriber for DegradedStateBridge {
    fn name(&self) -> &str {
        "engine-state"
    }

    fn on_alert(&self, event: &AlertEvent) -> Result<()> {
        if event.hard {
            self.degraded.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    fn on_recovery_ineffective(&self, _report: &RecoveryReport) -> Result<()> {
        self.degraded.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Coordinates admission, telemetry, monitoring, and the inference backend
/// for every generation job.
pub struct GenerationEngine {
    config: Config,
    admission: AdmissionController,
    telemetry: Arc<TelemetryRecorder>,
    monitor: Arc<SystemMonitor>,
    recovery: Arc<RecoveryCoordinator>,
    backend: Arc<dyn GenerationBackend>,
    degraded: Arc<AtomicBool>,
}

impl GenerationEngine {
    /// Build an engine and wire its subsystems together.
    ///
    /// The monitor doubles as the telemetry recorder's resource probe so
    /// step boundary snapshots and health sampling read the same counters.
    pub fn new(
        config: Config,
        backend: Arc<dyn GenerationBackend>,
        probe: Arc<dyn AcceleratorProbe>,
    ) -> Arc<Self> {
        let recovery = Arc::new(RecoveryCoordinator::new(config.auto_recovery_enabled));
        let monitor = Arc::new(SystemMonitor::new(&config, probe, Arc::clone(&recovery)));
        let telemetry = Arc::new(TelemetryRecorder::new(
            config.session_history_size,
            Arc::clone(&monitor) as Arc<dyn ResourceProbe>,
        ));

        let degraded = Arc::new(AtomicBool::new(false));
        recovery.subscribe(Arc::new(DegradedStateBridge {
            degraded: Arc::clone(&degraded),
        }));

        {
            let backend = Arc::clone(&backend);
            recovery.register_action(Arc::new(FnRecoveryAction::new(
                "drop_backend_cached_state",
                move || backend.drop_cached_state(),
            )));
        }

        info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            auto_recovery = config.auto_recovery_enabled,
            "Generation engine initialized"
        );

        let admission = AdmissionController::new(config.max_concurrent_jobs);
        Arc::new(Self {
            config,
            admission,
            telemetry,
            monitor,
            recovery,
            backend,
            degraded,
        })
    }

    pub fn monitor(&self) -> &Arc<SystemMonitor> {
        &self.monitor
    }

    pub fn telemetry(&self) -> &Arc<TelemetryRecorder> {
        &self.telemetry
    }

    pub fn recovery(&self) -> &Arc<RecoveryCoordinator> {
        &self.recovery
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one generation job end to end.
    ///
    /// Rejections happen before any session state exists and surface as
    /// errors. Past admission, every outcome is a [`GenerationResult`]: the
    /// telemetry session is always closed and the admission slot always
    /// released, exactly once.
    #[instrument(skip(self, request), fields(content_type = %request.content_type))]
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult> {
        validate(&request)?;

        let token = self.admission.acquire().map_err(|e| {
            metrics::record_admission_rejected();
            e
        })?;
        let guard = SlotGuard::new(&self.admission, token);
        metrics::record_request();
        metrics::record_active_jobs(self.admission.availability().outstanding);

        let session_id = Uuid::new_v4().to_string();
        let descriptor = serde_json::to_value(&request).unwrap_or(Value::Null);
        self.telemetry.start_session(&session_id, descriptor);

        let outcome = self.run_pipeline(&session_id, &request).await;

        drop(guard);
        metrics::record_active_jobs(self.admission.availability().outstanding);

        let success = outcome.is_ok();
        let error_message = outcome.as_ref().err().map(|e| e.to_string());
        let output_references = outcome.unwrap_or_default();

        let record = self.telemetry.end_session(&session_id, success)?;
        metrics::record_generation(record.total_duration, success);

        if let Err(e) = export::export_session(&self.config.export_directory, &record) {
            // Export is an artifact of the job, not part of it.
            error!(session_id = %session_id, error = %e, "Session export failed");
        }

        if success {
            self.degraded.store(false, Ordering::Relaxed);
        } else {
            warn!(session_id = %session_id, error = ?error_message, "Generation failed");
        }

        Ok(GenerationResult {
            success,
            session_id,
            output_references,
            processing_time: record.total_duration,
            resource_usage: record.usage_end.clone(),
            error_message,
        })
    }

    async fn run_pipeline(
        &self,
        session_id: &str,
        request: &GenerationRequest,
    ) -> Result<Vec<OutputRef>> {
        self.run_step(session_id, steps::PREPARE, async {
            tokio::fs::create_dir_all(&self.config.export_directory)
                .await
                .map_err(EngineError::from)
        })
        .await?;

        let deadline = request.deadline(self.config.inference_timeout);
        let outputs = self
            .run_step(
                session_id,
                steps::INFERENCE,
                with_timeout(self.backend.generate(request), deadline, "inference"),
            )
            .await?;

        self.run_step(session_id, steps::POST_PROCESS, async {
            for output in &outputs {
                self.telemetry.add_output(session_id, output.clone());
            }
            Ok(())
        })
        .await?;

        Ok(outputs)
    }

    /// Bracket a pipeline stage with telemetry step recording.
    ///
    /// The step is closed on both outcomes; a failure is rewrapped so the
    /// failing step's name survives into the result.
    async fn run_step<T, F>(&self, session_id: &str, step: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let handle = self.telemetry.start_step(session_id, step)?;
        let started = Instant::now();
        let result = operation.await;
        metrics::record_step(step, started.elapsed().as_secs_f64());

        match result {
            Ok(value) => {
                self.telemetry.end_step(&handle, true, None);
                Ok(value)
            }
            Err(e) => {
                self.telemetry.end_step(&handle, false, Some(e.to_string()));
                Err(match e {
                    timeout @ EngineError::Timeout(_) => timeout,
                    other => EngineError::StepFailure {
                        step: step.to_string(),
                        detail: other.to_string(),
                    },
                })
            }
        }
    }

    /// Point-in-time status across all subsystems.
    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            engine_state: if self.degraded.load(Ordering::Relaxed) {
                EngineState::Degraded
            } else {
                EngineState::Running
            },
            memory_status: self.monitor.memory_status(),
            resource_availability: self.admission.availability(),
            active_session_ids: self.telemetry.active_session_ids(),
        }
    }

    /// Duration trends over the completed-session history.
    pub fn trends(&self) -> PerformanceTrends {
        self.telemetry.trends()
    }

    /// Export the retained hardware-metric history to disk.
    pub fn export_hardware_metrics(&self) -> Result<()> {
        let samples = self.monitor.history_snapshot();
        export::export_hardware_metrics(&self.config.export_directory, &samples)?;
        Ok(())
    }
}

fn validate(request: &GenerationRequest) -> Result<()> {
    if request.content_type.is_empty() {
        return Err(EngineError::Validation(
            "content_type must not be empty".to_string(),
        ));
    }
    if request.prompt.is_empty() {
        return Err(EngineError::Validation(
            "prompt must not be empty".to_string(),
        ));
    }
    if request.batch_size == 0 {
        return Err(EngineError::Validation(
            "batch_size must be at least 1".to_string(),
        ));
    }
    Ok(())
}
