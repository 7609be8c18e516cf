//! Session and step recording.
//!
//! A telemetry session brackets one generation job; steps bracket its named
//! phases. Sessions move from an active map into a bounded completed-session
//! history when ended. Durations come from monotonic clocks; exported
//! timestamps are unix-epoch seconds.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::history::BoundedHistory;
use crate::monitor::sampler::ResourceProbe;
use crate::telemetry::trends::{self, PerformanceTrends};
use crate::types::{epoch_secs, OutputRef, ResourceUsage};

/// Proof that a step was started; required to end it.
#[derive(Debug)]
pub struct StepHandle {
    session_id: String,
    step_name: String,
}

impl StepHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }
}

/// One finished step inside a completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_name: String,

    /// Unix-epoch seconds at step start
    pub start_time: f64,

    /// Unix-epoch seconds at step end
    pub end_time: f64,

    /// Monotonic step duration in seconds
    pub duration: f64,

    pub cpu_start_percent: Option<f64>,
    pub cpu_end_percent: Option<f64>,
    pub memory_start_mb: Option<f64>,
    pub memory_end_mb: Option<f64>,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Immutable record of one finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedSession {
    pub session_id: String,

    /// Unix-epoch seconds at session start
    pub start_time: f64,

    /// Unix-epoch seconds at session end
    pub end_time: f64,

    /// Monotonic session duration in seconds
    pub total_duration: f64,

    pub success: bool,

    /// Opaque descriptor of the work the session covered
    pub input: Value,

    /// Completed steps in completion order
    pub steps: Vec<StepRecord>,

    /// Artifacts attached during the session
    pub output_files: Vec<OutputRef>,

    /// Resource snapshot at session start
    pub usage_start: ResourceUsage,

    /// Resource snapshot at session end
    pub usage_end: ResourceUsage,
}

struct OpenStep {
    name: String,
    start_epoch: f64,
    started: Instant,
    usage: ResourceUsage,
}

struct ActiveSession {
    start_epoch: f64,
    started: Instant,
    input: Value,
    open_steps: Vec<OpenStep>,
    closed_steps: Vec<StepRecord>,
    output_files: Vec<OutputRef>,
    usage_start: ResourceUsage,
}

/// Records sessions and steps; thread-safe, shared behind `Arc`.
pub struct TelemetryRecorder {
    active: DashMap<String, ActiveSession>,
    completed: Mutex<BoundedHistory<CompletedSession>>,
    probe: Arc<dyn ResourceProbe>,
}

impl TelemetryRecorder {
    /// Create a recorder retaining at most `capacity` completed sessions.
    pub fn new(capacity: usize, probe: Arc<dyn ResourceProbe>) -> Self {
        Self {
            active: DashMap::new(),
            completed: Mutex::new(BoundedHistory::new(capacity)),
            probe,
        }
    }

    /// Open a session. Reusing an id of a still-open session discards that
    /// session and starts fresh: last start wins.
    pub fn start_session(&self, session_id: &str, input: Value) {
        let session = ActiveSession {
            start_epoch: epoch_secs(),
            started: Instant::now(),
            input,
            open_steps: Vec::new(),
            closed_steps: Vec::new(),
            output_files: Vec::new(),
            usage_start: self.probe.usage(),
        };
        if self.active.insert(session_id.to_string(), session).is_some() {
            warn!(session_id, "Session already exists, overwriting");
        }
        debug!(session_id, "Session started");
    }

    /// Open a named step inside a session.
    ///
    /// Fails when the session is unknown. Starting a step whose name is
    /// already open replaces the earlier start.
    pub fn start_step(&self, session_id: &str, step_name: &str) -> Result<StepHandle> {
        let mut session = self.active.get_mut(session_id).ok_or_else(|| {
            EngineError::Internal(format!("No active session with id '{}'", session_id))
        })?;

        if let Some(pos) = session.open_steps.iter().position(|s| s.name == step_name) {
            warn!(session_id, step_name, "Step already open, restarting");
            session.open_steps.remove(pos);
        }

        session.open_steps.push(OpenStep {
            name: step_name.to_string(),
            start_epoch: epoch_secs(),
            started: Instant::now(),
            usage: self.probe.usage(),
        });
        debug!(session_id, step_name, "Step started");

        Ok(StepHandle {
            session_id: session_id.to_string(),
            step_name: step_name.to_string(),
        })
    }

    /// Close a step. Unknown sessions and steps that were never started (or
    /// already ended) are a logged no-op.
    pub fn end_step(&self, handle: &StepHandle, success: bool, error_message: Option<String>) {
        let Some(mut session) = self.active.get_mut(&handle.session_id) else {
            warn!(
                session_id = %handle.session_id,
                step_name = %handle.step_name,
                "End of step for unknown session ignored"
            );
            return;
        };

        let Some(pos) = session
            .open_steps
            .iter()
            .position(|s| s.name == handle.step_name)
        else {
            warn!(
                session_id = %handle.session_id,
                step_name = %handle.step_name,
                "End of unknown or already-closed step ignored"
            );
            return;
        };

        let open = session.open_steps.remove(pos);
        let duration = open.started.elapsed().as_secs_f64();
        let usage_end = self.probe.usage();

        session.closed_steps.push(StepRecord {
            step_name: open.name,
            start_time: open.start_epoch,
            end_time: open.start_epoch + duration,
            duration,
            cpu_start_percent: open.usage.cpu_percent,
            cpu_end_percent: usage_end.cpu_percent,
            memory_start_mb: open.usage.memory_mb,
            memory_end_mb: usage_end.memory_mb,
            success,
            error_message,
        });
        debug!(
            session_id = %handle.session_id,
            step_name = %handle.step_name,
            duration,
            success,
            "Step ended"
        );
    }

    /// Attach an output artifact to a session; no-op when unknown.
    pub fn add_output(&self, session_id: &str, output: OutputRef) {
        match self.active.get_mut(session_id) {
            Some(mut session) => session.output_files.push(output),
            None => warn!(session_id, "Output for unknown session ignored"),
        }
    }

    /// Close a session and move it into the completed history.
    ///
    /// Steps still open at this point were never properly ended; they are
    /// dropped with a warning rather than recorded with invented durations.
    pub fn end_session(&self, session_id: &str, success: bool) -> Result<CompletedSession> {
        let (_, session) = self.active.remove(session_id).ok_or_else(|| {
            EngineError::Internal(format!("No active session with id '{}'", session_id))
        })?;

        for open in &session.open_steps {
            warn!(session_id, step_name = %open.name, "Discarding step never ended");
        }

        let total_duration = session.started.elapsed().as_secs_f64();
        let record = CompletedSession {
            session_id: session_id.to_string(),
            start_time: session.start_epoch,
            end_time: session.start_epoch + total_duration,
            total_duration,
            success,
            input: session.input,
            steps: session.closed_steps,
            output_files: session.output_files,
            usage_start: session.usage_start,
            usage_end: self.probe.usage(),
        };

        if self.completed.lock().push(record.clone()).is_some() {
            debug!("Oldest completed session evicted from history");
        }
        debug!(session_id, total_duration, success, "Session ended");
        Ok(record)
    }

    /// Ids of sessions currently open.
    pub fn active_session_ids(&self) -> Vec<String> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of the completed-session history, oldest-first.
    pub fn completed_snapshot(&self) -> Vec<CompletedSession> {
        self.completed.lock().snapshot()
    }

    /// Duration statistics over the completed-session history.
    pub fn trends(&self) -> PerformanceTrends {
        trends::compute(&self.completed_snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::sampler::NullResourceProbe;
    use serde_json::json;

    fn recorder() -> TelemetryRecorder {
        TelemetryRecorder::new(8, Arc::new(NullResourceProbe))
    }

    #[test]
    fn test_session_lifecycle() {
        let recorder = recorder();
        recorder.start_session("s1", json!({"content_type": "image"}));
        assert_eq!(recorder.active_session_ids(), vec!["s1".to_string()]);

        let step = recorder.start_step("s1", "load").unwrap();
        recorder.end_step(&step, true, None);
        recorder.add_output(
            "s1",
            OutputRef {
                uri: "out/image_0.png".to_string(),
                kind: "image/png".to_string(),
            },
        );

        let record = recorder.end_session("s1", true).unwrap();
        assert!(record.success);
        assert_eq!(record.steps.len(), 1);
        assert_eq!(record.steps[0].step_name, "load");
        assert!(record.steps[0].success);
        assert_eq!(record.output_files.len(), 1);
        assert!(record.total_duration >= 0.0);
        assert!(record.end_time >= record.start_time);

        assert!(recorder.active_session_ids().is_empty());
        assert_eq!(recorder.completed_snapshot().len(), 1);
    }

    #[test]
    fn test_failed_step_carries_error() {
        let recorder = recorder();
        recorder.start_session("s1", json!({}));

        let step = recorder.start_step("s1", "infer").unwrap();
        recorder.end_step(&step, false, Some("model exploded".to_string()));

        let record = recorder.end_session("s1", false).unwrap();
        assert!(!record.success);
        assert_eq!(
            record.steps[0].error_message.as_deref(),
            Some("model exploded")
        );
    }

    #[test]
    fn test_end_unknown_step_is_noop() {
        let recorder = recorder();
        recorder.start_session("s1", json!({}));

        let step = recorder.start_step("s1", "load").unwrap();
        recorder.end_step(&step, true, None);
        // Ending again: already closed, ignored.
        recorder.end_step(&step, false, Some("late".to_string()));

        let record = recorder.end_session("s1", true).unwrap();
        assert_eq!(record.steps.len(), 1);
        assert!(record.steps[0].success);
    }

    #[test]
    fn test_duplicate_session_id_last_start_wins() {
        let recorder = recorder();
        recorder.start_session("s1", json!({"attempt": 1}));
        let stale = recorder.start_step("s1", "load").unwrap();

        recorder.start_session("s1", json!({"attempt": 2}));
        // The stale handle points at a step the fresh session never started.
        recorder.end_step(&stale, true, None);

        let record = recorder.end_session("s1", true).unwrap();
        assert_eq!(record.input, json!({"attempt": 2}));
        assert!(record.steps.is_empty());
    }

    #[test]
    fn test_interleaved_steps_match_by_name() {
        let recorder = recorder();
        recorder.start_session("s1", json!({}));

        let load = recorder.start_step("s1", "load").unwrap();
        let infer = recorder.start_step("s1", "infer").unwrap();
        // Closed out of start order; each end matches its own name.
        recorder.end_step(&infer, true, None);
        recorder.end_step(&load, true, None);

        let record = recorder.end_session("s1", true).unwrap();
        let names: Vec<&str> = record.steps.iter().map(|s| s.step_name.as_str()).collect();
        assert_eq!(names, vec!["infer", "load"]);
        assert!(record.steps.iter().all(|s| s.success));
    }

    #[test]
    fn test_start_step_on_unknown_session_fails() {
        let recorder = recorder();
        assert!(recorder.start_step("ghost", "load").is_err());
        assert!(recorder.end_session("ghost", true).is_err());
    }

    #[test]
    fn test_unended_steps_are_discarded() {
        let recorder = recorder();
        recorder.start_session("s1", json!({}));
        let _open = recorder.start_step("s1", "infer").unwrap();

        let record = recorder.end_session("s1", false).unwrap();
        assert!(record.steps.is_empty());
    }

    #[test]
    fn test_completed_history_is_bounded() {
        let recorder = TelemetryRecorder::new(2, Arc::new(NullResourceProbe));
        for i in 0..4 {
            let id = format!("s{}", i);
            recorder.start_session(&id, json!({}));
            recorder.end_session(&id, true).unwrap();
        }

        let completed = recorder.completed_snapshot();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].session_id, "s2");
        assert_eq!(completed[1].session_id, "s3");
    }
}
