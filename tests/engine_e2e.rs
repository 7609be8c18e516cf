//! End-to-end tests driving the engine through full generation jobs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aistudio_engine::config::Config;
use aistudio_engine::engine::{GenerationBackend, GenerationEngine};
use aistudio_engine::error::{EngineError, Result};
use aistudio_engine::monitor::sampler::{AcceleratorProbe, AcceleratorReading, NoAccelerator};
use aistudio_engine::types::{EngineState, GenerationRequest, OutputRef};

/// Backend that sleeps, then returns one artifact per batch entry.
struct SlowBackend {
    latency: Duration,
}

#[async_trait]
impl GenerationBackend for SlowBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<OutputRef>> {
        tokio::time::sleep(self.latency).await;
        Ok((0..request.batch_size)
            .map(|i| OutputRef {
                uri: format!("out/{}.png", i),
                kind: "image/png".to_string(),
            })
            .collect())
    }
}

/// Backend whose inference always fails.
struct FailingBackend;

#[async_trait]
impl GenerationBackend for FailingBackend {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Vec<OutputRef>> {
        Err(EngineError::Internal("model crashed".to_string()))
    }
}

fn test_config(dir: &std::path::Path, ceiling: usize) -> Config {
    Config {
        max_concurrent_jobs: ceiling,
        export_directory: dir.to_path_buf(),
        // Keep the health rules quiet; these tests exercise the job path.
        ram_threshold_percent: 100.0,
        accelerator_threshold_percent: 100.0,
        leak_threshold_mb: 1_000_000.0,
        ..Config::default()
    }
}

fn request() -> GenerationRequest {
    GenerationRequest {
        content_type: "image".to_string(),
        prompt: "a winding coastal road".to_string(),
        batch_size: 1,
        timeout_secs: None,
        parameters: HashMap::new(),
    }
}

#[tokio::test]
async fn admission_ceiling_bounds_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GenerationEngine::new(
        test_config(dir.path(), 2),
        Arc::new(SlowBackend {
            latency: Duration::from_millis(100),
        }),
        Arc::new(NoAccelerator),
    );

    // Three concurrent requests against a ceiling of two: the first two get
    // slots, the third is rejected while they run.
    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.generate(request()).await }
    });
    let second = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.generate(request()).await }
    });

    // Give the first two time to occupy their slots.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let rejected = engine.generate(request()).await;
    assert!(matches!(
        rejected,
        Err(EngineError::AdmissionRejected { ceiling: 2, .. })
    ));
    if let Err(e) = rejected {
        assert!(e.to_string().contains("MAX_CONCURRENT_JOBS_REACHED"));
    }

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert!(first.success);
    assert!(second.success);

    // Slots are free again; a retry now succeeds.
    let retry = engine.generate(request()).await.unwrap();
    assert!(retry.success);

    let status = engine.system_status();
    assert_eq!(status.resource_availability.outstanding, 0);
    assert_eq!(status.resource_availability.free, 2);

    // Only admitted jobs left sessions behind.
    assert_eq!(engine.telemetry().completed_snapshot().len(), 3);
}

#[tokio::test]
async fn inference_failure_is_a_structured_result() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GenerationEngine::new(
        test_config(dir.path(), 2),
        Arc::new(FailingBackend),
        Arc::new(NoAccelerator),
    );

    let result = engine.generate(request()).await.unwrap();
    assert!(!result.success);
    assert!(result.output_references.is_empty());
    let message = result.error_message.unwrap();
    assert!(message.contains("inference"));
    assert!(message.contains("model crashed"));

    // The session closed with the failing step recorded; later steps never ran.
    let sessions = engine.telemetry().completed_snapshot();
    assert_eq!(sessions.len(), 1);
    let record = &sessions[0];
    assert!(!record.success);
    let names: Vec<&str> = record.steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, vec!["prepare", "inference"]);
    assert!(!record.steps[1].success);

    // The slot was released despite the failure.
    assert_eq!(engine.system_status().resource_availability.outstanding, 0);

    // Export artifacts exist for the failed session too.
    assert!(dir
        .path()
        .join(format!("session_{}.json", result.session_id))
        .exists());
    assert!(dir
        .path()
        .join(format!("steps_{}.csv", result.session_id))
        .exists());
}

#[tokio::test]
async fn per_request_deadline_times_out_inference() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GenerationEngine::new(
        test_config(dir.path(), 1),
        Arc::new(SlowBackend {
            latency: Duration::from_millis(1500),
        }),
        Arc::new(NoAccelerator),
    );

    let mut slow = request();
    slow.timeout_secs = Some(1);

    let result = engine.generate(slow).await.unwrap();
    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("timed out"));

    // Session closed and slot released on the timeout path.
    let status = engine.system_status();
    assert!(status.active_session_ids.is_empty());
    assert_eq!(status.resource_availability.outstanding, 0);
}

#[tokio::test]
async fn trends_accumulate_across_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GenerationEngine::new(
        test_config(dir.path(), 2),
        Arc::new(SlowBackend {
            latency: Duration::from_millis(10),
        }),
        Arc::new(NoAccelerator),
    );

    // An empty history is a defined result.
    assert_eq!(engine.trends().session_duration.count, 0);

    for _ in 0..3 {
        engine.generate(request()).await.unwrap();
    }

    let trends = engine.trends();
    assert_eq!(trends.session_duration.count, 3);
    assert!(trends.session_duration.mean.unwrap() > 0.0);
    assert!(trends.session_duration.min <= trends.session_duration.max);
    assert_eq!(trends.per_step["inference"].count, 3);
    assert_eq!(trends.per_step["prepare"].count, 3);
}

/// Backend that counts cache drops and reports a scripted outcome.
struct CountingCacheBackend {
    drops: AtomicUsize,
    drop_effective: bool,
}

impl CountingCacheBackend {
    fn new(drop_effective: bool) -> Arc<Self> {
        Arc::new(Self {
            drops: AtomicUsize::new(0),
            drop_effective,
        })
    }
}

#[async_trait]
impl GenerationBackend for CountingCacheBackend {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Vec<OutputRef>> {
        Ok(vec![OutputRef {
            uri: "out/0.png".to_string(),
            kind: "image/png".to_string(),
        }])
    }

    fn drop_cached_state(&self) -> bool {
        self.drops.fetch_add(1, Ordering::SeqCst);
        self.drop_effective
    }
}

/// Probe reporting accelerator utilization well past any sane threshold.
struct HotAccelerator;

impl AcceleratorProbe for HotAccelerator {
    fn read(&self) -> AcceleratorReading {
        AcceleratorReading {
            memory_mb: Some(8000.0),
            utilization_percent: Some(95.0),
            allocator_memory_mb: Some(1000.0),
        }
    }
}

/// Probe scripting steady allocator readings followed by a jump.
struct LeakingAllocator {
    calls: AtomicUsize,
}

impl AcceleratorProbe for LeakingAllocator {
    fn read(&self) -> AcceleratorReading {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        AcceleratorReading {
            memory_mb: None,
            utilization_percent: None,
            allocator_memory_mb: Some(if call < 5 { 1000.0 } else { 1800.0 }),
        }
    }
}

#[tokio::test]
async fn hard_alert_degrades_engine_until_next_success() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        // Accelerator threshold is live; everything else stays quiet.
        accelerator_threshold_percent: 80.0,
        ram_threshold_percent: 100.0,
        leak_threshold_mb: 1_000_000.0,
        max_concurrent_jobs: 2,
        export_directory: dir.path().to_path_buf(),
        ..Config::default()
    };
    let backend = CountingCacheBackend::new(true);
    let engine = GenerationEngine::new(config, backend.clone(), Arc::new(HotAccelerator));

    assert_eq!(engine.system_status().engine_state, EngineState::Running);

    // One sampling cycle breaches the threshold: hard alert, recovery runs
    // the registered cache-drop action, and the engine flips to degraded.
    let event = engine.monitor().tick().expect("breach should raise an alert");
    assert!(event.hard);
    assert_eq!(engine.system_status().engine_state, EngineState::Degraded);
    assert_eq!(backend.drops.load(Ordering::SeqCst), 1);

    // A successful job is the evidence the engine is serving again.
    let result = engine.generate(request()).await.unwrap();
    assert!(result.success);
    assert_eq!(engine.system_status().engine_state, EngineState::Running);
}

#[tokio::test]
async fn ineffective_recovery_marks_engine_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        // Leak rule live (defaults: 500 MB over a 5-reading mean); the
        // absolute thresholds stay quiet so the alert is soft.
        ram_threshold_percent: 100.0,
        accelerator_threshold_percent: 100.0,
        export_directory: dir.path().to_path_buf(),
        ..Config::default()
    };
    let backend = CountingCacheBackend::new(false);
    let engine = GenerationEngine::new(
        config,
        backend.clone(),
        Arc::new(LeakingAllocator {
            calls: AtomicUsize::new(0),
        }),
    );

    // Five steady readings build the window without alerting.
    for _ in 0..5 {
        assert!(engine.monitor().tick().is_none());
        assert_eq!(engine.system_status().engine_state, EngineState::Running);
    }

    // The jump is a soft leak alert; the only recovery action reports no
    // effect, and that ineffective pass is what degrades the engine.
    let event = engine.monitor().tick().expect("leak should raise an alert");
    assert!(!event.hard);
    assert_eq!(backend.drops.load(Ordering::SeqCst), 1);
    assert_eq!(engine.system_status().engine_state, EngineState::Degraded);
    assert!(engine.system_status().memory_status.leak_detected);
}

#[tokio::test]
async fn engine_reports_running_after_successful_work() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GenerationEngine::new(
        test_config(dir.path(), 1),
        Arc::new(SlowBackend {
            latency: Duration::from_millis(5),
        }),
        Arc::new(NoAccelerator),
    );

    engine.generate(request()).await.unwrap();
    let status = engine.system_status();
    assert_eq!(status.engine_state, EngineState::Running);
    assert!(!status.memory_status.leak_detected);
}
