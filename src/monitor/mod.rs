//! Background system monitoring.
//!
//! [`SystemMonitor`] owns the sampling cadence: each cycle takes one metric
//! sample, appends it to the bounded history, runs the health rules against
//! the updated history, and hands any resulting alert to the recovery
//! coordinator.

pub mod health;
pub mod recovery;
pub mod sampler;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::history::BoundedHistory;
use crate::metrics;
use crate::types::MemoryStatus;

use health::{AlertEvent, HealthEvaluator};
use recovery::RecoveryCoordinator;
use sampler::{AcceleratorProbe, MetricSampler, MetricSample};

/// Drives sampling, health evaluation, and recovery dispatch.
pub struct SystemMonitor {
    sampler: MetricSampler,
    history: Mutex<BoundedHistory<MetricSample>>,
    evaluator: Mutex<HealthEvaluator>,
    recovery: Arc<RecoveryCoordinator>,
    interval: Duration,
}

impl SystemMonitor {
    pub fn new(
        config: &Config,
        probe: Arc<dyn AcceleratorProbe>,
        recovery: Arc<RecoveryCoordinator>,
    ) -> Self {
        Self {
            sampler: MetricSampler::new(probe),
            history: Mutex::new(BoundedHistory::new(config.metric_history_size)),
            evaluator: Mutex::new(HealthEvaluator::new(config)),
            recovery,
            interval: config.sampling_interval,
        }
    }

    /// Run one full cycle: sample, record, evaluate, dispatch.
    pub fn tick(&self) -> Option<AlertEvent> {
        let sample = self.sampler.sample();
        metrics::record_sample(&sample);

        let snapshot = {
            let mut history = self.history.lock();
            history.push(sample.clone());
            history.snapshot()
        };

        // Rules run on the snapshot so the history lock is never held
        // across evaluation.
        let event = self.evaluator.lock().evaluate(&sample, &snapshot);
        if let Some(event) = &event {
            metrics::record_alert(event);
            let report = self.recovery.on_alert(event);
            if let Some(report) = report {
                metrics::record_recovery(&report);
            }
        }
        event
    }

    /// Most recent sample, if any cycle has run.
    pub fn latest(&self) -> Option<MetricSample> {
        self.history.lock().latest().cloned()
    }

    /// Oldest-first snapshot of the retained sample history.
    pub fn history_snapshot(&self) -> Vec<MetricSample> {
        self.history.lock().snapshot()
    }

    /// Memory health summary from the latest sample and leak verdict.
    pub fn memory_status(&self) -> MemoryStatus {
        let latest = self.latest();
        let leak_detected = self.evaluator.lock().leak_detected();
        match latest {
            Some(sample) => MemoryStatus {
                status: if leak_detected { "warning" } else { "ok" }.to_string(),
                memory_percent: sample.memory_percent,
                allocator_memory_mb: sample.allocator_memory_mb,
                leak_detected,
            },
            None => MemoryStatus {
                status: "no_data".to_string(),
                memory_percent: None,
                allocator_memory_mb: None,
                leak_detected: false,
            },
        }
    }

    /// Sampling loop; runs until the token is cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Metric sampler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Metric sampler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(event) = self.tick() {
                        debug!(kind = ?event.kind, "Sampler cycle raised alert");
                    }
                }
            }
        }
    }
}

impl sampler::ResourceProbe for SystemMonitor {
    fn usage(&self) -> crate::types::ResourceUsage {
        sampler::ResourceProbe::usage(&self.sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampler::NoAccelerator;

    fn quiet_config() -> Config {
        // Thresholds high enough that a real host sample stays quiet.
        Config {
            ram_threshold_percent: 100.0,
            accelerator_threshold_percent: 100.0,
            leak_threshold_mb: 1_000_000.0,
            metric_history_size: 16,
            ..Config::default()
        }
    }

    #[test]
    fn test_tick_appends_history() {
        let recovery = Arc::new(RecoveryCoordinator::new(true));
        let monitor = SystemMonitor::new(&quiet_config(), Arc::new(NoAccelerator), recovery);

        assert!(monitor.latest().is_none());
        assert_eq!(monitor.memory_status().status, "no_data");

        monitor.tick();
        monitor.tick();

        assert_eq!(monitor.history_snapshot().len(), 2);
        assert!(monitor.latest().is_some());
        assert_eq!(monitor.memory_status().status, "ok");
    }

    #[test]
    fn test_history_stays_bounded() {
        let config = Config {
            metric_history_size: 4,
            ..quiet_config()
        };
        let recovery = Arc::new(RecoveryCoordinator::new(true));
        let monitor = SystemMonitor::new(&config, Arc::new(NoAccelerator), recovery);

        for _ in 0..10 {
            monitor.tick();
        }
        assert_eq!(monitor.history_snapshot().len(), 4);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let config = Config {
            sampling_interval: Duration::from_millis(10),
            ..quiet_config()
        };
        let recovery = Arc::new(RecoveryCoordinator::new(true));
        let monitor = Arc::new(SystemMonitor::new(
            &config,
            Arc::new(NoAccelerator),
            recovery,
        ));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&monitor).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(!monitor.history_snapshot().is_empty());
    }
}
