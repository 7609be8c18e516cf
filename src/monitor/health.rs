//! Health rule evaluation over the metric-sample history.
//!
//! Three rule families run against each fresh sample: absolute thresholds
//! (host memory, accelerator utilization), allocator leak detection, and
//! performance-degradation trends. Thresholds are plain configuration values;
//! the evaluator attaches no meaning to the shipped defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::Config;
use crate::monitor::sampler::MetricSample;
use crate::types::epoch_secs;

/// Category of health violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// An absolute resource threshold was crossed (hard)
    ThresholdExceeded,
    /// Allocator memory grew abnormally over the recent window (soft)
    LeakDetected,
    /// Resource usage trended upward across the sliding window (soft)
    DegradationTrend,
}

impl AlertKind {
    /// Hard alerts demand immediate attention; soft alerts are advisory.
    pub fn is_hard(&self) -> bool {
        matches!(self, AlertKind::ThresholdExceeded)
    }
}

/// One violated rule inside an alert event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Which rule family fired
    pub kind: AlertKind,

    /// Human-readable description of the violation
    pub message: String,
}

/// A single merged alert covering every rule violated in one evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Unix-epoch seconds when the alert fired
    pub timestamp: f64,

    /// The first violated rule's kind, for routing and metrics
    pub kind: AlertKind,

    /// True when any violation is a hard one
    pub hard: bool,

    /// Every rule violated in this cycle, in evaluation order
    pub violations: Vec<Violation>,

    /// The sample that triggered the evaluation
    pub sample: MetricSample,
}

/// Evaluates health rules and applies per-kind alert cooldowns.
///
/// Stateful: tracks cooldown deadlines and the latest leak verdict. One
/// evaluator instance serves one sample stream.
pub struct HealthEvaluator {
    ram_threshold_percent: f64,
    accelerator_threshold_percent: f64,
    leak_threshold_mb: f64,
    leak_window: usize,
    degradation_window: usize,
    degradation_delta_percent: f64,
    cooldown: Duration,
    last_fired: HashMap<AlertKind, Instant>,
    leak_detected: bool,
}

impl HealthEvaluator {
    pub fn new(config: &Config) -> Self {
        Self {
            ram_threshold_percent: config.ram_threshold_percent,
            accelerator_threshold_percent: config.accelerator_threshold_percent,
            leak_threshold_mb: config.leak_threshold_mb,
            leak_window: config.leak_window,
            degradation_window: config.degradation_window,
            degradation_delta_percent: config.degradation_delta_percent,
            cooldown: config.alert_cooldown,
            last_fired: HashMap::new(),
            leak_detected: false,
        }
    }

    /// Whether the most recent evaluation flagged allocator leak growth.
    pub fn leak_detected(&self) -> bool {
        self.leak_detected
    }

    /// Evaluate all rules against `sample`.
    ///
    /// `history` is an oldest-first snapshot whose final entry is `sample`
    /// itself. Violations of every rule family are merged into one event;
    /// kinds still inside their cooldown window are suppressed. Returns
    /// `None` when nothing (new) fired.
    pub fn evaluate(&mut self, sample: &MetricSample, history: &[MetricSample]) -> Option<AlertEvent> {
        let mut violations = Vec::new();

        // Host memory: absolute threshold wins over the trend rule.
        match sample.memory_percent {
            Some(percent) if percent > self.ram_threshold_percent => {
                violations.push(Violation {
                    kind: AlertKind::ThresholdExceeded,
                    message: format!(
                        "host memory at {:.1}% exceeds threshold {:.1}%",
                        percent, self.ram_threshold_percent
                    ),
                });
            }
            Some(_) => {
                if let Some(delta) = self.degradation_delta(history, |s| s.memory_percent) {
                    violations.push(Violation {
                        kind: AlertKind::DegradationTrend,
                        message: format!(
                            "host memory trending up {:.1} percentage points over the last {} samples",
                            delta, self.degradation_window
                        ),
                    });
                }
            }
            None => {}
        }

        // Accelerator utilization, when an accelerator is present.
        if let Some(utilization) = sample.accelerator_utilization {
            if utilization > self.accelerator_threshold_percent {
                violations.push(Violation {
                    kind: AlertKind::ThresholdExceeded,
                    message: format!(
                        "accelerator utilization at {:.1}% exceeds threshold {:.1}%",
                        utilization, self.accelerator_threshold_percent
                    ),
                });
            }
        }

        // Allocator growth against the recent mean.
        self.leak_detected = false;
        if let Some((current, mean)) = self.leak_excess(sample, history) {
            self.leak_detected = true;
            violations.push(Violation {
                kind: AlertKind::LeakDetected,
                message: format!(
                    "allocator memory {:.1} MB exceeds recent mean {:.1} MB by more than {:.1} MB",
                    current, mean, self.leak_threshold_mb
                ),
            });
        }

        if violations.is_empty() {
            return None;
        }

        // Per-kind cooldown: a kind that fired recently stays quiet, other
        // kinds in the same cycle still get through.
        let now = Instant::now();
        violations.retain(|violation| {
            match self.last_fired.get(&violation.kind) {
                Some(at) if now.duration_since(*at) < self.cooldown => false,
                _ => true,
            }
        });
        if violations.is_empty() {
            return None;
        }
        for violation in &violations {
            self.last_fired.insert(violation.kind, now);
        }

        let hard = violations.iter().any(|v| v.kind.is_hard());
        let kind = violations[0].kind;
        warn!(?kind, hard, count = violations.len(), "Health alert raised");

        Some(AlertEvent {
            timestamp: epoch_secs(),
            kind,
            hard,
            violations,
            sample: sample.clone(),
        })
    }

    /// Leak rule: the current allocator reading against the mean of the most
    /// recent `leak_window` prior readings. Requires a full window of prior
    /// samples carrying an allocator value.
    fn leak_excess(&self, sample: &MetricSample, history: &[MetricSample]) -> Option<(f64, f64)> {
        let current = sample.allocator_memory_mb?;

        let prior: Vec<f64> = history
            .iter()
            .rev()
            .skip(1) // the current sample is the final history entry
            .filter_map(|s| s.allocator_memory_mb)
            .take(self.leak_window)
            .collect();
        if prior.len() < self.leak_window {
            return None;
        }

        let mean = prior.iter().sum::<f64>() / prior.len() as f64;
        if current - mean > self.leak_threshold_mb {
            Some((current, mean))
        } else {
            None
        }
    }

    /// Trend rule: mean of the window's second half against its first half.
    /// Returns the delta in percentage points when it exceeds the configured
    /// slack.
    fn degradation_delta(
        &self,
        history: &[MetricSample],
        metric: impl Fn(&MetricSample) -> Option<f64>,
    ) -> Option<f64> {
        let values: Vec<f64> = history
            .iter()
            .rev()
            .filter_map(&metric)
            .take(self.degradation_window)
            .collect();
        if values.len() < self.degradation_window {
            return None;
        }
        // `values` is newest-first; restore chronological order.
        let values: Vec<f64> = values.into_iter().rev().collect();

        let half = values.len() / 2;
        let first = values[..half].iter().sum::<f64>() / half as f64;
        let second = values[half..].iter().sum::<f64>() / (values.len() - half) as f64;

        let delta = second - first;
        if delta > self.degradation_delta_percent {
            Some(delta)
        } else {
            None
        }
    }
}
