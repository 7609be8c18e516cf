//! Alert fan-out and recovery-action coordination.
//!
//! Subscribers observe alerts; recovery actions attempt to remediate them.
//! Notification is best-effort: a failing subscriber never prevents the rest
//! from being notified. When every registered action fails, a distinct
//! "recovery ineffective" event is surfaced through the same subscriber
//! channel so operators can escalate.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::monitor::health::{AlertEvent, AlertKind};
use crate::types::epoch_secs;

/// Observer of alert and recovery events.
pub trait AlertSubscriber: Send + Sync {
    /// Subscriber name for logging.
    fn name(&self) -> &str;

    /// Called for every alert event that passes cooldown.
    fn on_alert(&self, event: &AlertEvent) -> Result<()>;

    /// Called when a recovery pass ran and nothing succeeded.
    fn on_recovery_ineffective(&self, _report: &RecoveryReport) -> Result<()> {
        Ok(())
    }
}

/// A remediation step run in response to an alert.
///
/// Actions must be idempotent: they may run repeatedly across alert cycles.
pub trait RecoveryAction: Send + Sync {
    /// Action name; used for logging and duplicate registration checks.
    fn name(&self) -> &str;

    /// Attempt remediation, reporting whether it had effect.
    fn execute(&self) -> bool;
}

/// Adapter turning a closure into a named recovery action.
pub struct FnRecoveryAction<F> {
    name: String,
    action: F,
}

impl<F: Fn() -> bool + Send + Sync> FnRecoveryAction<F> {
    pub fn new(name: impl Into<String>, action: F) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }
}

impl<F: Fn() -> bool + Send + Sync> RecoveryAction for FnRecoveryAction<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> bool {
        (self.action)()
    }
}

/// Outcome summary of one recovery pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Unix-epoch seconds when the pass finished
    pub timestamp: f64,

    /// Kind of the alert that triggered the pass
    pub triggered_by: AlertKind,

    /// Number of actions attempted
    pub attempted: usize,

    /// Number of actions reporting success
    pub succeeded: usize,
}

/// Dispatches alerts to subscribers and drives registered recovery actions.
pub struct RecoveryCoordinator {
    subscribers: RwLock<Vec<Arc<dyn AlertSubscriber>>>,
    actions: RwLock<Vec<Arc<dyn RecoveryAction>>>,
    auto_recovery: bool,
}

impl RecoveryCoordinator {
    pub fn new(auto_recovery: bool) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            actions: RwLock::new(Vec::new()),
            auto_recovery,
        }
    }

    /// Register an alert subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn AlertSubscriber>) {
        info!(name = subscriber.name(), "Alert subscriber registered");
        self.subscribers.write().push(subscriber);
    }

    /// Register a recovery action. Returns false if an action with the same
    /// name is already registered.
    pub fn register_action(&self, action: Arc<dyn RecoveryAction>) -> bool {
        let mut actions = self.actions.write();
        if actions.iter().any(|a| a.name() == action.name()) {
            warn!(name = action.name(), "Duplicate recovery action ignored");
            return false;
        }
        info!(name = action.name(), "Recovery action registered");
        actions.push(action);
        true
    }

    /// Handle one alert: notify every subscriber, then run recovery actions
    /// in registration order when auto-recovery is enabled.
    ///
    /// Returns the recovery report when a pass ran, `None` when recovery was
    /// skipped (disabled, or no actions registered).
    pub fn on_alert(&self, event: &AlertEvent) -> Option<RecoveryReport> {
        let subscribers = self.subscribers.read().clone();
        for subscriber in &subscribers {
            if let Err(e) = subscriber.on_alert(event) {
                // Best-effort: keep notifying the rest.
                error!(name = subscriber.name(), error = %e, "Alert subscriber failed");
            }
        }

        if !self.auto_recovery {
            return None;
        }

        let actions = self.actions.read().clone();
        if actions.is_empty() {
            return None;
        }

        let mut succeeded = 0usize;
        for action in &actions {
            let ok = action.execute();
            info!(name = action.name(), ok, "Recovery action executed");
            if ok {
                succeeded += 1;
            }
        }

        let report = RecoveryReport {
            timestamp: epoch_secs(),
            triggered_by: event.kind,
            attempted: actions.len(),
            succeeded,
        };

        if report.succeeded == 0 {
            warn!(attempted = report.attempted, "Recovery pass had no effect");
            for subscriber in &subscribers {
                if let Err(e) = subscriber.on_recovery_ineffective(&report) {
                    error!(name = subscriber.name(), error = %e, "Subscriber failed on recovery report");
                }
            }
        }

        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::monitor::sampler::MetricSample;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_event() -> AlertEvent {
        AlertEvent {
            timestamp: epoch_secs(),
            kind: AlertKind::ThresholdExceeded,
            hard: true,
            violations: vec![],
            sample: MetricSample::default(),
        }
    }

    struct CountingSubscriber {
        alerts: AtomicUsize,
        ineffective: AtomicUsize,
        fail: bool,
    }

    impl CountingSubscriber {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                alerts: AtomicUsize::new(0),
                ineffective: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl AlertSubscriber for CountingSubscriber {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_alert(&self, _event: &AlertEvent) -> Result<()> {
            self.alerts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::Internal("subscriber failure".to_string()));
            }
            Ok(())
        }

        fn on_recovery_ineffective(&self, _report: &RecoveryReport) -> Result<()> {
            self.ineffective.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let coordinator = RecoveryCoordinator::new(false);
        let failing = CountingSubscriber::new(true);
        let healthy = CountingSubscriber::new(false);
        coordinator.subscribe(failing.clone());
        coordinator.subscribe(healthy.clone());

        coordinator.on_alert(&test_event());

        assert_eq!(failing.alerts.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.alerts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_actions_run_in_registration_order() {
        let coordinator = RecoveryCoordinator::new(true);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            coordinator.register_action(Arc::new(FnRecoveryAction::new(label, move || {
                order.lock().push(label);
                true
            })));
        }

        let report = coordinator.on_alert(&test_event()).unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_duplicate_action_name_rejected() {
        let coordinator = RecoveryCoordinator::new(true);
        assert!(coordinator.register_action(Arc::new(FnRecoveryAction::new("purge", || true))));
        assert!(!coordinator.register_action(Arc::new(FnRecoveryAction::new("purge", || true))));
    }

    #[test]
    fn test_ineffective_recovery_is_surfaced() {
        let coordinator = RecoveryCoordinator::new(true);
        let subscriber = CountingSubscriber::new(false);
        coordinator.subscribe(subscriber.clone());
        coordinator.register_action(Arc::new(FnRecoveryAction::new("noop", || false)));

        let report = coordinator.on_alert(&test_event()).unwrap();
        assert_eq!(report.succeeded, 0);
        assert_eq!(subscriber.ineffective.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auto_recovery_disabled_still_notifies() {
        let coordinator = RecoveryCoordinator::new(false);
        let subscriber = CountingSubscriber::new(false);
        coordinator.subscribe(subscriber.clone());
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let ran = Arc::clone(&ran);
            coordinator.register_action(Arc::new(FnRecoveryAction::new("skip", move || {
                ran.fetch_add(1, Ordering::SeqCst);
                true
            })));
        }

        assert!(coordinator.on_alert(&test_event()).is_none());
        assert_eq!(subscriber.alerts.load(Ordering::SeqCst), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
