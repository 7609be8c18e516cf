//! Duration statistics over the completed-session history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::telemetry::recorder::CompletedSession;

/// Summary statistics over a set of durations, in seconds.
///
/// All statistics are absent when `count` is zero; an empty history is a
/// defined result, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DurationStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl DurationStats {
    fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(|a, b| a.total_cmp(b));

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 1 {
            values[count / 2]
        } else {
            (values[count / 2 - 1] + values[count / 2]) / 2.0
        };

        Self {
            count,
            mean: Some(mean),
            median: Some(median),
            min: Some(values[0]),
            max: Some(values[count - 1]),
        }
    }
}

/// Aggregated duration trends across completed sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceTrends {
    /// Statistics over whole-session durations
    pub session_duration: DurationStats,

    /// Statistics per step name, across all sessions
    pub per_step: BTreeMap<String, DurationStats>,
}

/// Compute trends over an oldest-first session history.
pub fn compute(sessions: &[CompletedSession]) -> PerformanceTrends {
    let session_duration =
        DurationStats::from_values(sessions.iter().map(|s| s.total_duration).collect());

    let mut step_durations: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for session in sessions {
        for step in &session.steps {
            step_durations
                .entry(step.step_name.clone())
                .or_default()
                .push(step.duration);
        }
    }

    let per_step = step_durations
        .into_iter()
        .map(|(name, values)| (name, DurationStats::from_values(values)))
        .collect();

    PerformanceTrends {
        session_duration,
        per_step,
    }
}
