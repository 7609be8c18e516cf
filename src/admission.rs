//! Admission control for concurrent generation jobs.
//!
//! The controller bounds how many generation jobs may execute at once. An
//! `acquire` either grants an opaque reservation token immediately or rejects
//! with `MAX_CONCURRENT_JOBS_REACHED`; it never blocks or queues. Callers own
//! their retry policy.

use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::types::Availability;

/// Opaque admission ticket held exclusively by the job it was granted to.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ReservationToken {
    id: Uuid,
}

impl ReservationToken {
    /// Token identity, for logging and diagnostics.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Bounds concurrent job execution by issuing reservation tokens.
///
/// The outstanding-token set never exceeds the configured ceiling, under any
/// interleaving of acquire and release.
#[derive(Debug)]
pub struct AdmissionController {
    ceiling: usize,
    outstanding: Mutex<HashSet<Uuid>>,
}

impl AdmissionController {
    /// Create a controller with the given concurrency ceiling.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            outstanding: Mutex::new(HashSet::new()),
        }
    }

    /// Try to reserve a job slot without blocking.
    pub fn acquire(&self) -> Result<ReservationToken> {
        let mut outstanding = self.outstanding.lock();
        if outstanding.len() >= self.ceiling {
            warn!(
                ceiling = self.ceiling,
                "Admission rejected: concurrency ceiling reached"
            );
            return Err(EngineError::max_concurrent_jobs(self.ceiling));
        }

        let token = ReservationToken { id: Uuid::new_v4() };
        outstanding.insert(token.id);
        debug!(token = %token.id, outstanding = outstanding.len(), "Reservation granted");
        Ok(token)
    }

    /// Release a previously granted token.
    ///
    /// Idempotent: releasing an unknown or already-released token is a safe
    /// no-op and never decrements the outstanding count below zero.
    pub fn release(&self, token: &ReservationToken) {
        let mut outstanding = self.outstanding.lock();
        if outstanding.remove(&token.id) {
            debug!(token = %token.id, outstanding = outstanding.len(), "Reservation released");
        } else {
            debug!(token = %token.id, "Release of unknown token ignored");
        }
    }

    /// Current occupancy for observability.
    pub fn availability(&self) -> Availability {
        let outstanding = self.outstanding.lock().len();
        Availability {
            ceiling: self.ceiling,
            outstanding,
            free: self.ceiling.saturating_sub(outstanding),
        }
    }
}
