//! Submission outcome counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::limiter::Admission;

/// Lock-free counters updated on every legacy submission
#[derive(Debug, Default)]
pub struct BridgeStats {
    forwarded: AtomicU64,
    rate_limited: AtomicU64,
    idle_suppressed: AtomicU64,
    device_inactive: AtomicU64,
    degraded: AtomicU64,
    transport_errors: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub forwarded: u64,
    pub rate_limited: u64,
    pub idle_suppressed: u64,
    pub device_inactive: u64,
    pub degraded: u64,
    pub transport_errors: u64,
}

impl StatsSnapshot {
    /// Every submission seen, forwarded or not
    pub fn total(&self) -> u64 {
        self.forwarded
            + self.rate_limited
            + self.idle_suppressed
            + self.device_inactive
            + self.degraded
            + self.transport_errors
    }
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a limiter decision that ended the submission
    pub fn record_admission(&self, admission: Admission) {
        match admission {
            Admission::Forward => {}
            Admission::IdleSuppressed => {
                self.idle_suppressed.fetch_add(1, Ordering::Relaxed);
            }
            Admission::RateLimited => {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_inactive(&self) {
        self.device_inactive.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            idle_suppressed: self.idle_suppressed.load(Ordering::Relaxed),
            device_inactive: self.device_inactive.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}
