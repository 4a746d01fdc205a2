//! Submission rate limiting and idle suppression
//!
//! Legacy callers submit a frame for every device on every engine update
//! (60Hz or more). Two independent rules turn that into a stream the
//! transport can keep up with:
//!
//! 1. **Idle suppression**: a frame whose motors are all zero is dropped when
//!    the device has never been active, or has been quiet for longer than the
//!    idle timeout. Zero frames shortly after activity still go through so the
//!    device is actually switched off.
//! 2. **Rate limiting**: each (device, pattern key) lane forwards at most one
//!    frame per minimum interval.
//!
//! Lanes and activity are keyed on the position the caller sent, before
//! translation, so the two vest halves keep separate lanes even though both
//! reach the same transport device. Resets arrive per transport device and
//! clear every legacy position that maps onto it.
//!
//! Both maps live behind one mutex; a decision is a couple of map lookups.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::config::LimiterConfig;
use crate::position::{to_modern, DevicePosition, LegacyPosition};

/// Identifies one independent rate-limit lane
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionKey {
    pub position: LegacyPosition,
    pub pattern_key: String,
}

impl SubmissionKey {
    pub fn new(position: LegacyPosition, pattern_key: &str) -> Self {
        Self {
            position,
            pattern_key: pattern_key.to_string(),
        }
    }
}

/// Outcome of a submission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Forward to the transport
    Forward,
    /// Dropped: all-zero frame on a quiescent device
    IdleSuppressed,
    /// Dropped: lane submitted too recently
    RateLimited,
}

impl Admission {
    pub fn is_forward(self) -> bool {
        self == Admission::Forward
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Admission::Forward => write!(f, "forward"),
            Admission::IdleSuppressed => write!(f, "idle_suppressed"),
            Admission::RateLimited => write!(f, "rate_limited"),
        }
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    /// Last time any motor on the device was nonzero
    activity: HashMap<LegacyPosition, u64>,
    /// Last forwarded submission per lane
    submissions: HashMap<SubmissionKey, u64>,
    submissions_since_sweep: u32,
    last_sweep_ms: u64,
}

impl LimiterState {
    fn sweep(&mut self, now_ms: u64, retention_ms: u64) -> usize {
        let before = self.activity.len() + self.submissions.len();
        self.activity
            .retain(|_, last| now_ms.saturating_sub(*last) <= retention_ms);
        self.submissions
            .retain(|_, last| now_ms.saturating_sub(*last) <= retention_ms);
        self.submissions_since_sweep = 0;
        self.last_sweep_ms = now_ms;
        before - (self.activity.len() + self.submissions.len())
    }
}

/// Per-lane rate limiter with per-device idle suppression
#[derive(Debug)]
pub struct SubmissionLimiter {
    config: LimiterConfig,
    state: Mutex<LimiterState>,
}

impl SubmissionLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Decide whether a frame is forwarded, recording it if so.
    ///
    /// `has_active_motors` is true when any intensity in the frame is nonzero.
    pub fn admit(
        &self,
        position: LegacyPosition,
        pattern_key: &str,
        has_active_motors: bool,
        now_ms: u64,
    ) -> Admission {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        state.submissions_since_sweep = state.submissions_since_sweep.saturating_add(1);
        if state.submissions_since_sweep >= self.config.sweep_every_submissions
            || now_ms.saturating_sub(state.last_sweep_ms) >= self.config.sweep_interval_ms
        {
            let removed = state.sweep(now_ms, self.config.record_retention_ms);
            if removed > 0 {
                tracing::trace!(removed, "Swept stale limiter records");
            }
        }

        if has_active_motors {
            state.activity.insert(position, now_ms);
        } else {
            let idle = match state.activity.get(&position) {
                None => true,
                Some(last) => now_ms.saturating_sub(*last) > self.config.idle_timeout_ms,
            };
            if idle {
                return Admission::IdleSuppressed;
            }
        }

        let key = SubmissionKey::new(position, pattern_key);
        if let Some(last) = state.submissions.get(&key) {
            if now_ms.saturating_sub(*last) < self.config.min_interval_ms {
                return Admission::RateLimited;
            }
        }

        state.submissions.insert(key, now_ms);
        Admission::Forward
    }

    /// Duration to forward for a requested duration.
    ///
    /// Frames go out at the lane rate rather than the caller's frame rate, so
    /// each one has to last long enough to bridge the gap to the next.
    pub fn extended_duration(&self, requested_ms: u32) -> u32 {
        requested_ms
            .saturating_mul(self.config.duration_multiplier)
            .max(self.config.min_duration_ms)
    }

    /// Forget all activity and lanes for a transport device.
    ///
    /// Returns the pattern keys that had lanes on the device and have none on
    /// any other device. Stopping one of those cannot cut off another device.
    pub fn reset_device(&self, position: DevicePosition) -> Vec<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.activity.retain(|legacy, _| to_modern(*legacy) != position);

        let mut keys = Vec::new();
        state.submissions.retain(|key, _| {
            if to_modern(key.position) == position {
                keys.push(key.pattern_key.clone());
                false
            } else {
                true
            }
        });

        keys.sort();
        keys.dedup();
        keys.retain(|key| !state.submissions.keys().any(|lane| &lane.pattern_key == key));
        keys
    }

    /// Forget every record
    pub fn reset_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.activity.clear();
        state.submissions.clear();
    }

    /// Drop records older than the retention window. Returns how many went.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sweep(now_ms, self.config.record_retention_ms)
    }

    /// Whether the caller position has activity on record
    pub fn has_activity(&self, position: LegacyPosition) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.activity.contains_key(&position)
    }

    /// Number of live rate-limit lanes
    pub fn lane_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.submissions.len()
    }
}

impl Default for SubmissionLimiter {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: LegacyPosition = LegacyPosition::Head;
    const VEST: LegacyPosition = LegacyPosition::Vest;

    #[test]
    fn test_zero_frame_without_history_is_suppressed() {
        let limiter = SubmissionLimiter::default();
        assert_eq!(limiter.admit(HEAD, "hit", false, 0), Admission::IdleSuppressed);
        assert_eq!(limiter.admit(HEAD, "hit", false, 500), Admission::IdleSuppressed);
        assert_eq!(limiter.lane_count(), 0);
    }

    #[test]
    fn test_zero_frame_after_activity() {
        let limiter = SubmissionLimiter::default();
        assert_eq!(limiter.admit(HEAD, "hit", true, 1_000), Admission::Forward);
        // Within the idle timeout: forwarded so the device is turned off
        assert_eq!(limiter.admit(HEAD, "hit", false, 1_050), Admission::Forward);
        // Past the idle timeout: dropped
        assert_eq!(limiter.admit(HEAD, "hit", false, 1_150), Admission::IdleSuppressed);
    }

    #[test]
    fn test_same_lane_rate_limited() {
        let limiter = SubmissionLimiter::default();
        assert_eq!(limiter.admit(HEAD, "hit", true, 0), Admission::Forward);
        assert_eq!(limiter.admit(HEAD, "hit", true, 10), Admission::RateLimited);
        assert_eq!(limiter.admit(HEAD, "hit", true, 40), Admission::Forward);
    }

    #[test]
    fn test_exact_interval_is_forwarded() {
        let limiter = SubmissionLimiter::default();
        assert!(limiter.admit(HEAD, "hit", true, 0).is_forward());
        assert!(limiter.admit(HEAD, "hit", true, 35).is_forward());
    }

    #[test]
    fn test_lanes_are_independent() {
        let limiter = SubmissionLimiter::default();
        assert!(limiter.admit(HEAD, "hit", true, 0).is_forward());
        assert!(limiter.admit(HEAD, "rain", true, 5).is_forward());
        assert!(limiter.admit(VEST, "hit", true, 5).is_forward());
        assert_eq!(limiter.lane_count(), 3);
    }

    #[test]
    fn test_rate_limited_frame_still_counts_as_activity() {
        let limiter = SubmissionLimiter::default();
        assert!(limiter.admit(HEAD, "a", true, 0).is_forward());
        assert_eq!(limiter.admit(HEAD, "a", true, 90), Admission::Forward);
        assert_eq!(limiter.admit(HEAD, "a", true, 100), Admission::RateLimited);
        // Activity at t=100 keeps the zero frame at t=180 alive
        assert_eq!(limiter.admit(HEAD, "a", false, 180), Admission::Forward);
    }

    #[test]
    fn test_reset_device_returns_keys() {
        let limiter = SubmissionLimiter::default();
        limiter.admit(HEAD, "hit", true, 0);
        limiter.admit(HEAD, "rain", true, 0);
        limiter.admit(VEST, "hit", true, 0);

        // "hit" still has a lane on the vest, so only "rain" is returned
        let keys = limiter.reset_device(DevicePosition::Head);
        assert_eq!(keys, vec!["rain".to_string()]);
        assert!(!limiter.has_activity(HEAD));
        assert!(limiter.has_activity(VEST));
        assert_eq!(limiter.lane_count(), 1);

        // First frame after reset is not rate limited
        assert!(limiter.admit(HEAD, "hit", true, 1).is_forward());
    }

    #[test]
    fn test_duration_extension() {
        let limiter = SubmissionLimiter::default();
        assert_eq!(limiter.extended_duration(10), 80);
        assert_eq!(limiter.extended_duration(40), 80);
        assert_eq!(limiter.extended_duration(100), 200);
        assert_eq!(limiter.extended_duration(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_sweep_removes_stale_records() {
        let limiter = SubmissionLimiter::default();
        limiter.admit(HEAD, "old", true, 0);
        limiter.admit(VEST, "fresh", true, 900);

        let removed = limiter.sweep(5_500);
        assert_eq!(removed, 2);
        assert!(!limiter.has_activity(HEAD));
        assert!(limiter.has_activity(VEST));
        assert_eq!(limiter.lane_count(), 1);
    }

    #[test]
    fn test_opportunistic_sweep_by_call_count() {
        let config = LimiterConfig {
            sweep_every_submissions: 3,
            sweep_interval_ms: u64::MAX,
            record_retention_ms: 500,
            ..LimiterConfig::default()
        };
        let limiter = SubmissionLimiter::new(config);
        limiter.admit(HEAD, "old", true, 0);
        limiter.admit(VEST, "x", true, 1_000);
        assert_eq!(limiter.lane_count(), 2);

        // Third call triggers the sweep before recording
        limiter.admit(VEST, "y", true, 1_000);
        assert!(!limiter.has_activity(HEAD));
        assert_eq!(limiter.lane_count(), 2);
    }

    #[test]
    fn test_vest_halves_have_own_lanes() {
        let limiter = SubmissionLimiter::default();
        let front = LegacyPosition::VestFront;
        let back = LegacyPosition::VestBack;

        assert!(limiter.admit(front, "hit", true, 0).is_forward());
        assert!(limiter.admit(back, "hit", true, 0).is_forward());
        assert_eq!(limiter.lane_count(), 2);

        // Back half goes quiet; front activity must not keep its zero frames alive
        assert!(limiter.admit(front, "hit", true, 140).is_forward());
        assert_eq!(limiter.admit(back, "hit", false, 150), Admission::IdleSuppressed);
    }

    #[test]
    fn test_reset_device_clears_every_alias() {
        let limiter = SubmissionLimiter::default();
        limiter.admit(LegacyPosition::VestFront, "hit", true, 0);
        limiter.admit(LegacyPosition::VestBack, "hit", true, 0);
        limiter.admit(LegacyPosition::All, "rain", true, 0);

        let keys = limiter.reset_device(DevicePosition::Vest);
        assert_eq!(keys, vec!["hit".to_string(), "rain".to_string()]);
        assert_eq!(limiter.lane_count(), 0);
        assert!(!limiter.has_activity(LegacyPosition::VestFront));
        assert!(!limiter.has_activity(LegacyPosition::All));
    }
}
