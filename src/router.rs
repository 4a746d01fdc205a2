//! Bidirectional value routing for networked haptic points
//!
//! Each haptic point carries two value sets: what the local simulation senses
//! and the replica fields synchronized to other participants. Once per update
//! tick the router decides which set is authoritative:
//!
//! | context | owner | direction |
//! |---|---|---|
//! | private workspace | any | local -> replica |
//! | shared | unowned | local -> replica |
//! | shared | local user | local -> replica if self-haptics allowed, else skip |
//! | shared | remote user | replica -> local |
//!
//! Replica values applied inbound are cached. A later local sampling pass
//! within the freshness window gets the cached values back instead of its own
//! (usually zero) readings, so a remotely triggered effect survives the tick
//! it arrives in.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::config::RouterConfig;
use crate::position::DevicePosition;

/// Identifier of a host haptic point
pub type PointId = u64;

// ============================================================================
// Values and points
// ============================================================================

/// Sensation values of one haptic point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HapticValues {
    /// 0.0-1.0
    pub force: f32,
    /// -1.0 (cold) to 1.0 (hot)
    pub temperature: f32,
    /// 0.0-1.0
    pub pain: f32,
    /// 0.0-1.0
    pub vibration: f32,
}

impl HapticValues {
    pub const ZERO: HapticValues = HapticValues {
        force: 0.0,
        temperature: 0.0,
        pain: 0.0,
        vibration: 0.0,
    };

    pub fn new(force: f32, temperature: f32, pain: f32, vibration: f32) -> Self {
        Self {
            force,
            temperature,
            pain,
            vibration,
        }
        .clamped()
    }

    /// Values forced into their valid ranges
    pub fn clamped(self) -> Self {
        Self {
            force: self.force.clamp(0.0, 1.0),
            temperature: self.temperature.clamp(-1.0, 1.0),
            pain: self.pain.clamp(0.0, 1.0),
            vibration: self.vibration.clamp(0.0, 1.0),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.force == 0.0 && self.temperature == 0.0 && self.pain == 0.0 && self.vibration == 0.0
    }

    /// Total activation intensity, 0.0-1.0
    pub fn activation(&self) -> f32 {
        (self.force + self.temperature.abs() + self.pain + self.vibration).clamp(0.0, 1.0)
    }
}

/// Who controls a point in a shared session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Ownership {
    #[default]
    Unowned,
    LocalUser,
    RemoteUser(String),
}

/// One host haptic point as seen by the router
#[derive(Debug, Clone, PartialEq)]
pub struct HapticPoint {
    pub id: PointId,
    pub position: DevicePosition,
    /// Locally sensed values, also what drives the local actuator
    pub sensed: HapticValues,
    /// Networked replica fields
    pub replica: HapticValues,
    pub owner: Ownership,
}

impl HapticPoint {
    pub fn new(id: PointId, position: DevicePosition, owner: Ownership) -> Self {
        Self {
            id,
            position,
            sensed: HapticValues::ZERO,
            replica: HapticValues::ZERO,
            owner,
        }
    }
}

// ============================================================================
// Routing decision
// ============================================================================

/// Data-flow direction chosen for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDirection {
    /// Local sensed values are written to the replica fields
    Outbound,
    /// Replica fields override the local actuator values
    Inbound,
    /// Neither side is touched
    Skip,
}

impl fmt::Display for RouteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteDirection::Outbound => write!(f, "outbound"),
            RouteDirection::Inbound => write!(f, "inbound"),
            RouteDirection::Skip => write!(f, "skip"),
        }
    }
}

/// Pick the direction for a point
pub fn decide(private_workspace: bool, owner: &Ownership, allow_self_haptics: bool) -> RouteDirection {
    if private_workspace {
        return RouteDirection::Outbound;
    }
    match owner {
        Ownership::Unowned => RouteDirection::Outbound,
        Ownership::LocalUser if allow_self_haptics => RouteDirection::Outbound,
        Ownership::LocalUser => RouteDirection::Skip,
        Ownership::RemoteUser(_) => RouteDirection::Inbound,
    }
}

// ============================================================================
// Router
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ReplicaEntry {
    values: HapticValues,
    applied_at_ms: u64,
}

#[derive(Debug, Default)]
struct RouterState {
    replicas: HashMap<PointId, ReplicaEntry>,
    last_sweep_ms: u64,
}

impl RouterState {
    fn sweep_if_due(&mut self, now_ms: u64, config: &RouterConfig) {
        if now_ms.saturating_sub(self.last_sweep_ms) < config.sweep_interval_ms {
            return;
        }
        let before = self.replicas.len();
        self.replicas
            .retain(|_, entry| now_ms.saturating_sub(entry.applied_at_ms) <= config.freshness_ms);
        self.last_sweep_ms = now_ms;
        let removed = before - self.replicas.len();
        if removed > 0 {
            tracing::trace!(removed, "Swept stale replica values");
        }
    }
}

/// Per-tick value router with the inbound replica cache
#[derive(Debug)]
pub struct ValueRouter {
    config: RouterConfig,
    state: Mutex<RouterState>,
}

impl ValueRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RouterState::default()),
        }
    }

    /// Route one point for this tick, copying values in the chosen direction
    pub fn route(
        &self,
        point: &mut HapticPoint,
        private_workspace: bool,
        now_ms: u64,
    ) -> RouteDirection {
        let direction = decide(private_workspace, &point.owner, self.config.allow_self_haptics);

        match direction {
            RouteDirection::Outbound => {
                point.replica = point.sensed;
            }
            RouteDirection::Inbound => {
                point.sensed = point.replica;
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                state.sweep_if_due(now_ms, &self.config);
                state.replicas.insert(
                    point.id,
                    ReplicaEntry {
                        values: point.replica,
                        applied_at_ms: now_ms,
                    },
                );
            }
            RouteDirection::Skip => {}
        }

        direction
    }

    /// Values a local sampling pass should use for a point.
    ///
    /// Fresh, nonzero replica values win over `resampled`.
    pub fn sample(&self, id: PointId, resampled: HapticValues, now_ms: u64) -> HapticValues {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sweep_if_due(now_ms, &self.config);

        match state.replicas.get(&id) {
            Some(entry)
                if now_ms.saturating_sub(entry.applied_at_ms) <= self.config.freshness_ms
                    && !entry.values.is_zero() =>
            {
                entry.values
            }
            _ => resampled,
        }
    }

    /// Drop cached replicas older than the freshness window
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.replicas.len();
        state
            .replicas
            .retain(|_, entry| now_ms.saturating_sub(entry.applied_at_ms) <= self.config.freshness_ms);
        state.last_sweep_ms = now_ms;
        before - state.replicas.len()
    }

    /// Number of cached replica entries
    pub fn cached_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replicas
            .len()
    }
}

impl Default for ValueRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> Ownership {
        Ownership::RemoteUser("peer-7".to_string())
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(decide(true, &remote(), false), RouteDirection::Outbound);
        assert_eq!(decide(true, &Ownership::LocalUser, false), RouteDirection::Outbound);
        assert_eq!(decide(false, &Ownership::Unowned, false), RouteDirection::Outbound);
        assert_eq!(decide(false, &Ownership::LocalUser, true), RouteDirection::Outbound);
        assert_eq!(decide(false, &Ownership::LocalUser, false), RouteDirection::Skip);
        assert_eq!(decide(false, &remote(), true), RouteDirection::Inbound);
    }

    #[test]
    fn test_outbound_copies_sensed_to_replica() {
        let router = ValueRouter::default();
        let mut point = HapticPoint::new(1, DevicePosition::Vest, Ownership::Unowned);
        point.sensed = HapticValues::new(0.4, 0.0, 0.0, 0.2);

        assert_eq!(router.route(&mut point, false, 0), RouteDirection::Outbound);
        assert_eq!(point.replica, point.sensed);
        assert_eq!(router.cached_len(), 0);
    }

    #[test]
    fn test_skip_leaves_point_untouched() {
        let router = ValueRouter::default();
        let mut point = HapticPoint::new(1, DevicePosition::Head, Ownership::LocalUser);
        point.sensed = HapticValues::new(1.0, 0.0, 0.0, 0.0);
        let before = point.clone();

        assert_eq!(router.route(&mut point, false, 0), RouteDirection::Skip);
        assert_eq!(point, before);
    }

    #[test]
    fn test_inbound_overrides_and_survives_zero_resample() {
        let router = ValueRouter::default();
        let mut point = HapticPoint::new(9, DevicePosition::Vest, remote());
        point.replica = HapticValues::new(0.8, 0.0, 0.1, 0.5);

        assert_eq!(router.route(&mut point, false, 1_000), RouteDirection::Inbound);
        assert_eq!(point.sensed, point.replica);

        for t in [1_000, 1_050, 1_199, 1_200] {
            assert_eq!(router.sample(9, HapticValues::ZERO, t), point.replica);
        }
    }

    #[test]
    fn test_stale_replica_yields_local_values() {
        let router = ValueRouter::default();
        let mut point = HapticPoint::new(9, DevicePosition::Vest, remote());
        point.replica = HapticValues::new(0.8, 0.0, 0.0, 0.0);
        router.route(&mut point, false, 1_000);

        let local = HapticValues::new(0.1, 0.0, 0.0, 0.0);
        assert_eq!(router.sample(9, local, 1_201), local);
    }

    #[test]
    fn test_zero_replica_does_not_block_sampling() {
        let router = ValueRouter::default();
        let mut point = HapticPoint::new(3, DevicePosition::Head, remote());
        router.route(&mut point, false, 0);

        let local = HapticValues::new(0.3, 0.0, 0.0, 0.0);
        assert_eq!(router.sample(3, local, 10), local);
    }

    #[test]
    fn test_unknown_point_samples_locally() {
        let router = ValueRouter::default();
        let local = HapticValues::new(0.0, 0.5, 0.0, 0.0);
        assert_eq!(router.sample(42, local, 0), local);
    }

    #[test]
    fn test_sweep_bounds_cache() {
        let router = ValueRouter::default();
        for id in 0..4 {
            let mut point = HapticPoint::new(id, DevicePosition::Vest, remote());
            point.replica = HapticValues::new(0.5, 0.0, 0.0, 0.0);
            router.route(&mut point, false, 100);
        }
        assert_eq!(router.cached_len(), 4);
        assert_eq!(router.sweep(250), 0);
        assert_eq!(router.sweep(301), 4);
        assert_eq!(router.cached_len(), 0);
    }

    #[test]
    fn test_opportunistic_sweep_on_sample() {
        let router = ValueRouter::default();
        let mut point = HapticPoint::new(1, DevicePosition::Vest, remote());
        point.replica = HapticValues::new(0.5, 0.0, 0.0, 0.0);
        router.route(&mut point, false, 5_000);
        assert_eq!(router.cached_len(), 1);

        router.sample(2, HapticValues::ZERO, 6_500);
        assert_eq!(router.cached_len(), 0);
    }

    #[test]
    fn test_values_clamped_and_activation() {
        let v = HapticValues::new(2.0, -3.0, -1.0, 0.5);
        assert_eq!(v.force, 1.0);
        assert_eq!(v.temperature, -1.0);
        assert_eq!(v.pain, 0.0);
        assert_eq!(v.activation(), 1.0);
        assert!((HapticValues::new(0.2, 0.0, 0.0, 0.1).activation() - 0.3).abs() < 1e-6);
        assert!(HapticValues::ZERO.is_zero());
    }
}
