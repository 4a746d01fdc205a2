//! Legacy-facing haptic bridge
//!
//! [`HapticBridge`] owns one of every component and exposes the narrow,
//! synchronous surface the legacy caller expects:
//!
//! - `is_active(position) -> bool`
//! - `submit(key, position, dots, duration_ms)` / `submit_path(...)`
//! - `turn_off(key)` / `turn_off_all()`
//!
//! None of these return errors. Transport failures, unknown positions and
//! missing devices all degrade to `false` or a silent no-op, with the cause
//! logged where it happened.
//!
//! The host's main loop additionally calls [`HapticBridge::pump`] once per
//! frame to run queued registrations, and routes its networked points through
//! [`HapticBridge::route_point`] / [`HapticBridge::sample_point`].

use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::Config;
use crate::host::{main_loop_queue, DeviceInitializer, MainLoopReceiver};
use crate::lifecycle::DeviceLifecycle;
use crate::limiter::{Admission, SubmissionLimiter};
use crate::position::{to_modern, DevicePosition, LegacyPosition};
use crate::router::{HapticPoint, HapticValues, PointId, RouteDirection, ValueRouter};
use crate::stats::{BridgeStats, StatsSnapshot};
use crate::status_cache::StatusCache;
use crate::transport::{ConnectionStatus, DotPoint, HapticTransport, PathPoint, TransportError, TransportEvent};

/// Bridge between the legacy per-frame API and the event-driven transport
pub struct HapticBridge {
    config: Config,
    clock: SharedClock,
    transport: Arc<dyn HapticTransport>,
    status_cache: Arc<StatusCache>,
    limiter: Arc<SubmissionLimiter>,
    lifecycle: Arc<DeviceLifecycle>,
    router: ValueRouter,
    host_queue: MainLoopReceiver,
    stats: BridgeStats,
}

impl HapticBridge {
    pub fn new(config: Config, transport: Arc<dyn HapticTransport>, clock: SharedClock) -> Self {
        let status_cache = Arc::new(StatusCache::new(config.status_cache.ttl_ms));
        let limiter = Arc::new(SubmissionLimiter::new(config.limiter.clone()));
        let (queue_tx, host_queue) = main_loop_queue();
        let lifecycle = Arc::new(DeviceLifecycle::new(
            config.lifecycle.hot_plug_registration,
            clock.clone(),
            transport.clone(),
            limiter.clone(),
            status_cache.clone(),
            queue_tx,
        ));
        let router = ValueRouter::new(config.router.clone());

        Self {
            config,
            clock,
            transport,
            status_cache,
            limiter,
            lifecycle,
            router,
            host_queue,
            stats: BridgeStats::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Startup / shutdown
    // ------------------------------------------------------------------------

    /// Connect the transport and rebuild device state from its device list.
    ///
    /// Returns false when the transport never came up; the bridge then stays
    /// in a stable no-op mode until a connection event arrives.
    pub fn start(&self) -> bool {
        let transport_config = &self.config.transport;
        self.lifecycle.set_transport_status(ConnectionStatus::Connecting);

        let connected = match self.transport.connect(
            &transport_config.app_id,
            &transport_config.app_name,
            transport_config.auto_reconnect,
            transport_config.max_retries,
        ) {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!(error = %e, "Transport connect failed");
                false
            }
        };

        if !connected {
            self.lifecycle.set_transport_status(ConnectionStatus::Disconnected);
            tracing::error!(
                app_id = %transport_config.app_id,
                max_retries = transport_config.max_retries,
                "Haptic transport unavailable, bridge running in no-op mode"
            );
            return false;
        }

        self.lifecycle.set_transport_status(ConnectionStatus::Connected);

        let now = self.clock.now_ms();
        for position in DevicePosition::ALL {
            if self.transport.is_device_connected(position) {
                self.lifecycle.handle_event(TransportEvent::DeviceStatusChanged {
                    position,
                    is_connected: true,
                    timestamp_ms: now,
                });
            }
        }

        tracing::info!(
            devices = self.transport.connected_device_count(),
            "Haptic transport connected"
        );
        true
    }

    /// Stop all output and close the transport
    pub fn shutdown(&self) {
        if let Err(e) = self.transport.stop_all() {
            tracing::debug!(error = %e, "stop_all failed during shutdown");
        }
        match self.transport.disconnect() {
            Ok(_) => tracing::info!(stats = ?self.stats.snapshot(), "Haptic bridge shut down"),
            Err(e) => tracing::warn!(error = %e, "Transport disconnect failed"),
        }
        self.lifecycle.set_transport_status(ConnectionStatus::Disconnected);
        self.status_cache.clear();
        self.limiter.reset_all();
    }

    // ------------------------------------------------------------------------
    // Legacy surface
    // ------------------------------------------------------------------------

    /// Whether the device behind a legacy position is connected
    pub fn is_active(&self, position: impl Into<LegacyPosition>) -> bool {
        if !self.lifecycle.is_transport_connected() {
            return false;
        }
        let position = to_modern(position.into());
        self.status_cache
            .is_active(position, self.transport.as_ref(), self.clock.now_ms())
    }

    /// Submit one frame of motor intensities
    pub fn submit(
        &self,
        key: &str,
        position: impl Into<LegacyPosition>,
        dots: &[DotPoint],
        duration_ms: u32,
    ) {
        let has_active_motors = dots.iter().any(DotPoint::is_active);
        self.forward(key, position.into(), has_active_motors, duration_ms, |position, duration| {
            let active: Vec<DotPoint> = dots.iter().copied().filter(DotPoint::is_active).collect();
            self.transport.play(key, duration, position, &active)
        });
    }

    /// Submit one frame of path points
    pub fn submit_path(
        &self,
        key: &str,
        position: impl Into<LegacyPosition>,
        points: &[PathPoint],
        duration_ms: u32,
    ) {
        let has_active_motors = points.iter().any(PathPoint::is_active);
        self.forward(key, position.into(), has_active_motors, duration_ms, |position, duration| {
            let active: Vec<PathPoint> = points.iter().copied().filter(PathPoint::is_active).collect();
            self.transport.play_path(key, duration, position, &active)
        });
    }

    /// Stop one pattern
    pub fn turn_off(&self, key: &str) {
        if !self.lifecycle.is_transport_connected() {
            return;
        }
        if let Err(e) = self.transport.stop(key) {
            tracing::debug!(key, error = %e, "turn_off failed");
        }
    }

    /// Stop every pattern
    pub fn turn_off_all(&self) {
        if !self.lifecycle.is_transport_connected() {
            return;
        }
        if let Err(e) = self.transport.stop_all() {
            tracing::debug!(error = %e, "turn_off_all failed");
        }
    }

    fn forward<F>(
        &self,
        key: &str,
        legacy: LegacyPosition,
        has_active_motors: bool,
        duration_ms: u32,
        play: F,
    ) where
        F: FnOnce(DevicePosition, u32) -> Result<(), TransportError>,
    {
        if !self.lifecycle.is_transport_connected() {
            self.stats.record_degraded();
            return;
        }

        let now = self.clock.now_ms();

        let admission = self.limiter.admit(legacy, key, has_active_motors, now);
        if admission != Admission::Forward {
            tracing::trace!(position = ?legacy, key, admission = %admission, "Submission dropped");
            self.stats.record_admission(admission);
            return;
        }

        let position = to_modern(legacy);

        if !self
            .status_cache
            .is_active(position, self.transport.as_ref(), now)
        {
            self.device_gone(position, now);
            self.stats.record_device_inactive();
            return;
        }

        let duration = self.limiter.extended_duration(duration_ms);
        match play(position, duration) {
            Ok(()) => self.stats.record_forwarded(),
            Err(TransportError::DeviceNotConnected(position)) => {
                self.device_gone(position, now);
                self.stats.record_device_inactive();
            }
            Err(e) => {
                tracing::debug!(position = %position, key, error = %e, "Haptic submission failed");
                self.stats.record_transport_error();
            }
        }
    }

    /// Transport says the device is not there: forget its lanes and activity
    fn device_gone(&self, position: DevicePosition, now: u64) {
        self.limiter.reset_device(position);
        self.status_cache.store(position, false, now);
        tracing::trace!(position = %position, "Submission to inactive device dropped");
    }

    // ------------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------------

    /// Run queued host work. Call once per frame from the host's main loop.
    ///
    /// Returns the number of tasks processed.
    pub fn pump(&mut self, initializer: &mut dyn DeviceInitializer) -> usize {
        let tasks = self.host_queue.drain();
        for task in &tasks {
            self.lifecycle.run_registration(*task, initializer);
        }
        tasks.len()
    }

    /// Route one networked point for this tick
    pub fn route_point(&self, point: &mut HapticPoint, private_workspace: bool) -> RouteDirection {
        self.router.route(point, private_workspace, self.clock.now_ms())
    }

    /// Values a local sampling pass should use for a point
    pub fn sample_point(&self, id: PointId, resampled: HapticValues) -> HapticValues {
        self.router.sample(id, resampled, self.clock.now_ms())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Lifecycle handle for the transport's notification context
    pub fn lifecycle(&self) -> Arc<DeviceLifecycle> {
        self.lifecycle.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::position::PositionFamily;
    use crate::router::Ownership;
    use crate::sim::{PlayPayload, SimulatedHost, SimulatedTransport};

    const VEST: i32 = 3;
    const HEAD: i32 = 4;

    fn bridge_with(transport: Arc<SimulatedTransport>) -> (HapticBridge, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let bridge = HapticBridge::new(Config::default(), transport, clock.clone());
        (bridge, clock)
    }

    fn started(positions: &[DevicePosition]) -> (HapticBridge, Arc<ManualClock>, Arc<SimulatedTransport>) {
        let transport = Arc::new(SimulatedTransport::new());
        for position in positions {
            transport.plug(*position);
        }
        let (bridge, clock) = bridge_with(transport.clone());
        assert!(bridge.start());
        (bridge, clock, transport)
    }

    fn on() -> Vec<DotPoint> {
        vec![DotPoint::new(0, 60), DotPoint::new(1, 0), DotPoint::new(5, 30)]
    }

    fn off() -> Vec<DotPoint> {
        vec![DotPoint::new(0, 0), DotPoint::new(1, 0)]
    }

    #[test]
    fn test_forwarded_frame_is_translated_stripped_and_extended() {
        let (bridge, _clock, transport) = started(&[DevicePosition::Vest]);

        bridge.submit("hit", VEST, &on(), 20);

        let plays = transport.plays();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].key, "hit");
        assert_eq!(plays[0].position, DevicePosition::Vest);
        assert_eq!(plays[0].duration_ms, 80);
        assert_eq!(
            plays[0].payload,
            PlayPayload::Dots(vec![DotPoint::new(0, 60), DotPoint::new(5, 30)])
        );
    }

    #[test]
    fn test_vest_halves_reach_vest() {
        let (bridge, _clock, transport) = started(&[DevicePosition::Vest]);
        bridge.submit("front", LegacyPosition::VestFront, &on(), 100);
        assert_eq!(transport.plays()[0].position, DevicePosition::Vest);
        assert_eq!(transport.plays()[0].duration_ms, 200);
    }

    #[test]
    fn test_vest_halves_keep_separate_lanes() {
        let (bridge, _clock, transport) = started(&[DevicePosition::Vest]);
        let dot = [DotPoint::new(0, 60)];

        bridge.submit("hit", LegacyPosition::VestFront, &dot, 20);
        bridge.submit("hit", LegacyPosition::VestBack, &dot, 20);

        let plays = transport.plays();
        assert_eq!(plays.len(), 2);
        assert!(plays.iter().all(|play| play.position == DevicePosition::Vest));
        assert_eq!(bridge.stats().rate_limited, 0);
    }

    #[test]
    fn test_link_drop_and_restore() {
        let (transport, mut events) = SimulatedTransport::with_events();
        let transport = Arc::new(transport);
        transport.plug(DevicePosition::Head);
        let (bridge, clock) = bridge_with(transport.clone());
        assert!(bridge.start());
        let lifecycle = bridge.lifecycle();
        let deliver = |events: &mut tokio::sync::mpsc::UnboundedReceiver<TransportEvent>| {
            while let Ok(event) = events.try_recv() {
                lifecycle.handle_event(event);
            }
        };
        deliver(&mut events);

        bridge.submit("k", HEAD, &on(), 50);
        assert_eq!(transport.play_count(), 1);

        transport.drop_connection();
        deliver(&mut events);
        clock.advance(40);
        assert!(!bridge.is_active(HEAD));
        bridge.submit("k", HEAD, &on(), 50);
        assert_eq!(transport.play_count(), 1);
        assert_eq!(bridge.stats().degraded, 1);

        transport.restore_connection();
        deliver(&mut events);
        assert!(bridge.is_active(HEAD));
        bridge.submit("k", HEAD, &on(), 50);
        assert_eq!(transport.play_count(), 2);
    }

    #[test]
    fn test_rate_limit_through_bridge() {
        let (bridge, clock, transport) = started(&[DevicePosition::Head]);

        bridge.submit("k", HEAD, &on(), 50);
        clock.advance(10);
        bridge.submit("k", HEAD, &on(), 50);
        assert_eq!(transport.play_count(), 1);

        clock.advance(30);
        bridge.submit("k", HEAD, &on(), 50);
        assert_eq!(transport.play_count(), 2);
        assert_eq!(bridge.stats().rate_limited, 1);
    }

    #[test]
    fn test_idle_suppression_through_bridge() {
        let (bridge, clock, transport) = started(&[DevicePosition::Head]);

        bridge.submit("k", HEAD, &off(), 50);
        assert_eq!(transport.play_count(), 0);

        bridge.submit("k", HEAD, &on(), 50);
        clock.advance(50);
        bridge.submit("k", HEAD, &off(), 50);
        assert_eq!(transport.play_count(), 2);
        assert_eq!(transport.plays()[1].payload, PlayPayload::Dots(vec![]));

        clock.advance(100);
        bridge.submit("k", HEAD, &off(), 50);
        assert_eq!(transport.play_count(), 2);
        assert_eq!(bridge.stats().idle_suppressed, 2);
    }

    #[test]
    fn test_sixty_hz_caller_is_capped() {
        let (bridge, clock, transport) = started(&[DevicePosition::Vest]);
        // One second of 60Hz frames, ~16.7ms apart
        for frame in 0..60u64 {
            clock.set(10_000 + frame * 1000 / 60);
            bridge.submit("stream", VEST, &on(), 16);
        }
        let forwarded = transport.play_count();
        assert!(forwarded <= 29, "forwarded {forwarded}");
        assert!(forwarded >= 20, "forwarded {forwarded}");
    }

    #[test]
    fn test_is_active_cached() {
        let (bridge, clock, transport) = started(&[DevicePosition::Head]);
        let baseline = transport.status_queries();

        assert!(bridge.is_active(HEAD));
        clock.advance(500);
        assert!(bridge.is_active(HEAD));
        assert_eq!(transport.status_queries(), baseline);

        transport.unplug_silently(DevicePosition::Head);
        clock.advance(600);
        assert!(!bridge.is_active(HEAD));
        assert_eq!(transport.status_queries(), baseline + 1);
    }

    #[test]
    fn test_unknown_legacy_code_is_vest() {
        let (bridge, _clock, _transport) = started(&[DevicePosition::Vest]);
        assert!(bridge.is_active(777));
        assert!(!bridge.is_active(HEAD));
    }

    #[test]
    fn test_transport_unavailable_degrades() {
        let transport = Arc::new(SimulatedTransport::new());
        transport.plug(DevicePosition::Vest);
        transport.refuse_connections();
        let (bridge, _clock) = bridge_with(transport.clone());

        assert!(!bridge.start());
        assert!(!bridge.is_active(VEST));
        bridge.submit("k", VEST, &on(), 50);
        bridge.turn_off("k");
        bridge.turn_off_all();
        assert_eq!(transport.play_count(), 0);
        assert!(transport.stopped_keys().is_empty());
        assert_eq!(transport.stop_all_calls(), 0);
        assert_eq!(bridge.stats().degraded, 1);
    }

    #[test]
    fn test_inactive_device_clears_state() {
        let (bridge, clock, transport) = started(&[DevicePosition::Head]);
        let lifecycle = bridge.lifecycle();

        bridge.submit("k", HEAD, &on(), 50);
        assert_eq!(transport.play_count(), 1);

        // Gone without a notification: the play call reports it
        transport.unplug_silently(DevicePosition::Head);
        clock.advance(40);
        bridge.submit("k", HEAD, &on(), 50);
        assert_eq!(transport.play_count(), 1);
        assert_eq!(bridge.stats().device_inactive, 1);

        // Now cached as inactive; zero frames look like a fresh device
        clock.advance(40);
        bridge.submit("k", HEAD, &off(), 50);
        assert_eq!(bridge.stats().idle_suppressed, 1);
        assert!(!bridge.is_active(HEAD));
        assert!(lifecycle.is_transport_connected());
    }

    #[test]
    fn test_disconnect_then_reconnect() {
        let (mut bridge, clock, transport) = started(&[DevicePosition::Head]);
        let lifecycle = bridge.lifecycle();
        let mut host = SimulatedHost::new();
        bridge.pump(&mut host);
        assert!(lifecycle.is_registered(DevicePosition::Head));

        bridge.submit("k", HEAD, &on(), 50);

        transport.unplug_silently(DevicePosition::Head);
        lifecycle.handle_event(TransportEvent::DeviceStatusChanged {
            position: DevicePosition::Head,
            is_connected: false,
            timestamp_ms: clock.now_ms(),
        });
        assert!(!lifecycle.is_registered(DevicePosition::Head));
        assert_eq!(transport.stopped_keys(), vec!["k".to_string()]);

        // Treated as never active
        clock.advance(10);
        bridge.submit("k", HEAD, &off(), 50);
        assert_eq!(bridge.stats().idle_suppressed, 1);

        transport.plug(DevicePosition::Head);
        lifecycle.handle_event(TransportEvent::DeviceStatusChanged {
            position: DevicePosition::Head,
            is_connected: true,
            timestamp_ms: clock.now_ms(),
        });
        bridge.pump(&mut host);
        assert!(lifecycle.is_registered(DevicePosition::Head));
        assert_eq!(host.init_calls(), vec![PositionFamily::Head, PositionFamily::Head]);

        bridge.submit("k", HEAD, &on(), 50);
        assert_eq!(transport.play_count(), 2);
    }

    #[test]
    fn test_path_submission() {
        let (bridge, _clock, transport) = started(&[DevicePosition::ForearmLeft]);
        let points = [PathPoint::new(0.5, 0.5, 40), PathPoint::new(0.1, 0.9, 0)];

        bridge.submit_path("swipe", LegacyPosition::ForearmL, &points, 30);

        let plays = transport.plays();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].position, DevicePosition::ForearmLeft);
        assert_eq!(plays[0].duration_ms, 80);
        assert_eq!(plays[0].payload, PlayPayload::Path(vec![PathPoint::new(0.5, 0.5, 40)]));
    }

    #[test]
    fn test_turn_off_forwards_stops() {
        let (bridge, _clock, transport) = started(&[]);
        bridge.turn_off("rain");
        bridge.turn_off_all();
        assert_eq!(transport.stopped_keys(), vec!["rain".to_string()]);
        assert_eq!(transport.stop_all_calls(), 1);
    }

    #[test]
    fn test_startup_registers_present_devices() {
        let (mut bridge, _clock, _transport) =
            started(&[DevicePosition::Vest, DevicePosition::FootRight]);
        let mut host = SimulatedHost::new();

        assert_eq!(bridge.pump(&mut host), 2);
        assert_eq!(
            bridge.lifecycle().registered(),
            vec![DevicePosition::Vest, DevicePosition::FootRight]
        );
        assert_eq!(bridge.pump(&mut host), 0);
    }

    #[test]
    fn test_shutdown() {
        let (bridge, _clock, transport) = started(&[DevicePosition::Vest]);
        bridge.shutdown();
        assert_eq!(transport.stop_all_calls(), 1);
        assert!(!bridge.is_active(VEST));
    }

    #[test]
    fn test_remote_point_survives_local_zero_sampling() {
        let (bridge, clock, _transport) = started(&[]);
        let mut point = HapticPoint::new(11, DevicePosition::Vest, Ownership::RemoteUser("peer".into()));
        point.replica = HapticValues::new(0.7, 0.0, 0.0, 0.4);

        assert_eq!(bridge.route_point(&mut point, false), RouteDirection::Inbound);
        for _ in 0..10 {
            clock.advance(20);
            assert_eq!(bridge.sample_point(11, HapticValues::ZERO), point.replica);
        }
        clock.advance(1);
        assert_eq!(bridge.sample_point(11, HapticValues::ZERO), HapticValues::ZERO);
    }

    #[tokio::test]
    async fn test_notifications_from_background_task() {
        let (transport, mut events) = SimulatedTransport::with_events();
        let transport = Arc::new(transport);
        let (mut bridge, _clock) = bridge_with(transport.clone());
        assert!(bridge.start());

        let lifecycle = bridge.lifecycle();
        let listener = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                lifecycle.handle_event(event);
            }
        });

        transport.plug(DevicePosition::Head);
        transport.plug(DevicePosition::Head);
        transport.plug(DevicePosition::HandLeft);
        transport.close_events();
        listener.await.unwrap();

        let mut host = SimulatedHost::new();
        bridge.pump(&mut host);
        assert_eq!(
            host.init_calls(),
            vec![PositionFamily::Head, PositionFamily::Hand { is_left: true }]
        );
        assert!(bridge.is_active(HEAD));
    }
}
