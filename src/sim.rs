//! In-memory transport and host
//!
//! [`SimulatedTransport`] behaves like the device service: devices can be
//! plugged and unplugged, the link can drop, and every call is recorded.
//! Notifications go out on a tokio channel, the same way a real transport
//! delivers them from its background context. [`SimulatedHost`] records host
//! initializer calls.
//!
//! Used by the daemon's demo mode, the test suites and the benchmarks.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::clock::{Clock, SystemClock};
use crate::host::{DeviceInitializer, InitError, InitOutcome};
use crate::position::{DevicePosition, PositionFamily};
use crate::transport::{DotPoint, HapticTransport, PathPoint, TransportError, TransportEvent};

// ============================================================================
// Transport
// ============================================================================

/// Motor data of a recorded play call
#[derive(Debug, Clone, PartialEq)]
pub enum PlayPayload {
    Dots(Vec<DotPoint>),
    Path(Vec<PathPoint>),
}

/// One recorded play call
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRecord {
    pub key: String,
    pub duration_ms: u32,
    pub position: DevicePosition,
    pub payload: PlayPayload,
}

#[derive(Debug)]
struct SimState {
    connected: bool,
    accept_connect: bool,
    devices: HashSet<DevicePosition>,
    plays: Vec<PlayRecord>,
    stopped: Vec<String>,
    stop_all_calls: usize,
}

/// Simulated haptic device service
#[derive(Debug)]
pub struct SimulatedTransport {
    clock: SystemClock,
    state: Mutex<SimState>,
    status_queries: AtomicUsize,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

impl SimulatedTransport {
    /// Transport with a live link and no event channel
    pub fn new() -> Self {
        Self {
            clock: SystemClock::new(),
            state: Mutex::new(SimState {
                connected: true,
                accept_connect: true,
                devices: HashSet::new(),
                plays: Vec::new(),
                stopped: Vec::new(),
                stop_all_calls: 0,
            }),
            status_queries: AtomicUsize::new(0),
            events: Mutex::new(None),
        }
    }

    /// Transport that publishes notifications on the returned receiver
    pub fn with_events() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self::new();
        *transport.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        (transport, rx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TransportEvent) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = events.as_ref() {
            if tx.send(event).is_err() {
                tracing::trace!("Simulated transport event dropped, no listener");
            }
        }
    }

    /// Close the notification channel so listeners see end-of-stream
    pub fn close_events(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Make subsequent `connect` calls fail
    pub fn refuse_connections(&self) {
        let mut state = self.lock();
        state.accept_connect = false;
        state.connected = false;
    }

    /// Plug a device in and notify
    pub fn plug(&self, position: DevicePosition) {
        self.lock().devices.insert(position);
        self.emit(TransportEvent::DeviceStatusChanged {
            position,
            is_connected: true,
            timestamp_ms: self.clock.now_ms(),
        });
    }

    /// Unplug a device and notify
    pub fn unplug(&self, position: DevicePosition) {
        self.lock().devices.remove(&position);
        self.emit(TransportEvent::DeviceStatusChanged {
            position,
            is_connected: false,
            timestamp_ms: self.clock.now_ms(),
        });
    }

    /// Unplug a device without any notification
    pub fn unplug_silently(&self, position: DevicePosition) {
        self.lock().devices.remove(&position);
    }

    /// Drop the service link and notify
    pub fn drop_connection(&self) {
        self.lock().connected = false;
        self.emit(TransportEvent::ConnectionLost);
    }

    /// Restore the service link and notify
    pub fn restore_connection(&self) {
        self.lock().connected = true;
        self.emit(TransportEvent::ConnectionEstablished);
    }

    pub fn plays(&self) -> Vec<PlayRecord> {
        self.lock().plays.clone()
    }

    pub fn play_count(&self) -> usize {
        self.lock().plays.len()
    }

    pub fn stopped_keys(&self) -> Vec<String> {
        self.lock().stopped.clone()
    }

    pub fn stop_all_calls(&self) -> usize {
        self.lock().stop_all_calls
    }

    /// Number of `is_device_connected` calls so far
    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    fn record_play(
        &self,
        key: &str,
        duration_ms: u32,
        position: DevicePosition,
        payload: PlayPayload,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if !state.devices.contains(&position) {
            return Err(TransportError::DeviceNotConnected(position));
        }
        state.plays.push(PlayRecord {
            key: key.to_string(),
            duration_ms,
            position,
            payload,
        });
        Ok(())
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HapticTransport for SimulatedTransport {
    fn connect(
        &self,
        app_id: &str,
        app_name: &str,
        auto_reconnect: bool,
        max_retries: u32,
    ) -> Result<bool, TransportError> {
        let mut state = self.lock();
        tracing::debug!(app_id, app_name, auto_reconnect, max_retries, "Simulated connect");
        state.connected = state.accept_connect;
        Ok(state.connected)
    }

    fn is_device_connected(&self, position: DevicePosition) -> bool {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        state.connected && state.devices.contains(&position)
    }

    fn connected_device_count(&self) -> usize {
        let state = self.lock();
        if state.connected {
            state.devices.len()
        } else {
            0
        }
    }

    fn play(
        &self,
        key: &str,
        duration_ms: u32,
        position: DevicePosition,
        dots: &[DotPoint],
    ) -> Result<(), TransportError> {
        self.record_play(key, duration_ms, position, PlayPayload::Dots(dots.to_vec()))
    }

    fn play_path(
        &self,
        key: &str,
        duration_ms: u32,
        position: DevicePosition,
        points: &[PathPoint],
    ) -> Result<(), TransportError> {
        self.record_play(key, duration_ms, position, PlayPayload::Path(points.to_vec()))
    }

    fn stop(&self, key: &str) -> Result<(), TransportError> {
        self.lock().stopped.push(key.to_string());
        Ok(())
    }

    fn stop_all(&self) -> Result<(), TransportError> {
        self.lock().stop_all_calls += 1;
        Ok(())
    }

    fn disconnect(&self) -> Result<bool, TransportError> {
        let mut state = self.lock();
        let was_connected = state.connected;
        state.connected = false;
        Ok(was_connected)
    }
}

// ============================================================================
// Host
// ============================================================================

/// Host double recording initializer calls
#[derive(Debug, Default)]
pub struct SimulatedHost {
    calls: Vec<PositionFamily>,
    initialized: HashSet<PositionFamily>,
    failing: HashSet<PositionFamily>,
    refreshes: usize,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend points for a family already exist
    pub fn mark_initialized(&mut self, family: PositionFamily) {
        self.initialized.insert(family);
    }

    /// Make the initializer for a family fail
    pub fn fail_family(&mut self, family: PositionFamily) {
        self.failing.insert(family);
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    /// Every initializer call, in order
    pub fn init_calls(&self) -> Vec<PositionFamily> {
        self.calls.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes
    }

    fn init(&mut self, family: PositionFamily) -> Result<InitOutcome, InitError> {
        self.calls.push(family);
        if self.failing.contains(&family) {
            return Err(InitError::Failed(format!("{:?} rejected by host", family)));
        }
        if self.initialized.insert(family) {
            Ok(InitOutcome::Initialized)
        } else {
            Ok(InitOutcome::AlreadyInitialized)
        }
    }
}

impl DeviceInitializer for SimulatedHost {
    fn initialize_head(&mut self) -> Result<InitOutcome, InitError> {
        self.init(PositionFamily::Head)
    }

    fn initialize_vest(&mut self) -> Result<InitOutcome, InitError> {
        self.init(PositionFamily::Vest)
    }

    fn initialize_forearm(&mut self, is_left: bool) -> Result<InitOutcome, InitError> {
        self.init(PositionFamily::Forearm { is_left })
    }

    fn initialize_foot(&mut self, is_left: bool) -> Result<InitOutcome, InitError> {
        self.init(PositionFamily::Foot { is_left })
    }

    fn initialize_hand(&mut self, is_left: bool) -> Result<InitOutcome, InitError> {
        self.init(PositionFamily::Hand { is_left })
    }

    fn initialize_glove(&mut self, is_left: bool) -> Result<InitOutcome, InitError> {
        self.init(PositionFamily::Glove { is_left })
    }

    fn refresh_point_lookup(&mut self) {
        self.refreshes += 1;
    }
}
