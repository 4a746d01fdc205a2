//! Device hot-plug lifecycle
//!
//! Reconciles asynchronous transport notifications with the bridge's own
//! state. Per device:
//!
//! ```text
//! Unknown -> Disconnected -> Connected -> Registered -> Disconnected -> ...
//! ```
//!
//! Notification handlers run on the transport's background context and only
//! touch bridge-owned maps. Host registration is queued for the main loop and
//! runs in [`DeviceLifecycle::run_registration`].
//!
//! Registration is at most once per connection: a device that is registered,
//! or has a registration queued, is never queued again. Host points are never
//! removed on disconnect since hosts offer no removal entry point.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::clock::SharedClock;
use crate::host::{initialize_family, DeviceInitializer, InitOutcome, MainLoopSender, RegistrationTask};
use crate::limiter::SubmissionLimiter;
use crate::position::DevicePosition;
use crate::status_cache::StatusCache;
use crate::transport::{ConnectionStatus, HapticTransport, TransportEvent};

/// Last known connection state of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub position: DevicePosition,
    pub connected: bool,
    pub last_changed_at_ms: u64,
}

/// Lifecycle stage of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No notification seen yet
    Unknown,
    Disconnected,
    /// Connected, host points not (yet) created
    Connected,
    /// Connected with host points created
    Registered,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Unknown => write!(f, "unknown"),
            DeviceState::Disconnected => write!(f, "disconnected"),
            DeviceState::Connected => write!(f, "connected"),
            DeviceState::Registered => write!(f, "registered"),
        }
    }
}

#[derive(Debug, Default)]
struct LifecycleState {
    statuses: HashMap<DevicePosition, DeviceStatus>,
    registered: HashSet<DevicePosition>,
    /// Registration queued but not yet run
    pending: HashSet<DevicePosition>,
    transport_status: ConnectionStatus,
}

impl LifecycleState {
    fn is_connected(&self, position: DevicePosition) -> bool {
        self.statuses
            .get(&position)
            .map(|s| s.connected)
            .unwrap_or(false)
    }
}

/// Hot-plug state machine shared between the notification context and the
/// main loop
pub struct DeviceLifecycle {
    hot_plug_registration: bool,
    clock: SharedClock,
    transport: Arc<dyn HapticTransport>,
    limiter: Arc<SubmissionLimiter>,
    status_cache: Arc<StatusCache>,
    queue: MainLoopSender,
    state: Mutex<LifecycleState>,
}

impl DeviceLifecycle {
    pub fn new(
        hot_plug_registration: bool,
        clock: SharedClock,
        transport: Arc<dyn HapticTransport>,
        limiter: Arc<SubmissionLimiter>,
        status_cache: Arc<StatusCache>,
        queue: MainLoopSender,
    ) -> Self {
        Self {
            hot_plug_registration,
            clock,
            transport,
            limiter,
            status_cache,
            queue,
            state: Mutex::new(LifecycleState::default()),
        }
    }

    // ------------------------------------------------------------------------
    // Notification context
    // ------------------------------------------------------------------------

    /// Apply one transport notification. Safe to call from any thread.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::DeviceStatusChanged {
                position,
                is_connected: true,
                timestamp_ms,
            } => self.on_device_connected(position, timestamp_ms),
            TransportEvent::DeviceStatusChanged {
                position,
                is_connected: false,
                timestamp_ms,
            } => self.on_device_disconnected(position, timestamp_ms),
            TransportEvent::ConnectionEstablished => {
                self.set_transport_status(ConnectionStatus::Connected);
                tracing::info!("Transport connection established");
            }
            TransportEvent::ConnectionLost => {
                self.set_transport_status(ConnectionStatus::Disconnected);
                self.status_cache.clear();
                tracing::warn!("Transport connection lost, device status cache cleared");
            }
            TransportEvent::StatusChanged { previous, new } => {
                tracing::debug!(previous = %previous, new = %new, "Transport status changed");
                self.set_transport_status(new);
                if previous == ConnectionStatus::Connected && new != ConnectionStatus::Connected {
                    self.status_cache.clear();
                }
            }
        }
    }

    fn on_device_connected(&self, position: DevicePosition, timestamp_ms: u64) {
        let now = self.clock.now_ms();

        let should_queue = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.statuses.insert(
                position,
                DeviceStatus {
                    position,
                    connected: true,
                    last_changed_at_ms: timestamp_ms,
                },
            );
            // Under the state lock: cache and status change together
            self.status_cache.store(position, true, now);
            let queue = self.hot_plug_registration
                && !state.registered.contains(&position)
                && !state.pending.contains(&position);
            if queue {
                state.pending.insert(position);
            }
            queue
        };

        // Fresh connection: the next frame must not look like a repeat
        self.limiter.reset_device(position);

        tracing::info!(position = %position, "Haptic device connected");

        if should_queue {
            let task = RegistrationTask {
                position,
                queued_at_ms: now,
            };
            if self.queue.enqueue(task).is_err() {
                tracing::warn!(position = %position, "Main loop gone, registration not queued");
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                state.pending.remove(&position);
            }
        }
    }

    fn on_device_disconnected(&self, position: DevicePosition, timestamp_ms: u64) {
        let now = self.clock.now_ms();

        let was_registered = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.statuses.insert(
                position,
                DeviceStatus {
                    position,
                    connected: false,
                    last_changed_at_ms: timestamp_ms,
                },
            );
            self.status_cache.store(position, false, now);
            state.pending.remove(&position);
            state.registered.remove(&position)
        };

        let keys = self.limiter.reset_device(position);

        tracing::info!(
            position = %position,
            was_registered,
            active_keys = keys.len(),
            "Haptic device disconnected"
        );

        for key in keys {
            if let Err(e) = self.transport.stop(&key) {
                tracing::debug!(key = %key, error = %e, "Failed to stop pattern on disconnect");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Main-loop context
    // ------------------------------------------------------------------------

    /// Run a queued registration against the host.
    ///
    /// Returns true if the device is registered afterwards. A failure leaves
    /// the device unregistered until its next connect notification.
    pub fn run_registration(
        &self,
        task: RegistrationTask,
        initializer: &mut dyn DeviceInitializer,
    ) -> bool {
        let position = task.position;

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.pending.remove(&position);
            if state.registered.contains(&position) {
                return true;
            }
            if !state.is_connected(position) {
                tracing::debug!(position = %position, "Device left before registration ran");
                return false;
            }
        }

        match initialize_family(initializer, position.family()) {
            Ok(outcome) => {
                let registered = {
                    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                    // A disconnect may have raced the host call
                    if state.is_connected(position) {
                        state.registered.insert(position);
                        true
                    } else {
                        false
                    }
                };

                if registered {
                    initializer.refresh_point_lookup();
                    tracing::info!(
                        position = %position,
                        already_initialized = outcome == InitOutcome::AlreadyInitialized,
                        queued_for_ms = self.clock.now_ms().saturating_sub(task.queued_at_ms),
                        "Haptic device registered with host"
                    );
                }
                registered
            }
            Err(e) => {
                tracing::warn!(
                    position = %position,
                    error = %e,
                    "Host registration failed, will retry on next connect"
                );
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn set_transport_status(&self, status: ConnectionStatus) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.transport_status = status;
    }

    pub fn transport_status(&self) -> ConnectionStatus {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.transport_status
    }

    pub fn is_transport_connected(&self) -> bool {
        self.transport_status() == ConnectionStatus::Connected
    }

    pub fn is_registered(&self, position: DevicePosition) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.registered.contains(&position)
    }

    /// Registered devices in transport order
    pub fn registered(&self) -> Vec<DevicePosition> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut positions: Vec<_> = state.registered.iter().copied().collect();
        positions.sort();
        positions
    }

    pub fn device_status(&self, position: DevicePosition) -> Option<DeviceStatus> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.statuses.get(&position).copied()
    }

    pub fn device_state(&self, position: DevicePosition) -> DeviceState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.statuses.get(&position) {
            None => DeviceState::Unknown,
            Some(status) if !status.connected => DeviceState::Disconnected,
            Some(_) if state.registered.contains(&position) => DeviceState::Registered,
            Some(_) => DeviceState::Connected,
        }
    }
}
