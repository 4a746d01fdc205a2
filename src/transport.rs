//! Haptic device transport contract
//!
//! The transport is the modern, event-driven device service. The bridge only
//! needs the narrow surface below; the wire protocol behind it is opaque.
//!
//! ## Calls
//! - `connect(app_id, app_name, auto_reconnect, max_retries)`
//! - `is_device_connected(position)` / `connected_device_count()`
//! - `play(key, duration_ms, position, dots)` and the path-point variant
//! - `stop(key)` / `stop_all()` / `disconnect()`
//!
//! ## Events
//! Delivered asynchronously as [`TransportEvent`] on a background context.

use std::fmt;

use crate::position::DevicePosition;

// ============================================================================
// Motor data
// ============================================================================

/// Highest intensity accepted by the transport
pub const MAX_DOT_INTENSITY: u8 = 100;

/// One motor of a device, addressed by index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotPoint {
    pub index: u16,
    /// Intensity 0-100
    pub intensity: u8,
}

impl DotPoint {
    pub fn new(index: u16, intensity: u8) -> Self {
        Self {
            index,
            intensity: intensity.min(MAX_DOT_INTENSITY),
        }
    }

    /// Convert a host activation level (0.0-1.0) into a motor intensity
    pub fn from_activation(index: u16, activation: f32) -> Self {
        let scaled = (activation.clamp(0.0, 1.0) * MAX_DOT_INTENSITY as f32).round();
        Self::new(index, scaled as u8)
    }

    pub fn is_active(&self) -> bool {
        self.intensity > 0
    }
}

/// A point on a device surface in normalized coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    pub x: f32,
    pub y: f32,
    /// Intensity 0-100
    pub intensity: u8,
}

impl PathPoint {
    pub fn new(x: f32, y: f32, intensity: u8) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
            intensity: intensity.min(MAX_DOT_INTENSITY),
        }
    }

    pub fn is_active(&self) -> bool {
        self.intensity > 0
    }
}

// ============================================================================
// Connection status and events
// ============================================================================

/// Transport-level connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
        }
    }
}

/// Asynchronous notification from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A device was plugged in or removed
    DeviceStatusChanged {
        position: DevicePosition,
        is_connected: bool,
        timestamp_ms: u64,
    },
    /// Link to the device service is up
    ConnectionEstablished,
    /// Link to the device service dropped
    ConnectionLost,
    /// Generic status transition
    StatusChanged {
        previous: ConnectionStatus,
        new: ConnectionStatus,
    },
}

// ============================================================================
// Transport trait
// ============================================================================

/// Modern haptic device transport
///
/// Implementations must be callable from any thread. Calls are expected to be
/// fire-and-forget; none of them should block on device I/O for long.
pub trait HapticTransport: Send + Sync {
    /// Open the link to the device service
    fn connect(
        &self,
        app_id: &str,
        app_name: &str,
        auto_reconnect: bool,
        max_retries: u32,
    ) -> Result<bool, TransportError>;

    fn is_device_connected(&self, position: DevicePosition) -> bool;

    fn connected_device_count(&self) -> usize;

    /// Play motor intensities on a device under a pattern key
    fn play(
        &self,
        key: &str,
        duration_ms: u32,
        position: DevicePosition,
        dots: &[DotPoint],
    ) -> Result<(), TransportError>;

    /// Play path points on a device under a pattern key
    fn play_path(
        &self,
        key: &str,
        duration_ms: u32,
        position: DevicePosition,
        points: &[PathPoint],
    ) -> Result<(), TransportError>;

    fn stop(&self, key: &str) -> Result<(), TransportError>;

    fn stop_all(&self) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<bool, TransportError>;
}

// ============================================================================
// Error Types
// ============================================================================

/// Transport error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Link to the device service is not up
    NotConnected,
    /// The addressed device is not connected
    DeviceNotConnected(DevicePosition),
    /// Call rejected by the device service
    Rejected(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "Transport is not connected"),
            TransportError::DeviceNotConnected(position) => {
                write!(f, "Device {} is not connected", position)
            }
            TransportError::Rejected(msg) => write!(f, "Transport rejected call: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}
