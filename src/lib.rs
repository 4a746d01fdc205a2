//! Haptic Bridge Daemon Library
//!
//! Adapts a per-frame legacy haptic API to an event-driven device transport.
//! Public API for testing and integration.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod host;
pub mod lifecycle;
pub mod limiter;
pub mod position;
pub mod router;
pub mod sim;
pub mod stats;
pub mod status_cache;
pub mod transport;

/// Re-export commonly used types
pub use bridge::HapticBridge;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, ConfigError};
pub use host::{DeviceInitializer, InitError, InitOutcome};
pub use lifecycle::{DeviceLifecycle, DeviceState};
pub use limiter::{Admission, SubmissionLimiter};
pub use position::{DevicePosition, LegacyPosition, PositionFamily};
pub use router::{HapticPoint, HapticValues, Ownership, RouteDirection};
pub use stats::StatsSnapshot;
pub use transport::{DotPoint, HapticTransport, PathPoint, TransportError, TransportEvent};
