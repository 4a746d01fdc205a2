//! Host engine contract
//!
//! The host owns the actuator point objects and they are not thread-safe.
//! The bridge therefore never touches them from the transport's notification
//! context: registration work is queued as [`RegistrationTask`] values and
//! executed when the host's main loop drains the [`MainLoopReceiver`].
//!
//! Hosts expose one initialization entry point per position family, often
//! without public hooks for runtime registration. [`DeviceInitializer`] is the
//! capability an adapter over the host implements; the bridge depends on
//! nothing else.

use std::fmt;

use tokio::sync::mpsc;

use crate::position::{DevicePosition, PositionFamily};

// ============================================================================
// Device initialization capability
// ============================================================================

/// Successful result of a host initialization call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Points were created by this call
    Initialized,
    /// Points already existed; treated as success
    AlreadyInitialized,
}

/// Per-family actuator point creation, implemented over the host
pub trait DeviceInitializer {
    fn initialize_head(&mut self) -> Result<InitOutcome, InitError>;

    fn initialize_vest(&mut self) -> Result<InitOutcome, InitError>;

    fn initialize_forearm(&mut self, is_left: bool) -> Result<InitOutcome, InitError>;

    fn initialize_foot(&mut self, is_left: bool) -> Result<InitOutcome, InitError>;

    fn initialize_hand(&mut self, is_left: bool) -> Result<InitOutcome, InitError>;

    fn initialize_glove(&mut self, is_left: bool) -> Result<InitOutcome, InitError>;

    /// Rebuild any host-side point lookup so consumers see new points
    fn refresh_point_lookup(&mut self) {}
}

/// Dispatch to the initializer for a position family
pub fn initialize_family(
    initializer: &mut dyn DeviceInitializer,
    family: PositionFamily,
) -> Result<InitOutcome, InitError> {
    match family {
        PositionFamily::Head => initializer.initialize_head(),
        PositionFamily::Vest => initializer.initialize_vest(),
        PositionFamily::Forearm { is_left } => initializer.initialize_forearm(is_left),
        PositionFamily::Foot { is_left } => initializer.initialize_foot(is_left),
        PositionFamily::Hand { is_left } => initializer.initialize_hand(is_left),
        PositionFamily::Glove { is_left } => initializer.initialize_glove(is_left),
    }
}

// ============================================================================
// Main-loop work queue
// ============================================================================

/// Registration work to run on the host's main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationTask {
    pub position: DevicePosition,
    pub queued_at_ms: u64,
}

/// Create a main-loop work queue
pub fn main_loop_queue() -> (MainLoopSender, MainLoopReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MainLoopSender { tx }, MainLoopReceiver { rx })
}

/// Enqueue side, usable from any thread
#[derive(Debug, Clone)]
pub struct MainLoopSender {
    tx: mpsc::UnboundedSender<RegistrationTask>,
}

impl MainLoopSender {
    /// Queue a task. Fails only when the main loop has gone away.
    pub fn enqueue(&self, task: RegistrationTask) -> Result<(), RegistrationTask> {
        self.tx.send(task).map_err(|e| e.0)
    }
}

/// Drain side, owned by the main loop
#[derive(Debug)]
pub struct MainLoopReceiver {
    rx: mpsc::UnboundedReceiver<RegistrationTask>,
}

impl MainLoopReceiver {
    /// Take every task queued so far without waiting
    pub fn drain(&mut self) -> Vec<RegistrationTask> {
        let mut tasks = Vec::new();
        while let Ok(task) = self.rx.try_recv() {
            tasks.push(task);
        }
        tasks
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Host registration error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The host does not expose an initializer for this family
    EntryPointMissing(&'static str),
    /// The initializer ran and failed
    Failed(String),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::EntryPointMissing(name) => {
                write!(f, "Host initializer '{}' not available", name)
            }
            InitError::Failed(msg) => write!(f, "Host initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for InitError {}
