//! Short-TTL cache of per-device "is active" answers
//!
//! Legacy callers ask whether a device is active every frame. The cache
//! bounds how often that question reaches the transport; a slightly stale
//! answer is acceptable.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::position::DevicePosition;
use crate::transport::HapticTransport;

/// Default time-to-live for cached answers (milliseconds)
pub const DEFAULT_TTL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    is_active: bool,
    observed_at_ms: u64,
}

/// Per-device TTL cache
#[derive(Debug)]
pub struct StatusCache {
    ttl_ms: u64,
    entries: Mutex<HashMap<DevicePosition, CacheEntry>>,
}

impl StatusCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached answer if it is still authoritative at `now_ms`
    pub fn get(&self, position: DevicePosition, now_ms: u64) -> Option<bool> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&position)
            .filter(|entry| now_ms.saturating_sub(entry.observed_at_ms) <= self.ttl_ms)
            .map(|entry| entry.is_active)
    }

    /// Record a fresh observation
    pub fn store(&self, position: DevicePosition, is_active: bool, now_ms: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            position,
            CacheEntry {
                is_active,
                observed_at_ms: now_ms,
            },
        );
    }

    /// Answer from cache, querying the transport on a miss.
    ///
    /// The transport is queried without holding the lock.
    pub fn is_active(
        &self,
        position: DevicePosition,
        transport: &dyn HapticTransport,
        now_ms: u64,
    ) -> bool {
        if let Some(cached) = self.get(position, now_ms) {
            return cached;
        }

        let is_active = transport.is_device_connected(position);
        tracing::trace!(position = %position, is_active, "Status cache refreshed");
        self.store(position, is_active, now_ms);
        is_active
    }

    /// Drop a single device's entry
    pub fn invalidate(&self, position: DevicePosition) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&position);
    }

    /// Drop every entry (transport connection lost)
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.is_empty() {
            tracing::debug!(entries = entries.len(), "Status cache cleared");
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MS)
    }
}
