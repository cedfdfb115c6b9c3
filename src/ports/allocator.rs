//! Host port allocation over a closed range.
//!
//! The store's set of recorded ports is merged with an in-process reservation
//! set, so two creations racing inside one process can never pick the same
//! port before either has persisted its record.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::PlatformError;

/// Default SSH host port range.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 8000..=9000;

/// Returned when every port in the range is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No available ports in range {start}-{end}")]
pub struct PortsExhausted {
    pub start: u16,
    pub end: u16,
}

impl From<PortsExhausted> for PlatformError {
    fn from(err: PortsExhausted) -> Self {
        PlatformError::PortsExhausted {
            start: err.start,
            end: err.end,
        }
    }
}

/// Assigns host ports from a bounded range.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    reserved: Arc<Mutex<HashSet<u16>>>,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_RANGE)
    }
}

impl PortAllocator {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range,
            reserved: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn range(&self) -> RangeInclusive<u16> {
        self.range.clone()
    }

    /// Number of ports the range can hand out.
    pub fn capacity(&self) -> usize {
        self.range.clone().count()
    }

    /// Picks the lowest port that is neither in `in_use` nor reserved, and
    /// reserves it until the returned guard is dropped.
    pub fn allocate(&self, in_use: &HashSet<u16>) -> Result<PortReservation, PortsExhausted> {
        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());

        let port = self
            .range
            .clone()
            .find(|port| !in_use.contains(port) && !reserved.contains(port))
            .ok_or(PortsExhausted {
                start: *self.range.start(),
                end: *self.range.end(),
            })?;

        reserved.insert(port);
        debug!(port, "Reserved host port");

        Ok(PortReservation {
            port,
            reserved: Arc::clone(&self.reserved),
        })
    }

    /// Ports currently held by live reservations.
    pub fn reserved_count(&self) -> usize {
        self.reserved.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// An in-process claim on a host port.
///
/// Hold it until the record carrying the port is persisted; dropping it
/// releases the claim.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
    reserved: Arc<Mutex<HashSet<u16>>>,
}

impl PortReservation {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());
        reserved.remove(&self.port);
    }
}
