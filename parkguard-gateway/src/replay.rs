//! Per-device replay protection: the highest counter accepted so far
//!
//! A device is either unseen (no record) or tracked with the last accepted
//! counter. Only acceptance moves a record forward; rejections leave it as is.
//! A 32 bit counter that wraps around is rejected like any other stale value,
//! and only an explicit [`ReplayGuard::forget`] (re-pairing) clears it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Counter state kept for one device identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    pub last_accepted_counter: u32,
    pub last_accepted_at: Instant,
}

/// How a counter was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// No record existed; the device is now tracked
    FirstContact,
    /// The counter moved forward from `previous`
    Advanced { previous: u32 },
}

/// Counter is not strictly above the last accepted one. Exact repeats and
/// out-of-order older values are not distinguished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("counter {counter} is not above last accepted counter {last_accepted}")]
pub struct ReplayError {
    pub counter: u32,
    pub last_accepted: u32,
}

/// Owned replay state, one per gateway instance
#[derive(Debug, Default)]
pub struct ReplayGuard {
    records: Mutex<HashMap<String, DeviceRecord>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `counter` for `device` iff the device is unseen or the counter is
    /// strictly greater than the stored one
    pub fn try_accept(&self, device: &str, counter: u32) -> Result<Acceptance, ReplayError> {
        self.try_accept_at(device, counter, Instant::now())
    }

    pub fn try_accept_at(
        &self,
        device: &str,
        counter: u32,
        now: Instant,
    ) -> Result<Acceptance, ReplayError> {
        let mut records = self.records();

        let Some(record) = records.get_mut(device) else {
            records.insert(
                device.to_string(),
                DeviceRecord {
                    last_accepted_counter: counter,
                    last_accepted_at: now,
                },
            );
            debug!(device, counter, "tracking new device");
            return Ok(Acceptance::FirstContact);
        };

        if counter <= record.last_accepted_counter {
            return Err(ReplayError {
                counter,
                last_accepted: record.last_accepted_counter,
            });
        }

        let previous = record.last_accepted_counter;
        record.last_accepted_counter = counter;
        record.last_accepted_at = now;
        Ok(Acceptance::Advanced { previous })
    }

    pub fn last_accepted(&self, device: &str) -> Option<u32> {
        self.records()
            .get(device)
            .map(|record| record.last_accepted_counter)
    }

    pub fn record(&self, device: &str) -> Option<DeviceRecord> {
        self.records().get(device).copied()
    }

    /// Out-of-band re-pairing: drop the record so the next authentic packet is
    /// accepted as first contact
    pub fn forget(&self, device: &str) -> Option<DeviceRecord> {
        self.records().remove(device)
    }

    /// Drop records whose last acceptance is older than `max_idle`. Returns the
    /// number of records removed.
    pub fn expire_idle(&self, max_idle: Duration, now: Instant) -> usize {
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| now.saturating_duration_since(record.last_accepted_at) <= max_idle);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    // A panic while holding the lock cannot leave a record half-written, so a
    // poisoned map is still consistent.
    fn records(&self) -> MutexGuard<'_, HashMap<String, DeviceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
