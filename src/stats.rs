//! Adapter-owned statistics.
//!
//! Mirrors the Python driver's `self.stats = {'retries': 0, 'checksum_errors':
//! 0, 'unneeded_retry': 0, 'usb_busy': 0}` dict, but as a struct owned by the
//! `Adapter` rather than a free-floating dict attached to an object that also
//! happens to be an `Ftdi` subclass. Counters are monotone for the lifetime
//! of the adapter.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    pub retries: u64,
    pub checksum_errors: u64,
    pub unneeded_retry: u64,
    pub usb_busy: u64,
}

impl AdapterStats {
    pub fn new() -> Self {
        Self::default()
    }
}
