//! Adapter configuration.
//!
//! Immutable once the `Adapter` is constructed, same as the Python
//! `KlineAdapter.__init__` keyword arguments.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub baud_rate: u32,
    pub retries: u32,
    /// Generic per-operation timeout.
    pub timeout: Duration,
    /// K-Line liveness-probe total timeout.
    pub kline_timeout: Duration,
    /// K-Line liveness-probe inter-byte wait, after writing the test bytes
    /// and before reading the echo.
    pub kline_wait: Duration,
    /// Number of `0xFF` test bytes written by the liveness probe.
    pub kline_testbytes: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            baud_rate: 10_400,
            retries: 1,
            timeout: Duration::from_millis(100),
            kline_timeout: Duration::from_millis(100),
            kline_wait: Duration::from_millis(2),
            kline_testbytes: 1,
        }
    }
}
