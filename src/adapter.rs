//! Layer 1 — timed, retry-free byte I/O plus the K-Line liveness probe.
//!
//! Grounded on `KlineAdapter` (`original_source/eculib/base.py`) and the
//! teacher's `FtdiConnection` (`ftdi.rs`): owns the device handle and the
//! stats bag, exposes a narrow I/O surface, and publishes a stats snapshot
//! on every counter mutation instead of leaving a bare dict lying around.

use std::time::Instant;

use tracing::{trace, warn};

use crate::config::AdapterConfig;
use crate::device::RawDevice;
use crate::error::{DriverError, DriverResult};
use crate::event::{Event, Observer};
use crate::stats::AdapterStats;

pub struct Adapter<D: RawDevice, O: Observer> {
    device: D,
    observer: O,
    config: AdapterConfig,
    stats: AdapterStats,
}

impl<D: RawDevice, O: Observer> Adapter<D, O> {
    pub fn new(device: D, observer: O, config: AdapterConfig) -> Self {
        let adapter = Self {
            device,
            observer,
            config,
            stats: AdapterStats::new(),
        };
        adapter.publish_stats();
        adapter
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats
    }

    /// Effective retry budget. `detect_state`/`probe_tables` temporarily
    /// zero this out; exposed so the ECU layer can restore it afterwards.
    pub fn retries(&self) -> u32 {
        self.config.retries
    }

    pub fn set_retries(&mut self, retries: u32) {
        self.config.retries = retries;
    }

    /// Publishes the current stats snapshot. Called by `Transport` after
    /// every `send_command` retry loop, same as the Python
    /// `dispatcher.send(signal='ecu.stats', ...)` at the end of
    /// `send_command`.
    pub(crate) fn notify_stats(&self) {
        self.publish_stats();
    }

    pub(crate) fn bump_retries_stat(&mut self) {
        self.stats.retries += 1;
    }

    pub(crate) fn bump_checksum_error_stat(&mut self) {
        self.stats.checksum_errors += 1;
    }

    pub(crate) fn bump_unneeded_retry_stat(&mut self) {
        self.stats.unneeded_retry += 1;
    }

    /// Publishes a hex-dump of an outgoing/incoming frame, same as the
    /// Python `dispatcher.send(signal='ecu.debug', ...)` calls bracketing
    /// `send`/`send_command`'s wire traffic.
    pub(crate) fn notify_debug(&self, msg: String) {
        self.observer.notify(&Event::Debug(msg));
    }

    fn publish_stats(&self) {
        self.observer.notify(&Event::Stats(self.stats));
    }

    /// Classifies a `DriverError`: bus-busy bumps the counter and is
    /// retried by the caller; anything else is published on the event bus
    /// and propagated so the caller aborts the operation.
    fn classify(&mut self, err: DriverError) -> DriverError {
        match &err {
            DriverError::UsbBusy => {
                self.stats.usb_busy += 1;
                self.publish_stats();
            }
            DriverError::UsbError { errno, strerror } => {
                self.observer.notify(&Event::UsbError {
                    errno: *errno,
                    strerror: strerror.clone(),
                });
            }
            DriverError::FtdiError { errno, strerror } => {
                self.observer.notify(&Event::FtdiError {
                    errno: *errno,
                    strerror: strerror.clone(),
                });
            }
        }
        err
    }

    pub fn write(&mut self, bytes: &[u8]) -> DriverResult<usize> {
        self.device.write(bytes).map_err(|e| self.classify(e))
    }

    pub fn read(&mut self) -> DriverResult<Vec<u8>> {
        self.device.read().map_err(|e| self.classify(e))
    }

    pub fn purge(&mut self) -> DriverResult<()> {
        self.device.purge().map_err(|e| self.classify(e))
    }

    pub fn set_bitmode(&mut self, mask: u8, mode: u8) -> DriverResult<()> {
        self.device.set_bitmode(mask, mode).map_err(|e| self.classify(e))
    }

    pub fn set_line_property(&mut self, bits: u8, stopbits: u8, parity: char) -> DriverResult<()> {
        self.device
            .set_line_property(bits, stopbits, parity)
            .map_err(|e| self.classify(e))
    }

    pub fn set_baudrate(&mut self, baud: u32) -> DriverResult<()> {
        self.device.set_baudrate(baud).map_err(|e| self.classify(e))
    }

    /// K-Line liveness probe: write `kline_testbytes` copies of `0xFF`,
    /// sleep `kline_wait`, read back. An electrically alive line echoes
    /// exactly `2 + kline_testbytes` bytes (2 FTDI status bytes + the
    /// echoed data). Retries on bus-busy until `kline_timeout` elapses;
    /// any other error terminates with `false`. Always purges buffers on
    /// exit.
    pub fn kline_ping(&mut self) -> bool {
        let msg = vec![0xFFu8; self.config.kline_testbytes];
        let want = 2 + self.config.kline_testbytes;
        let start = Instant::now();
        let mut alive = false;

        loop {
            match self.probe_once(&msg, want) {
                Ok(true) => {
                    alive = true;
                    break;
                }
                Ok(false) => {}
                Err(_) => break,
            }
            if start.elapsed() > self.config.kline_timeout {
                break;
            }
        }

        let _ = self.purge();
        alive
    }

    fn probe_once(&mut self, msg: &[u8], want: usize) -> DriverResult<bool> {
        let _ = self.purge();
        match self.device.write(msg) {
            Ok(n) if n == msg.len() => {
                std::thread::sleep(self.config.kline_wait);
                match self.device.read() {
                    Ok(tmp) => Ok(tmp.len() == want),
                    Err(e) => {
                        if e.is_busy() {
                            self.stats.usb_busy += 1;
                            self.publish_stats();
                            Ok(false)
                        } else {
                            trace!("kline_ping aborted: {}", e);
                            warn!("kline liveness probe error: {}", e);
                            Err(self.classify(e))
                        }
                    }
                }
            }
            Ok(_) => Ok(false),
            Err(e) => {
                if e.is_busy() {
                    self.stats.usb_busy += 1;
                    self.publish_stats();
                    Ok(false)
                } else {
                    trace!("kline_ping aborted: {}", e);
                    warn!("kline liveness probe error: {}", e);
                    Err(self.classify(e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimDevice;
    use crate::event::NullObserver;

    #[test]
    fn ping_true_when_line_echoes_expected_byte_count() {
        let mut device = SimDevice::new();
        device.loopback_alive = true;
        let mut adapter = Adapter::new(device, NullObserver, AdapterConfig::default());
        assert!(adapter.kline_ping());
    }

    #[test]
    fn ping_false_when_line_is_dead() {
        let device = SimDevice::new();
        let mut adapter = Adapter::new(device, NullObserver, AdapterConfig::default());
        assert!(!adapter.kline_ping());
    }

    #[test]
    fn stats_start_at_zero_and_are_monotone() {
        let device = SimDevice::new();
        let adapter = Adapter::new(device, NullObserver, AdapterConfig::default());
        let stats = adapter.stats();
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.checksum_errors, 0);
        assert_eq!(stats.usb_busy, 0);
        assert_eq!(stats.unneeded_retry, 0);
    }
}
