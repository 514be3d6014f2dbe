//! The FTDI-like device collaborator (spec §6 "Adapter contract (consumed)").
//!
//! `RawDevice` is the narrow byte-I/O surface the rest of the crate is
//! written against. The production implementation, `FtdiRawDevice`, is
//! backed by `libftd2xx` — the same crate the teacher daemon uses. Tests
//! exercise the exact same code paths against `SimDevice`, an in-memory
//! double.

use std::time::{Duration, Instant};

use libftd2xx::{BitMode, Ftdi, FtdiCommon};
use tracing::{debug, info};

use crate::error::{DriverError, DriverResult};

/// Byte-granular I/O surface an `Adapter` drives.
///
/// `read` returns whatever chunk the device handed back for a single poll;
/// it may be empty. Callers loop, as spec §4.2 describes, until they have
/// collected enough bytes or their own timeout elapses.
pub trait RawDevice {
    fn write(&mut self, bytes: &[u8]) -> DriverResult<usize>;
    fn read(&mut self) -> DriverResult<Vec<u8>>;
    fn purge(&mut self) -> DriverResult<()>;
    fn set_bitmode(&mut self, mask: u8, mode: u8) -> DriverResult<()>;
    fn set_line_property(&mut self, bits: u8, stopbits: u8, parity: char) -> DriverResult<()>;
    fn set_baudrate(&mut self, baud: u32) -> DriverResult<()>;
}

fn classify(err: libftd2xx::FtStatus) -> DriverError {
    // libftd2xx has no public errno; fold the status code into the same
    // structured shape callers get from a hard USB error.
    let errno = err as i32;
    DriverError::FtdiError {
        errno,
        strerror: format!("{:?}", err),
    }
}

/// FTDI D2XX-backed device, opened by index.
pub struct FtdiRawDevice {
    device: Ftdi,
}

impl FtdiRawDevice {
    pub fn open(index: i32) -> DriverResult<Self> {
        info!("opening FTDI device index {}", index);
        let mut device = Ftdi::with_index(index).map_err(classify)?;
        device.reset().map_err(classify)?;
        device
            .set_timeouts(Duration::from_millis(1000), Duration::from_millis(1000))
            .map_err(classify)?;
        device.purge_all().map_err(classify)?;
        Ok(Self { device })
    }

    pub fn open_by_serial(serial: &str) -> DriverResult<Self> {
        info!("opening FTDI device with serial {}", serial);
        let mut device = Ftdi::with_serial_number(serial).map_err(classify)?;
        device.reset().map_err(classify)?;
        device
            .set_timeouts(Duration::from_millis(1000), Duration::from_millis(1000))
            .map_err(classify)?;
        device.purge_all().map_err(classify)?;
        Ok(Self { device })
    }

    fn queued_read(&mut self, timeout: Duration) -> DriverResult<Vec<u8>> {
        let start = Instant::now();
        let mut out = Vec::new();
        while start.elapsed() < timeout {
            let queued = self.device.queue_status().map_err(classify)? as usize;
            if queued == 0 {
                break;
            }
            let mut buf = vec![0u8; queued];
            let n = self.device.read(&mut buf).map_err(classify)?;
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }
}

impl RawDevice for FtdiRawDevice {
    fn write(&mut self, bytes: &[u8]) -> DriverResult<usize> {
        debug!("TX: {:02X?}", bytes);
        self.device.write(bytes).map_err(classify)
    }

    fn read(&mut self) -> DriverResult<Vec<u8>> {
        // D2XX already strips the 2-status-byte FTDI packet header that
        // pyftdi's raw libusb reads exposed, so there is nothing to
        // de-stuff here. Transport still implements the stripping logic
        // in full (see transport.rs) so that it behaves identically
        // against a SimDevice that reproduces the raw framing.
        let out = self.queued_read(Duration::from_millis(50))?;
        if !out.is_empty() {
            debug!("RX: {:02X?}", out);
        }
        Ok(out)
    }

    fn purge(&mut self) -> DriverResult<()> {
        self.device.purge_all().map_err(classify)
    }

    fn set_bitmode(&mut self, mask: u8, mode: u8) -> DriverResult<()> {
        let mode = if mode == 0 {
            BitMode::Reset
        } else {
            BitMode::AsyncBitbang
        };
        self.device.set_bit_mode(mask, mode).map_err(classify)
    }

    fn set_line_property(&mut self, bits: u8, stopbits: u8, parity: char) -> DriverResult<()> {
        let bits = if bits == 7 {
            libftd2xx::BitsPerWord::Bits7
        } else {
            libftd2xx::BitsPerWord::Bits8
        };
        let stopbits = if stopbits == 2 {
            libftd2xx::StopBits::Bits2
        } else {
            libftd2xx::StopBits::Bits1
        };
        let parity = match parity {
            'O' | 'o' => libftd2xx::Parity::Odd,
            'E' | 'e' => libftd2xx::Parity::Even,
            _ => libftd2xx::Parity::No,
        };
        self.device
            .set_data_characteristics(bits, stopbits, parity)
            .map_err(classify)
    }

    fn set_baudrate(&mut self, baud: u32) -> DriverResult<()> {
        self.device.set_baud_rate(baud).map_err(classify)
    }
}

#[cfg(test)]
pub use test_support::SimDevice;

#[cfg(test)]
mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory `RawDevice` double.
    ///
    /// Scripted with a queue of responses. Each `write` call consumes one
    /// scripted response (if any) and makes it available to the next
    /// `read` calls, chunked exactly the way the real FTDI packet framing
    /// would: 2 status bytes prefixing every 64-byte segment. This lets
    /// tests exercise Transport's status-byte stripping loop faithfully.
    #[derive(Default)]
    pub struct SimDevice {
        /// Queued raw (pre-status-byte) reply bytes, one entry per request.
        pub replies: VecDeque<Vec<u8>>,
        /// Bytes available to the next `read()` call (post status-byte framing).
        pending: VecDeque<u8>,
        pub writes: Vec<Vec<u8>>,
        /// When true, echo the request back (as K-Line half-duplex does)
        /// before the scripted reply bytes.
        pub echo: bool,
        /// When true, `write` loops back exactly what was written (used to
        /// emulate the K-Line liveness probe's loopback, which never goes
        /// through the frame/reply machinery below).
        pub loopback_alive: bool,
    }

    impl SimDevice {
        pub fn new() -> Self {
            Self::default()
        }

        fn frame_with_status(data: &[u8]) -> Vec<u8> {
            let mut out = Vec::new();
            for chunk in data.chunks(62) {
                out.push(0x31); // arbitrary modem status byte
                out.push(0x60);
                out.extend_from_slice(chunk);
            }
            out
        }
    }

    impl RawDevice for SimDevice {
        fn write(&mut self, bytes: &[u8]) -> DriverResult<usize> {
            self.writes.push(bytes.to_vec());
            if self.loopback_alive {
                self.pending.extend(Self::frame_with_status(bytes));
                return Ok(bytes.len());
            }
            // Frame the whole logical byte stream (echo + reply) as one
            // contiguous run, the way real FTDI packet boundaries fall
            // every 62 data bytes of the USB transfer regardless of where
            // our logical "echo" and "reply" pieces happen to end.
            let mut raw = Vec::new();
            if self.echo {
                raw.extend_from_slice(bytes);
            }
            if let Some(reply) = self.replies.pop_front() {
                raw.extend_from_slice(&reply);
            }
            self.pending.extend(Self::frame_with_status(&raw));
            Ok(bytes.len())
        }

        fn read(&mut self) -> DriverResult<Vec<u8>> {
            // Return everything currently pending in one chunk, the way a
            // single USB bulk-read poll would.
            let out: Vec<u8> = self.pending.drain(..).collect();
            Ok(out)
        }

        fn purge(&mut self) -> DriverResult<()> {
            self.pending.clear();
            Ok(())
        }

        fn set_bitmode(&mut self, _mask: u8, _mode: u8) -> DriverResult<()> {
            Ok(())
        }

        fn set_line_property(&mut self, _bits: u8, _stopbits: u8, _parity: char) -> DriverResult<()> {
            Ok(())
        }

        fn set_baudrate(&mut self, _baud: u32) -> DriverResult<()> {
            Ok(())
        }
    }
}
