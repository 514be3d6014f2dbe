//! Layer 2 — frame build, single exchange, and the retrying wrapper.
//!
//! Grounded on `HondaECU.send`/`HondaECU.send_command`
//! (`original_source/eculib/honda.py`) and the teacher's `KLine::send_request`
//! (`kline.rs`). The retry/validation restructuring fixes the fallthrough
//! bug spec.md §9 calls out: the three mtype-length branches are mutually
//! exclusive, and `valid` is always computed before it's checked.

use std::time::Instant;

use tracing::debug;

use crate::adapter::Adapter;
use crate::device::RawDevice;
use crate::error::DriverResult;
use crate::event::Observer;
use crate::frame::{checksum8bit_honda, Frame, Response};

pub struct Transport<D: RawDevice, O: Observer> {
    pub adapter: Adapter<D, O>,
}

impl<D: RawDevice, O: Observer> Transport<D, O> {
    pub fn new(adapter: Adapter<D, O>) -> Self {
        Self { adapter }
    }

    /// One bounded request/response exchange. Returns `Ok(None)` for every
    /// "no response" case spec.md §4.2 describes (short write, phase-A/B
    /// timeout); returns `Ok(Some(reply_bytes))` (echo already stripped)
    /// on success.
    pub fn send(&mut self, frame: &Frame) -> DriverResult<Option<Vec<u8>>> {
        loop {
            let written = match self.adapter.write(&frame.bytes) {
                Ok(n) => n,
                Err(e) if e.is_busy() => continue,
                Err(e) => return Err(e),
            };
            if written < frame.len() {
                return Ok(None);
            }

            let timeout = self.adapter.config().timeout;
            let start = Instant::now();
            let mut buf: Vec<u8> = Vec::new();

            // Phase A: our echo + reply header + length byte.
            let want_a = frame.len() + frame.mtype_len + 1;
            match self.collect_until(&mut buf, want_a, start, timeout) {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(e) if e.is_busy() => continue,
                Err(e) => return Err(e),
            }

            // Phase B: length byte at frame.len()+mtype_len gives the
            // reply's total length.
            let reply_total_len = buf[frame.len() + frame.mtype_len] as usize;
            let want_b = frame.len() + reply_total_len;
            match self.collect_until(&mut buf, want_b, start, timeout) {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(e) if e.is_busy() => continue,
                Err(e) => return Err(e),
            }

            // Discard the bus echo of our own request.
            return Ok(Some(buf.split_off(frame.len())));
        }
    }

    /// Reads chunks from the adapter, stripping the 2 status bytes that
    /// prefix every 64-byte USB segment, until `buf.len() >= want` or
    /// `timeout` elapses since `start`.
    fn collect_until(
        &mut self,
        buf: &mut Vec<u8>,
        want: usize,
        start: Instant,
        timeout: std::time::Duration,
    ) -> DriverResult<bool> {
        while buf.len() < want {
            let chunk = self.adapter.read()?;
            if chunk.len() > 2 {
                let mut i = 0;
                while i < chunk.len() {
                    let end = (i + 64).min(chunk.len());
                    if i + 2 < end {
                        buf.extend_from_slice(&chunk[i + 2..end]);
                    }
                    i += 64;
                }
            }
            if start.elapsed() > timeout {
                return Ok(buf.len() >= want);
            }
        }
        Ok(true)
    }

    /// Builds the frame, retries up to `adapter.retries()` times, validates
    /// checksum and reply mtype, and returns the parsed `Response` on
    /// success or `None` once retries are exhausted.
    pub fn send_command(&mut self, mtype: &[u8], data: &[u8]) -> DriverResult<Option<Response>> {
        let frame = Frame::build(mtype, data);
        let retries = self.adapter.retries();
        let mut attempt = 0u32;
        let mut result = None;

        while attempt <= retries {
            debug!("{} > {:02X?}", attempt, frame.bytes);
            self.adapter.notify_debug(format!("{:02X?}", frame.bytes));
            let resp = self.send(&frame)?;

            let Some(resp) = resp else {
                self.bump_retry();
                attempt += 1;
                continue;
            };

            if resp.is_empty() || checksum8bit_honda(&resp[..resp.len() - 1]) != resp[resp.len() - 1] {
                self.bump_checksum_error();
                self.bump_retry();
                attempt += 1;
                continue;
            }

            debug!("{} < {:02X?}", attempt, resp);
            self.adapter.notify_debug(format!("{:02X?}", resp));

            let ml = frame.mtype_len;
            if resp.len() < ml + 2 {
                self.bump_retry();
                attempt += 1;
                continue;
            }
            let reply_mtype = resp[..ml].to_vec();

            let valid = match ml {
                3 => reply_mtype[0] == (mtype[0] | 0x10) && reply_mtype[1] == (mtype[1] | 0x10),
                2 => reply_mtype == mtype,
                1 => reply_mtype[0] == (mtype[0] & 0x0F),
                _ => false,
            };

            if !valid {
                self.bump_retry();
                attempt += 1;
                continue;
            }

            let reply_length = resp[ml];
            let reply_data_len = reply_length as i32 - 2 - ml as i32;
            let reply_data = resp[ml + 1..resp.len() - 1].to_vec();
            result = Some(Response {
                reply_mtype,
                reply_length,
                reply_data,
                reply_data_len,
            });
            break;
        }

        self.adapter.notify_stats();
        Ok(result)
    }

    fn bump_retry(&mut self) {
        self.adapter.bump_retries_stat();
    }

    fn bump_checksum_error(&mut self) {
        self.adapter.bump_checksum_error_stat();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::device::SimDevice;
    use crate::event::NullObserver;

    fn transport_with(device: SimDevice) -> Transport<SimDevice, NullObserver> {
        let adapter = Adapter::new(device, NullObserver, AdapterConfig::default());
        Transport::new(adapter)
    }

    #[test]
    fn ping_round_trip() {
        // spec.md §8 scenario 1: ping() sends mtype [0xFE] data [mode].
        // A 1-byte mtype reply must equal mtype & 0x0F, i.e. 0x0E.
        let mut device = SimDevice::new();
        device.echo = true;
        device.replies.push_back(Frame::build(&[0x0E], &[]).bytes);
        let mut transport = transport_with(device);
        let resp = transport.send_command(&[0xFE], &[0x72]).unwrap();
        assert!(resp.is_some());
    }

    #[test]
    fn no_response_when_device_returns_short() {
        let device = SimDevice::new(); // no replies queued at all
        let mut transport = transport_with(device);
        let resp = transport.send_command(&[0x72], &[0x71, 0x00]).unwrap();
        assert!(resp.is_none());
    }

    #[test]
    fn mtype_validation_is_mutually_exclusive() {
        // A 2-byte mtype reply must match exactly; a 3-byte reply with
        // mismatched bits must not validate even if the checksum is fine.
        let mut device = SimDevice::new();
        device.echo = true;
        // Build a well-formed but mtype-mismatched 2-byte reply.
        let bad = Frame::build(&[0x00, 0x00], &[0x01]).bytes;
        device.replies.push_back(bad);
        let mut transport = transport_with(device);
        let resp = transport.send_command(&[0x72, 0x71], &[0x00]).unwrap();
        assert!(resp.is_none());
    }
}
