//! Layer 3 — Honda ECU controller: state detection, DTCs, flash lifecycle,
//! and PGM-FI RAM/EEPROM/flash accessors.
//!
//! Grounded on `HondaECU` (`original_source/eculib/honda.py`), generalized
//! from the teacher's `KLine` (`kline.rs`, whose `read_dtcs`/`send_request`
//! shape this borrows) onto the Honda dialect's exact frame sequences.
//! Fixes both open bugs spec.md §9 calls out: `detect_state` always
//! restores `retries` and always returns a concrete state (never falls off
//! the end), and never reproduces the original's nested-`elif` fallthrough.

use std::time::Duration;

use tracing::debug;

use crate::adapter::Adapter;
use crate::device::RawDevice;
use crate::dtc::format_code;
use crate::error::DriverResult;
use crate::event::Observer;
use crate::frame::format_read;
use crate::stats::AdapterStats;
use crate::transport::Transport;

/// Bit-bang wake pulse timings, ISO 9141 / Honda K-Line contract
/// (spec.md §4.3, §9 — preserved within ±10%).
const INIT_LOW: Duration = Duration::from_millis(70);
const INIT_HIGH: Duration = Duration::from_millis(200);
const POST_ERASE_WAIT: Duration = Duration::from_millis(40);
const ERASE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const POST_WRITE_STEP_WAIT: Duration = Duration::from_millis(500);

/// Terminal result of [`HondaEcu::detect_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ECUState {
    Off,
    Unknown,
    Ok,
    Flash,
    Secure,
    RecoverOld,
    RecoverNew,
}

/// Result of [`HondaEcu::probe_tables`]: table id → (length, raw data).
pub type TableInfo = std::collections::BTreeMap<u8, (i32, Vec<u8>)>;

/// Result of [`HondaEcu::get_faults`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    pub current: Vec<String>,
    pub past: Vec<String>,
}

fn le16(location: u16) -> [u8; 2] {
    [(location & 0xFF) as u8, (location >> 8) as u8]
}

/// Swaps the byte order of every 16-bit word in `data`. An involution:
/// applying it twice returns the original bytes.
fn byteswap_words(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for pair in data.chunks(2) {
        if pair.len() == 2 {
            out.push(pair[1]);
            out.push(pair[0]);
        } else {
            out.push(pair[0]);
        }
    }
    out
}

pub struct HondaEcu<D: RawDevice, O: Observer> {
    transport: Transport<D, O>,
}

impl<D: RawDevice, O: Observer> HondaEcu<D, O> {
    pub fn new(transport: Transport<D, O>) -> Self {
        Self { transport }
    }

    pub fn into_transport(self) -> Transport<D, O> {
        self.transport
    }

    pub fn stats(&self) -> AdapterStats {
        self.transport.adapter.stats()
    }

    /// ECU wake sequence: bit-bang TX low 70ms, high 200ms, drain RX.
    /// Retries on bus-busy; aborts on any other error.
    pub fn init(&mut self) -> DriverResult<()> {
        loop {
            match self.try_init() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_busy() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn try_init(&mut self) -> DriverResult<()> {
        let adapter = &mut self.transport.adapter;
        adapter.set_bitmode(1, 1)?;
        adapter.write(&[0x00])?;
        std::thread::sleep(INIT_LOW);
        adapter.write(&[0x01])?;
        adapter.set_bitmode(0, 0)?;
        std::thread::sleep(INIT_HIGH);
        adapter.read()?;
        Ok(())
    }

    pub fn ping(&mut self, mode: u8) -> DriverResult<bool> {
        Ok(self.transport.send_command(&[0xFE], &[mode])?.is_some())
    }

    pub fn diag(&mut self, mode: u8) -> DriverResult<bool> {
        Ok(self.transport.send_command(&[0x72], &[0x00, mode])?.is_some())
    }

    /// ECU state-detection decision tree (spec.md §4.3). Temporarily zeroes
    /// the retry budget and always restores it, on every exit path.
    pub fn detect_state(&mut self) -> DriverResult<ECUState> {
        let saved_retries = self.transport.adapter.retries();
        self.transport.adapter.set_retries(0);
        let result = self.detect_state_inner();
        self.transport.adapter.set_retries(saved_retries);
        result
    }

    fn detect_state_inner(&mut self) -> DriverResult<ECUState> {
        if self.transport.adapter.kline_ping() {
            let mut state = ECUState::Unknown;
            self.init()?;
            self.init()?;
            self.ping(0x72)?;
            let table = self.transport.send_command(&[0x72], &[0x71, 0x00])?;
            match table {
                None => state = ECUState::Ok,
                Some(resp) => {
                    let zeroed = resp.reply_data.len() >= 7
                        && resp.reply_data[5] == 0
                        && resp.reply_data[6] == 0;
                    if zeroed {
                        if self.transport.send_command(&[0x7D], &[0x01, 0x01, 0x03])?.is_some() {
                            state = ECUState::RecoverOld;
                        } else if self
                            .transport
                            .send_command(&[0x7B], &[0x00, 0x01, 0x04])?
                            .is_some()
                        {
                            state = ECUState::RecoverNew;
                        }
                    }
                }
            }
            Ok(state)
        } else if self.transport.send_command(&[0x7E], &[0x01, 0x01, 0x00])?.is_some() {
            Ok(ECUState::Flash)
        } else if self
            .transport
            .send_command(&[0x82, 0x82, 0x10], &[0x00])?
            .is_some()
        {
            Ok(ECUState::Secure)
        } else {
            Ok(ECUState::Off)
        }
    }

    /// Probes a set of Honda table ids (§4.3 default: the standard 14
    /// tables). Aborts and returns an empty map if any table id fails to
    /// respond at all; tables that respond but with ≤2 bytes of payload
    /// are simply skipped.
    pub fn probe_tables(&mut self, tables: Option<&[u8]>) -> DriverResult<TableInfo> {
        const DEFAULT_TABLES: &[u8] = &[
            0x10, 0x11, 0x13, 0x17, 0x20, 0x21, 0x60, 0x61, 0x63, 0x67, 0x70, 0x71, 0xD0, 0xD1,
        ];
        let tables = tables.unwrap_or(DEFAULT_TABLES);

        let saved_retries = self.transport.adapter.retries();
        self.transport.adapter.set_retries(0);

        let mut result = TableInfo::new();
        for &id in tables {
            match self.transport.send_command(&[0x72], &[0x71, id])? {
                None => {
                    result.clear();
                    break;
                }
                Some(resp) => {
                    if resp.reply_data_len > 2 {
                        result.insert(id, (resp.reply_data_len, resp.reply_data));
                    }
                }
            }
        }

        self.transport.adapter.set_retries(saved_retries);
        Ok(result)
    }

    /// Reads current and past DTC lists. Stops early for a given list once
    /// a query returns a zero value at payload position 2 (spec.md §4.3);
    /// a missing response also stops that list early rather than
    /// propagating an error, since a partial fault list is still useful.
    pub fn get_faults(&mut self) -> DriverResult<Faults> {
        let mut faults = Faults::default();
        for i in 1..12u8 {
            let Some(resp) = self.transport.send_command(&[0x72], &[0x74, i])? else {
                break;
            };
            let data = &resp.reply_data;
            for &j in &[3usize, 5, 7] {
                if data.len() > j + 1 && data[j] != 0 {
                    faults.current.push(format_code(data[j], data[j + 1]));
                }
            }
            if data.len() > 2 && data[2] == 0 {
                break;
            }
        }

        for i in 1..12u8 {
            let Some(resp) = self.transport.send_command(&[0x72], &[0x73, i])? else {
                break;
            };
            let data = &resp.reply_data;
            for &j in &[3usize, 5, 7] {
                if data.len() > j + 1 && data[j] != 0 {
                    faults.past.push(format_code(data[j], data[j + 1]));
                }
            }
            if data.len() > 2 && data[2] == 0 {
                break;
            }
        }

        Ok(faults)
    }

    // ---- Flash lifecycle ------------------------------------------------

    pub fn do_init_recover(&mut self) -> DriverResult<()> {
        self.transport.send_command(&[0x7B], &[0x00, 0x02, 0x76, 0x03, 0x17])?;
        self.transport.send_command(&[0x7B], &[0x00, 0x03, 0x75, 0x05, 0x13])?;
        Ok(())
    }

    pub fn do_init_write(&mut self) -> DriverResult<()> {
        self.transport.send_command(&[0x7D], &[0x01, 0x02, 0x50, 0x47, 0x4D])?;
        self.transport.send_command(&[0x7D], &[0x01, 0x03, 0x2D, 0x46, 0x49])?;
        Ok(())
    }

    pub fn get_write_status(&mut self) -> DriverResult<Option<u8>> {
        let info = self.transport.send_command(&[0x7E], &[0x01, 0x01, 0x00])?;
        Ok(info.and_then(|r| r.reply_data.get(1).copied()))
    }

    pub fn do_erase(&mut self) -> DriverResult<bool> {
        self.transport.send_command(&[0x7E], &[0x01, 0x02])?;
        self.transport.send_command(&[0x7E], &[0x01, 0x03, 0x00, 0x00])?;
        self.get_write_status()?;
        self.transport
            .send_command(&[0x7E], &[0x01, 0x0B, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF])?;
        self.get_write_status()?;
        self.transport.send_command(&[0x7E], &[0x01, 0x0E, 0x01, 0x90])?;
        std::thread::sleep(POST_ERASE_WAIT);
        let info = self.transport.send_command(&[0x7E], &[0x01, 0x04, 0xFF])?;
        Ok(info.map(|r| r.reply_data.get(1) == Some(&0)).unwrap_or(false))
    }

    pub fn do_erase_wait(&mut self) -> DriverResult<bool> {
        loop {
            std::thread::sleep(ERASE_POLL_INTERVAL);
            match self.transport.send_command(&[0x7E], &[0x01, 0x05])? {
                None => return Ok(false),
                Some(resp) => {
                    debug!("erase poll status: {:?}", resp.reply_data);
                    if resp.reply_data.get(1) == Some(&0) {
                        self.get_write_status()?;
                        return Ok(true);
                    }
                }
            }
        }
    }

    pub fn do_post_write(&mut self) -> DriverResult<bool> {
        let mut last_status = None;
        for step in [0x08u8, 0x09, 0x0A, 0x0C] {
            self.transport.send_command(&[0x7E], &[0x01, step])?;
            std::thread::sleep(POST_WRITE_STEP_WAIT);
            last_status = self.get_write_status()?;
        }
        if last_status == Some(0x0F) {
            let info = self.transport.send_command(&[0x7E], &[0x01, 0x0D])?;
            Ok(info.map(|r| r.reply_data.get(1) == Some(&0x0F)).unwrap_or(false))
        } else {
            Ok(false)
        }
    }

    // ---- PGM-FI memory accessors ----------------------------------------

    pub fn pgmfi_read_flash_bytes(&mut self, location: u32, size: u8) -> DriverResult<Option<Vec<u8>>> {
        if size == 0 || size > 12 {
            return Ok(None);
        }
        let mut data = format_read(location).to_vec();
        data.push(size);
        let info = self.transport.send_command(&[0x82, 0x82, 0x00], &data)?;
        Ok(info.and_then(|r| {
            (r.reply_length == size + 5).then_some(r.reply_data)
        }))
    }

    pub fn pgmfi_read_ram_bytes(&mut self, location: u16, size: u8) -> DriverResult<Option<Vec<u8>>> {
        if size == 0 || size > 12 {
            return Ok(None);
        }
        let mut data = le16(location).to_vec();
        data.push(size);
        let info = self.transport.send_command(&[0x82, 0x82, 0x04], &data)?;
        Ok(info.and_then(|r| (r.reply_length == size + 5).then_some(r.reply_data)))
    }

    /// `size` is a word count. Odd word counts are rejected without I/O,
    /// matching the original (spec.md §8 boundary case).
    pub fn pgmfi_read_ram_words(&mut self, location: u16, size: u8) -> DriverResult<Option<Vec<u8>>> {
        if size % 2 != 0 || size == 0 || size > 6 {
            return Ok(None);
        }
        let mut data = le16(location).to_vec();
        data.push(size);
        let info = self.transport.send_command(&[0x82, 0x82, 0x05], &data)?;
        Ok(info.and_then(|r| {
            let size2 = size * 2;
            (r.reply_length == size2 + 5).then(|| byteswap_words(&r.reply_data))
        }))
    }

    pub fn pgmfi_write_ram_bytes(&mut self, location: u16, payload: &[u8]) -> DriverResult<Option<Vec<u8>>> {
        let size = payload.len();
        if size == 0 || size > 12 {
            return Ok(None);
        }
        let mut data = le16(location).to_vec();
        data.extend_from_slice(payload);
        data.push(size as u8);
        let info = self.transport.send_command(&[0x82, 0x82, 0x08], &data)?;
        Ok(info.and_then(|r| (r.reply_length == 5).then_some(r.reply_data)))
    }

    pub fn pgmfi_write_ram_words(&mut self, location: u16, payload: &[u8]) -> DriverResult<Option<Vec<u8>>> {
        let size = payload.len();
        if size == 0 || size % 2 != 0 || size / 2 > 6 {
            return Ok(None);
        }
        let mut data = le16(location).to_vec();
        data.extend_from_slice(payload);
        data.push(size as u8);
        let info = self.transport.send_command(&[0x82, 0x82, 0x09], &data)?;
        Ok(info.and_then(|r| (r.reply_length == 5).then_some(r.reply_data)))
    }

    pub fn pgmfi_read_eeprom_word(&mut self, location: u8) -> DriverResult<Option<[u8; 2]>> {
        let info = self.transport.send_command(&[0x82, 0x82, 0x10], &[location])?;
        Ok(info.and_then(|r| {
            (r.reply_length == 7 && r.reply_data.len() >= 2)
                .then_some([r.reply_data[0], r.reply_data[1]])
        }))
    }

    pub fn pgmfi_write_eeprom_word(&mut self, location: u8, word: [u8; 2]) -> DriverResult<Option<Vec<u8>>> {
        let data = [location, word[0], word[1]];
        let info = self.transport.send_command(&[0x82, 0x82, 0x14], &data)?;
        Ok(info.and_then(|r| (r.reply_length == 5).then_some(r.reply_data)))
    }

    pub fn pgmfi_format_eeprom_ff(&mut self) -> DriverResult<Option<Vec<u8>>> {
        let info = self.transport.send_command(&[0x82, 0x82, 0x18], &[])?;
        Ok(info.and_then(|r| (r.reply_length == 5).then_some(r.reply_data)))
    }

    pub fn pgmfi_format_eeprom_00(&mut self) -> DriverResult<Option<Vec<u8>>> {
        let info = self.transport.send_command(&[0x82, 0x82, 0x19], &[])?;
        Ok(info.and_then(|r| (r.reply_length == 5).then_some(r.reply_data)))
    }

    pub fn pgmfi_write_unk1_byte(&mut self, location: u16, payload: &[u8]) -> DriverResult<Option<Vec<u8>>> {
        if payload.is_empty() || payload.len() > 12 {
            return Ok(None);
        }
        let mut data = le16(location).to_vec();
        data.extend_from_slice(payload);
        let info = self.transport.send_command(&[0x82, 0x82, 0x1D], &data)?;
        Ok(info.and_then(|r| (r.reply_length == 5).then_some(r.reply_data)))
    }

    pub fn pgmfi_write_unk1_word(&mut self, location: u16, payload: &[u8]) -> DriverResult<Option<Vec<u8>>> {
        let size = payload.len();
        if size == 0 || size % 2 != 0 || size / 2 > 6 {
            return Ok(None);
        }
        let mut data = le16(location).to_vec();
        data.extend_from_slice(payload);
        let info = self.transport.send_command(&[0x82, 0x82, 0x1E], &data)?;
        Ok(info.and_then(|r| (r.reply_length == 5).then_some(r.reply_data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::device::SimDevice;
    use crate::event::NullObserver;
    use crate::frame::Frame;

    fn ecu_with(device: SimDevice) -> HondaEcu<SimDevice, NullObserver> {
        let adapter = Adapter::new(device, NullObserver, AdapterConfig::default());
        HondaEcu::new(Transport::new(adapter))
    }

    fn reply(mtype: &[u8], data: &[u8]) -> Vec<u8> {
        Frame::build(mtype, data).bytes
    }

    #[test]
    fn detect_state_off_when_line_dead_and_nothing_responds() {
        // spec.md §8 scenario 4
        let mut device = SimDevice::new();
        device.loopback_alive = false;
        // No replies queued: every send_command times out to "no response".
        let mut ecu = ecu_with(device);
        assert_eq!(ecu.detect_state().unwrap(), ECUState::Off);
    }

    #[test]
    fn detect_state_flash_when_line_dead_but_flash_query_responds() {
        // spec.md §8 scenario 5. Sent mtype is the 1-byte [0x7E]; a valid
        // reply's mtype byte is mtype[0] & 0x0F == 0x0E.
        let mut device = SimDevice::new();
        device.loopback_alive = false;
        device.echo = true;
        device.replies.push_back(reply(&[0x0E], &[0x00]));
        let mut ecu = ecu_with(device);
        assert_eq!(ecu.detect_state().unwrap(), ECUState::Flash);
    }

    #[test]
    fn erase_happy_path() {
        // spec.md §8 scenario 6. do_erase issues 7 send_command calls, all
        // with the 1-byte mtype [0x7E] (valid reply mtype byte: 0x0E); only
        // the final one's payload is inspected, at reply_data[1] == 0.
        let mut device = SimDevice::new();
        device.echo = true;
        for _ in 0..6 {
            device.replies.push_back(reply(&[0x0E], &[0x00, 0xFF]));
        }
        device.replies.push_back(reply(&[0x0E], &[0x00, 0x00]));
        let mut ecu = ecu_with(device);
        assert!(ecu.do_erase().unwrap());
    }

    #[test]
    fn pgmfi_rejects_oversized_flash_read_without_io() {
        let device = SimDevice::new();
        let mut ecu = ecu_with(device);
        assert_eq!(ecu.pgmfi_read_flash_bytes(0x1000, 13).unwrap(), None);
    }

    #[test]
    fn pgmfi_rejects_odd_word_count_without_io() {
        let device = SimDevice::new();
        let mut ecu = ecu_with(device);
        assert_eq!(ecu.pgmfi_read_ram_words(0x1000, 3).unwrap(), None);
    }

    #[test]
    fn ram_byte_round_trip_against_simulator() {
        let mut device = SimDevice::new();
        device.echo = true;
        // write: reply_length must be 5.
        device.replies.push_back(reply(&[0x92, 0x92, 0x08], &[]));
        // read: reply_length must be size+5, payload is the written bytes.
        device.replies.push_back(reply(&[0x92, 0x92, 0x04], &[0xAA, 0xBB, 0xCC]));
        let mut ecu = ecu_with(device);

        let written = ecu.pgmfi_write_ram_bytes(0x2000, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert!(written.is_some());

        let read_back = ecu.pgmfi_read_ram_bytes(0x2000, 3).unwrap();
        assert_eq!(read_back, Some(vec![0xAA, 0xBB, 0xCC]));
    }

    #[test]
    fn eeprom_word_round_trip_against_simulator() {
        let mut device = SimDevice::new();
        device.echo = true;
        device.replies.push_back(reply(&[0x92, 0x92, 0x14], &[]));
        device.replies.push_back(reply(&[0x92, 0x92, 0x10], &[0x12, 0x34]));
        let mut ecu = ecu_with(device);

        let written = ecu.pgmfi_write_eeprom_word(0x05, [0x12, 0x34]).unwrap();
        assert!(written.is_some());

        let read_back = ecu.pgmfi_read_eeprom_word(0x05).unwrap();
        assert_eq!(read_back, Some([0x12, 0x34]));
    }

    #[test]
    fn ram_word_byteswap_is_an_involution() {
        let data = vec![0x01u8, 0x02, 0x03, 0x04];
        let once = byteswap_words(&data);
        let twice = byteswap_words(&once);
        assert_eq!(twice, data);
        assert_ne!(once, data);
    }
}
