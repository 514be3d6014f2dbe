//! Host-side driver for the Honda PGM-FI K-Line diagnostic protocol over an
//! FTDI D2XX adapter.
//!
//! Layered the way `original_source/eculib` is, but split across modules
//! instead of two mixed-concern classes:
//!
//! - [`device`] / [`adapter`] — byte I/O, the K-Line liveness probe, and
//!   stats (`KlineAdapter` in the original).
//! - [`frame`] — the Honda wire format: checksum, frame build, response
//!   parsing (`eculib.honda.format_message` / `checksum8bitHonda`).
//! - [`transport`] — one bounded request/response exchange plus the
//!   retrying `send_command` wrapper (`HondaECU.send` / `.send_command`).
//! - [`honda`] — ECU state detection, DTCs, the flash lifecycle, and the
//!   PGM-FI memory accessors (`HondaECU`'s higher-level methods).
//!
//! `RawDevice` and `Observer` are the two seams production code and tests
//! plug into: a production caller wires up [`device::FtdiRawDevice`] and
//! whatever [`event::Observer`] it wants telemetry on; tests use
//! `device::SimDevice` (behind `#[cfg(test)]`) and [`event::NullObserver`].

pub mod adapter;
pub mod config;
pub mod device;
pub mod dtc;
pub mod error;
pub mod event;
pub mod frame;
pub mod honda;
pub mod stats;
pub mod transport;

pub use adapter::Adapter;
pub use config::AdapterConfig;
pub use device::{FtdiRawDevice, RawDevice};
pub use error::{DriverError, DriverResult};
pub use event::{Event, NullObserver, Observer};
pub use frame::{Frame, Response};
pub use honda::{ECUState, Faults, HondaEcu, TableInfo};
pub use stats::AdapterStats;
pub use transport::Transport;
