//! Structured error types for the K-Line driver stack.
//!
//! Unlike the original Python implementation, which recovered the FTDI
//! errno by string-splitting an exception message (`"...: ... [... NNN]"`),
//! every variant here carries its errno as a plain field.

use thiserror::Error;

/// Errors surfaced by a [`RawDevice`](crate::device::RawDevice) implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Transient USB bus-busy condition (errno 2). Callers never see this
    /// directly: the adapter and transport retry loops intercept it,
    /// bump `AdapterStats::usb_busy`, and retry the operation.
    #[error("USB bus busy")]
    UsbBusy,

    /// A hard USB error that is not bus-busy. Aborts the current operation.
    #[error("USB error {errno}: {strerror}")]
    UsbError { errno: i32, strerror: String },

    /// A hard FTDI/D2XX error that is not bus-busy. Aborts the current
    /// operation.
    #[error("FTDI error {errno}: {strerror}")]
    FtdiError { errno: i32, strerror: String },
}

impl DriverError {
    /// True if this error should be treated as the transient bus-busy
    /// condition (errno 2) rather than a hard fault.
    pub fn is_busy(&self) -> bool {
        matches!(self, DriverError::UsbBusy)
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
