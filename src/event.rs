//! Typed event bus.
//!
//! The original Python driver publishes on a name-keyed dispatcher
//! (`pydispatch.dispatcher.send(signal='ecu.stats', ...)`). This crate
//! replaces that with an explicit capability: any `Observer` the caller
//! hands to [`Adapter::new`](crate::adapter::Adapter::new) receives every
//! event by value, with no global registry involved.

use serde::Serialize;

use crate::stats::AdapterStats;

/// Signal published by the adapter/transport layers.
#[derive(Debug, Clone, Serialize)]
pub enum Event {
    /// Full stats snapshot, published on every counter mutation.
    Stats(AdapterStats),
    /// Human-readable hex dump of an outgoing or incoming frame.
    Debug(String),
    /// A hard (non bus-busy) USB error.
    UsbError { errno: i32, strerror: String },
    /// A hard (non bus-busy) FTDI/D2XX error.
    FtdiError { errno: i32, strerror: String },
}

/// Receives events published by the driver stack.
///
/// Implementations must not block for long: `notify` is called from
/// inside the hot path of every adapter read/write.
pub trait Observer {
    fn notify(&self, event: &Event);
}

/// An `Observer` that discards every event. The default choice for
/// callers that don't care about telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn notify(&self, _event: &Event) {}
}

impl<O: Observer + ?Sized> Observer for &O {
    fn notify(&self, event: &Event) {
        (**self).notify(event)
    }
}
