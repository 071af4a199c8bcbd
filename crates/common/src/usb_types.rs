//! USB transport abstractions
//!
//! A print session never talks to libusb directly. It asks a [`Connector`]
//! for a claimed [`Transport`] and writes raw command bytes through it. The
//! server crate provides the libusb-backed implementation; tests use the
//! recording mocks in [`crate::test_utils`].

use protocol::UsbDeviceIdentity;
use thiserror::Error;

/// Failure of a single raw write
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("Transfer timed out")]
    Timeout,

    #[error("Device disconnected")]
    NoDevice,

    #[error("Interface not claimed")]
    NotClaimed,

    #[error("Transfer failed: {0}")]
    Io(String),
}

/// Failure to acquire a claimed handle
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// No attached device matches the identity
    #[error("Printer not found (device {0})")]
    DeviceNotFound(UsbDeviceIdentity),

    /// The interface is busy or access was denied
    #[error("Failed to claim device {identity}: {reason}")]
    ClaimFailed {
        identity: UsbDeviceIdentity,
        reason: String,
    },
}

/// Claimed, writable connection to one printer
///
/// Owned exclusively by the session worker of that printer.
pub trait Transport: Send {
    /// Write the whole buffer to the printer's OUT endpoint
    fn write_raw(&mut self, data: &[u8]) -> Result<(), TransferError>;

    /// Release the claimed interface and dispose of the handle
    ///
    /// Must be safe to call more than once.
    fn release(&mut self);
}

/// Opens and claims printers by identity
pub trait Connector: Send + Sync {
    fn connect(&self, identity: UsbDeviceIdentity) -> Result<Box<dyn Transport>, ConnectError>;
}
