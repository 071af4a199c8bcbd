//! Print job error taxonomy
//!
//! Every failure a print request can hit is a [`PrintError`]. The HTTP layer
//! only ever sees its [`PrintError::error_code`], never the underlying cause.

use common::{ConnectError, TransferError};
use protocol::{EncodingError, UsbDeviceIdentity};
use thiserror::Error;

pub const PRINTER_NOT_FOUND: &str = "PRINTER_NOT_FOUND";
pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";
pub const PRINT_FAILED: &str = "PRINT_FAILED";

#[derive(Debug, Error)]
pub enum PrintError {
    /// No attached device matches the identity
    #[error("Printer not found (device {identity})")]
    DeviceNotFound { identity: UsbDeviceIdentity },

    /// Enumeration found no printer at all
    #[error("No printers found")]
    NoPrinters,

    /// Interface busy or permission denied
    #[error("Failed to claim printer {identity}: {reason}")]
    ClaimFailed {
        identity: UsbDeviceIdentity,
        reason: String,
    },

    #[error("Print transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// Malformed base64 or image data
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode print data: {0}")]
    Encoding(#[from] EncodingError),

    /// The session stopped accepting jobs
    #[error("Print queue is closed")]
    QueueClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrintError {
    /// Error code reported to HTTP clients
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DeviceNotFound { .. } | Self::NoPrinters => PRINTER_NOT_FOUND,
            Self::ClaimFailed { .. } | Self::TransferFailed(_) | Self::QueueClosed => {
                CONNECTION_FAILED
            }
            Self::Decode(_) | Self::Encoding(_) | Self::Internal(_) => PRINT_FAILED,
        }
    }
}

impl From<ConnectError> for PrintError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::DeviceNotFound(identity) => Self::DeviceNotFound { identity },
            ConnectError::ClaimFailed { identity, reason } => Self::ClaimFailed { identity, reason },
        }
    }
}

impl From<common::Error> for PrintError {
    fn from(err: common::Error) -> Self {
        match err {
            common::Error::Channel(_) => Self::QueueClosed,
            common::Error::Config(msg) => Self::Internal(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, PrintError>;

#[cfg(test)]
mod tests {
    use super::*;

    const ID: UsbDeviceIdentity = UsbDeviceIdentity::new(0x0fe6, 0x811e);

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PrintError::DeviceNotFound { identity: ID }.error_code(),
            PRINTER_NOT_FOUND
        );
        assert_eq!(PrintError::NoPrinters.error_code(), PRINTER_NOT_FOUND);
        assert_eq!(
            PrintError::from(TransferError::Timeout).error_code(),
            CONNECTION_FAILED
        );
        assert_eq!(PrintError::QueueClosed.error_code(), CONNECTION_FAILED);
        assert_eq!(
            PrintError::Decode("bad base64".into()).error_code(),
            PRINT_FAILED
        );
        assert_eq!(
            PrintError::from(EncodingError::EmptyBitmap {
                width: 0,
                height: 0
            })
            .error_code(),
            PRINT_FAILED
        );
    }

    #[test]
    fn test_from_connect_error() {
        let err = PrintError::from(ConnectError::ClaimFailed {
            identity: ID,
            reason: "busy".into(),
        });
        assert_eq!(err.error_code(), CONNECTION_FAILED);
        assert!(err.to_string().contains("0fe6:811e"));

        let err = PrintError::from(ConnectError::DeviceNotFound(ID));
        assert!(matches!(err, PrintError::DeviceNotFound { identity } if identity == ID));
    }

    #[test]
    fn test_channel_error_is_queue_closed() {
        let err = PrintError::from(common::Error::Channel("job queue closed".into()));
        assert!(matches!(err, PrintError::QueueClosed));
    }
}
