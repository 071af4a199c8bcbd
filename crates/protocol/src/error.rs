//! Protocol error types

use thiserror::Error;

/// Errors raised while building printer command streams
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// The bitmap has no pixels to print
    #[error("Bitmap is empty ({width}x{height})")]
    EmptyBitmap { width: u32, height: u32 },

    /// Requested output dimensions cannot be encoded
    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Errors raised while parsing USB vendor/product identifiers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// Identifier string is empty
    #[error("Missing {0}")]
    Missing(&'static str),

    /// Identifier is not a 1-4 digit hex number
    #[error("Invalid {field} '{value}', expected 1-4 hex digits")]
    InvalidHex { field: &'static str, value: String },
}

/// Type alias for encoder results
pub type Result<T> = std::result::Result<T, EncodingError>;
