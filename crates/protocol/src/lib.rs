//! Printer protocol library for usb-print-agent
//!
//! This crate converts monochrome bitmaps into printer command streams and
//! defines the device types shared by the agent crates. It performs no I/O.
//!
//! - [`escpos`]: ESC/POS raster receipts (`GS v 0`), drawer pulses, text tickets
//! - [`zpl`]: ZPL labels embedding the image as a `^GFA` graphic field
//! - [`types`]: USB identities and enumeration descriptors
//!
//! # Example
//!
//! ```
//! use protocol::{Bitmap, escpos, zpl};
//!
//! let bitmap = Bitmap::from_fn(384, 20, |x, _| x % 2 == 0);
//!
//! let receipt = escpos::encode_raster(&bitmap).unwrap();
//! assert!(receipt.ends_with(&escpos::FULL_CUT));
//!
//! let label = zpl::encode_label(&bitmap, zpl::cm_to_pixels(5.08), 20).unwrap();
//! assert!(label.starts_with(b"^XA\n^PW400\n"));
//! ```

pub mod bitmap;
pub mod error;
pub mod escpos;
pub mod types;
pub mod zpl;

pub use bitmap::Bitmap;
pub use error::{EncodingError, IdentityError, Result};
pub use escpos::TicketBuilder;
pub use types::{
    DeviceDescriptor, DeviceType, EndpointDirection, EndpointInfo, EndpointTransfer, MatchedBy,
    PRINTER_INTERFACE_CLASS, PrinterAction, UsbDeviceIdentity, parse_hex_id,
};
pub use zpl::cm_to_pixels;
