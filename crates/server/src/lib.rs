//! usb-print-agent server
//!
//! Local print agent for USB receipt and label printers. Discovers attached
//! printers, encodes images as ESC/POS raster or ZPL commands, and writes them
//! through one serialized print session per printer, behind a small HTTP API.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod status;
pub mod usb;

pub use error::{PrintError, Result};
