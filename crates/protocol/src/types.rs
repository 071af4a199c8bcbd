//! USB printer type definitions
//!
//! This module defines the device-facing types shared by the agent: the
//! vendor/product identity used to key print sessions, the descriptor
//! produced by enumeration, and the print action selecting an encoder.

use crate::error::IdentityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// USB interface class code for printers
pub const PRINTER_INTERFACE_CLASS: u8 = 0x07;

/// Vendor/product pair identifying a printer model
///
/// Sessions are keyed by this pair. Two identical models attached at the
/// same time share one identity.
///
/// Serialized as 4-digit lowercase hex strings (`"04b8"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsbDeviceIdentity {
    /// USB Vendor ID
    #[serde(with = "hex_id")]
    pub vendor_id: u16,
    /// USB Product ID
    #[serde(with = "hex_id")]
    pub product_id: u16,
}

impl UsbDeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Parse an identity from the hex strings used by the HTTP API
    pub fn parse(vendor_id: &str, product_id: &str) -> Result<Self, IdentityError> {
        Ok(Self {
            vendor_id: parse_hex_id(vendor_id, "vendor_id")?,
            product_id: parse_hex_id(product_id, "product_id")?,
        })
    }
}

impl fmt::Display for UsbDeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Parse a base-16 USB identifier, with or without a `0x` prefix
pub fn parse_hex_id(value: &str, field: &'static str) -> Result<u16, IdentityError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::Missing(field));
    }

    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > 4 {
        return Err(IdentityError::InvalidHex {
            field,
            value: value.to_string(),
        });
    }

    u16::from_str_radix(digits, 16).map_err(|_| IdentityError::InvalidHex {
        field,
        value: value.to_string(),
    })
}

mod hex_id {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(id: &u16, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:04x}", id))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u16, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_hex_id(&s, "identifier").map_err(serde::de::Error::custom)
    }
}

/// Coarse device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Printer,
    Other,
}

/// Which classification rule accepted a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchedBy {
    #[serde(rename = "Vendor id")]
    VendorId,
    #[serde(rename = "Interface class")]
    InterfaceClass,
    #[serde(rename = "Name keyword")]
    NameKeyword,
    #[serde(rename = "No Filter Applied")]
    NoFilter,
}

/// Endpoint transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointDirection {
    In,
    Out,
}

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointTransfer {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// One endpoint found while walking a device's interface tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Interface number owning the endpoint
    pub interface: u8,
    /// Endpoint address including the direction bit
    pub address: u8,
    pub direction: EndpointDirection,
    #[serde(rename = "type")]
    pub transfer: EndpointTransfer,
}

/// Device information produced by one enumeration pass
///
/// Not persisted; every listing builds fresh descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(flatten)]
    pub identity: UsbDeviceIdentity,
    /// Manufacturer string, "Unknown" when unreadable
    pub manufacturer: String,
    /// Product string, "Unknown" when unreadable
    pub product: String,
    pub serial_number: Option<String>,
    pub bus: u8,
    pub address: u8,
    /// Interface class codes across all configurations
    pub interface_classes: Vec<u8>,
    #[serde(rename = "usb_interfaces")]
    pub endpoints: Vec<EndpointInfo>,
    pub device_type: DeviceType,
    /// Name unique within one listing
    pub display_name: String,
    /// Vendor name from the known-printer table, "Unknown" otherwise
    pub vendor_name: String,
    pub matched_by: MatchedBy,
}

impl DeviceDescriptor {
    pub fn is_printer(&self) -> bool {
        self.device_type == DeviceType::Printer
    }

    /// First bulk OUT endpoint, if the device exposes one
    pub fn bulk_out_endpoint(&self) -> Option<&EndpointInfo> {
        self.endpoints.iter().find(|ep| {
            ep.direction == EndpointDirection::Out && ep.transfer == EndpointTransfer::Bulk
        })
    }
}

/// Printer class requested by the caller, selecting the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterAction {
    /// ESC/POS receipt printer (raster mode, cutter, cash drawer)
    ReceiptPrinter,
    /// ZPL label printer
    LabelPrinter,
}

impl PrinterAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrinterAction::ReceiptPrinter => "receipt_printer",
            PrinterAction::LabelPrinter => "label_printer",
        }
    }

    /// Whether the device class drives a cash drawer
    pub fn supports_cash_drawer(&self) -> bool {
        matches!(self, PrinterAction::ReceiptPrinter)
    }
}

impl fmt::Display for PrinterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
