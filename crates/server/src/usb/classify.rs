//! Printer classification rules
//!
//! A device counts as a printer if any rule matches, checked in this order:
//! known printer vendor, printer interface class (0x07), or a printer keyword
//! in its manufacturer/product strings. Host controllers and hubs are filtered
//! out before classification.

use protocol::{MatchedBy, PRINTER_INTERFACE_CLASS};

/// Vendors whose devices are treated as printers
pub const PRINTER_VENDORS: &[(u16, &str)] = &[
    (0x4b43, "Caysn"),
    (0x0fe6, "RuGtek or Xprinter"),
    (0x04b8, "EPSON"),
    (0x1504, "BIXOLON"),
    (0x0416, "Winbond"),
    (0x1fc9, "POSBANK"),
    (0x0519, "Star Micronics"),
    (0x0a5f, "Zebra"),
];

/// Substrings marking USB infrastructure rather than peripherals
const SYSTEM_KEYWORDS: &[&str] = &[
    "linux",
    "xhci-hcd",
    "ehci-hcd",
    "root hub",
    "usb hub",
    "microsoft",
    "standard usb host controller",
    "usb root hub",
    "generic usb hub",
    "apple",
    "usb host controller",
    "usb high-speed bus",
];

const PRINTER_KEYWORDS: &[&str] = &["printer", "thermal", "receipt", "pos", "rugtek", "xprinter"];

/// Linux Foundation, vendor of the virtual root hubs
const ROOT_HUB_VENDOR: u16 = 0x1d6b;
const HUB_CLASS: u8 = 0x09;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Whether a device is a host controller or hub
pub fn is_system_device(manufacturer: &str, product: &str) -> bool {
    contains_any(manufacturer, SYSTEM_KEYWORDS) || contains_any(product, SYSTEM_KEYWORDS)
}

/// Root hubs are skipped without opening them
pub fn is_root_hub(vendor_id: u16, class_code: u8) -> bool {
    vendor_id == ROOT_HUB_VENDOR && class_code == HUB_CLASS
}

/// Display name for a known printer vendor
pub fn vendor_name(vendor_id: u16) -> Option<&'static str> {
    PRINTER_VENDORS
        .iter()
        .find(|(id, _)| *id == vendor_id)
        .map(|(_, name)| *name)
}

/// Device facts the rules look at
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub vendor_id: u16,
    pub manufacturer: &'a str,
    pub product: &'a str,
    pub interface_classes: &'a [u8],
}

/// Rule set with the built-in vendor table plus configured extras
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    extra_vendors: Vec<u16>,
}

impl Classifier {
    pub fn new(extra_vendors: Vec<u16>) -> Self {
        Self { extra_vendors }
    }

    pub fn is_printer_vendor(&self, vendor_id: u16) -> bool {
        vendor_name(vendor_id).is_some() || self.extra_vendors.contains(&vendor_id)
    }

    /// First rule that identifies `candidate` as a printer
    pub fn classify(&self, candidate: &Candidate<'_>) -> Option<MatchedBy> {
        if self.is_printer_vendor(candidate.vendor_id) {
            return Some(MatchedBy::VendorId);
        }
        if candidate
            .interface_classes
            .contains(&PRINTER_INTERFACE_CLASS)
        {
            return Some(MatchedBy::InterfaceClass);
        }
        if contains_any(candidate.product, PRINTER_KEYWORDS)
            || contains_any(candidate.manufacturer, PRINTER_KEYWORDS)
        {
            return Some(MatchedBy::NameKeyword);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(vendor_id: u16, manufacturer: &'a str, product: &'a str, classes: &'a [u8]) -> Candidate<'a> {
        Candidate {
            vendor_id,
            manufacturer,
            product,
            interface_classes: classes,
        }
    }

    #[test]
    fn test_system_devices() {
        assert!(is_system_device("Linux Foundation", "2.0 root hub"));
        assert!(is_system_device("Unknown", "xHCI-hcd Host Controller"));
        assert!(is_system_device("Apple Inc.", "Keyboard"));
        assert!(!is_system_device("EPSON", "TM-T20II"));
        assert!(is_root_hub(0x1d6b, 0x09));
        assert!(!is_root_hub(0x1d6b, 0x00));
    }

    #[test]
    fn test_rule_order() {
        let classifier = Classifier::default();

        // Vendor wins even when the interface class also matches
        let c = candidate(0x04b8, "EPSON", "TM-T20", &[0x07]);
        assert_eq!(classifier.classify(&c), Some(MatchedBy::VendorId));

        let c = candidate(0x1234, "Acme", "Widget", &[0x03, 0x07]);
        assert_eq!(classifier.classify(&c), Some(MatchedBy::InterfaceClass));

        let c = candidate(0x1234, "Acme", "Thermal Receipt 80mm", &[0xff]);
        assert_eq!(classifier.classify(&c), Some(MatchedBy::NameKeyword));

        let c = candidate(0x1234, "Acme", "Mouse", &[0x03]);
        assert_eq!(classifier.classify(&c), None);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let classifier = Classifier::default();
        let c = candidate(0x1234, "XPRINTER", "Unknown", &[]);
        assert_eq!(classifier.classify(&c), Some(MatchedBy::NameKeyword));
    }

    #[test]
    fn test_extra_vendors() {
        let c = candidate(0x2bdf, "Acme", "Box", &[]);
        assert_eq!(Classifier::default().classify(&c), None);
        assert_eq!(
            Classifier::new(vec![0x2bdf]).classify(&c),
            Some(MatchedBy::VendorId)
        );
    }

    #[test]
    fn test_vendor_name() {
        assert_eq!(vendor_name(0x04b8), Some("EPSON"));
        assert_eq!(vendor_name(0x0fe6), Some("RuGtek or Xprinter"));
        assert_eq!(vendor_name(0xdead), None);
    }
}
