//! Printer status ticket
//!
//! A short diagnostic print identifying the printer and the host running the
//! agent. Receipt printers get an ESC/POS text ticket, label printers a fixed
//! ZPL test label.

use protocol::{DeviceDescriptor, PrinterAction, TicketBuilder, zpl};

const UNKNOWN: &str = "Unknown";

/// Facts printed on the status ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTicket {
    pub printer_name: String,
    pub action: PrinterAction,
    pub vendor_id: u16,
    pub product_id: u16,
    pub hostname: String,
    pub ip_address: String,
}

impl StatusTicket {
    /// Collect ticket facts for `printer`, looking up this host's name and address
    pub fn collect(printer: &DeviceDescriptor, action: PrinterAction) -> Self {
        let hostname = sysinfo::System::host_name()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let ip_address = local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|e| {
                tracing::debug!("Local IP lookup failed: {}", e);
                UNKNOWN.to_string()
            });

        Self::new(printer, action, hostname, ip_address)
    }

    pub fn new(
        printer: &DeviceDescriptor,
        action: PrinterAction,
        hostname: String,
        ip_address: String,
    ) -> Self {
        Self {
            printer_name: printer.display_name.clone(),
            action,
            vendor_id: printer.identity.vendor_id,
            product_id: printer.identity.product_id,
            hostname,
            ip_address,
        }
    }

    /// Command stream for the printer class
    pub fn render(&self) -> Vec<u8> {
        match self.action {
            PrinterAction::ReceiptPrinter => self.to_escpos(),
            PrinterAction::LabelPrinter => zpl::STATUS_LABEL.as_bytes().to_vec(),
        }
    }

    pub fn to_escpos(&self) -> Vec<u8> {
        let mut ticket = TicketBuilder::new();
        ticket
            .center()
            .title("Printer Status")
            .newline()
            .line("Printer")
            .pair("Printer Name", &self.printer_name)
            .pair("Printer Type", self.action.as_str())
            .newline()
            .line("System")
            .pair("Hostname", &self.hostname)
            .pair("IP Address", &self.ip_address)
            .newline()
            .line("Connection")
            .pair("Vendor ID", &format!("{:04x}", self.vendor_id))
            .pair("Product ID", &format!("{:04x}", self.product_id))
            .cut();
        ticket.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::create_mock_printer;

    fn ticket(action: PrinterAction) -> StatusTicket {
        let printer = create_mock_printer(0x0fe6, 0x811e, "POS58");
        StatusTicket::new(&printer, action, "till-01".into(), "192.168.1.20".into())
    }

    #[test]
    fn test_receipt_ticket() {
        let out = ticket(PrinterAction::ReceiptPrinter).render();
        let text = String::from_utf8_lossy(&out);

        assert!(out.starts_with(&[0x1B, b'@', 0x1B, b'a', 0x01]));
        assert!(text.contains("\x1b!\x30Printer Status\x1b!\x00\n"));
        assert!(text.contains("Printer Name : POS58\n"));
        assert!(text.contains("Printer Type : receipt_printer\n"));
        assert!(text.contains("Hostname : till-01\n"));
        assert!(text.contains("IP Address : 192.168.1.20\n"));
        assert!(text.contains("Vendor ID : 0fe6\n"));
        assert!(text.contains("Product ID : 811e\n"));
        assert!(out.ends_with(b"\x1dVA\n"));
    }

    #[test]
    fn test_label_ticket_is_fixed_zpl() {
        let out = ticket(PrinterAction::LabelPrinter).render();
        assert!(out.starts_with(b"^XA"));
        assert!(out.ends_with(b"^XZ"));
    }

    #[test]
    fn test_collect_fills_host_fields() {
        let printer = create_mock_printer(0x04b8, 0x0e15, "TM-T20");
        let ticket = StatusTicket::collect(&printer, PrinterAction::ReceiptPrinter);
        assert!(!ticket.hostname.is_empty());
        assert!(!ticket.ip_address.is_empty());
        assert_eq!(ticket.printer_name, "TM-T20");
    }
}
