//! Print job pipeline
//!
//! Turns requests into command streams and queues them on the right printer
//! session: decode the base64 image, threshold it to a bitmap, encode for the
//! printer class, then hand the bytes to [`DeviceSession::print_raw`].
//!
//! Image decoding, encoding and USB enumeration are blocking work and run on
//! Tokio's blocking pool. Nothing here waits for the printer itself.

use crate::error::{PrintError, Result};
use crate::status::StatusTicket;
use crate::usb::{DeviceCatalog, DeviceSession, SessionRegistry};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use protocol::{
    Bitmap, DeviceDescriptor, EncodingError, PrinterAction, UsbDeviceIdentity, escpos, zpl,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Print a receipt image and/or open the cash drawer
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub identity: UsbDeviceIdentity,
    pub action: PrinterAction,
    /// Base64 image, optionally as a data URL
    pub receipt: Option<String>,
    pub cash_drawer: bool,
}

/// Print an image as a label of the given size
#[derive(Debug, Clone)]
pub struct LabelRequest {
    pub image: String,
    pub width_cm: f64,
    pub height_cm: f64,
}

pub struct JobPipeline {
    registry: Arc<SessionRegistry>,
    catalog: Arc<dyn DeviceCatalog>,
    label_printer: UsbDeviceIdentity,
    label_dpi: u32,
}

impl JobPipeline {
    pub fn new(
        registry: Arc<SessionRegistry>,
        catalog: Arc<dyn DeviceCatalog>,
        label_printer: UsbDeviceIdentity,
        label_dpi: u32,
    ) -> Self {
        Self {
            registry,
            catalog,
            label_printer,
            label_dpi,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Enumerate devices on the blocking pool
    pub async fn list_printers(&self, classify: bool) -> Result<Vec<DeviceDescriptor>> {
        let catalog = self.catalog.clone();
        blocking(move || Ok(catalog.list_printers(classify))).await
    }

    async fn find_device(&self, identity: UsbDeviceIdentity) -> Result<DeviceDescriptor> {
        let catalog = self.catalog.clone();
        blocking(move || {
            catalog
                .find(identity)
                .ok_or(PrintError::DeviceNotFound { identity })
        })
        .await
    }

    fn session(&self, identity: UsbDeviceIdentity) -> Result<Arc<DeviceSession>> {
        self.registry
            .get_session(identity)
            .map_err(|e| PrintError::Internal(format!("failed to start print session: {}", e)))
    }

    /// Queue a receipt and/or drawer kick
    ///
    /// The printer must be attached; otherwise no session is created. The
    /// drawer kick, if requested and supported, is queued before the receipt.
    pub async fn submit_print(&self, request: PrintRequest) -> Result<()> {
        let identity = request.identity;
        self.find_device(identity).await?;

        let payload = match request.receipt {
            Some(data) => {
                let action = request.action;
                Some(blocking(move || encode_image(&data, action)).await?)
            }
            None => None,
        };

        let session = self.session(identity)?;

        if request.cash_drawer {
            if request.action.supports_cash_drawer() {
                session.print_raw(escpos::drawer_kick_sequence()).await?;
            } else {
                debug!("Ignoring cash drawer request for {} {}", request.action, identity);
            }
        }

        if let Some(payload) = payload {
            info!(
                bytes = payload.len(),
                "Queued {} job for {}", request.action, identity
            );
            session.print_raw(payload).await?;
        }

        Ok(())
    }

    /// Queue a ZPL label on the configured label printer
    pub async fn submit_label(&self, request: LabelRequest) -> Result<UsbDeviceIdentity> {
        let identity = self.label_printer;
        self.find_device(identity).await?;

        let dpi = self.label_dpi;
        let payload = blocking(move || {
            let width = zpl::cm_to_pixels_at(request.width_cm, dpi);
            let height = zpl::cm_to_pixels_at(request.height_cm, dpi);

            let image = decode_image(&request.image)?;
            let label = zpl::encode_label(&Bitmap::from_image(&image), width, height)?;
            if label.is_empty() {
                return Err(EncodingError::InvalidDimensions { width, height }.into());
            }

            let mut payload = Vec::with_capacity(zpl::WAKE_UP.len() + label.len());
            payload.extend_from_slice(&zpl::WAKE_UP);
            payload.extend_from_slice(&label);
            Ok(payload)
        })
        .await?;

        info!(bytes = payload.len(), "Queued label for {}", identity);
        self.session(identity)?.print_raw(payload).await?;
        Ok(identity)
    }

    /// Queue a status ticket on the first detected printer
    pub async fn print_status(&self, action: PrinterAction) -> Result<DeviceDescriptor> {
        let printer = self
            .list_printers(true)
            .await?
            .into_iter()
            .next()
            .ok_or(PrintError::NoPrinters)?;

        let target = printer.clone();
        let payload = blocking(move || Ok(StatusTicket::collect(&target, action).render())).await?;

        self.session(printer.identity)?.print_raw(payload).await?;
        info!("Queued status ticket for {}", printer.display_name);
        Ok(printer)
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PrintError::Internal(format!("blocking task failed: {}", e)))?
}

/// Decode a base64 image, accepting an optional `data:` URL prefix
pub fn decode_image(data: &str) -> Result<DynamicImage> {
    let data = data.trim();
    let encoded = match data.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, payload)| payload)
            .ok_or_else(|| PrintError::Decode("malformed data URL".to_string()))?,
        None => data,
    };

    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| PrintError::Decode(format!("invalid base64: {}", e)))?;

    image::load_from_memory(&bytes).map_err(|e| PrintError::Decode(e.to_string()))
}

/// Decode and encode an image for the printer class
pub fn encode_image(data: &str, action: PrinterAction) -> Result<Vec<u8>> {
    let image = decode_image(data)?;
    let bitmap = Bitmap::from_image(&image);

    let payload = match action {
        PrinterAction::ReceiptPrinter => escpos::encode_raster(&bitmap)?,
        PrinterAction::LabelPrinter => zpl::encode_bitmap(&bitmap)?,
    };
    if payload.is_empty() {
        return Err(EncodingError::EmptyBitmap {
            width: bitmap.width(),
            height: bitmap.height(),
        }
        .into());
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::SessionSettings;
    use common::test_utils::{DEFAULT_TEST_TIMEOUT, MockConnector, create_mock_printer};
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use std::time::Duration;

    const RECEIPT: UsbDeviceIdentity = UsbDeviceIdentity::new(0x0fe6, 0x811e);
    const LABEL: UsbDeviceIdentity = UsbDeviceIdentity::new(0x0a5f, 0x0187);

    fn png_base64(width: u32, height: u32) -> String {
        let image = GrayImage::from_fn(width, height, |x, _| {
            if x % 2 == 0 { Luma([0]) } else { Luma([255]) }
        });
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        BASE64.encode(buf)
    }

    fn pipeline(connector: &MockConnector) -> JobPipeline {
        let catalog: Vec<DeviceDescriptor> = vec![
            create_mock_printer(RECEIPT.vendor_id, RECEIPT.product_id, "POS58"),
            create_mock_printer(LABEL.vendor_id, LABEL.product_id, "ZD220"),
        ];
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(connector.clone()),
            SessionSettings {
                settle_delay: Duration::from_millis(1),
                ..SessionSettings::default()
            },
        ));
        JobPipeline::new(registry, Arc::new(catalog), LABEL, 203)
    }

    fn request(identity: UsbDeviceIdentity, action: PrinterAction) -> PrintRequest {
        PrintRequest {
            identity,
            action,
            receipt: Some(png_base64(12, 3)),
            cash_drawer: false,
        }
    }

    #[test]
    fn test_decode_image_accepts_data_url() {
        let raw = png_base64(4, 4);
        assert!(decode_image(&raw).is_ok());
        assert!(decode_image(&format!("data:image/png;base64,{}", raw)).is_ok());
        assert!(matches!(decode_image("not base64!"), Err(PrintError::Decode(_))));
        assert!(matches!(
            decode_image(&BASE64.encode(b"plain text")),
            Err(PrintError::Decode(_))
        ));
    }

    #[test]
    fn test_encode_image_per_action() {
        let data = png_base64(12, 3);

        let receipt = encode_image(&data, PrinterAction::ReceiptPrinter).unwrap();
        assert!(receipt.starts_with(&escpos::INITIALIZE));
        // 12px wide pads to 2 bytes per row
        assert_eq!(&receipt[5..13], &[0x1D, b'v', b'0', 0x00, 2, 0, 3, 0]);
        assert_eq!(&receipt[13..15], &[0b1010_1010, 0b1010_0000]);

        let label = encode_image(&data, PrinterAction::LabelPrinter).unwrap();
        assert!(label.starts_with(b"^XA\n^PW8\n"));
    }

    #[test]
    fn test_encode_image_too_narrow_for_label() {
        let data = png_base64(4, 4);
        assert!(matches!(
            encode_image(&data, PrinterAction::LabelPrinter),
            Err(PrintError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_printer_creates_no_session() {
        let connector = MockConnector::new();
        let pipeline = pipeline(&connector);

        let unknown = UsbDeviceIdentity::new(0xdead, 0xbeef);
        let err = pipeline
            .submit_print(request(unknown, PrinterAction::ReceiptPrinter))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "PRINTER_NOT_FOUND");
        assert!(pipeline.registry().is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_creates_no_session() {
        let connector = MockConnector::new();
        let pipeline = pipeline(&connector);

        let mut req = request(RECEIPT, PrinterAction::ReceiptPrinter);
        req.receipt = Some("%%%".to_string());
        let err = pipeline.submit_print(req).await.unwrap_err();

        assert_eq!(err.error_code(), "PRINT_FAILED");
        assert!(pipeline.registry().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_with_cash_drawer() {
        let connector = MockConnector::new();
        let pipeline = pipeline(&connector);

        let mut req = request(RECEIPT, PrinterAction::ReceiptPrinter);
        req.cash_drawer = true;
        pipeline.submit_print(req).await.unwrap();

        assert!(connector.wait_for_writes(RECEIPT, 2, DEFAULT_TEST_TIMEOUT));
        let writes = connector.writes_for(RECEIPT);
        assert_eq!(writes[0], escpos::drawer_kick_sequence());
        assert!(writes[1].starts_with(&escpos::INITIALIZE));
        assert!(writes[1].ends_with(&escpos::FULL_CUT));
        pipeline.registry().shutdown_all();
    }

    #[tokio::test]
    async fn test_label_action_ignores_cash_drawer() {
        let connector = MockConnector::new();
        let pipeline = pipeline(&connector);

        let mut req = request(LABEL, PrinterAction::LabelPrinter);
        req.cash_drawer = true;
        pipeline.submit_print(req).await.unwrap();

        assert!(connector.wait_for_writes(LABEL, 1, DEFAULT_TEST_TIMEOUT));
        let writes = connector.writes_for(LABEL);
        assert_eq!(writes.len(), 1);
        assert!(writes[0].starts_with(b"^XA"));
        pipeline.registry().shutdown_all();
    }

    #[tokio::test]
    async fn test_submit_label_prepends_wake_up() {
        let connector = MockConnector::new();
        let pipeline = pipeline(&connector);

        let identity = pipeline
            .submit_label(LabelRequest {
                image: png_base64(40, 20),
                width_cm: 5.08,
                height_cm: 2.54,
            })
            .await
            .unwrap();
        assert_eq!(identity, LABEL);

        assert!(connector.wait_for_writes(LABEL, 1, DEFAULT_TEST_TIMEOUT));
        let payload = &connector.writes_for(LABEL)[0];
        assert!(payload.starts_with(b"\x00\x00^XA\n^PW400\n^FO0,0\n^GFA,10000,10000,50,"));
        pipeline.registry().shutdown_all();
    }

    #[tokio::test]
    async fn test_submit_label_zero_size() {
        let connector = MockConnector::new();
        let pipeline = pipeline(&connector);

        let err = pipeline
            .submit_label(LabelRequest {
                image: png_base64(8, 8),
                width_cm: 0.0,
                height_cm: 2.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::Encoding(_)));
        assert!(pipeline.registry().is_empty());
    }

    #[tokio::test]
    async fn test_submit_label_too_large() {
        let connector = MockConnector::new();
        let pipeline = pipeline(&connector);

        let err = pipeline
            .submit_label(LabelRequest {
                image: png_base64(8, 8),
                width_cm: 100_000.0,
                height_cm: 100_000.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PrintError::Encoding(EncodingError::InvalidDimensions { .. })
        ));
        assert_eq!(err.error_code(), "PRINT_FAILED");
        assert!(pipeline.registry().is_empty());
    }

    #[tokio::test]
    async fn test_status_goes_to_first_printer() {
        let connector = MockConnector::new();
        let pipeline = pipeline(&connector);

        let printer = pipeline
            .print_status(PrinterAction::ReceiptPrinter)
            .await
            .unwrap();
        assert_eq!(printer.identity, RECEIPT);

        assert!(connector.wait_for_writes(RECEIPT, 1, DEFAULT_TEST_TIMEOUT));
        let ticket = String::from_utf8_lossy(&connector.writes_for(RECEIPT)[0]).into_owned();
        assert!(ticket.contains("Printer Status"));
        assert!(ticket.contains("Printer Name : POS58"));
        pipeline.registry().shutdown_all();
    }
}
