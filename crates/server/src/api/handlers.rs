//! Route handlers

use super::AppState;
use crate::error::{PRINT_FAILED, PRINTER_NOT_FOUND, PrintError};
use crate::pipeline::{LabelRequest, PrintRequest};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use protocol::{DeviceDescriptor, PrinterAction, UsbDeviceIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterResponse {
    pub status: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printer: Option<Vec<DeviceDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl PrinterResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
            printer: None,
            error_code: None,
        }
    }

    fn with_printers(mut self, printers: Vec<DeviceDescriptor>) -> Self {
        self.printer = Some(printers);
        self
    }

    fn fail(message: impl Into<String>, error_code: &str) -> Self {
        Self {
            status: false,
            message: message.into(),
            printer: None,
            error_code: Some(error_code.to_string()),
        }
    }

    fn from_error(context: &str, err: &PrintError) -> Self {
        warn!("{}: {}", context, err);
        Self::fail(format!("{}: {}", context, err), err.error_code())
    }

    fn rejected(rejection: &JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        Self::fail(
            format!("Invalid request: {}", rejection.body_text()),
            PRINT_FAILED,
        )
    }
}

/// Unwrap a JSON body or answer with the usual failure envelope
macro_rules! json_body {
    ($payload:expr) => {
        match $payload {
            Ok(Json(body)) => body,
            Err(rejection) => return Json(PrinterResponse::rejected(&rejection)),
        }
    };
}

/// Printer reference as sent by clients
///
/// Usually an entry of the `GET /printer` listing; only the ids are read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrinterRef {
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
}

impl PrinterRef {
    fn identity(&self) -> Result<UsbDeviceIdentity, String> {
        match (self.vendor_id.as_deref(), self.product_id.as_deref()) {
            (Some(vid), Some(pid)) if !vid.is_empty() && !pid.is_empty() => {
                UsbDeviceIdentity::parse(vid, pid).map_err(|e| e.to_string())
            }
            _ => Err("Printer identification is missing".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrintBody {
    pub action: PrinterAction,
    #[serde(default)]
    pub printer: PrinterRef,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub cash_drawer: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusBody {
    pub action: PrinterAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelBody {
    pub image: String,
    #[serde(alias = "width")]
    pub width_cm: f64,
    #[serde(alias = "height")]
    pub height_cm: f64,
}

/// GET /
pub async fn health() -> Json<Value> {
    Json(json!({ "status": true, "message": "Printer server is running." }))
}

/// GET /printer
pub async fn list_printers(State(state): State<Arc<AppState>>) -> Json<PrinterResponse> {
    let response = match state.pipeline.list_printers(true).await {
        Ok(printers) if !printers.is_empty() => {
            PrinterResponse::ok("Printers found").with_printers(printers)
        }
        Ok(_) => PrinterResponse::fail("No printers available", PRINTER_NOT_FOUND),
        Err(e) => PrinterResponse::from_error("Failed to list printers", &e),
    };
    Json(response)
}

/// POST /print
pub async fn print(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PrintBody>, JsonRejection>,
) -> Json<PrinterResponse> {
    let body = json_body!(payload);
    let identity = match body.printer.identity() {
        Ok(identity) => identity,
        Err(message) => return Json(PrinterResponse::fail(message, PRINTER_NOT_FOUND)),
    };

    let request = PrintRequest {
        identity,
        action: body.action,
        receipt: body.receipt.filter(|data| !data.is_empty()),
        cash_drawer: body.cash_drawer,
    };

    let response = match state.pipeline.submit_print(request).await {
        Ok(()) => PrinterResponse::ok("Print job queued successfully"),
        Err(e) => PrinterResponse::from_error("Failed to print receipt", &e),
    };
    Json(response)
}

/// POST /print/status
pub async fn print_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> Json<PrinterResponse> {
    let body = json_body!(payload);
    let response = match state.pipeline.print_status(body.action).await {
        Ok(printer) => PrinterResponse::ok(format!(
            "Status ticket queued for {}",
            printer.display_name
        ))
        .with_printers(vec![printer]),
        Err(PrintError::NoPrinters) => {
            PrinterResponse::fail("No printers available", PRINTER_NOT_FOUND)
        }
        Err(e) => PrinterResponse::from_error("Failed to print status ticket", &e),
    };
    Json(response)
}

/// POST /test-lable
pub async fn print_label(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LabelBody>, JsonRejection>,
) -> Json<PrinterResponse> {
    let body = json_body!(payload);
    let request = LabelRequest {
        image: body.image,
        width_cm: body.width_cm,
        height_cm: body.height_cm,
    };

    let response = match state.pipeline.submit_label(request).await {
        Ok(identity) => PrinterResponse::ok(format!("Label queued for {}", identity)),
        Err(e) => PrinterResponse::from_error("Failed to print label", &e),
    };
    Json(response)
}
