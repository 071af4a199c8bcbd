//! HTTP API
//!
//! Thin JSON layer over the job pipeline. Every route answers 200 with a
//! `{status, message, printer?, error_code?}` body; failures are reported
//! through `status: false` and an error code, never an HTTP error status.
//! Bodies that fail to parse get `PRINT_FAILED`.

mod handlers;

pub use handlers::{LabelBody, PrintBody, PrinterRef, PrinterResponse, StatusBody};

use crate::pipeline::JobPipeline;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Base64 images are large; allow up to 20MB bodies
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// State shared by all handlers
pub struct AppState {
    pub pipeline: JobPipeline,
}

impl AppState {
    pub fn new(pipeline: JobPipeline) -> Arc<Self> {
        Arc::new(Self { pipeline })
    }
}

/// Build the application router with middleware and state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/printer", get(handlers::list_printers))
        .route("/print", post(handlers::print))
        .route("/print/status", post(handlers::print_status))
        .route("/test-lable", post(handlers::print_label))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        // Called from browser apps on other origins
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
