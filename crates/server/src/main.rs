//! usb-print-agent
//!
//! Local print agent for USB thermal receipt and label printers.
//! Exposes an HTTP API that applications use to list printers and print.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use server::api::{self, AppState};
use server::config::{AgentConfig, load_config};
use server::pipeline::JobPipeline;
use server::usb::{DeviceCatalog, DeviceDirectory, SessionRegistry, UsbConnector};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-print-agent")]
#[command(
    author,
    version,
    about = "USB print agent - print receipts and labels over a local HTTP API"
)]
#[command(long_about = "
Local print agent for USB thermal receipt printers (ESC/POS) and label
printers (ZPL). Applications post base64 images to the HTTP API; the agent
encodes them and writes them to the printer, one job at a time per printer.

EXAMPLES:
    # Run with default config
    usb-print-agent

    # Run with custom config
    usb-print-agent --config /path/to/agent.toml

    # List detected printers without starting the server
    usb-print-agent --list-printers

    # List every USB device, printer or not
    usb-print-agent --list-printers --all-devices

    # Run with debug logging on another port
    usb-print-agent --log-level debug --port 6060

CONFIGURATION:
    The agent looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-print-agent/agent.toml
    3. /etc/usb-print-agent/agent.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List printers and exit
    #[arg(long)]
    list_printers: bool,

    /// With --list-printers, list every device without classification
    #[arg(long, requires = "list_printers")]
    all_devices: bool,

    /// Port to listen on, overriding the configured bind address
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = AgentConfig::default();
        let path = AgentConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        load_config(path).context("Failed to load configuration")?
    } else {
        AgentConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-print-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let directory = DeviceDirectory::new(config.usb.extra_vendor_ids())
        .context("Failed to initialize libusb")?;

    if args.list_printers {
        list_printers_mode(&directory, !args.all_devices);
        return Ok(());
    }

    run_server(config, directory, args.port).await
}

/// Print the device listing and exit
fn list_printers_mode(directory: &DeviceDirectory, classify: bool) {
    let devices = directory.list_printers(classify);

    if devices.is_empty() {
        println!("No printers found.");
        return;
    }

    println!("Found {} device(s):\n", devices.len());
    for device in devices {
        println!(
            "  {} - {} ({} {})",
            device.identity, device.display_name, device.manufacturer, device.product
        );
        println!(
            "      Bus {:03} Device {:03} Type: {:?} Vendor: {} Matched by: {:?}",
            device.bus, device.address, device.device_type, device.vendor_name, device.matched_by
        );
        if let Some(serial) = &device.serial_number {
            println!("      Serial: {}", serial);
        }
        if let Some(endpoint) = device.bulk_out_endpoint() {
            println!("      Bulk OUT endpoint: {:#04x}", endpoint.address);
        }
        println!();
    }
}

/// Serve the HTTP API until Ctrl+C, then shut every print session down
async fn run_server(config: AgentConfig, directory: DeviceDirectory, port: Option<u16>) -> Result<()> {
    let mut addr = config.bind_addr()?;
    if let Some(port) = port {
        addr.set_port(port);
    }

    let connector = UsbConnector::new(
        directory.context().clone(),
        config.usb.interface,
        config.usb.endpoint_out,
        config.usb.write_timeout(),
    );
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(connector),
        config.session_settings(),
    ));
    let label_printer = config.label.identity()?;
    let pipeline = JobPipeline::new(
        registry.clone(),
        Arc::new(directory),
        label_printer,
        config.label.dpi,
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Press Ctrl+C to shutdown");

    let result = api::serve(listener, AppState::new(pipeline), shutdown_signal())
        .await
        .context("HTTP server error");

    info!("Shutting down print sessions...");
    if let Err(e) = tokio::task::spawn_blocking(move || registry.shutdown_all()).await {
        error!("Print session shutdown panicked: {}", e);
    }

    info!("Agent shutdown complete");
    result
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }
}
