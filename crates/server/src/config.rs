//! Agent configuration management

use crate::usb::SessionSettings;
use anyhow::{Context, Result, anyhow};
use protocol::{UsbDeviceIdentity, parse_hex_id};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    /// Default label printer for the label route
    #[serde(default)]
    pub label: LabelSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "ServerSettings::default_log_level")]
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: Self::default_bind_addr(),
            log_level: Self::default_log_level(),
        }
    }
}

impl ServerSettings {
    fn default_bind_addr() -> String {
        "127.0.0.1:5050".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Interface claimed on every printer
    #[serde(default)]
    pub interface: u8,
    /// Bulk OUT endpoint address
    #[serde(default = "UsbSettings::default_endpoint_out")]
    pub endpoint_out: u8,
    #[serde(default = "UsbSettings::default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Pause after each successful write so the printer buffer drains
    #[serde(default = "UsbSettings::default_settle_delay")]
    pub settle_delay_ms: u64,
    /// Jobs buffered per printer before submitters wait
    #[serde(default = "UsbSettings::default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long shutdown waits for each worker thread
    #[serde(default = "UsbSettings::default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    /// Vendor ids treated as printers on top of the built-in table
    #[serde(default)]
    pub extra_printer_vendors: Vec<String>,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            interface: 0,
            endpoint_out: Self::default_endpoint_out(),
            write_timeout_ms: Self::default_write_timeout(),
            settle_delay_ms: Self::default_settle_delay(),
            queue_capacity: Self::default_queue_capacity(),
            shutdown_timeout_secs: Self::default_shutdown_timeout(),
            extra_printer_vendors: Vec::new(),
        }
    }
}

impl UsbSettings {
    fn default_endpoint_out() -> u8 {
        0x01
    }

    fn default_write_timeout() -> u64 {
        5000
    }

    fn default_settle_delay() -> u64 {
        30
    }

    fn default_queue_capacity() -> usize {
        common::DEFAULT_QUEUE_CAPACITY
    }

    fn default_shutdown_timeout() -> u64 {
        5
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Parsed `extra_printer_vendors`, skipping entries that do not parse
    pub fn extra_vendor_ids(&self) -> Vec<u16> {
        self.extra_printer_vendors
            .iter()
            .filter_map(|id| parse_hex_id(id, "vendor_id").ok())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSettings {
    #[serde(default = "LabelSettings::default_dpi")]
    pub dpi: u32,
    #[serde(default = "LabelSettings::default_vendor_id")]
    pub vendor_id: String,
    #[serde(default = "LabelSettings::default_product_id")]
    pub product_id: String,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            dpi: Self::default_dpi(),
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
        }
    }
}

impl LabelSettings {
    fn default_dpi() -> u32 {
        protocol::zpl::DEFAULT_DPI
    }

    // Zebra
    fn default_vendor_id() -> String {
        "0x0a5f".to_string()
    }

    fn default_product_id() -> String {
        "0x0187".to_string()
    }

    pub fn identity(&self) -> Result<UsbDeviceIdentity> {
        UsbDeviceIdentity::parse(&self.vendor_id, &self.product_id)
            .map_err(|e| anyhow!("Invalid label printer id: {}", e))
    }
}

impl AgentConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-print-agent/agent.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-print-agent").join("agent.toml")
        } else {
            PathBuf::from(".config/usb-print-agent/agent.toml")
        }
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", self.server.bind_addr))
    }

    /// Per-session timings derived from the `[usb]` table
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            queue_capacity: self.usb.queue_capacity,
            settle_delay: Duration::from_millis(self.usb.settle_delay_ms),
            shutdown_timeout: Duration::from_secs(self.usb.shutdown_timeout_secs),
            ..SessionSettings::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        self.bind_addr()?;

        if self.usb.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity must be greater than 0"));
        }
        if self.usb.write_timeout_ms == 0 {
            return Err(anyhow!("write_timeout_ms must be greater than 0"));
        }

        for vendor in &self.usb.extra_printer_vendors {
            Self::validate_hex_id(vendor, "extra_printer_vendors")?;
        }
        Self::validate_hex_id(&self.label.vendor_id, "label vendor_id")?;
        Self::validate_hex_id(&self.label.product_id, "label product_id")?;

        if self.label.dpi == 0 {
            return Err(anyhow!("label dpi must be greater than 0"));
        }

        Ok(())
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        if !id.starts_with("0x") && !id.starts_with("0X") {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                name,
                id
            ));
        }

        let hex_part = &id[2..];
        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

        Ok(())
    }
}

/// Load a config file from a user-supplied path, expanding `~`
pub fn load_config(path: &str) -> Result<AgentConfig> {
    AgentConfig::load(Some(expand_path(path)))
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
