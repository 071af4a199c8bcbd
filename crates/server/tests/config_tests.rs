//! Integration tests for configuration loading
//!
//! Tests agent configuration parsing, including:
//! - Minimal and full config files
//! - Defaults for omitted sections
//! - Invalid configuration handling
//! - Save/load through the filesystem

use server::config::{AgentConfig, load_config};
use std::fs;
use std::time::Duration;

const MINIMAL_CONFIG: &str = r#"
[server]
bind_addr = "127.0.0.1:5050"
log_level = "info"
"#;

const FULL_CONFIG: &str = r#"
[server]
bind_addr = "0.0.0.0:6060"
log_level = "debug"

[usb]
interface = 0
endpoint_out = 2
write_timeout_ms = 3000
settle_delay_ms = 50
queue_capacity = 10
shutdown_timeout_secs = 2
extra_printer_vendors = ["0x2bdf", "0x0dd4"]

[label]
dpi = 300
vendor_id = "0x0a5f"
product_id = "0x0166"
"#;

fn write_config(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("agent.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_minimal_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig::load(Some(write_config(&dir, MINIMAL_CONFIG))).unwrap();

    assert_eq!(config.server.log_level, "info");
    assert_eq!(config.usb.queue_capacity, 100);
    assert_eq!(config.usb.settle_delay_ms, 30);
    assert_eq!(config.label.vendor_id, "0x0a5f");
    assert_eq!(config.bind_addr().unwrap().port(), 5050);
}

#[test]
fn test_load_full_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig::load(Some(write_config(&dir, FULL_CONFIG))).unwrap();

    assert_eq!(config.server.log_level, "debug");
    assert_eq!(config.usb.endpoint_out, 2);
    assert_eq!(config.usb.write_timeout(), Duration::from_secs(3));
    assert_eq!(config.usb.extra_vendor_ids(), vec![0x2bdf, 0x0dd4]);
    assert_eq!(config.label.dpi, 300);

    let settings = config.session_settings();
    assert_eq!(settings.queue_capacity, 10);
    assert_eq!(settings.settle_delay, Duration::from_millis(50));
    assert_eq!(settings.shutdown_timeout, Duration::from_secs(2));
}

#[test]
fn test_empty_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig::load(Some(write_config(&dir, ""))).unwrap();
    assert_eq!(config.server.bind_addr, "127.0.0.1:5050");
    assert_eq!(config.usb.write_timeout_ms, 5000);
}

#[test]
fn test_invalid_configs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let cases = [
        "[server]\nlog_level = \"verbose\"\n",
        "[server]\nbind_addr = \"not an address\"\n",
        "[usb]\nqueue_capacity = 0\n",
        "[usb]\nextra_printer_vendors = [\"2bdf\"]\n",
        "[label]\nproduct_id = \"0x12345\"\n",
        "[usb]\nendpoint_out = \"one\"\n",
    ];

    for case in cases {
        let path = write_config(&dir, case);
        assert!(AgentConfig::load(Some(path)).is_err(), "accepted: {}", case);
    }
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(AgentConfig::load(Some(dir.path().join("missing.toml"))).is_err());
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dir").join("agent.toml");

    let mut config = AgentConfig::default();
    config.usb.settle_delay_ms = 75;
    config.usb.extra_printer_vendors = vec!["0x2bdf".to_string()];
    config.save(&path).unwrap();

    let loaded = load_config(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded.usb.settle_delay_ms, 75);
    assert_eq!(loaded.usb.extra_printer_vendors, vec!["0x2bdf".to_string()]);
}

#[test]
fn test_default_path_location() {
    let path = AgentConfig::default_path();
    assert!(path.ends_with("usb-print-agent/agent.toml"));
}
