//! USB device directory
//!
//! Enumerates attached devices through libusb and turns them into
//! [`DeviceDescriptor`]s. Probing a device and building the listing are kept
//! apart: probing touches the bus and may fail per device, while
//! [`build_listing`] is a pure function applying the filtering, classification
//! and naming rules.

use crate::usb::classify::{Candidate, Classifier, is_root_hub, is_system_device, vendor_name};
use protocol::{
    DeviceDescriptor, DeviceType, EndpointDirection, EndpointInfo, EndpointTransfer, MatchedBy,
    UsbDeviceIdentity,
};
use rusb::{Context, Device, UsbContext};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const UNKNOWN: &str = "Unknown";

/// Timeout for string descriptor reads
const STRING_TIMEOUT: Duration = Duration::from_millis(500);

/// Raw facts read from one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbedDevice {
    pub identity: UsbDeviceIdentity,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub bus: u8,
    pub address: u8,
    pub interface_classes: Vec<u8>,
    pub endpoints: Vec<EndpointInfo>,
}

/// A device whose descriptors could not be read
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to read descriptors of device at {bus}:{address}: {reason}")]
pub struct ProbeError {
    pub bus: u8,
    pub address: u8,
    pub reason: String,
}

/// Source of device listings
///
/// The pipeline and HTTP handlers only see this trait, so they can run
/// against a fixed listing when no USB bus is available.
pub trait DeviceCatalog: Send + Sync {
    /// Enumerate devices; with `classify` only printers are returned
    fn list_printers(&self, classify: bool) -> Vec<DeviceDescriptor>;

    /// Every attached non-system device
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.list_printers(false)
    }

    /// Attached device with this identity, if any
    fn find(&self, identity: UsbDeviceIdentity) -> Option<DeviceDescriptor> {
        self.list_devices()
            .into_iter()
            .find(|device| device.identity == identity)
    }
}

/// A fixed listing, used when devices are known up front
impl DeviceCatalog for Vec<DeviceDescriptor> {
    fn list_printers(&self, classify: bool) -> Vec<DeviceDescriptor> {
        self.iter()
            .filter(|device| !classify || device.is_printer())
            .cloned()
            .collect()
    }
}

/// First free name among `base`, `base (2)`, `base (3)`...
///
/// `counts` remembers the last suffix used per base so repeated bases do not
/// rescan from the start. A candidate is free if no earlier device got it,
/// whether as its plain name or as a suffixed one.
fn unique_name(
    base: &str,
    counts: &mut HashMap<String, usize>,
    taken: &mut HashSet<String>,
) -> String {
    let mut n = counts.get(base).copied().unwrap_or(1);
    let mut name = if n == 1 {
        base.to_string()
    } else {
        format!("{} ({})", base, n)
    };
    while taken.contains(&name) {
        n += 1;
        name = format!("{} ({})", base, n);
    }

    counts.insert(base.to_string(), n);
    taken.insert(name.clone());
    name
}

/// Apply the exclusion, classification and naming rules to probe results
///
/// Failed probes are logged and skipped. Display names are unique within the
/// returned listing: repeats get a ` (2)`, ` (3)`... suffix.
pub fn build_listing(
    probes: Vec<Result<ProbedDevice, ProbeError>>,
    classifier: &Classifier,
    classify: bool,
) -> Vec<DeviceDescriptor> {
    let mut listing = Vec::new();
    let mut name_counts: HashMap<String, usize> = HashMap::new();
    let mut taken_names: HashSet<String> = HashSet::new();
    let mut seen_printers: HashSet<UsbDeviceIdentity> = HashSet::new();

    for probe in probes {
        let device = match probe {
            Ok(device) => device,
            Err(e) => {
                warn!("Skipping device: {}", e);
                continue;
            }
        };

        let manufacturer = device.manufacturer.unwrap_or_else(|| UNKNOWN.to_string());
        let product = device.product.unwrap_or_else(|| UNKNOWN.to_string());

        if is_system_device(&manufacturer, &product) {
            debug!(
                "Skipping system device {} ({} {})",
                device.identity, manufacturer, product
            );
            continue;
        }

        let matched = classifier.classify(&Candidate {
            vendor_id: device.identity.vendor_id,
            manufacturer: &manufacturer,
            product: &product,
            interface_classes: &device.interface_classes,
        });
        if classify && matched.is_none() {
            continue;
        }

        let device_type = if matched.is_some() {
            DeviceType::Printer
        } else {
            DeviceType::Other
        };

        if device_type == DeviceType::Printer && !seen_printers.insert(device.identity) {
            warn!(
                vendor_id = %format!("{:04x}", device.identity.vendor_id),
                product_id = %format!("{:04x}", device.identity.product_id),
                "Several printers share one vendor/product id; jobs for them go to a single session"
            );
        }

        let base = match device_type {
            DeviceType::Printer if product.is_empty() || product == UNKNOWN => {
                "Printer".to_string()
            }
            DeviceType::Printer => product.clone(),
            DeviceType::Other => format!("{} {}", manufacturer, product),
        };
        let display_name = unique_name(&base, &mut name_counts, &mut taken_names);

        listing.push(DeviceDescriptor {
            identity: device.identity,
            vendor_name: vendor_name(device.identity.vendor_id)
                .unwrap_or(UNKNOWN)
                .to_string(),
            manufacturer,
            product,
            serial_number: device.serial_number,
            bus: device.bus,
            address: device.address,
            interface_classes: device.interface_classes,
            endpoints: device.endpoints,
            device_type,
            display_name,
            matched_by: if classify {
                matched.unwrap_or(MatchedBy::NoFilter)
            } else {
                MatchedBy::NoFilter
            },
        });
    }

    listing
}

/// libusb-backed directory
pub struct DeviceDirectory {
    context: Context,
    classifier: Classifier,
}

impl DeviceDirectory {
    pub fn new(extra_vendors: Vec<u16>) -> Result<Self, rusb::Error> {
        Ok(Self::with_context(Context::new()?, extra_vendors))
    }

    pub fn with_context(context: Context, extra_vendors: Vec<u16>) -> Self {
        Self {
            context,
            classifier: Classifier::new(extra_vendors),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Probe every device on the bus, skipping root hubs
    fn probe_all(&self) -> Vec<Result<ProbedDevice, ProbeError>> {
        let devices = match self.context.devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to enumerate USB devices: {}", e);
                return Vec::new();
            }
        };

        let probes: Vec<_> = devices
            .iter()
            .filter_map(|device| probe_device(&device).transpose())
            .collect();

        debug!("Probed {} devices", probes.len());
        probes
    }
}

impl DeviceCatalog for DeviceDirectory {
    fn list_printers(&self, classify: bool) -> Vec<DeviceDescriptor> {
        build_listing(self.probe_all(), &self.classifier, classify)
    }
}

/// Read descriptors of one device; `Ok(None)` for root hubs
fn probe_device(device: &Device<Context>) -> Result<Option<ProbedDevice>, ProbeError> {
    let bus = device.bus_number();
    let address = device.address();
    let probe_error = |e: rusb::Error| ProbeError {
        bus,
        address,
        reason: e.to_string(),
    };

    let descriptor = device.device_descriptor().map_err(probe_error)?;
    if is_root_hub(descriptor.vendor_id(), descriptor.class_code()) {
        debug!("Skipping root hub: bus={}, addr={}", bus, address);
        return Ok(None);
    }

    let mut probed = ProbedDevice {
        identity: UsbDeviceIdentity::new(descriptor.vendor_id(), descriptor.product_id()),
        bus,
        address,
        ..Default::default()
    };

    // Each string read may fail on its own
    match device.open() {
        Ok(handle) => {
            let language = handle
                .read_languages(STRING_TIMEOUT)
                .ok()
                .and_then(|languages| languages.first().copied());

            if let Some(language) = language {
                probed.manufacturer = handle
                    .read_manufacturer_string(language, &descriptor, STRING_TIMEOUT)
                    .ok();
                probed.product = handle
                    .read_product_string(language, &descriptor, STRING_TIMEOUT)
                    .ok();
                probed.serial_number = handle
                    .read_serial_number_string(language, &descriptor, STRING_TIMEOUT)
                    .ok();
            }
        }
        Err(e) => debug!("Cannot open {} to read strings: {}", probed.identity, e),
    }

    for index in 0..descriptor.num_configurations() {
        let config = device.config_descriptor(index).map_err(probe_error)?;
        for interface in config.interfaces() {
            for alt in interface.descriptors() {
                if !probed.interface_classes.contains(&alt.class_code()) {
                    probed.interface_classes.push(alt.class_code());
                }
                for endpoint in alt.endpoint_descriptors() {
                    probed.endpoints.push(EndpointInfo {
                        interface: alt.interface_number(),
                        address: endpoint.address(),
                        direction: match endpoint.direction() {
                            rusb::Direction::In => EndpointDirection::In,
                            rusb::Direction::Out => EndpointDirection::Out,
                        },
                        transfer: match endpoint.transfer_type() {
                            rusb::TransferType::Control => EndpointTransfer::Control,
                            rusb::TransferType::Isochronous => EndpointTransfer::Isochronous,
                            rusb::TransferType::Bulk => EndpointTransfer::Bulk,
                            rusb::TransferType::Interrupt => EndpointTransfer::Interrupt,
                        },
                    });
                }
            }
        }
    }

    Ok(Some(probed))
}
