//! libusb transport for printers
//!
//! [`UsbConnector`] finds a printer by vendor/product id, detaches any kernel
//! driver bound to the printer interface, selects the configuration and
//! claims the interface. The resulting [`UsbTransport`] writes raw command
//! bytes to the bulk OUT endpoint.

use common::{ConnectError, Connector, TransferError, Transport};
use protocol::UsbDeviceIdentity;
use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for bulk writes (5 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration value selected before claiming
const PRINTER_CONFIGURATION: u8 = 1;

/// Opens printers through libusb
#[derive(Clone)]
pub struct UsbConnector {
    context: Context,
    interface: u8,
    endpoint_out: u8,
    write_timeout: Duration,
}

impl UsbConnector {
    pub fn new(context: Context, interface: u8, endpoint_out: u8, write_timeout: Duration) -> Self {
        Self {
            context,
            interface,
            endpoint_out,
            write_timeout,
        }
    }

    fn claim_failed(identity: UsbDeviceIdentity, err: rusb::Error) -> ConnectError {
        match err {
            rusb::Error::NoDevice | rusb::Error::NotFound => ConnectError::DeviceNotFound(identity),
            _ => ConnectError::ClaimFailed {
                identity,
                reason: err.to_string(),
            },
        }
    }
}

impl Connector for UsbConnector {
    fn connect(&self, identity: UsbDeviceIdentity) -> Result<Box<dyn Transport>, ConnectError> {
        let mut handle = self
            .context
            .open_device_with_vid_pid(identity.vendor_id, identity.product_id)
            .ok_or(ConnectError::DeviceNotFound(identity))?;

        if let Err(e) = detach_kernel_driver(&mut handle, self.interface) {
            // Not supported on every platform; claiming decides
            debug!(
                "Kernel driver detach on {} interface {} failed: {}",
                identity, self.interface, e
            );
        }

        match handle.active_configuration() {
            Ok(active) if active == PRINTER_CONFIGURATION => {}
            _ => {
                if let Err(e) = handle.set_active_configuration(PRINTER_CONFIGURATION) {
                    debug!("Could not set configuration on {}: {}", identity, e);
                }
            }
        }

        handle.claim_interface(self.interface).map_err(|e| {
            warn!(
                "Failed to claim interface {} on {}: {}",
                self.interface, identity, e
            );
            Self::claim_failed(identity, e)
        })?;

        info!(
            vendor_id = %format!("{:04x}", identity.vendor_id),
            product_id = %format!("{:04x}", identity.product_id),
            "Claimed printer interface {}",
            self.interface
        );

        Ok(Box::new(UsbTransport {
            identity,
            handle: Some(handle),
            interface: self.interface,
            endpoint_out: self.endpoint_out,
            timeout: self.write_timeout,
        }))
    }
}

/// Detach the kernel driver from `interface` if one is bound
fn detach_kernel_driver(
    handle: &mut DeviceHandle<Context>,
    interface: u8,
) -> Result<(), rusb::Error> {
    if handle.kernel_driver_active(interface)? {
        debug!("Detaching kernel driver from interface {}", interface);
        handle.detach_kernel_driver(interface)?;
    }
    Ok(())
}

/// Claimed printer interface
pub struct UsbTransport {
    identity: UsbDeviceIdentity,
    handle: Option<DeviceHandle<Context>>,
    interface: u8,
    endpoint_out: u8,
    timeout: Duration,
}

impl Transport for UsbTransport {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let handle = self.handle.as_mut().ok_or(TransferError::NotClaimed)?;

        let mut written = 0;
        while written < data.len() {
            let n = handle
                .write_bulk(self.endpoint_out, &data[written..], self.timeout)
                .map_err(map_rusb_error)?;
            if n == 0 {
                return Err(TransferError::Io("bulk write made no progress".to_string()));
            }
            written += n;
        }

        debug!(
            "Wrote {} bytes to {} endpoint {:#04x}",
            written, self.identity, self.endpoint_out
        );
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.release_interface(self.interface) {
                debug!(
                    "Failed to release interface {} on {}: {}",
                    self.interface, self.identity, e
                );
            }
            // Dropping the handle closes the device
            debug!("Released printer {}", self.identity);
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.release();
    }
}

/// Map rusb errors to transfer errors
pub fn map_rusb_error(err: rusb::Error) -> TransferError {
    match err {
        rusb::Error::Timeout => TransferError::Timeout,
        rusb::Error::NoDevice | rusb::Error::NotFound => TransferError::NoDevice,
        _ => TransferError::Io(err.to_string()),
    }
}
