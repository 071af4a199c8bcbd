//! Test utilities for usb-print-agent
//!
//! Provides mock implementations and helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockConnector, create_mock_printer};
//! use common::{Connector, Transport};
//!
//! let printer = create_mock_printer(0x04b8, 0x0e15, "TM-T20");
//! let connector = MockConnector::new();
//!
//! let mut transport = connector.connect(printer.identity).unwrap();
//! transport.write_raw(b"\x1b@").unwrap();
//! assert_eq!(connector.writes_for(printer.identity), vec![b"\x1b@".to_vec()]);
//! ```

use crate::usb_types::{ConnectError, Connector, TransferError, Transport};
use protocol::{
    DeviceDescriptor, DeviceType, EndpointDirection, EndpointInfo, EndpointTransfer, MatchedBy,
    PRINTER_INTERFACE_CLASS, UsbDeviceIdentity,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock printer descriptor with a bulk OUT endpoint
pub fn create_mock_printer(vendor_id: u16, product_id: u16, product: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        identity: UsbDeviceIdentity::new(vendor_id, product_id),
        manufacturer: "Test Manufacturer".to_string(),
        product: product.to_string(),
        serial_number: None,
        bus: 1,
        address: (product_id % 128) as u8,
        interface_classes: vec![PRINTER_INTERFACE_CLASS],
        endpoints: vec![
            EndpointInfo {
                interface: 0,
                address: 0x01,
                direction: EndpointDirection::Out,
                transfer: EndpointTransfer::Bulk,
            },
            EndpointInfo {
                interface: 0,
                address: 0x82,
                direction: EndpointDirection::In,
                transfer: EndpointTransfer::Bulk,
            },
        ],
        device_type: DeviceType::Printer,
        display_name: product.to_string(),
        vendor_name: "Unknown".to_string(),
        matched_by: MatchedBy::InterfaceClass,
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[derive(Default)]
struct MockState {
    writes: Mutex<Vec<(UsbDeviceIdentity, Vec<u8>)>>,
    missing: Mutex<HashSet<UsbDeviceIdentity>>,
    busy: Mutex<HashSet<UsbDeviceIdentity>>,
    delays: Mutex<HashMap<UsbDeviceIdentity, Duration>>,
    failures: Mutex<HashMap<UsbDeviceIdentity, usize>>,
    connects: AtomicUsize,
    releases: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Connector whose transports record writes in memory
///
/// Clones share state, so a test can keep one handle while the session
/// under test owns another.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` report the device as absent
    pub fn set_missing(&self, identity: UsbDeviceIdentity, missing: bool) {
        let mut set = lock(&self.state.missing);
        if missing {
            set.insert(identity);
        } else {
            set.remove(&identity);
        }
    }

    /// Make `connect` fail with a claim error
    pub fn set_busy(&self, identity: UsbDeviceIdentity, busy: bool) {
        let mut set = lock(&self.state.busy);
        if busy {
            set.insert(identity);
        } else {
            set.remove(&identity);
        }
    }

    /// Sleep this long inside every write to `identity`
    pub fn set_write_delay(&self, identity: UsbDeviceIdentity, delay: Duration) {
        lock(&self.state.delays).insert(identity, delay);
    }

    /// Fail the next `count` writes to `identity`
    pub fn fail_next_writes(&self, identity: UsbDeviceIdentity, count: usize) {
        lock(&self.state.failures).insert(identity, count);
    }

    /// All successful writes in completion order
    pub fn writes(&self) -> Vec<(UsbDeviceIdentity, Vec<u8>)> {
        lock(&self.state.writes).clone()
    }

    /// Successful writes to one device in completion order
    pub fn writes_for(&self, identity: UsbDeviceIdentity) -> Vec<Vec<u8>> {
        lock(&self.state.writes)
            .iter()
            .filter(|(id, _)| *id == identity)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.state.writes).len()
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` writes reached `identity`
    pub fn wait_for_writes(&self, identity: UsbDeviceIdentity, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.writes_for(identity).len() >= count)
    }
}

impl Connector for MockConnector {
    fn connect(&self, identity: UsbDeviceIdentity) -> Result<Box<dyn Transport>, ConnectError> {
        if lock(&self.state.missing).contains(&identity) {
            return Err(ConnectError::DeviceNotFound(identity));
        }
        if lock(&self.state.busy).contains(&identity) {
            return Err(ConnectError::ClaimFailed {
                identity,
                reason: "interface busy".to_string(),
            });
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransport {
            identity,
            state: self.state.clone(),
            released: false,
        }))
    }
}

/// Transport handed out by [`MockConnector`]
pub struct MockTransport {
    identity: UsbDeviceIdentity,
    state: Arc<MockState>,
    released: bool,
}

impl Transport for MockTransport {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), TransferError> {
        if self.released {
            return Err(TransferError::NotClaimed);
        }

        let delay = lock(&self.state.delays).get(&self.identity).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        {
            let mut failures = lock(&self.state.failures);
            if let Some(remaining) = failures.get_mut(&self.identity)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(TransferError::Io("mock transfer failure".to_string()));
            }
        }

        lock(&self.state.writes).push((self.identity, data.to_vec()));
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.release();
    }
}
