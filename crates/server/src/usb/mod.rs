//! USB subsystem
//!
//! Device enumeration and classification, the libusb printer transport, and
//! the per-printer print sessions.
//!
//! Each printer session runs in a dedicated thread so blocking libusb writes
//! never stall the Tokio runtime; handlers only enqueue jobs.

pub mod classify;
pub mod directory;
pub mod registry;
pub mod session;
pub mod transport;

pub use classify::Classifier;
pub use directory::{DeviceCatalog, DeviceDirectory, ProbeError, ProbedDevice, build_listing};
pub use registry::SessionRegistry;
pub use session::{DeviceSession, SessionSettings, WorkerState};
pub use transport::{UsbConnector, UsbTransport, map_rusb_error};
