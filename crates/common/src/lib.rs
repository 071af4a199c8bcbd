//! Common utilities for usb-print-agent
//!
//! This crate provides shared functionality for the agent, including error
//! handling, logging setup, the USB transport abstractions, and the bounded
//! job queue connecting request handlers to printer worker threads.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod usb_types;

pub use channel::{
    DEFAULT_QUEUE_CAPACITY, JobReceiver, JobSender, PrintJob, QueueItem, Recv, create_job_queue,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{ConnectError, Connector, TransferError, Transport};
