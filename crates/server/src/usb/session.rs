//! Per-printer print session
//!
//! Each session owns one worker thread and one bounded job queue. The worker
//! is the only code that touches the printer handle: it claims the printer
//! lazily on the first job, reuses the claim for later jobs, and drops it
//! when a write fails so the next job claims again. Jobs for one printer are
//! written strictly in submission order, one at a time.
//!
//! ```text
//! handlers --submit--> [bounded queue] --recv_timeout--> worker --write_raw--> printer
//! ```

use crate::error::{PrintError, Result};
use bytes::Bytes;
use common::{
    Connector, JobReceiver, JobSender, PrintJob, QueueItem, Recv, Transport, create_job_queue,
};
use protocol::UsbDeviceIdentity;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Builder;
use tracing::{debug, error, info, warn};

/// Timings and limits shared by all sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub queue_capacity: usize,
    /// Pause after each successful write
    pub settle_delay: Duration,
    /// Bound on waiting for the worker during shutdown
    pub shutdown_timeout: Duration,
    /// Longest an idle worker waits on the queue before checking its state
    pub idle_wake: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: common::DEFAULT_QUEUE_CAPACITY,
            settle_delay: Duration::from_millis(30),
            shutdown_timeout: Duration::from_secs(5),
            idle_wake: Duration::from_millis(500),
        }
    }
}

/// Lifecycle of the worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    ShuttingDown = 1,
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Running,
            1 => WorkerState::ShuttingDown,
            _ => WorkerState::Stopped,
        }
    }
}

/// State readable from both the session handle and its worker
#[derive(Default)]
struct Shared {
    state: AtomicU8,
    claimed: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// One printer's job queue and worker
pub struct DeviceSession {
    identity: UsbDeviceIdentity,
    sender: JobSender,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Disconnects when the worker thread returns
    stopped: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown_timeout: Duration,
}

impl DeviceSession {
    /// Create the queue and spawn the worker thread
    ///
    /// The printer is not opened until the first job arrives.
    pub fn start(
        identity: UsbDeviceIdentity,
        connector: Arc<dyn Connector>,
        settings: SessionSettings,
    ) -> std::io::Result<Arc<Self>> {
        let (sender, receiver) = create_job_queue(settings.queue_capacity);
        let shared = Arc::new(Shared::default());
        let (stopped_tx, stopped_rx) = mpsc::channel::<()>();

        let worker = Worker {
            identity,
            connector,
            receiver,
            shared: shared.clone(),
            settle_delay: settings.settle_delay,
            idle_wake: settings.idle_wake,
            transport: None,
        };

        let handle = thread::Builder::new()
            .name(format!(
                "usb-{:04x}:{:04x}",
                identity.vendor_id, identity.product_id
            ))
            .spawn(move || {
                worker.run();
                drop(stopped_tx);
            })?;

        info!("Started print session for {}", identity);

        Ok(Arc::new(Self {
            identity,
            sender,
            shared,
            worker: Mutex::new(Some(handle)),
            stopped: Mutex::new(Some(stopped_rx)),
            shutdown_timeout: settings.shutdown_timeout,
        }))
    }

    pub fn identity(&self) -> UsbDeviceIdentity {
        self.identity
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Whether the worker currently holds a claimed handle
    pub fn is_claimed(&self) -> bool {
        self.shared.claimed.load(Ordering::SeqCst)
    }

    /// Jobs written successfully
    pub fn completed_jobs(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Jobs that failed to claim or write
    pub fn failed_jobs(&self) -> u64 {
        self.shared.failed.load(Ordering::SeqCst)
    }

    /// Jobs waiting in the queue
    pub fn pending_jobs(&self) -> usize {
        self.sender.pending()
    }

    fn job(&self, payload: impl Into<Bytes>) -> Result<PrintJob> {
        if self.state() != WorkerState::Running {
            return Err(PrintError::QueueClosed);
        }
        Ok(PrintJob::new(self.identity, payload))
    }

    /// Queue raw command bytes, waiting while the queue is full
    ///
    /// Returns once the job is queued, not when it is printed.
    pub async fn print_raw(&self, payload: impl Into<Bytes>) -> Result<()> {
        let job = self.job(payload)?;
        let bytes = job.len();
        self.sender.submit(job).await?;
        debug!(bytes = bytes, "Queued job for {}", self.identity);
        Ok(())
    }

    /// Blocking variant of [`DeviceSession::print_raw`] for synchronous callers
    pub fn print_raw_blocking(&self, payload: impl Into<Bytes>) -> Result<()> {
        let job = self.job(payload)?;
        let bytes = job.len();
        self.sender.submit_blocking(job)?;
        debug!(bytes = bytes, "Queued job for {}", self.identity);
        Ok(())
    }

    /// Stop accepting jobs and wait for the worker
    ///
    /// Jobs still queued are discarded; a job already being written runs to
    /// completion. If the worker does not stop within the shutdown timeout a
    /// warning is logged and the handle is released by the worker as soon
    /// as its current transfer returns.
    pub fn shutdown(&self) {
        if self
            .shared
            .state
            .compare_exchange(
                WorkerState::Running as u8,
                WorkerState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        debug!("Shutting down print session for {}", self.identity);
        self.sender.request_shutdown();

        let stopped = lock(&self.stopped).take();
        let finished = match stopped {
            Some(rx) => !matches!(
                rx.recv_timeout(self.shutdown_timeout),
                Err(RecvTimeoutError::Timeout)
            ),
            None => true,
        };

        let handle = lock(&self.worker).take();
        if finished {
            if let Some(handle) = handle
                && handle.join().is_err()
            {
                error!("Print worker for {} panicked", self.identity);
            }
        } else {
            warn!(
                "Print worker for {} did not stop within {:?}",
                self.identity, self.shutdown_timeout
            );
        }

        self.sender.close();
        info!("Print session for {} shut down", self.identity);
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        // Lets a detached worker see the end of the queue
        self.sender.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Worker thread state; owns the printer handle exclusively
struct Worker {
    identity: UsbDeviceIdentity,
    connector: Arc<dyn Connector>,
    receiver: JobReceiver,
    shared: Arc<Shared>,
    settle_delay: Duration,
    idle_wake: Duration,
    transport: Option<Box<dyn Transport>>,
}

impl Worker {
    fn run(mut self) {
        debug!("Print worker for {} started", self.identity);

        // Drives only the bounded queue wait
        let runtime = match Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Print worker for {} could not start: {}", self.identity, e);
                self.receiver.drain();
                self.shared.set_state(WorkerState::Stopped);
                return;
            }
        };

        let mut dropped = 0;
        loop {
            let next = runtime.block_on(self.receiver.recv_timeout(self.idle_wake));
            match next {
                Recv::Item(QueueItem::Job(job)) => {
                    if self.shared.state() != WorkerState::Running {
                        dropped += 1;
                        break;
                    }
                    self.process(job);
                }
                Recv::Item(QueueItem::Shutdown) | Recv::Closed => break,
                Recv::Idle => {
                    if self.shared.state() != WorkerState::Running {
                        break;
                    }
                }
            }
        }

        dropped += self.receiver.drain();
        if dropped > 0 {
            warn!(
                "Discarded {} queued jobs for {} on shutdown",
                dropped, self.identity
            );
        }

        self.release();
        self.shared.set_state(WorkerState::Stopped);
        debug!("Print worker for {} stopped", self.identity);
    }

    fn process(&mut self, job: PrintJob) {
        let mut transport = match self.transport.take() {
            Some(transport) => transport,
            None => match self.connector.connect(self.identity) {
                Ok(transport) => {
                    self.shared.claimed.store(true, Ordering::SeqCst);
                    transport
                }
                Err(e) => {
                    error!("Print job for {} failed: {}", self.identity, e);
                    self.shared.failed.fetch_add(1, Ordering::SeqCst);
                    return;
                }
            },
        };

        match transport.write_raw(&job.payload) {
            Ok(()) => {
                self.transport = Some(transport);
                self.shared.completed.fetch_add(1, Ordering::SeqCst);
                debug!(bytes = job.len(), "Printed job on {}", self.identity);
                thread::sleep(self.settle_delay);
            }
            Err(e) => {
                error!(
                    bytes = job.len(),
                    "Print job for {} failed: {}", self.identity, e
                );
                self.shared.failed.fetch_add(1, Ordering::SeqCst);
                // Next job claims again
                transport.release();
                self.shared.claimed.store(false, Ordering::SeqCst);
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.release();
        }
        self.shared.claimed.store(false, Ordering::SeqCst);
    }
}
