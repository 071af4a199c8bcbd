//! Bounded job queue between request handlers and a printer worker thread
//!
//! Handlers run on the Tokio runtime and enqueue with `submit().await`; the
//! worker is a plain OS thread driving its own small runtime and pops with
//! `recv_timeout()`. The queue is the only structure shared between the two
//! sides.

use async_channel::{Receiver, Sender, bounded};
use bytes::Bytes;
use protocol::UsbDeviceIdentity;
use std::time::Duration;

/// Default backlog per printer
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Encoded command stream for one printer
///
/// Immutable once created; consumed exactly once by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub target: UsbDeviceIdentity,
    pub payload: Bytes,
}

impl PrintJob {
    pub fn new(target: UsbDeviceIdentity, payload: impl Into<Bytes>) -> Self {
        Self {
            target,
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Items travelling through the queue
#[derive(Debug)]
pub enum QueueItem {
    Job(PrintJob),
    /// Sentinel asking the worker to stop
    Shutdown,
}

/// Outcome of one bounded wait on the queue
#[derive(Debug)]
pub enum Recv {
    Item(QueueItem),
    /// Nothing arrived before the wait ran out
    Idle,
    /// Queue closed and empty
    Closed,
}

/// Submitting side (cloneable, used from handlers)
#[derive(Clone)]
pub struct JobSender {
    tx: Sender<QueueItem>,
}

impl JobSender {
    /// Enqueue a job, waiting while the queue is full
    pub async fn submit(&self, job: PrintJob) -> crate::Result<()> {
        self.tx
            .send(QueueItem::Job(job))
            .await
            .map_err(|_| crate::Error::Channel("job queue closed".to_string()))
    }

    /// Enqueue a job from synchronous code, blocking while the queue is full
    pub fn submit_blocking(&self, job: PrintJob) -> crate::Result<()> {
        self.tx
            .send_blocking(QueueItem::Job(job))
            .map_err(|_| crate::Error::Channel("job queue closed".to_string()))
    }

    /// Queue the shutdown sentinel without blocking
    ///
    /// If the queue is full the channel is closed instead, which also wakes
    /// the worker once the backlog is consumed. Returns true if the sentinel
    /// was queued.
    pub fn request_shutdown(&self) -> bool {
        match self.tx.try_send(QueueItem::Shutdown) {
            Ok(()) => true,
            Err(_) => {
                self.tx.close();
                false
            }
        }
    }

    /// Close the queue; pending items remain readable
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Items currently waiting
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Worker side
pub struct JobReceiver {
    rx: Receiver<QueueItem>,
}

impl JobReceiver {
    /// Wait up to `timeout` for the next item
    ///
    /// Needs a Tokio runtime with the time driver enabled.
    pub async fn recv_timeout(&self, timeout: Duration) -> Recv {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(item)) => Recv::Item(item),
            Ok(Err(_)) => Recv::Closed,
            Err(_) => Recv::Idle,
        }
    }

    /// Discard every pending job, returning how many were dropped
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while let Ok(item) = self.rx.try_recv() {
            if matches!(item, QueueItem::Job(_)) {
                dropped += 1;
            }
        }
        dropped
    }
}

/// Create a bounded job queue
///
/// Returns (JobSender for handlers, JobReceiver for the worker thread)
pub fn create_job_queue(capacity: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (JobSender { tx }, JobReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(500);

    fn job(byte: u8) -> PrintJob {
        PrintJob::new(UsbDeviceIdentity::new(0x0416, 0x5011), vec![byte])
    }

    async fn next(rx: &JobReceiver) -> Option<u8> {
        match rx.recv_timeout(WAIT).await {
            Recv::Item(QueueItem::Job(job)) => Some(job.payload[0]),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, rx) = create_job_queue(8);
        for i in 0..5 {
            tx.submit_blocking(job(i)).unwrap();
        }
        for i in 0..5 {
            assert_eq!(next(&rx).await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_shutdown_sentinel_after_jobs() {
        let (tx, rx) = create_job_queue(4);
        tx.submit_blocking(job(7)).unwrap();
        assert!(tx.request_shutdown());

        assert_eq!(next(&rx).await, Some(7));
        assert!(matches!(
            rx.recv_timeout(WAIT).await,
            Recv::Item(QueueItem::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_on_full_queue_closes() {
        let (tx, rx) = create_job_queue(1);
        tx.submit_blocking(job(1)).unwrap();
        assert!(!tx.request_shutdown());
        assert!(tx.is_closed());

        // Backlog is still delivered, then the closed queue ends the worker loop
        assert_eq!(next(&rx).await, Some(1));
        assert!(matches!(rx.recv_timeout(WAIT).await, Recv::Closed));
        assert!(tx.submit_blocking(job(2)).is_err());
    }

    #[tokio::test]
    async fn test_empty_queue_wait_runs_out() {
        let (tx, rx) = create_job_queue(4);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(20)).await,
            Recv::Idle
        ));

        tx.submit_blocking(job(3)).unwrap();
        assert_eq!(next(&rx).await, Some(3));
    }

    #[test]
    fn test_drain_counts_jobs() {
        let (tx, rx) = create_job_queue(8);
        for i in 0..3 {
            tx.submit_blocking(job(i)).unwrap();
        }
        tx.request_shutdown();
        assert_eq!(tx.pending(), 4);
        assert_eq!(rx.drain(), 3);
        assert_eq!(tx.pending(), 0);
    }

    #[tokio::test]
    async fn test_async_submit_waits_for_space() {
        let (tx, rx) = create_job_queue(1);
        tx.submit(job(1)).await.unwrap();

        let worker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let first = next(&rx).await;
            let second = next(&rx).await;
            (first, second)
        });

        // Blocks until the worker pops the first job
        tx.submit(job(2)).await.unwrap();
        assert_eq!(worker.await.unwrap(), (Some(1), Some(2)));
    }
}
