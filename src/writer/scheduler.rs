//! Background write scheduler.
//!
//! `enqueue` reserves the byte range synchronously and hands the payload to
//! a bounded job queue; a single worker thread drains the queue in FIFO
//! order and performs all file I/O. Producers block only when the queue is
//! full. The worker starts lazily, exits after a short idle period, and is
//! restarted by the next enqueue, so an idle writer holds no thread.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::config::WriterConfig;
use super::registry::StreamRegistry;
use crate::util::{Error, Result};

/// Worker poll interval; the thread exits after one empty interval.
const IDLE_TIMEOUT: Duration = Duration::from_millis(250);

struct WriteJob {
    key: String,
    data: Vec<u8>,
}

/// State shared between producers and the worker thread.
struct Shared {
    registry: StreamRegistry,
    /// Held by the worker for its whole lifetime; guarantees one drainer.
    queue: Mutex<Receiver<WriteJob>>,
    /// Jobs reserved but not yet written; keeps the worker alive through
    /// the window between a producer's reservation and its send.
    pending: AtomicUsize,
    /// Deadline for the next periodic flush, shared across worker restarts.
    next_flush: Mutex<Instant>,
    flush_interval: Duration,
}

/// Asynchronous multi-stream append writer.
///
/// Payloads enqueued against the same stream key land in one physical file
/// in enqueue order, at the offsets returned. The physical filename is
/// `{key}.{creation_time}.{hostname}.{pid}{extension}`, fixed for the
/// lifetime of the writer.
///
/// All methods take `&self`; the writer is shared freely between producer
/// threads.
pub struct DataWriter {
    shared: Arc<Shared>,
    sender: Mutex<Option<SyncSender<WriteJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DataWriter {
    /// Create a writer with the given configuration.
    pub fn new(config: WriterConfig) -> Self {
        let (sender, receiver) = sync_channel(config.max_queue);
        let flush_interval = Duration::from_secs(config.flush_secs);
        Self {
            shared: Arc::new(Shared {
                registry: StreamRegistry::new(&config.extension),
                queue: Mutex::new(receiver),
                pending: AtomicUsize::new(0),
                next_flush: Mutex::new(Instant::now() + flush_interval),
                flush_interval,
            }),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(None),
        }
    }

    /// Add a write job for `key` to the queue.
    ///
    /// Returns the physical file name and the byte offset the payload will
    /// occupy once the worker drains the job. Blocks while the queue is
    /// full. The returned offset is final: jobs for one key are written
    /// strictly in enqueue order.
    pub fn enqueue(&self, key: &str, data: Vec<u8>) -> Result<(String, u64)> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(Error::WriterClosed)?;

        let (filename, offset) = self.shared.registry.reserve(key, data.len() as u64)?;
        tracing::debug!(key, offset, len = data.len(), "queueing write");

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if sender
            .send(WriteJob {
                key: key.to_string(),
                data,
            })
            .is_err()
        {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::WriterClosed);
        }
        self.ensure_worker();

        Ok((filename, offset))
    }

    /// Signal that no more writes are coming and drain outstanding jobs.
    ///
    /// Queued payloads are written before the worker exits; open handles
    /// are flushed last. Subsequent `enqueue` calls fail with
    /// [`Error::WriterClosed`]. Called automatically on drop.
    pub fn close(&self) {
        drop(self.sender.lock().take());
        // The worker may have idled out with jobs still buffered; run one
        // final drain pass.
        self.ensure_worker();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        flush_all(&self.shared.registry);
    }

    /// Start the worker if it is not currently running.
    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }
        let shared = Arc::clone(&self.shared);
        *worker = Some(thread::spawn(move || worker_loop(&shared)));
    }
}

impl Default for DataWriter {
    fn default() -> Self {
        Self::new(WriterConfig::default())
    }
}

impl Drop for DataWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Worker thread main function.
fn worker_loop(shared: &Shared) {
    let queue = shared.queue.lock();
    loop {
        let job = match queue.recv_timeout(IDLE_TIMEOUT) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => {
                // A producer may have reserved a range but not yet sent the
                // job; keep polling until the queue is truly drained.
                if shared.pending.load(Ordering::SeqCst) > 0 {
                    continue;
                }
                break;
            }
            // Writer closed and buffered jobs fully delivered.
            Err(RecvTimeoutError::Disconnected) => break,
        };

        write_job(&shared.registry, &job);
        shared.pending.fetch_sub(1, Ordering::SeqCst);

        if Instant::now() >= *shared.next_flush.lock() {
            flush_all(&shared.registry);
            *shared.next_flush.lock() += shared.flush_interval;
        }
    }
}

/// Append one payload to its stream file.
fn write_job(registry: &StreamRegistry, job: &WriteJob) {
    let Some(file) = registry.file_for(&job.key) else {
        // Poisoned by an earlier failure; the reserved range is abandoned.
        tracing::debug!(key = %job.key, "dropping job for poisoned stream");
        return;
    };
    tracing::debug!(key = %job.key, len = job.data.len(), "writing payload");
    if let Err(err) = (&*file).write_all(&job.data) {
        tracing::error!(key = %job.key, %err, "stream write failed, poisoning stream");
        registry.poison(&job.key);
    }
}

/// Best-effort flush of every open stream handle.
///
/// The handle set is snapshotted under the registry lock and each flush
/// syscall runs with no lock held. Failures are logged and retried at the
/// next deadline.
fn flush_all(registry: &StreamRegistry) {
    for file in registry.snapshot_files() {
        if let Err(err) = file.sync_data() {
            tracing::warn!(%err, "stream flush failed");
        }
    }
}
