use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use soundtrap_foundation::PersistenceError;

use crate::engine::CaptureEvent;
use crate::storage::Storage;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Serialized hand-off of completed captures to storage.
///
/// A bounded channel feeds one worker thread, so the capture loop never
/// touches the filesystem and saves land on disk in completion order. Event
/// buffers move into the channel; nothing on the producing side can touch
/// them after submission.
pub struct PersistenceQueue {
    tx: Sender<CaptureEvent>,
    drained_rx: Receiver<()>,
    worker: Option<JoinHandle<()>>,
    submit_timeout: Duration,
}

/// Cloneable submit-side handle for the capture thread.
#[derive(Clone)]
pub struct QueueHandle {
    tx: Sender<CaptureEvent>,
    submit_timeout: Duration,
}

impl PersistenceQueue {
    pub fn spawn(
        storage: Box<dyn Storage>,
        output_dir: PathBuf,
        capacity: usize,
        submit_timeout: Duration,
    ) -> Result<Self, PersistenceError> {
        let (tx, rx) = bounded::<CaptureEvent>(capacity);
        let (drained_tx, drained_rx) = bounded::<()>(0);
        let worker = thread::Builder::new()
            .name("persist-worker".to_string())
            .spawn(move || run_worker(rx, storage, output_dir, drained_tx))
            .map_err(PersistenceError::Io)?;
        Ok(Self {
            tx,
            drained_rx,
            worker: Some(worker),
            submit_timeout,
        })
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            tx: self.tx.clone(),
            submit_timeout: self.submit_timeout,
        }
    }

    /// Stops accepting new events and waits for queued saves to finish.
    ///
    /// Returns whether the worker drained within `timeout`. The worker only
    /// exits once every [`QueueHandle`] has been dropped, so stop the
    /// capture loop first.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        drop(self.tx);
        let drained = match self.drained_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        if drained {
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        } else {
            tracing::warn!(?timeout, "persistence worker did not drain in time");
        }
        drained
    }
}

impl QueueHandle {
    /// Enqueues a completed capture for saving.
    ///
    /// When the queue is full this blocks up to the configured bound
    /// (backpressure against a slow disk), then drops the event and reports
    /// it. Returns whether the event was accepted.
    pub fn submit(&self, event: CaptureEvent) -> bool {
        match self.tx.send_timeout(event, self.submit_timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(event)) => {
                tracing::warn!(
                    bytes = event.pcm.len(),
                    waited = ?self.submit_timeout,
                    "save queue full, dropping capture"
                );
                false
            }
            Err(SendTimeoutError::Disconnected(event)) => {
                tracing::error!(bytes = event.pcm.len(), "save queue is gone, dropping capture");
                false
            }
        }
    }
}

fn run_worker(
    rx: Receiver<CaptureEvent>,
    storage: Box<dyn Storage>,
    output_dir: PathBuf,
    _drained_tx: Sender<()>,
) {
    tracing::info!("persistence worker started");
    while let Ok(event) = rx.recv() {
        let path = output_dir.join(file_name(&event));
        match storage.write(&event, &path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), bytes = event.pcm.len(), "saved capture");
            }
            Err(err) => {
                // Reported, not raised: a failed save never stops the worker
                // or subsequent captures.
                tracing::error!(path = %path.display(), error = %err, "failed to save capture");
            }
        }
    }
    tracing::info!("persistence worker drained");
    // _drained_tx drops here, releasing anyone blocked in shutdown()
}

fn file_name(event: &CaptureEvent) -> String {
    format!("{}.wav", event.captured_at.format("%Y-%m-%d-%H-%M-%S"))
}
