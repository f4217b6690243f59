use std::io::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use soundtrap_foundation::{CaptureError, ShutdownFlag};

use crate::engine::CaptureEngine;
use crate::io::{AudioSink, AudioSource};
use crate::queue::QueueHandle;

/// Counters shared with the supervising task for heartbeat logs.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub chunks_processed: AtomicU64,
    pub captures_started: AtomicU64,
    pub captures_completed: AtomicU64,
    pub events_dropped: AtomicU64,
}

/// Handle to the dedicated capture thread.
///
/// The thread runs the read → monitor → engine → submit cycle once per
/// chunk and checks the shutdown flag between iterations, never mid-read.
/// It must not block on storage; completed events go through the bounded
/// persistence queue.
pub struct CaptureLoop {
    handle: JoinHandle<Result<(), CaptureError>>,
}

impl CaptureLoop {
    pub fn spawn(
        engine: CaptureEngine,
        source: Box<dyn AudioSource>,
        sink: Option<Box<dyn AudioSink>>,
        queue: QueueHandle,
        shutdown: ShutdownFlag,
        stats: Arc<CaptureStats>,
        show_loudness: bool,
    ) -> Result<Self, CaptureError> {
        let handle = thread::Builder::new()
            .name("capture-loop".to_string())
            .spawn(move || {
                run_loop(engine, source, sink, queue, shutdown, stats, show_loudness)
            })
            .map_err(|e| CaptureError::Stream(format!("failed to spawn capture thread: {e}")))?;
        Ok(Self { handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the loop to observe the shutdown flag (or fail) and exit.
    pub fn join(self) -> Result<(), CaptureError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Invariant("capture thread panicked".into())),
        }
    }
}

fn run_loop(
    mut engine: CaptureEngine,
    mut source: Box<dyn AudioSource>,
    mut sink: Option<Box<dyn AudioSink>>,
    queue: QueueHandle,
    shutdown: ShutdownFlag,
    stats: Arc<CaptureStats>,
    show_loudness: bool,
) -> Result<(), CaptureError> {
    tracing::info!("capture loop started");
    let mut chunk = vec![0u8; engine.config().chunk_bytes()];

    while !shutdown.is_set() {
        let got = source.read_chunk(&mut chunk)?;
        if got != chunk.len() {
            return Err(CaptureError::ShortRead {
                got,
                expected: chunk.len(),
            });
        }
        if let Some(sink) = sink.as_mut() {
            sink.write_chunk(&chunk)?;
        }

        let outcome = engine.on_chunk(&chunk)?;
        stats.chunks_processed.fetch_add(1, Ordering::Relaxed);
        if outcome.started {
            stats.captures_started.fetch_add(1, Ordering::Relaxed);
        }
        if show_loudness {
            print!("Loudness {:>3.0}%\r", outcome.loudness_percent);
            let _ = std::io::stdout().flush();
        }
        if let Some(event) = outcome.completed {
            stats.captures_completed.fetch_add(1, Ordering::Relaxed);
            if !queue.submit(event) {
                stats.events_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    tracing::info!("capture loop stopped");
    Ok(())
}
