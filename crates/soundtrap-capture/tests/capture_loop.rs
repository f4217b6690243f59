use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use soundtrap_capture::{
    AudioSource, CaptureConfig, CaptureEngine, CaptureEvent, CaptureLoop, CaptureSettings,
    CaptureStats, PersistenceQueue, Storage,
};
use soundtrap_foundation::{AudioFormat, CaptureError, PersistenceError, ShutdownFlag};
use soundtrap_loudness::LoudnessConfig;

fn engine(threshold: f32) -> CaptureEngine {
    let settings = CaptureSettings {
        format: AudioFormat::default(),
        loudness: LoudnessConfig {
            threshold_percent: threshold,
        },
        ..CaptureSettings::default()
    };
    CaptureEngine::new(CaptureConfig::derive(&settings).unwrap()).unwrap()
}

struct CountingStorage {
    saved: Arc<Mutex<usize>>,
}

impl Storage for CountingStorage {
    fn write(&self, _event: &CaptureEvent, _path: &Path) -> Result<(), PersistenceError> {
        *self.saved.lock().unwrap() += 1;
        Ok(())
    }
}

fn queue_with_counter() -> (PersistenceQueue, Arc<Mutex<usize>>) {
    let saved = Arc::new(Mutex::new(0));
    let storage = Box::new(CountingStorage {
        saved: Arc::clone(&saved),
    });
    let queue =
        PersistenceQueue::spawn(storage, PathBuf::from("."), 10, Duration::from_secs(5)).unwrap();
    (queue, saved)
}

/// Endless silence, paced roughly like a real device.
struct SilentSource;

impl AudioSource for SilentSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        thread::sleep(Duration::from_millis(1));
        buf.fill(0);
        Ok(buf.len())
    }
}

struct ShortSource;

impl AudioSource for ShortSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        Ok(buf.len() / 2)
    }
}

/// Plays back a fixed chunk sequence, then fails like a dead device.
struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
}

impl AudioSource for ScriptedSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        match self.chunks.pop_front() {
            Some(chunk) => {
                buf.copy_from_slice(&chunk);
                Ok(buf.len())
            }
            None => Err(CaptureError::Stream("device unplugged".into())),
        }
    }
}

#[test]
fn loop_exits_on_shutdown_flag() {
    let engine = engine(10.0);
    let (queue, _saved) = queue_with_counter();
    let shutdown = ShutdownFlag::new();
    let stats = Arc::new(CaptureStats::default());

    let capture = CaptureLoop::spawn(
        engine,
        Box::new(SilentSource),
        None,
        queue.handle(),
        shutdown.clone(),
        Arc::clone(&stats),
        false,
    )
    .unwrap();

    thread::sleep(Duration::from_millis(30));
    shutdown.set();
    capture.join().unwrap();

    assert!(
        stats
            .chunks_processed
            .load(std::sync::atomic::Ordering::Relaxed)
            > 0
    );
    assert!(queue.shutdown(Duration::from_secs(2)));
}

#[test]
fn short_read_is_fatal() {
    let engine = engine(10.0);
    let (queue, _saved) = queue_with_counter();

    let capture = CaptureLoop::spawn(
        engine,
        Box::new(ShortSource),
        None,
        queue.handle(),
        ShutdownFlag::new(),
        Arc::new(CaptureStats::default()),
        false,
    )
    .unwrap();

    let result = capture.join();
    assert!(matches!(result, Err(CaptureError::ShortRead { .. })));
    assert!(queue.shutdown(Duration::from_secs(2)));
}

#[test]
fn completed_captures_are_flushed_even_when_the_loop_dies() {
    let engine = engine(10.0);
    let chunk_bytes = engine.config().chunk_bytes();
    let (queue, saved) = queue_with_counter();

    let tone: Vec<u8> = (0..chunk_bytes / 2)
        .flat_map(|i| {
            let sample: i16 = if i % 2 == 0 { 20_000 } else { -20_000 };
            sample.to_be_bytes()
        })
        .collect();
    let silence = vec![0u8; chunk_bytes];

    // one trigger, a full quiet period to finish the capture, then the
    // device dies
    let mut chunks = VecDeque::new();
    chunks.push_back(tone);
    for _ in 0..21 {
        chunks.push_back(silence.clone());
    }

    let stats = Arc::new(CaptureStats::default());
    let capture = CaptureLoop::spawn(
        engine,
        Box::new(ScriptedSource { chunks }),
        None,
        queue.handle(),
        ShutdownFlag::new(),
        Arc::clone(&stats),
        false,
    )
    .unwrap();

    let result = capture.join();
    assert!(matches!(result, Err(CaptureError::Stream(_))));
    assert_eq!(
        stats
            .captures_completed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );

    assert!(queue.shutdown(Duration::from_secs(2)));
    assert_eq!(*saved.lock().unwrap(), 1);
}
