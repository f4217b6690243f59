use chrono::{DateTime, Local};
use soundtrap_foundation::{AudioFormat, CaptureError};
use soundtrap_loudness::LoudnessDetector;

use crate::config::CaptureConfig;
use crate::pre_roll::PreRollBuffer;

/// A completed capture, ready to persist. Owns its bytes; the engine keeps
/// no reference once it is handed out.
#[derive(Debug, Clone)]
pub struct CaptureEvent {
    pub pcm: Vec<u8>,
    pub format: AudioFormat,
    pub captured_at: DateTime<Local>,
}

impl CaptureEvent {
    pub fn duration_seconds(&self) -> f64 {
        let bytes_per_second = self.format.sample_rate_hz * self.format.frame_bytes() as f64;
        self.pcm.len() as f64 / bytes_per_second
    }
}

/// Per-chunk result handed back to the capture loop.
pub struct ChunkOutcome {
    pub loudness_percent: f32,
    /// A capture started on this chunk.
    pub started: bool,
    /// A capture completed on this chunk.
    pub completed: Option<CaptureEvent>,
}

struct CaptureSession {
    buffer: Vec<u8>,
    consecutive_quiet_chunks: u32,
}

/// Loudness-triggered recorder state machine.
///
/// Idle until a chunk exceeds the threshold, then accumulates a session
/// seeded with the pre-roll window until either the session buffer is
/// exhausted or the quiet period elapses. Every chunk lands in the pre-roll
/// ring in both states, so a capture ending and a new trigger on the same
/// chunk still gets its full pre-roll window.
pub struct CaptureEngine {
    config: CaptureConfig,
    detector: LoudnessDetector,
    pre_roll: PreRollBuffer,
    session: Option<CaptureSession>,
}

impl CaptureEngine {
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        let pre_roll = PreRollBuffer::new(config.listening_buffer_bytes(), config.chunk_bytes())?;
        Ok(Self {
            config,
            detector: LoudnessDetector::new(),
            pre_roll,
            session: None,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_capturing(&self) -> bool {
        self.session.is_some()
    }

    /// Advances the state machine by one chunk.
    pub fn on_chunk(&mut self, chunk: &[u8]) -> Result<ChunkOutcome, CaptureError> {
        if chunk.len() != self.config.chunk_bytes() {
            return Err(CaptureError::Invariant(format!(
                "chunk of {} bytes fed to an engine expecting {}",
                chunk.len(),
                self.config.chunk_bytes()
            )));
        }

        let written_at = self.pre_roll.write_chunk(chunk);
        let loudness_percent = self.detector.measure(chunk);
        let loud = self.config.loudness().is_loud(loudness_percent);

        if let Some(session) = self.session.as_mut() {
            session.buffer.extend_from_slice(chunk);
            if loud {
                session.consecutive_quiet_chunks = 0;
            } else {
                session.consecutive_quiet_chunks += 1;
            }
        }

        let mut completed = None;
        if self.should_stop() {
            if let Some(session) = self.session.take() {
                let event = CaptureEvent {
                    pcm: session.buffer,
                    format: self.config.format(),
                    captured_at: Local::now(),
                };
                tracing::info!(
                    bytes = event.pcm.len(),
                    seconds = event.duration_seconds(),
                    "stopping capture"
                );
                completed = Some(event);
            }
        }

        // A capture stopped by exhaustion on a loud chunk may re-enter
        // immediately; the seed then overlaps the tail of the previous event.
        let mut started = false;
        if loud && self.session.is_none() {
            let mut buffer = self.pre_roll.linearize(written_at);
            buffer.reserve_exact(self.config.capture_buffer_bytes() - buffer.len());
            tracing::info!(
                loudness = loudness_percent,
                pre_roll_bytes = buffer.len(),
                "starting capture"
            );
            self.session = Some(CaptureSession {
                buffer,
                consecutive_quiet_chunks: 0,
            });
            started = true;
        }

        Ok(ChunkOutcome {
            loudness_percent,
            started,
            completed,
        })
    }

    fn should_stop(&self) -> bool {
        match &self.session {
            Some(session) => {
                session.buffer.len() == self.config.capture_buffer_bytes()
                    || session.consecutive_quiet_chunks > self.config.quiet_chunks_threshold()
            }
            None => false,
        }
    }
}
