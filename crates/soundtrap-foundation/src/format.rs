use serde::{Deserialize, Serialize};

/// PCM stream format shared by every stage of the pipeline.
///
/// Fixed at startup; the same value flows from the input stream through the
/// capture engine into the WAV header of each saved file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate_hz: f64,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub big_endian: bool,
}

impl AudioFormat {
    /// Bytes per frame (one sample across all channels).
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate_hz: 44_100.0,
            bits_per_sample: 16,
            channels: 1,
            big_endian: true,
        }
    }
}
