use serde::{Deserialize, Serialize};
use soundtrap_foundation::{AudioFormat, ConfigError};
use soundtrap_loudness::LoudnessConfig;

/// Chunks processed per second; one chunk is 1/20 s of audio.
pub const CHUNKS_PER_SECOND: usize = 20;

pub const DEFAULT_PRE_ROLL_SECONDS: u32 = 1;
pub const DEFAULT_MAX_CAPTURE_SECONDS: u32 = 5;
pub const DEFAULT_QUIET_PERIOD_SECONDS: u32 = 1;

/// User-facing knobs, validated into a [`CaptureConfig`] before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub format: AudioFormat,
    pub loudness: LoudnessConfig,
    /// Seconds of audio recovered from before each trigger.
    pub pre_roll_seconds: u32,
    /// Hard cap on the recorded tail after the pre-roll window.
    pub max_capture_seconds: u32,
    /// Seconds of sustained quiet that end a capture.
    pub quiet_period_seconds: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            loudness: LoudnessConfig::default(),
            pre_roll_seconds: DEFAULT_PRE_ROLL_SECONDS,
            max_capture_seconds: DEFAULT_MAX_CAPTURE_SECONDS,
            quiet_period_seconds: DEFAULT_QUIET_PERIOD_SECONDS,
        }
    }
}

/// Parameters derived once at startup, immutable afterwards.
///
/// All byte counts are whole multiples of the chunk size, which keeps the
/// pre-roll wrap arithmetic chunk-aligned.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    format: AudioFormat,
    loudness: LoudnessConfig,
    chunk_bytes: usize,
    bytes_per_second: usize,
    listening_buffer_bytes: usize,
    capture_buffer_bytes: usize,
    quiet_chunks_threshold: u32,
}

impl CaptureConfig {
    pub fn derive(settings: &CaptureSettings) -> Result<Self, ConfigError> {
        let format = settings.format;
        if !(format.sample_rate_hz > 0.0) || format.sample_rate_hz.fract() != 0.0 {
            return Err(ConfigError::InvalidSampleRate(format.sample_rate_hz));
        }
        if format.bits_per_sample != 16 {
            return Err(ConfigError::UnsupportedSampleSize(format.bits_per_sample));
        }
        if format.channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        for (param, value) in [
            ("pre-roll seconds", settings.pre_roll_seconds),
            ("max capture seconds", settings.max_capture_seconds),
            ("quiet period seconds", settings.quiet_period_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroSeconds { param });
            }
        }
        let threshold = settings.loudness.threshold_percent;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }

        let bytes_per_second = format.sample_rate_hz
            * f64::from(format.channels)
            * f64::from(format.bits_per_sample)
            / 8.0;
        if bytes_per_second.fract() != 0.0 {
            return Err(ConfigError::MisalignedChunk(format!(
                "{bytes_per_second} bytes per second is not a whole number"
            )));
        }
        let bytes_per_second = bytes_per_second as usize;
        if bytes_per_second % CHUNKS_PER_SECOND != 0 {
            return Err(ConfigError::MisalignedChunk(format!(
                "{bytes_per_second} bytes per second does not split into {CHUNKS_PER_SECOND} chunks"
            )));
        }
        let chunk_bytes = bytes_per_second / CHUNKS_PER_SECOND;
        if chunk_bytes % 2 != 0 {
            return Err(ConfigError::MisalignedChunk(format!(
                "chunk of {chunk_bytes} bytes is not an even number of bytes"
            )));
        }

        let listening_buffer_bytes = bytes_per_second * settings.pre_roll_seconds as usize;
        let capture_buffer_bytes =
            listening_buffer_bytes + bytes_per_second * settings.max_capture_seconds as usize;
        let quiet_chunks_threshold = CHUNKS_PER_SECOND as u32 * settings.quiet_period_seconds;

        Ok(Self {
            format,
            loudness: settings.loudness,
            chunk_bytes,
            bytes_per_second,
            listening_buffer_bytes,
            capture_buffer_bytes,
            quiet_chunks_threshold,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn loudness(&self) -> LoudnessConfig {
        self.loudness
    }

    pub fn threshold_percent(&self) -> f32 {
        self.loudness.threshold_percent
    }

    /// Bytes in one 1/20 s chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Bytes needed to hold `seconds` of audio at the configured format.
    pub fn buffer_bytes(&self, seconds: u32) -> usize {
        self.bytes_per_second * seconds as usize
    }

    /// Capacity of the pre-roll ring buffer.
    pub fn listening_buffer_bytes(&self) -> usize {
        self.listening_buffer_bytes
    }

    /// Pre-roll window plus the maximum recorded tail.
    pub fn capture_buffer_bytes(&self) -> usize {
        self.capture_buffer_bytes
    }

    /// Consecutive quiet chunks beyond which an active capture stops.
    pub fn quiet_chunks_threshold(&self) -> u32 {
        self.quiet_chunks_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_reference_values_for_defaults() {
        let config = CaptureConfig::derive(&CaptureSettings::default()).unwrap();
        assert_eq!(config.chunk_bytes(), 4410);
        assert_eq!(config.listening_buffer_bytes(), 88_200);
        assert_eq!(config.capture_buffer_bytes(), 529_200);
        assert_eq!(config.quiet_chunks_threshold(), 20);
        assert_eq!(config.buffer_bytes(3), 264_600);
        assert_eq!(config.listening_buffer_bytes() % config.chunk_bytes(), 0);
    }

    #[test]
    fn rejects_threshold_outside_range() {
        let mut settings = CaptureSettings::default();
        settings.loudness.threshold_percent = 101.0;
        assert!(matches!(
            CaptureConfig::derive(&settings),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));

        settings.loudness.threshold_percent = -1.0;
        assert!(matches!(
            CaptureConfig::derive(&settings),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_zero_seconds() {
        let settings = CaptureSettings {
            quiet_period_seconds: 0,
            ..CaptureSettings::default()
        };
        assert!(matches!(
            CaptureConfig::derive(&settings),
            Err(ConfigError::ZeroSeconds { .. })
        ));
    }

    #[test]
    fn rejects_zero_and_fractional_sample_rates() {
        let mut settings = CaptureSettings::default();
        settings.format.sample_rate_hz = 0.0;
        assert!(matches!(
            CaptureConfig::derive(&settings),
            Err(ConfigError::InvalidSampleRate(_))
        ));

        settings.format.sample_rate_hz = 44_100.5;
        assert!(matches!(
            CaptureConfig::derive(&settings),
            Err(ConfigError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn rejects_rates_that_misalign_chunks() {
        // 11025 Hz mono 16-bit: 22050 bytes/s, 1102.5 bytes per chunk
        let mut settings = CaptureSettings::default();
        settings.format.sample_rate_hz = 11_025.0;
        assert!(matches!(
            CaptureConfig::derive(&settings),
            Err(ConfigError::MisalignedChunk(_))
        ));
    }

    #[test]
    fn rejects_non_16_bit_formats() {
        let mut settings = CaptureSettings::default();
        settings.format.bits_per_sample = 8;
        assert!(matches!(
            CaptureConfig::derive(&settings),
            Err(ConfigError::UnsupportedSampleSize(8))
        ));
    }
}
