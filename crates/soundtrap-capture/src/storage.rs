use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use soundtrap_foundation::PersistenceError;

use crate::engine::CaptureEvent;

/// Writes one completed capture to disk.
pub trait Storage: Send {
    fn write(&self, event: &CaptureEvent, path: &Path) -> Result<(), PersistenceError>;
}

/// Uncompressed 16-bit PCM WAV at the event's format; the file is fully
/// reconstructible from the header plus the raw sample bytes.
pub struct WavStorage;

impl Storage for WavStorage {
    fn write(&self, event: &CaptureEvent, path: &Path) -> Result<(), PersistenceError> {
        let spec = WavSpec {
            channels: event.format.channels,
            sample_rate: event.format.sample_rate_hz as u32,
            bits_per_sample: event.format.bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).map_err(wav_error)?;
        for pair in event.pcm.chunks_exact(2) {
            let sample = if event.format.big_endian {
                i16::from_be_bytes([pair[0], pair[1]])
            } else {
                i16::from_le_bytes([pair[0], pair[1]])
            };
            writer.write_sample(sample).map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)
    }
}

fn wav_error(err: hound::Error) -> PersistenceError {
    match err {
        hound::Error::IoError(io) => PersistenceError::Io(io),
        other => PersistenceError::Encode(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use soundtrap_foundation::AudioFormat;

    #[test]
    fn written_file_reads_back_sample_for_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let samples: Vec<i16> = (0..441).map(|i| (i * 64 - 14_000) as i16).collect();
        let event = CaptureEvent {
            pcm: samples.iter().flat_map(|s| s.to_be_bytes()).collect(),
            format: AudioFormat::default(),
            captured_at: Local::now(),
        };

        WavStorage.write(&event, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn unwritable_path_reports_io_error() {
        let event = CaptureEvent {
            pcm: vec![0u8; 4],
            format: AudioFormat::default(),
            captured_at: Local::now(),
        };
        let result = WavStorage.write(&event, Path::new("/nonexistent-dir/capture.wav"));
        assert!(matches!(result, Err(PersistenceError::Io(_))));
    }
}
