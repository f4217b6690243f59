use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use soundtrap_capture::AudioSource;
use soundtrap_foundation::{AudioFormat, CaptureError, ConfigError};

/// How many chunks the callback-side ring can hold before dropping.
const RING_CHUNKS: usize = 64;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Keeps the cpal input stream alive. Streams are not `Send`; this stays on
/// the thread that opened the device while [`ChunkSource`] crosses into the
/// capture thread.
pub struct InputStream {
    _stream: Stream,
}

/// Blocking chunk reader over the callback-side ring buffer.
pub struct ChunkSource {
    consumer: Consumer<u8>,
    failure: Arc<Mutex<Option<String>>>,
}

/// Opens the device at the configured format and starts pulling samples.
///
/// The callback converts whatever sample type the device delivers to 16-bit
/// PCM bytes in the format's endianness, so everything downstream sees one
/// byte layout.
pub fn open_input(
    device: &Device,
    format: &AudioFormat,
    chunk_bytes: usize,
) -> Result<(InputStream, ChunkSource), ConfigError> {
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate_hz as u32),
        buffer_size: BufferSize::Default,
    };
    let sample_format = device.default_input_config()?.sample_format();

    let (producer, consumer) = RingBuffer::<u8>::new(chunk_bytes * RING_CHUNKS);
    let failure = Arc::new(Mutex::new(None));

    let stream = build_input_stream(
        device,
        &config,
        sample_format,
        producer,
        format.big_endian,
        Arc::clone(&failure),
    )?;
    stream.play()?;

    tracing::info!(
        device = %device.name().unwrap_or_default(),
        ?sample_format,
        "input stream started"
    );

    Ok((
        InputStream { _stream: stream },
        ChunkSource { consumer, failure },
    ))
}

fn build_input_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    producer: Producer<u8>,
    big_endian: bool,
    failure: Arc<Mutex<Option<String>>>,
) -> Result<Stream, ConfigError> {
    let err_failure = Arc::clone(&failure);
    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("input stream error: {err}");
        *err_failure.lock() = Some(err.to_string());
    };

    let dropped = Arc::new(AtomicU64::new(0));
    let producer = Arc::new(Mutex::new(producer));

    // Common handler once samples are i16
    let handle_i16 = move |samples: &[i16]| {
        let mut producer = producer.lock();
        let mut lost = 0u64;
        for &sample in samples {
            // a sample never straddles the full boundary
            if producer.slots() < 2 {
                lost += 1;
                continue;
            }
            let bytes = if big_endian {
                sample.to_be_bytes()
            } else {
                sample.to_le_bytes()
            };
            let _ = producer.push(bytes[0]);
            let _ = producer.push(bytes[1]);
        }
        if lost > 0 {
            let total = dropped.fetch_add(lost, Ordering::Relaxed) + lost;
            tracing::warn!(lost, total, "input ring overrun, samples dropped");
        }
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &_| {
                handle_i16(data);
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => {
            let mut converted: Vec<i16> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[f32], _: &_| {
                    converted.clear();
                    converted.reserve(data.len());
                    for &s in data {
                        let clamped = s.clamp(-1.0, 1.0);
                        converted.push((clamped * 32767.0).round() as i16);
                    }
                    handle_i16(&converted);
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::U16 => {
            let mut converted: Vec<i16> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[u16], _: &_| {
                    converted.clear();
                    converted.reserve(data.len());
                    for &s in data {
                        converted.push((s as i32 - 32_768) as i16);
                    }
                    handle_i16(&converted);
                },
                err_fn,
                None,
            )?
        }
        other => {
            return Err(ConfigError::FormatNotSupported {
                format: format!("{other:?}"),
            });
        }
    };

    Ok(stream)
}

impl ChunkSource {
    /// Drains whatever is currently available into `buf`. The read may wrap,
    /// so both rtrb slices are copied.
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        let chunk = match self.consumer.read_chunk(buf.len()) {
            Ok(chunk) => chunk,
            Err(rtrb::chunks::ChunkError::TooFewSlots(0)) => return 0,
            Err(rtrb::chunks::ChunkError::TooFewSlots(available)) => {
                // available can only grow between the two calls; this read
                // cannot fail
                self.consumer.read_chunk(available).unwrap()
            }
        };
        let len = chunk.len();
        let (first, second) = chunk.as_slices();
        buf[..first.len()].copy_from_slice(first);
        if !second.is_empty() {
            buf[first.len()..first.len() + second.len()].copy_from_slice(second);
        }
        chunk.commit_all();
        len
    }
}

impl AudioSource for ChunkSource {
    /// Blocks until a full chunk has arrived. There is no per-read timeout;
    /// a stalled device stalls the caller until its read would complete.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        let mut filled = 0;
        while filled < buf.len() {
            if let Some(message) = self.failure.lock().take() {
                return Err(CaptureError::Stream(message));
            }
            let got = self.read_available(&mut buf[filled..]);
            filled += got;
            if got == 0 {
                thread::sleep(POLL_INTERVAL);
            }
        }
        Ok(filled)
    }
}
