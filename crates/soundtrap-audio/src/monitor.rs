use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use soundtrap_capture::AudioSink;
use soundtrap_foundation::{AudioFormat, CaptureError, ConfigError};

/// Chunks of slack between the capture loop and the output callback.
const RING_CHUNKS: usize = 16;

/// Keeps the cpal output stream alive on the opening thread.
pub struct MonitorStream {
    _stream: Stream,
}

/// Passthrough writer feeding the output callback.
///
/// Monitoring is best-effort: when the output side falls behind, whole
/// chunks are discarded rather than stalling the capture loop.
pub struct MonitorSink {
    producer: Producer<i16>,
    failure: Arc<Mutex<Option<String>>>,
    big_endian: bool,
    dropped_chunks: u64,
}

pub fn open_monitor(
    device: &Device,
    format: &AudioFormat,
    chunk_bytes: usize,
) -> Result<(MonitorStream, MonitorSink), ConfigError> {
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate_hz as u32),
        buffer_size: BufferSize::Default,
    };
    let sample_format = device.default_output_config()?.sample_format();

    let chunk_samples = chunk_bytes / 2;
    let (producer, consumer) = RingBuffer::<i16>::new(chunk_samples * RING_CHUNKS);
    let failure = Arc::new(Mutex::new(None));

    let stream = build_output_stream(device, &config, sample_format, consumer, Arc::clone(&failure))?;
    stream.play()?;

    tracing::info!(
        device = %device.name().unwrap_or_default(),
        ?sample_format,
        "monitor stream started"
    );

    Ok((
        MonitorStream { _stream: stream },
        MonitorSink {
            producer,
            failure,
            big_endian: format.big_endian,
            dropped_chunks: 0,
        },
    ))
}

fn build_output_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    consumer: Consumer<i16>,
    failure: Arc<Mutex<Option<String>>>,
) -> Result<Stream, ConfigError> {
    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("monitor stream error: {err}");
        *failure.lock() = Some(err.to_string());
    };

    let consumer = Arc::new(Mutex::new(consumer));

    let stream = match sample_format {
        SampleFormat::I16 => device.build_output_stream(
            config,
            move |data: &mut [i16], _: &_| {
                let mut consumer = consumer.lock();
                let mut filled = 0;
                while filled < data.len() {
                    match consumer.pop() {
                        Ok(sample) => {
                            data[filled] = sample;
                            filled += 1;
                        }
                        Err(_) => break,
                    }
                }
                // underrun plays silence
                for sample in &mut data[filled..] {
                    *sample = 0;
                }
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _: &_| {
                let mut consumer = consumer.lock();
                let mut filled = 0;
                while filled < data.len() {
                    match consumer.pop() {
                        Ok(sample) => {
                            data[filled] = f32::from(sample) / 32_768.0;
                            filled += 1;
                        }
                        Err(_) => break,
                    }
                }
                for sample in &mut data[filled..] {
                    *sample = 0.0;
                }
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(ConfigError::FormatNotSupported {
                format: format!("{other:?}"),
            });
        }
    };

    Ok(stream)
}

impl AudioSink for MonitorSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CaptureError> {
        if let Some(message) = self.failure.lock().take() {
            return Err(CaptureError::Stream(message));
        }
        if self.producer.slots() < chunk.len() / 2 {
            self.dropped_chunks += 1;
            tracing::debug!(
                dropped = self.dropped_chunks,
                "monitor ring full, chunk discarded"
            );
            return Ok(());
        }
        for pair in chunk.chunks_exact(2) {
            let sample = if self.big_endian {
                i16::from_be_bytes([pair[0], pair[1]])
            } else {
                i16::from_le_bytes([pair[0], pair[1]])
            };
            let _ = self.producer.push(sample);
        }
        Ok(())
    }
}
