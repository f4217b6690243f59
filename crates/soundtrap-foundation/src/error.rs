use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors that prevent the recorder from starting. Never raised once the
/// capture loop is running.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("sample rate must be a positive whole number of Hz, got {0}")]
    InvalidSampleRate(f64),

    #[error("only 16-bit PCM is supported, got {0} bits per sample")]
    UnsupportedSampleSize(u16),

    #[error("at least one channel is required")]
    NoChannels,

    #[error("{param} must be at least one second")]
    ZeroSeconds { param: &'static str },

    #[error("loudness threshold must be within 0..=100, got {0}")]
    ThresholdOutOfRange(f32),

    #[error("format does not divide into whole 1/20 s chunks: {0}")]
    MisalignedChunk(String),

    #[error("audio device not found: {name}")]
    DeviceNotFound { name: String },

    #[error("format not supported by device: {format}")]
    FormatNotSupported { format: String },

    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default stream config: {0}")]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// Failures inside the capture loop. Fatal to the loop; the process still
/// drains the persistence queue for already-completed captures before it
/// exits.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("short read from input device: got {got} bytes, expected {expected}")]
    ShortRead { got: usize, expected: usize },

    #[error("audio stream failed: {0}")]
    Stream(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// A single save failed. Recovered locally: reported, never escalated to
/// stop capturing.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding failed: {0}")]
    Encode(String),
}
