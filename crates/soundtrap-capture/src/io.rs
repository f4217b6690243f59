use soundtrap_foundation::CaptureError;

/// Blocking pull of raw PCM chunks from an input device.
pub trait AudioSource: Send {
    /// Fills `buf` with the next chunk of the stream and returns the number
    /// of bytes read. Implementations must fail loudly on device errors;
    /// anything short of `buf.len()` is treated as fatal by the caller.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError>;
}

/// Push of raw PCM chunks to a live monitoring output.
pub trait AudioSink: Send {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CaptureError>;
}
