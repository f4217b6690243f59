const FULL_SCALE: f64 = i16::MAX as f64;

/// Computes one RMS loudness percentage per chunk of 16-bit PCM bytes.
///
/// Bytes are read as signed big-endian sample pairs, one sample per two
/// bytes regardless of channel count. The mean square uses integer division
/// over the sample count before the square root; threshold percentages are
/// calibrated against exactly this sequence of operations.
pub struct LoudnessDetector;

impl LoudnessDetector {
    pub fn new() -> Self {
        Self
    }

    /// RMS amplitude of `chunk` as a percentage of full scale.
    ///
    /// Chunk lengths are always even when derived from a valid config; an
    /// odd length is a caller bug.
    pub fn measure(&self, chunk: &[u8]) -> f32 {
        assert!(
            chunk.len() % 2 == 0,
            "chunk length must be an even number of bytes"
        );
        if chunk.is_empty() {
            return 0.0;
        }

        let mut sum_squares: i64 = 0;
        for pair in chunk.chunks_exact(2) {
            let sample = i16::from_be_bytes([pair[0], pair[1]]) as i64;
            sum_squares += sample * sample;
        }

        let mean_square = sum_squares / (chunk.len() / 2) as i64;
        ((mean_square as f64).sqrt() / FULL_SCALE * 100.0) as f32
    }
}

impl Default for LoudnessDetector {
    fn default() -> Self {
        Self::new()
    }
}
