use soundtrap_foundation::CaptureError;

/// Fixed circular byte buffer holding the most recent pre-roll window.
///
/// Writes advance one whole chunk at a time; the capacity is a multiple of
/// the chunk size, so the cursor lands exactly on the end and wraps to zero
/// rather than straddling it.
pub struct PreRollBuffer {
    data: Vec<u8>,
    chunk_bytes: usize,
    index: usize,
    wrapped: bool,
}

impl PreRollBuffer {
    pub fn new(capacity: usize, chunk_bytes: usize) -> Result<Self, CaptureError> {
        if capacity == 0 || chunk_bytes == 0 || capacity % chunk_bytes != 0 {
            return Err(CaptureError::Invariant(format!(
                "pre-roll capacity {capacity} is not a positive multiple of chunk size {chunk_bytes}"
            )));
        }
        Ok(Self {
            data: vec![0u8; capacity],
            chunk_bytes,
            index: 0,
            wrapped: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn has_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Copies one chunk at the cursor and advances it, wrapping at capacity.
    /// Returns the index the chunk was written at.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> usize {
        debug_assert_eq!(chunk.len(), self.chunk_bytes);
        let at = self.index;
        self.data[at..at + self.chunk_bytes].copy_from_slice(chunk);
        self.index += self.chunk_bytes;
        if self.index == self.data.len() {
            self.index = 0;
            self.wrapped = true;
        }
        at
    }

    /// The most recent `min(capacity, bytes written)` bytes in chronological
    /// order, ending with the chunk written at `upto_index`.
    ///
    /// Before the first wrap that is the plain prefix; afterwards the oldest
    /// retained data sits just past the cursor, so the two halves are
    /// stitched back together across the wrap boundary.
    pub fn linearize(&self, upto_index: usize) -> Vec<u8> {
        let end = upto_index + self.chunk_bytes;
        if !self.wrapped {
            return self.data[..end].to_vec();
        }
        let mut out = Vec::with_capacity(self.data.len());
        out.extend_from_slice(&self.data[end..]);
        out.extend_from_slice(&self.data[..end]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 2;

    fn chunk(value: u8) -> Vec<u8> {
        vec![value; CHUNK]
    }

    #[test]
    fn rejects_misaligned_capacity() {
        assert!(PreRollBuffer::new(7, CHUNK).is_err());
        assert!(PreRollBuffer::new(0, CHUNK).is_err());
        assert!(PreRollBuffer::new(8, CHUNK).is_ok());
    }

    #[test]
    fn linearize_before_wrap_returns_writes_in_order() {
        let mut buffer = PreRollBuffer::new(8, CHUNK).unwrap();
        assert_eq!(buffer.write_chunk(&chunk(1)), 0);
        let at = buffer.write_chunk(&chunk(2));
        assert_eq!(at, 2);
        assert!(!buffer.has_wrapped());
        assert_eq!(buffer.linearize(at), vec![1, 1, 2, 2]);
    }

    #[test]
    fn write_count_exactly_at_capacity_wraps_and_keeps_order() {
        let mut buffer = PreRollBuffer::new(8, CHUNK).unwrap();
        let mut last = 0;
        for value in 1..=4 {
            last = buffer.write_chunk(&chunk(value));
        }
        assert_eq!(last, 6);
        assert!(buffer.has_wrapped());
        assert_eq!(buffer.linearize(last), vec![1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn write_count_past_capacity_overwrites_oldest() {
        let mut buffer = PreRollBuffer::new(8, CHUNK).unwrap();
        for value in 1..=4 {
            buffer.write_chunk(&chunk(value));
        }
        let at = buffer.write_chunk(&chunk(5));
        assert_eq!(at, 0);
        assert_eq!(buffer.linearize(at), vec![2, 2, 3, 3, 4, 4, 5, 5]);
    }

    #[test]
    fn linearize_mid_cycle_after_wrap_stitches_halves() {
        let mut buffer = PreRollBuffer::new(8, CHUNK).unwrap();
        let mut at = 0;
        for value in 1..=6 {
            at = buffer.write_chunk(&chunk(value));
        }
        assert_eq!(at, 2);
        assert_eq!(buffer.linearize(at), vec![3, 3, 4, 4, 5, 5, 6, 6]);
    }
}
