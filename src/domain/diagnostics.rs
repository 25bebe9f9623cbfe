use std::collections::VecDeque;

/// Default number of subprocess output bytes kept for failure reports.
pub const DEFAULT_TAIL_BYTES: usize = 16 * 1024;

/// Keeps only the most recent `capacity` bytes written to it.
#[derive(Debug)]
pub struct DiagnosticTail {
    buf: VecDeque<u8>,
    capacity: usize,
    dropped: u64,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(DEFAULT_TAIL_BYTES)),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.capacity == 0 {
            self.dropped += chunk.len() as u64;
            return;
        }
        let chunk = if chunk.len() > self.capacity {
            let skip = chunk.len() - self.capacity;
            self.dropped += skip as u64;
            &chunk[skip..]
        } else {
            chunk
        };
        let overflow = (self.buf.len() + chunk.len()).saturating_sub(self.capacity);
        self.buf.drain(..overflow);
        self.dropped += overflow as u64;
        self.buf.extend(chunk);
    }

    /// Bytes discarded so far to stay within capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn text(&self) -> String {
        let (front, back) = self.buf.as_slices();
        let mut bytes = Vec::with_capacity(self.buf.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_BYTES)
    }
}
