//! Growable per-connection byte buffers.

/// Bytes waiting to be interpreted or written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoBuffer {
    bytes: Vec<u8>,
}

impl IoBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Drop the first `n` bytes, or everything if fewer are buffered.
    pub fn consume(&mut self, n: usize) {
        if n >= self.bytes.len() {
            self.bytes.clear();
        } else {
            self.bytes.drain(..n);
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
