use bytes::{Bytes, BytesMut};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Bytes already pulled from the transport but not yet handed to a caller.
///
/// Reads drain from the front; bytes found past a transaction's terminal line
/// are pushed back onto the front so they are seen before anything newer.
#[derive(Debug)]
pub struct PendingBuffer {
    buf: BytesMut,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// How many more bytes are needed to satisfy a read of `max_len`.
    pub fn shortfall(&self, max_len: usize) -> usize {
        max_len.saturating_sub(self.buf.len())
    }

    /// Append bytes obtained from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Remove and return up to `max_len` bytes from the front.
    pub fn take(&mut self, max_len: usize) -> Bytes {
        let count = max_len.min(self.buf.len());
        self.buf.split_to(count).freeze()
    }

    /// Put `bytes` back ahead of everything currently buffered.
    pub fn push_front(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut merged = BytesMut::with_capacity(bytes.len() + self.buf.len());
        merged.extend_from_slice(bytes);
        merged.extend_from_slice(&self.buf);
        self.buf = merged;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for PendingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_leaves_excess_buffered() {
        let mut buf = PendingBuffer::new();
        buf.extend(b"hello world");

        assert_eq!(buf.take(5).as_ref(), b"hello");
        assert_eq!(buf.as_slice(), b" world");
        assert_eq!(buf.take(64).as_ref(), b" world");
        assert!(buf.is_empty());
    }

    #[test]
    fn shortfall_counts_missing_bytes() {
        let mut buf = PendingBuffer::new();
        assert_eq!(buf.shortfall(8), 8);
        buf.extend(b"abc");
        assert_eq!(buf.shortfall(8), 5);
        assert_eq!(buf.shortfall(2), 0);
    }

    #[test]
    fn push_front_preserves_order() {
        let mut buf = PendingBuffer::new();
        buf.extend(b"later");
        buf.push_front(b"first-");
        assert_eq!(buf.as_slice(), b"first-later");

        buf.push_front(b"");
        assert_eq!(buf.len(), 11);
    }
}
