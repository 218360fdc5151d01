//! Once-readable byte streams with a bounded rewind window.

use std::io::{self, Read};

use crate::domain::errors::DecodeError;

/// A once-readable stream that remembers up to `mark_limit` bytes so it can
/// be rewound to its start.
///
/// Reading past the limit discards the remembered bytes; after that the
/// stream can no longer be rewound.
pub struct RewindableStream {
    inner: Box<dyn Read + Send>,
    buffer: Vec<u8>,
    pos: usize,
    mark_limit: usize,
    consumed: usize,
    overflowed: bool,
}

impl RewindableStream {
    /// Wraps `inner`, remembering at most `mark_limit` bytes.
    pub fn new(inner: impl Read + Send + 'static, mark_limit: usize) -> Self {
        Self {
            inner: Box::new(inner),
            buffer: Vec::new(),
            pos: 0,
            mark_limit,
            consumed: 0,
            overflowed: false,
        }
    }

    /// Returns the total number of bytes pulled from the underlying reader.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Returns how many bytes are remembered for rewinding.
    #[must_use]
    pub const fn mark_limit(&self) -> usize {
        self.mark_limit
    }

    /// Returns true if the stream can still be rewound.
    #[must_use]
    pub const fn is_reseekable(&self) -> bool {
        !self.overflowed
    }

    /// Moves the read position back to the start of the stream.
    ///
    /// # Errors
    /// Returns [`DecodeError::StreamNotReseekable`] once more than
    /// `mark_limit` bytes have been read.
    pub fn rewind(&mut self) -> Result<(), DecodeError> {
        if self.overflowed {
            return Err(DecodeError::StreamNotReseekable {
                consumed: self.consumed,
            });
        }
        self.pos = 0;
        Ok(())
    }

    /// Reads up to `limit` bytes from the current position.
    ///
    /// # Errors
    /// Propagates I/O errors from the underlying reader.
    pub fn read_prefix(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(limit.min(64 * 1024));
        self.by_ref().take(limit as u64).read_to_end(&mut out)?;
        Ok(out)
    }

    /// Reads everything from the current position.
    ///
    /// # Errors
    /// Propagates I/O errors from the underlying reader.
    pub fn read_remaining(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Read for RewindableStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.overflowed && self.pos < self.buffer.len() {
            let n = (self.buffer.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }

        let n = self.inner.read(buf)?;
        self.consumed += n;
        if !self.overflowed {
            if self.buffer.len() + n > self.mark_limit {
                self.overflowed = true;
                self.buffer = Vec::new();
                self.pos = 0;
            } else {
                self.buffer.extend_from_slice(&buf[..n]);
                self.pos = self.buffer.len();
            }
        }
        Ok(n)
    }
}

impl std::fmt::Debug for RewindableStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewindableStream")
            .field("consumed", &self.consumed)
            .field("mark_limit", &self.mark_limit)
            .field("reseekable", &!self.overflowed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_rewind_within_limit_replays_bytes() {
        let mut stream = RewindableStream::new(Cursor::new(b"hello world".to_vec()), 64);
        assert_eq!(stream.read_prefix(5).unwrap(), b"hello");
        stream.rewind().unwrap();
        assert_eq!(stream.read_remaining().unwrap(), b"hello world");
        stream.rewind().unwrap();
        assert_eq!(stream.read_remaining().unwrap(), b"hello world");
        assert_eq!(stream.consumed(), 11);
    }

    #[test]
    fn test_reading_past_limit_disables_rewind() {
        let mut stream = RewindableStream::new(Cursor::new(vec![7u8; 100]), 10);
        assert_eq!(stream.read_remaining().unwrap().len(), 100);
        assert!(!stream.is_reseekable());

        let err = stream.rewind().unwrap_err();
        assert!(err.is_not_reseekable());
    }

    #[test]
    fn test_prefix_then_remaining_continues() {
        let mut stream = RewindableStream::new(Cursor::new(b"abcdef".to_vec()), 3);
        assert_eq!(stream.read_prefix(2).unwrap(), b"ab");
        assert_eq!(stream.read_remaining().unwrap(), b"cdef");
        assert!(stream.rewind().is_err());
    }
}
