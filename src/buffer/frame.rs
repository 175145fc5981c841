//! Payload + fixed-suffix view over a buffer.

use bytes::BytesMut;

use crate::error::{Error, Result};

/// A buffer split into a message and a trailing suffix of known length.
///
/// Sending side: [`Frame::extend`] appends the suffix bytes to a buffer that
/// holds only the payload. Receiving side: [`Frame::parse`] takes a complete
/// buffer and treats its last `suffix_len` bytes as the suffix.
#[derive(Debug)]
pub struct Frame<'a> {
    buf: &'a mut BytesMut,
    suffix_len: usize,
}

impl<'a> Frame<'a> {
    /// Reserve `suffix_len` zeroed bytes after the payload already in `buf`.
    pub fn extend(buf: &'a mut BytesMut, suffix_len: usize) -> Self {
        let len = buf.len();
        buf.resize(len + suffix_len, 0);
        Self { buf, suffix_len }
    }

    /// View a received buffer. Fails if it cannot hold the suffix.
    pub fn parse(buf: &'a mut BytesMut, suffix_len: usize) -> Result<Self> {
        if buf.len() < suffix_len {
            return Err(Error::Buffer {
                expected: suffix_len,
                actual: buf.len(),
            });
        }
        Ok(Self { buf, suffix_len })
    }

    /// Length of the message part.
    pub fn message_len(&self) -> usize {
        self.buf.len() - self.suffix_len
    }

    /// The message part.
    pub fn message(&self) -> &[u8] {
        &self.buf[..self.message_len()]
    }

    /// The suffix part.
    pub fn suffix(&self) -> &[u8] {
        &self.buf[self.message_len()..]
    }

    /// The suffix part, writable.
    pub fn suffix_mut(&mut self) -> &mut [u8] {
        let at = self.message_len();
        &mut self.buf[at..]
    }

    /// Message and suffix together.
    pub fn complete_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }

    /// Drop the suffix, leaving only the message in the buffer.
    pub fn into_message(self) -> &'a mut BytesMut {
        let len = self.message_len();
        self.buf.truncate(len);
        self.buf
    }
}
