//! Output sinks: the three output shapes a [`ProtoWriter`] encodes into.
//!
//! [`ProtoWriter`]: crate::writer::ProtoWriter

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};

use crate::error::EncodeError;

/// Scratch buffer size for [`StreamSink`] unless overridden.
pub const DEFAULT_SINK_BUFFER_SIZE: usize = 4096;

/// A destination for encoded bytes.
pub trait WriteSink {
    /// Appends `data` in full, or fails without a partial-write guarantee.
    fn write(&mut self, data: &[u8]) -> Result<(), EncodeError>;

    /// Pushes any buffered bytes through to the destination.
    fn flush(&mut self) -> Result<(), EncodeError> {
        Ok(())
    }
}

/// A fixed-capacity sink over a caller-provided buffer.
///
/// Overflowing the buffer fails with [`EncodeError::OutOfSpace`].
#[derive(Debug)]
pub struct SliceSink<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl<'a> SliceSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> SliceSink<'a> {
        SliceSink { buf, written: 0 }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Capacity left in the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.written
    }
}

impl WriteSink for SliceSink<'_> {
    fn write(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        let end = self
            .written
            .checked_add(data.len())
            .filter(|&end| end <= self.buf.len())
            .ok_or(EncodeError::OutOfSpace)?;
        self.buf[self.written..end].copy_from_slice(data);
        self.written = end;
        Ok(())
    }
}

impl WriteSink for Vec<u8> {
    fn write(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.extend_from_slice(data);
        Ok(())
    }
}

impl WriteSink for BytesMut {
    fn write(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.put_slice(data);
        Ok(())
    }
}

/// A push-stream sink that buffers through a scratch buffer and writes to
/// the underlying stream whenever the scratch fills.
#[derive(Debug)]
pub struct StreamSink<W> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W) -> StreamSink<W> {
        StreamSink::with_capacity(DEFAULT_SINK_BUFFER_SIZE, inner)
    }

    pub fn with_capacity(capacity: usize, inner: W) -> StreamSink<W> {
        StreamSink {
            inner,
            buf: Vec::with_capacity(capacity.max(1)),
        }
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    /// Flushes the scratch buffer and returns the underlying stream.
    pub fn into_inner(mut self) -> Result<W, EncodeError> {
        self.flush_buf()?;
        Ok(self.inner)
    }
}

impl<W: Write> WriteSink for StreamSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.buf.len() + data.len() > self.buf.capacity() {
            self.flush_buf()?;
        }
        if data.len() >= self.buf.capacity() {
            // Oversized writes bypass the scratch buffer entirely.
            self.inner.write_all(data)?;
        } else {
            self.buf.extend_from_slice(data);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EncodeError> {
        self.flush_buf()?;
        self.inner.flush()?;
        Ok(())
    }
}
