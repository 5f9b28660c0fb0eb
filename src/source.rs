//! Byte sources: the three input shapes a [`ProtoReader`] parses over.
//!
//! A source exposes one contiguous run of unread bytes at a time. The reader
//! decodes straight out of that run on its fast paths and calls [`refill`]
//! only when the run is empty, so for the contiguous and segmented shapes
//! refilling is free of I/O and for the streaming shape it is the single
//! suspension point.
//!
//! [`ProtoReader`]: crate::reader::ProtoReader
//! [`refill`]: ByteSource::refill

use std::collections::VecDeque;
use std::io;
use std::io::Read;

use bytes::{Buf, Bytes};

/// Scratch buffer size for [`StreamSource`] unless overridden.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 4096;

/// A cursor-shaped supply of input bytes.
pub trait ByteSource {
    /// The current contiguous run of unread bytes.
    fn chunk(&self) -> &[u8];

    /// Advances past `n` bytes of the current chunk.
    ///
    /// Callers keep `n <= self.chunk().len()`.
    fn consume(&mut self, n: usize);

    /// Makes more bytes visible through [`chunk`](ByteSource::chunk).
    ///
    /// Called when the current chunk is empty. `Ok(true)` guarantees the
    /// chunk is now non-empty; `Ok(false)` means the input is exhausted.
    fn refill(&mut self) -> io::Result<bool>;

    /// Detaches the next `n` bytes as an owned [`Bytes`], zero-copy when they
    /// sit inside a single segment.
    ///
    /// Returns `Ok(None)` when the input ends before `n` bytes arrive; the
    /// cursor position is unspecified afterwards and the caller abandons the
    /// parse.
    fn take_bytes(&mut self, n: usize) -> io::Result<Option<Bytes>>;
}

/// A single contiguous byte range. Never refills.
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Bytes,
}

impl BytesSource {
    pub fn new(data: impl Into<Bytes>) -> BytesSource {
        BytesSource { data: data.into() }
    }
}

impl ByteSource for BytesSource {
    #[inline(always)]
    fn chunk(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    fn consume(&mut self, n: usize) {
        self.data.advance(n);
    }

    #[inline]
    fn refill(&mut self) -> io::Result<bool> {
        Ok(false)
    }

    fn take_bytes(&mut self, n: usize) -> io::Result<Option<Bytes>> {
        if self.data.len() < n {
            return Ok(None);
        }
        Ok(Some(self.data.split_to(n)))
    }
}

/// An ordered sequence of contiguous byte ranges, as produced by a chain of
/// buffers from an asynchronous transport.
///
/// Transitioning between segments is the only refill event. A payload that
/// lies entirely inside one segment is detached without copying.
#[derive(Debug, Clone, Default)]
pub struct SegmentedSource {
    segments: VecDeque<Bytes>,
}

impl SegmentedSource {
    pub fn new<I>(segments: I) -> SegmentedSource
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        SegmentedSource {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    fn remaining(&self) -> usize {
        self.segments.iter().map(Bytes::len).sum()
    }
}

impl ByteSource for SegmentedSource {
    #[inline(always)]
    fn chunk(&self) -> &[u8] {
        match self.segments.front() {
            Some(front) => front,
            None => &[],
        }
    }

    #[inline(always)]
    fn consume(&mut self, n: usize) {
        if let Some(front) = self.segments.front_mut() {
            front.advance(n);
        }
    }

    fn refill(&mut self) -> io::Result<bool> {
        // Input may contain empty segments; skip them all so Ok(true) always
        // leaves a non-empty chunk.
        loop {
            match self.segments.front() {
                Some(front) if front.is_empty() => {
                    self.segments.pop_front();
                }
                Some(_) => return Ok(true),
                None => return Ok(false),
            }
        }
    }

    fn take_bytes(&mut self, n: usize) -> io::Result<Option<Bytes>> {
        if !self.refill()? {
            return if n == 0 { Ok(Some(Bytes::new())) } else { Ok(None) };
        }

        // Zero-copy when the payload lies within the current segment.
        if let Some(front) = self.segments.front_mut() {
            if front.len() >= n {
                return Ok(Some(front.split_to(n)));
            }
        }

        // Split across segments: gather into one owned buffer. Checking the
        // total first keeps an adversarial length prefix from reserving
        // memory the input cannot back.
        if self.remaining() < n {
            return Ok(None);
        }
        let mut gathered = Vec::with_capacity(n);
        let mut needed = n;
        while needed > 0 {
            if !self.refill()? {
                return Ok(None);
            }
            let Some(front) = self.segments.front_mut() else {
                return Ok(None);
            };
            let step = front.len().min(needed);
            gathered.extend_from_slice(&front[..step]);
            front.advance(step);
            needed -= step;
        }
        Ok(Some(Bytes::from(gathered)))
    }
}

/// A pull-based byte stream buffered through a fixed scratch buffer.
///
/// The scratch buffer is acquired at construction and refilled on demand;
/// `eof` records whether the last read observed end-of-input so an exhausted
/// stream is never polled twice.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R) -> StreamSource<R> {
        StreamSource::with_capacity(DEFAULT_STREAM_BUFFER_SIZE, inner)
    }

    pub fn with_capacity(capacity: usize, inner: R) -> StreamSource<R> {
        StreamSource {
            inner,
            buf: vec![0; capacity.max(1)].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
        }
    }

    /// Returns the underlying stream. Buffered-but-unparsed bytes are
    /// dropped.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    #[inline(always)]
    fn chunk(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    #[inline(always)]
    fn consume(&mut self, n: usize) {
        self.start += n;
    }

    fn refill(&mut self) -> io::Result<bool> {
        if self.start < self.end {
            return Ok(true);
        }
        if self.eof {
            return Ok(false);
        }
        self.start = 0;
        self.end = 0;
        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.end = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn take_bytes(&mut self, n: usize) -> io::Result<Option<Bytes>> {
        // The stream's total length is unknown, so allocation is capped at
        // the scratch size and grows only as bytes actually arrive.
        let mut gathered = Vec::with_capacity(n.min(self.buf.len()));
        let mut needed = n;
        while needed > 0 {
            if self.start == self.end && !self.refill()? {
                return Ok(None);
            }
            let step = (self.end - self.start).min(needed);
            gathered.extend_from_slice(&self.buf[self.start..self.start + step]);
            self.start += step;
            needed -= step;
        }
        Ok(Some(Bytes::from(gathered)))
    }
}
