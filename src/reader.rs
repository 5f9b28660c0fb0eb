//! The coded reader: a cursor over a [`ByteSource`] that decodes wire-format
//! primitives while enforcing length limits, a total size limit, and a
//! recursion bound.
//!
//! Every primitive read has a fully-inlined fast path that assumes the
//! requested bytes sit in the current chunk, and a slow path that walks byte
//! by byte, refilling across segment boundaries or from the stream as it
//! goes.

use bytes::Bytes;
use smallvec::SmallVec;

use crate::error::{DecodeError, DecodeErrorKind};
use crate::leb128;
use crate::message::ProtoString;
use crate::source::ByteSource;
use crate::util::{likely, unlikely};
use crate::wire::{zigzag_decode32, zigzag_decode64, FieldKey, WireType};

/// Default bound on embedded-message and group nesting.
pub const DEFAULT_RECURSION_LIMIT: u32 = 64;

/// Default bound on the total bytes a reader will consume.
#[allow(clippy::as_conversions)]
pub const DEFAULT_SIZE_LIMIT: u64 = i32::MAX as u64;

/// A single-owner decoder over one of the three input shapes.
///
/// The reader tracks an absolute byte offset from the start of the input, a
/// stack of absolute-offset ceilings pushed around length-delimited payloads,
/// and the nesting depth of embedded messages and groups. It is owned by one
/// logical task; operations are totally ordered and nothing is shared across
/// readers.
#[derive(Debug)]
pub struct ProtoReader<S> {
    source: S,
    /// Total bytes consumed; `position()` for error reporting.
    consumed: u64,
    /// Absolute-offset ceilings, innermost last.
    limits: SmallVec<[u64; 8]>,
    recursion_depth: u32,
    recursion_limit: u32,
    size_limit: u64,
}

impl<S: ByteSource> ProtoReader<S> {
    pub fn new(source: S) -> ProtoReader<S> {
        ProtoReader {
            source,
            consumed: 0,
            limits: SmallVec::new(),
            recursion_depth: 0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }

    /// Overrides [`DEFAULT_RECURSION_LIMIT`]. Clamped to at least 1.
    pub fn with_recursion_limit(mut self, limit: u32) -> ProtoReader<S> {
        self.recursion_limit = limit.max(1);
        self
    }

    /// Overrides [`DEFAULT_SIZE_LIMIT`]. Clamped to at least 1.
    pub fn with_size_limit(mut self, limit: u64) -> ProtoReader<S> {
        self.size_limit = limit.max(1);
        self
    }

    /// Absolute byte offset of the cursor from the start of the input.
    pub fn position(&self) -> u64 {
        self.consumed
    }

    pub(crate) fn err(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(kind, self.consumed)
    }

    fn io_err(&self, e: std::io::Error) -> DecodeError {
        DecodeError::new(DecodeErrorKind::Io(e), self.consumed)
    }

    /// Bytes readable from the current chunk without refilling or crossing
    /// the active limit.
    #[inline(always)]
    fn fast_len(&self) -> usize {
        let available = self.source.chunk().len();
        match self.limits.last() {
            Some(&limit) => {
                let remaining = limit.saturating_sub(self.consumed);
                available.min(usize::try_from(remaining).unwrap_or(usize::MAX))
            }
            None => available,
        }
    }

    /// Consumes `n` bytes of the current chunk, charging them against the
    /// size limit.
    #[inline(always)]
    #[allow(clippy::as_conversions)]
    fn advance(&mut self, n: usize) -> Result<(), DecodeError> {
        if unlikely(self.consumed + n as u64 > self.size_limit) {
            return Err(self.err(DecodeErrorKind::SizeLimitExceeded {
                limit: self.size_limit,
            }));
        }
        self.source.consume(n);
        self.consumed += n as u64;
        Ok(())
    }

    /// Makes the current chunk non-empty, refilling as often as needed.
    /// `Ok(false)` means the input is exhausted.
    fn ensure_some_bytes(&mut self) -> Result<bool, DecodeError> {
        loop {
            if !self.source.chunk().is_empty() {
                return Ok(true);
            }
            match self.source.refill() {
                Ok(true) => continue,
                Ok(false) => return Ok(false),
                Err(e) => return Err(self.io_err(e)),
            }
        }
    }

    /// Slow-path single byte read: respects the active limit and refills
    /// across segment boundaries.
    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        if unlikely(self.reached_limit()) {
            return Err(self.err(DecodeErrorKind::TruncatedMessage));
        }
        if !self.ensure_some_bytes()? {
            return Err(self.err(DecodeErrorKind::TruncatedMessage));
        }
        let byte = self.source.chunk()[0];
        self.advance(1)?;
        Ok(byte)
    }

    /// Reads the next field key, or `None` at end of input or at the active
    /// limit.
    pub fn read_tag(&mut self) -> Result<Option<FieldKey>, DecodeError> {
        if self.reached_limit() {
            return Ok(None);
        }
        if !self.ensure_some_bytes()? {
            return Ok(None);
        }

        // Keys for field numbers up to 4095 fit in two bytes, which covers
        // nearly every schema; peek those without a full varint decode.
        let available = self.fast_len();
        let b0 = self.source.chunk()[0];
        let raw = if likely(b0 < 0x80) {
            self.advance(1)?;
            u32::from(b0)
        } else if available >= 2 {
            let b1 = self.source.chunk()[1];
            if b1 < 0x80 {
                self.advance(2)?;
                u32::from(b0 & 0x7f) | (u32::from(b1) << 7)
            } else {
                self.read_varint32()?
            }
        } else {
            // A lone continuation byte at a segment boundary: fall through
            // to the varint slow path, which refills mid-value.
            self.read_varint32()?
        };

        match FieldKey::from_raw(raw) {
            Some(key) => Ok(Some(key)),
            None => Err(self.err(DecodeErrorKind::InvalidTag { raw })),
        }
    }

    /// Reads a varint and keeps the low 32 bits.
    ///
    /// Accepts up to ten bytes on the wire, discarding the upper bits of
    /// over-long encodings the way every canonical protobuf decoder does.
    #[allow(clippy::as_conversions)]
    pub fn read_varint32(&mut self) -> Result<u32, DecodeError> {
        if likely(self.fast_len() >= 5) {
            // SAFETY: at least five bytes are readable in the current chunk.
            if let Some((value, len)) = unsafe { leb128::decode_u32_unchecked(self.source.chunk()) }
            {
                self.advance(len)?;
                return Ok(value);
            }
            // Over-long encoding: decode the full width and truncate.
        }
        self.read_varint64_slow().map(|v| v as u32)
    }

    pub fn read_varint64(&mut self) -> Result<u64, DecodeError> {
        if likely(self.fast_len() >= leb128::MAX_VARINT_BYTES) {
            // SAFETY: at least MAX_VARINT_BYTES are readable in the current
            // chunk.
            return match unsafe { leb128::decode_u64_unchecked(self.source.chunk()) } {
                Some((value, len)) => {
                    self.advance(len)?;
                    Ok(value)
                }
                None => Err(self.err(DecodeErrorKind::MalformedVarint)),
            };
        }
        self.read_varint64_slow()
    }

    fn read_varint64_slow(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for i in 0..leb128::MAX_VARINT_BYTES {
            let byte = self.read_byte()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        Err(self.err(DecodeErrorKind::MalformedVarint))
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        if likely(self.fast_len() >= 4) {
            let c = self.source.chunk();
            let value = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            self.advance(4)?;
            return Ok(value);
        }
        let mut bytes = [0u8; 4];
        for slot in &mut bytes {
            *slot = self.read_byte()?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        if likely(self.fast_len() >= 8) {
            let c = self.source.chunk();
            let value = u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]);
            self.advance(8)?;
            return Ok(value);
        }
        let mut bytes = [0u8; 8];
        for slot in &mut bytes {
            *slot = self.read_byte()?;
        }
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        self.read_fixed64().map(f64::from_bits)
    }

    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        self.read_fixed32().map(f32::from_bits)
    }

    /// `int32` fields are sign-extended 64-bit varints on the wire.
    #[allow(clippy::as_conversions)]
    pub fn read_int32(&mut self) -> Result<i32, DecodeError> {
        self.read_varint64().map(|v| v as i32)
    }

    #[allow(clippy::as_conversions)]
    pub fn read_int64(&mut self) -> Result<i64, DecodeError> {
        self.read_varint64().map(|v| v as i64)
    }

    pub fn read_uint32(&mut self) -> Result<u32, DecodeError> {
        self.read_varint32()
    }

    pub fn read_uint64(&mut self) -> Result<u64, DecodeError> {
        self.read_varint64()
    }

    pub fn read_sint32(&mut self) -> Result<i32, DecodeError> {
        self.read_varint32().map(zigzag_decode32)
    }

    pub fn read_sint64(&mut self) -> Result<i64, DecodeError> {
        self.read_varint64().map(zigzag_decode64)
    }

    #[allow(clippy::as_conversions)]
    pub fn read_sfixed32(&mut self) -> Result<i32, DecodeError> {
        self.read_fixed32().map(|v| v as i32)
    }

    #[allow(clippy::as_conversions)]
    pub fn read_sfixed64(&mut self) -> Result<i64, DecodeError> {
        self.read_fixed64().map(|v| v as i64)
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        self.read_varint64().map(|v| v != 0)
    }

    pub fn read_enum(&mut self) -> Result<i32, DecodeError> {
        self.read_int32()
    }

    /// Reads a length prefix and validates it against the active limit.
    #[allow(clippy::as_conversions)]
    pub fn read_length(&mut self) -> Result<usize, DecodeError> {
        let raw = self.read_varint32()?;
        if unlikely((raw as i32) < 0) {
            return Err(self.err(DecodeErrorKind::NegativeSize));
        }
        let len = raw as usize;
        if let Some(&limit) = self.limits.last() {
            if unlikely(self.consumed + len as u64 > limit) {
                return Err(self.err(DecodeErrorKind::TruncatedMessage));
            }
        }
        Ok(len)
    }

    /// Reads a length-prefixed byte payload, zero-copy when it lies within a
    /// single segment.
    pub fn read_bytes(&mut self) -> Result<Bytes, DecodeError> {
        let len = self.read_length()?;
        self.take(len)
    }

    /// Reads a length-prefixed UTF-8 string. Invalid sequences do not fail;
    /// each offending byte is replaced with U+FFFD.
    pub fn read_string(&mut self) -> Result<ProtoString, DecodeError> {
        self.read_bytes().map(ProtoString::from_lossy)
    }

    #[allow(clippy::as_conversions)]
    fn take(&mut self, n: usize) -> Result<Bytes, DecodeError> {
        if unlikely(self.consumed + n as u64 > self.size_limit) {
            return Err(self.err(DecodeErrorKind::SizeLimitExceeded {
                limit: self.size_limit,
            }));
        }
        match self.source.take_bytes(n) {
            Ok(Some(data)) => {
                self.consumed += n as u64;
                Ok(data)
            }
            Ok(None) => Err(self.err(DecodeErrorKind::TruncatedMessage)),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Installs an absolute-offset ceiling `len` bytes past the cursor.
    ///
    /// Fails if the new ceiling would extend past the one already active.
    /// Every successful push is paired with exactly one
    /// [`pop_limit`](Self::pop_limit).
    #[allow(clippy::as_conversions)]
    pub fn push_limit(&mut self, len: usize) -> Result<(), DecodeError> {
        let ceiling = self.consumed + len as u64;
        if let Some(&outer) = self.limits.last() {
            if unlikely(ceiling > outer) {
                return Err(self.err(DecodeErrorKind::TruncatedMessage));
            }
        }
        self.limits.push(ceiling);
        Ok(())
    }

    /// Removes the innermost limit, restoring the previous one.
    pub fn pop_limit(&mut self) {
        self.limits.pop();
    }

    /// Whether the cursor sits at (or past) the active limit. Always false
    /// when no limit is installed.
    pub fn reached_limit(&self) -> bool {
        match self.limits.last() {
            Some(&limit) => self.consumed >= limit,
            None => false,
        }
    }

    /// Whether the input is exhausted. For a streaming source this may pull
    /// from the stream to find out.
    pub fn is_at_end(&mut self) -> Result<bool, DecodeError> {
        Ok(!self.ensure_some_bytes()?)
    }

    /// Fails with `MoreDataAvailable` unless the input is exhausted.
    pub fn expect_end(&mut self) -> Result<(), DecodeError> {
        if self.is_at_end()? {
            Ok(())
        } else {
            Err(self.err(DecodeErrorKind::MoreDataAvailable))
        }
    }

    /// Advances the cursor `n` bytes, refilling across segments as needed.
    #[allow(clippy::as_conversions)]
    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        if let Some(&limit) = self.limits.last() {
            if unlikely(self.consumed + n as u64 > limit) {
                return Err(self.err(DecodeErrorKind::TruncatedMessage));
            }
        }
        let mut remaining = n;
        while remaining > 0 {
            let available = self.source.chunk().len();
            if available == 0 {
                if !self.ensure_some_bytes()? {
                    return Err(self.err(DecodeErrorKind::TruncatedMessage));
                }
                continue;
            }
            let step = available.min(remaining);
            self.advance(step)?;
            remaining -= step;
        }
        Ok(())
    }

    /// Consumes the value of the field introduced by `key` without
    /// interpreting it.
    pub fn skip_field(&mut self, key: FieldKey) -> Result<(), DecodeError> {
        match key.wire_type() {
            WireType::Varint => {
                self.read_varint64()?;
                Ok(())
            }
            WireType::Fixed64 => self.skip(8),
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.skip(len)
            }
            WireType::StartGroup => self.skip_group(key),
            WireType::EndGroup => Err(self.err(DecodeErrorKind::UnexpectedEndGroup {
                field_number: key.field_number(),
            })),
            WireType::Fixed32 => self.skip(4),
        }
    }

    /// Skips a group opened by `start`, recursing through nested groups
    /// until the matching end-group tag.
    pub fn skip_group(&mut self, start: FieldKey) -> Result<(), DecodeError> {
        self.enter_recursion()?;
        loop {
            let Some(key) = self.read_tag()? else {
                return Err(self.err(DecodeErrorKind::TruncatedMessage));
            };
            if key.wire_type() == WireType::EndGroup {
                if unlikely(key.field_number() != start.field_number()) {
                    return Err(self.err(DecodeErrorKind::MalformedGroup {
                        start: start.field_number(),
                        end: key.field_number(),
                    }));
                }
                break;
            }
            self.skip_field(key)?;
        }
        self.leave_recursion();
        Ok(())
    }

    pub(crate) fn enter_recursion(&mut self) -> Result<(), DecodeError> {
        if unlikely(self.recursion_depth >= self.recursion_limit) {
            return Err(self.err(DecodeErrorKind::RecursionLimitExceeded {
                limit: self.recursion_limit,
            }));
        }
        self.recursion_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_recursion(&mut self) {
        self.recursion_depth = self.recursion_depth.saturating_sub(1);
    }
}
