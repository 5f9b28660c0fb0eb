//! The coded writer: encodes wire-format primitives into a [`WriteSink`],
//! together with the `encoded_*_len` family that mirrors every writer.
//!
//! Length prefixes are never backpatched: nested sizes are computed up front
//! through [`MessageWrite::encoded_len`] and the `encoded_*_len` helpers, so
//! output can go straight to a stream.

use crate::error::EncodeError;
use crate::leb128;
use crate::sink::WriteSink;
use crate::wire::{zigzag_encode32, zigzag_encode64, FieldKey, WireType};

/// A message body that can report its encoded size and write itself.
///
/// This is the encode-side counterpart of the decode-side
/// [`MessageType`](crate::message::MessageType) capability: the writer owns
/// framing (keys, length prefixes), the implementor owns the body.
pub trait MessageWrite {
    /// Encoded length of the message body, excluding any length prefix.
    fn encoded_len(&self) -> usize;

    /// Writes the message body, excluding any length prefix.
    fn write_to<S: WriteSink>(&self, writer: &mut ProtoWriter<S>) -> Result<(), EncodeError>;
}

/// Encodes wire-format values into one of the three output shapes.
#[derive(Debug)]
pub struct ProtoWriter<S> {
    sink: S,
    written: u64,
}

impl<S: WriteSink> ProtoWriter<S> {
    pub fn new(sink: S) -> ProtoWriter<S> {
        ProtoWriter { sink, written: 0 }
    }

    /// Total bytes emitted so far.
    pub fn position(&self) -> u64 {
        self.written
    }

    /// Pushes buffered bytes through to the destination (a no-op for
    /// in-memory sinks).
    pub fn flush(&mut self) -> Result<(), EncodeError> {
        self.sink.flush()
    }

    /// Returns the sink. Stream sinks should be flushed first.
    pub fn into_inner(self) -> S {
        self.sink
    }

    #[inline(always)]
    #[allow(clippy::as_conversions)]
    fn emit(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.sink.write(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Writes the key introducing `field_number` with `wire_type`.
    pub fn write_tag(&mut self, field_number: u32, wire_type: WireType) -> Result<(), EncodeError> {
        self.write_varint32(FieldKey::new(field_number, wire_type).raw())
    }

    /// Emits pre-computed key bytes, for generated code that caches them.
    pub fn write_raw_tag(&mut self, tag_bytes: &[u8]) -> Result<(), EncodeError> {
        self.emit(tag_bytes)
    }

    pub fn write_varint32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_varint64(u64::from(value))
    }

    pub fn write_varint64(&mut self, value: u64) -> Result<(), EncodeError> {
        let mut scratch = [0u8; leb128::MAX_VARINT_BYTES];
        let len = leb128::encode_u64(value, &mut scratch);
        self.emit(&scratch[..len])
    }

    pub fn write_fixed32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.emit(&value.to_le_bytes())
    }

    pub fn write_fixed64(&mut self, value: u64) -> Result<(), EncodeError> {
        self.emit(&value.to_le_bytes())
    }

    pub fn write_double(&mut self, value: f64) -> Result<(), EncodeError> {
        self.write_fixed64(value.to_bits())
    }

    pub fn write_float(&mut self, value: f32) -> Result<(), EncodeError> {
        self.write_fixed32(value.to_bits())
    }

    /// `int32` values are sign-extended to 64 bits on the wire, so negatives
    /// always occupy ten bytes.
    #[allow(clippy::as_conversions)]
    pub fn write_int32(&mut self, value: i32) -> Result<(), EncodeError> {
        self.write_varint64(i64::from(value) as u64)
    }

    #[allow(clippy::as_conversions)]
    pub fn write_int64(&mut self, value: i64) -> Result<(), EncodeError> {
        self.write_varint64(value as u64)
    }

    pub fn write_uint32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_varint32(value)
    }

    pub fn write_uint64(&mut self, value: u64) -> Result<(), EncodeError> {
        self.write_varint64(value)
    }

    pub fn write_sint32(&mut self, value: i32) -> Result<(), EncodeError> {
        self.write_varint32(zigzag_encode32(value))
    }

    pub fn write_sint64(&mut self, value: i64) -> Result<(), EncodeError> {
        self.write_varint64(zigzag_encode64(value))
    }

    #[allow(clippy::as_conversions)]
    pub fn write_sfixed32(&mut self, value: i32) -> Result<(), EncodeError> {
        self.write_fixed32(value as u32)
    }

    #[allow(clippy::as_conversions)]
    pub fn write_sfixed64(&mut self, value: i64) -> Result<(), EncodeError> {
        self.write_fixed64(value as u64)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), EncodeError> {
        self.emit(&[u8::from(value)])
    }

    pub fn write_enum(&mut self, value: i32) -> Result<(), EncodeError> {
        self.write_int32(value)
    }

    /// Writes a length prefix. Wire-format lengths fit in 31 bits.
    #[allow(clippy::as_conversions)]
    pub fn write_length(&mut self, len: usize) -> Result<(), EncodeError> {
        debug_assert!(len <= i32::MAX as usize, "length {len} exceeds wire range");
        self.write_varint32(len as u32)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<(), EncodeError> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a length-prefixed byte payload.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), EncodeError> {
        self.write_length(value.len())?;
        self.emit(value)
    }

    /// Writes bytes verbatim, with no length prefix.
    pub fn write_raw_bytes(&mut self, value: &[u8]) -> Result<(), EncodeError> {
        self.emit(value)
    }

    /// Writes a length-prefixed message body.
    ///
    /// The size is computed before any byte is emitted, trading one extra
    /// traversal for a stream-friendly single pass.
    pub fn write_message<M: MessageWrite>(&mut self, message: &M) -> Result<(), EncodeError> {
        self.write_length(message.encoded_len())?;
        message.write_to(self)
    }

    /// Writes a `google.protobuf.DoubleValue` body: a length-delimited
    /// message whose field 1 holds the primitive. Default values produce an
    /// empty body.
    pub fn write_wrapped_double(&mut self, value: f64) -> Result<(), EncodeError> {
        if value.to_bits() == 0 {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_double_len())?;
        self.write_tag(1, WireType::Fixed64)?;
        self.write_double(value)
    }

    /// Writes a `google.protobuf.FloatValue` body.
    pub fn write_wrapped_float(&mut self, value: f32) -> Result<(), EncodeError> {
        if value.to_bits() == 0 {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_float_len())?;
        self.write_tag(1, WireType::Fixed32)?;
        self.write_float(value)
    }

    /// Writes a `google.protobuf.Int32Value` body.
    pub fn write_wrapped_int32(&mut self, value: i32) -> Result<(), EncodeError> {
        if value == 0 {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_int32_len(value))?;
        self.write_tag(1, WireType::Varint)?;
        self.write_int32(value)
    }

    /// Writes a `google.protobuf.Int64Value` body.
    pub fn write_wrapped_int64(&mut self, value: i64) -> Result<(), EncodeError> {
        if value == 0 {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_int64_len(value))?;
        self.write_tag(1, WireType::Varint)?;
        self.write_int64(value)
    }

    /// Writes a `google.protobuf.UInt32Value` body.
    pub fn write_wrapped_uint32(&mut self, value: u32) -> Result<(), EncodeError> {
        if value == 0 {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_uint32_len(value))?;
        self.write_tag(1, WireType::Varint)?;
        self.write_uint32(value)
    }

    /// Writes a `google.protobuf.UInt64Value` body.
    pub fn write_wrapped_uint64(&mut self, value: u64) -> Result<(), EncodeError> {
        if value == 0 {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_uint64_len(value))?;
        self.write_tag(1, WireType::Varint)?;
        self.write_uint64(value)
    }

    /// Writes a `google.protobuf.BoolValue` body.
    pub fn write_wrapped_bool(&mut self, value: bool) -> Result<(), EncodeError> {
        if !value {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_bool_len())?;
        self.write_tag(1, WireType::Varint)?;
        self.write_bool(value)
    }

    /// Writes a `google.protobuf.StringValue` body.
    pub fn write_wrapped_string(&mut self, value: &str) -> Result<(), EncodeError> {
        if value.is_empty() {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_string_len(value))?;
        self.write_tag(1, WireType::LengthDelimited)?;
        self.write_string(value)
    }

    /// Writes a `google.protobuf.BytesValue` body.
    pub fn write_wrapped_bytes(&mut self, value: &[u8]) -> Result<(), EncodeError> {
        if value.is_empty() {
            return self.write_length(0);
        }
        self.write_length(encoded_tag_len(1) + encoded_bytes_len(value))?;
        self.write_tag(1, WireType::LengthDelimited)?;
        self.write_bytes(value)
    }
}

/// Encoded length of a field key. The wire type lives in the low three bits
/// and never changes the length.
pub fn encoded_tag_len(field_number: u32) -> usize {
    leb128::encoded_u32_len(field_number << 3)
}

pub fn encoded_varint32_len(value: u32) -> usize {
    leb128::encoded_u32_len(value)
}

pub fn encoded_varint64_len(value: u64) -> usize {
    leb128::encoded_u64_len(value)
}

#[allow(clippy::as_conversions)]
pub fn encoded_int32_len(value: i32) -> usize {
    leb128::encoded_u64_len(i64::from(value) as u64)
}

#[allow(clippy::as_conversions)]
pub fn encoded_int64_len(value: i64) -> usize {
    leb128::encoded_u64_len(value as u64)
}

pub fn encoded_uint32_len(value: u32) -> usize {
    leb128::encoded_u32_len(value)
}

pub fn encoded_uint64_len(value: u64) -> usize {
    leb128::encoded_u64_len(value)
}

pub fn encoded_sint32_len(value: i32) -> usize {
    leb128::encoded_u32_len(zigzag_encode32(value))
}

pub fn encoded_sint64_len(value: i64) -> usize {
    leb128::encoded_u64_len(zigzag_encode64(value))
}

pub const fn encoded_fixed32_len() -> usize {
    4
}

pub const fn encoded_fixed64_len() -> usize {
    8
}

pub const fn encoded_sfixed32_len() -> usize {
    4
}

pub const fn encoded_sfixed64_len() -> usize {
    8
}

pub const fn encoded_float_len() -> usize {
    4
}

pub const fn encoded_double_len() -> usize {
    8
}

pub const fn encoded_bool_len() -> usize {
    1
}

pub fn encoded_enum_len(value: i32) -> usize {
    encoded_int32_len(value)
}

#[allow(clippy::as_conversions)]
pub fn encoded_length_len(len: usize) -> usize {
    debug_assert!(len <= i32::MAX as usize, "length {len} exceeds wire range");
    leb128::encoded_u32_len(len as u32)
}

pub fn encoded_string_len(value: &str) -> usize {
    encoded_length_len(value.len()) + value.len()
}

pub fn encoded_bytes_len(value: &[u8]) -> usize {
    encoded_length_len(value.len()) + value.len()
}

/// Encoded length of a message as a length-delimited field value.
pub fn encoded_message_len<M: MessageWrite>(message: &M) -> usize {
    let len = message.encoded_len();
    encoded_length_len(len) + len
}

fn encoded_wrapper_len(value_len: Option<usize>) -> usize {
    match value_len {
        None => encoded_length_len(0),
        Some(value_len) => {
            let inner = encoded_tag_len(1) + value_len;
            encoded_length_len(inner) + inner
        }
    }
}

pub fn encoded_wrapped_double_len(value: f64) -> usize {
    encoded_wrapper_len((value.to_bits() != 0).then(encoded_double_len))
}

pub fn encoded_wrapped_float_len(value: f32) -> usize {
    encoded_wrapper_len((value.to_bits() != 0).then(encoded_float_len))
}

pub fn encoded_wrapped_int32_len(value: i32) -> usize {
    encoded_wrapper_len((value != 0).then(|| encoded_int32_len(value)))
}

pub fn encoded_wrapped_int64_len(value: i64) -> usize {
    encoded_wrapper_len((value != 0).then(|| encoded_int64_len(value)))
}

pub fn encoded_wrapped_uint32_len(value: u32) -> usize {
    encoded_wrapper_len((value != 0).then(|| encoded_uint32_len(value)))
}

pub fn encoded_wrapped_uint64_len(value: u64) -> usize {
    encoded_wrapper_len((value != 0).then(|| encoded_uint64_len(value)))
}

pub fn encoded_wrapped_bool_len(value: bool) -> usize {
    encoded_wrapper_len(value.then(encoded_bool_len))
}

pub fn encoded_wrapped_string_len(value: &str) -> usize {
    encoded_wrapper_len((!value.is_empty()).then(|| encoded_string_len(value)))
}

pub fn encoded_wrapped_bytes_len(value: &[u8]) -> usize {
    encoded_wrapper_len((!value.is_empty()).then(|| encoded_bytes_len(value)))
}
