//! The reflective message dispatcher: drives a field-by-field loop over a
//! [`ProtoReader`], consulting a caller-supplied [`MessageType`] descriptor
//! for every tag and delivering decoded values back through it.
//!
//! The dispatcher owns the wire-level concerns (limits, recursion, group
//! skipping, packed payloads, unknown fields); the descriptor owns the
//! schema-level ones (which tags exist, what they mean, where values land).

use std::any::Any;
use std::fmt;

use bytes::Bytes;

use crate::error::{DecodeError, DecodeErrorKind};
use crate::reader::ProtoReader;
use crate::source::ByteSource;
use crate::util::unlikely;
use crate::wire::{FieldKey, WireType};

/// An opaque, mutable message object produced and consumed by a
/// [`MessageType`].
pub type DynMessage = Box<dyn Any>;

/// A UTF-8 string backed by [`Bytes`].
///
/// Construction is lax the way protobuf string decoding is lax: valid UTF-8
/// is wrapped without copying, and invalid sequences are rewritten with each
/// offending byte replaced by U+FFFD.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ProtoString(Bytes);

impl ProtoString {
    /// Wraps `data`, replacing invalid UTF-8 rather than failing.
    pub fn from_lossy(data: Bytes) -> ProtoString {
        match std::str::from_utf8(&data) {
            Ok(_) => ProtoString(data),
            Err(_) => {
                let replaced = String::from_utf8_lossy(&data).into_owned();
                ProtoString(Bytes::from(replaced))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: every constructor validates or rewrites the bytes as
        // UTF-8.
        unsafe { std::str::from_utf8_unchecked(&self.0) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl std::ops::Deref for ProtoString {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for ProtoString {
    fn from(s: &str) -> ProtoString {
        ProtoString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for ProtoString {
    fn from(s: String) -> ProtoString {
        ProtoString(Bytes::from(s))
    }
}

impl fmt::Debug for ProtoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ProtoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The declared logical type of a message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    String,
    Bytes,
    Enum,
    /// An embedded message; its descriptor travels in [`FieldInfo`].
    Message,
    /// No declared type: the field's bytes are consumed per the wire type
    /// and discarded (or handed to the unknown-field hook).
    Unknown,
}

impl FieldType {
    /// The wire type this field type is encoded with, or `None` for
    /// [`FieldType::Unknown`].
    pub fn wire_type(self) -> Option<WireType> {
        Some(match self {
            FieldType::Double | FieldType::Fixed64 | FieldType::SFixed64 => WireType::Fixed64,
            FieldType::Float | FieldType::Fixed32 | FieldType::SFixed32 => WireType::Fixed32,
            FieldType::Int32
            | FieldType::Int64
            | FieldType::UInt32
            | FieldType::UInt64
            | FieldType::SInt32
            | FieldType::SInt64
            | FieldType::Bool
            | FieldType::Enum => WireType::Varint,
            FieldType::String | FieldType::Bytes | FieldType::Message => {
                WireType::LengthDelimited
            }
            FieldType::Unknown => return None,
        })
    }

    /// Whether repeated values of this type may arrive packed inside a
    /// single length-delimited payload.
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message | FieldType::Unknown
        )
    }
}

/// What a descriptor declares about one field: its [`FieldType`] and, for
/// embedded messages, the nested [`MessageType`].
///
/// Constructors keep the pair consistent; a message declaration always
/// carries its descriptor.
#[derive(Clone, Copy)]
pub struct FieldInfo<'a> {
    kind: FieldKind<'a>,
}

#[derive(Clone, Copy)]
enum FieldKind<'a> {
    Scalar(FieldType),
    Message(&'a dyn MessageType),
    Unknown,
}

impl<'a> FieldInfo<'a> {
    /// Declares a scalar, string, bytes, or enum field.
    ///
    /// `Message` and `Unknown` are not scalar declarations; passing them
    /// degrades to [`FieldInfo::unknown`] so the field is skipped rather
    /// than misparsed.
    pub fn scalar(field_type: FieldType) -> FieldInfo<'static> {
        debug_assert!(
            !matches!(field_type, FieldType::Message),
            "embedded messages are declared with FieldInfo::message",
        );
        match field_type {
            FieldType::Message | FieldType::Unknown => FieldInfo {
                kind: FieldKind::Unknown,
            },
            other => FieldInfo {
                kind: FieldKind::Scalar(other),
            },
        }
    }

    /// Declares an embedded-message field with the nested descriptor.
    pub fn message(message_type: &'a dyn MessageType) -> FieldInfo<'a> {
        FieldInfo {
            kind: FieldKind::Message(message_type),
        }
    }

    /// Declares a field the descriptor knows nothing about.
    pub fn unknown() -> FieldInfo<'static> {
        FieldInfo {
            kind: FieldKind::Unknown,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self.kind {
            FieldKind::Scalar(field_type) => field_type,
            FieldKind::Message(_) => FieldType::Message,
            FieldKind::Unknown => FieldType::Unknown,
        }
    }

    /// The nested descriptor, when this declares an embedded message.
    pub fn message_type(&self) -> Option<&'a dyn MessageType> {
        match self.kind {
            FieldKind::Message(message_type) => Some(message_type),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("field_type", &self.field_type())
            .finish()
    }
}

/// A decoded value delivered to [`MessageType::consume_field`].
///
/// The variant always agrees with the [`FieldType`] the descriptor declared
/// for the field's tag.
pub enum FieldValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    SInt32(i32),
    SInt64(i64),
    Fixed32(u32),
    Fixed64(u64),
    SFixed32(i32),
    SFixed64(i64),
    Bool(bool),
    String(ProtoString),
    Bytes(Bytes),
    Enum(i32),
    Message(DynMessage),
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Double(v) => f.debug_tuple("Double").field(v).finish(),
            FieldValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            FieldValue::Int32(v) => f.debug_tuple("Int32").field(v).finish(),
            FieldValue::Int64(v) => f.debug_tuple("Int64").field(v).finish(),
            FieldValue::UInt32(v) => f.debug_tuple("UInt32").field(v).finish(),
            FieldValue::UInt64(v) => f.debug_tuple("UInt64").field(v).finish(),
            FieldValue::SInt32(v) => f.debug_tuple("SInt32").field(v).finish(),
            FieldValue::SInt64(v) => f.debug_tuple("SInt64").field(v).finish(),
            FieldValue::Fixed32(v) => f.debug_tuple("Fixed32").field(v).finish(),
            FieldValue::Fixed64(v) => f.debug_tuple("Fixed64").field(v).finish(),
            FieldValue::SFixed32(v) => f.debug_tuple("SFixed32").field(v).finish(),
            FieldValue::SFixed64(v) => f.debug_tuple("SFixed64").field(v).finish(),
            FieldValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            FieldValue::String(v) => f.debug_tuple("String").field(v).finish(),
            FieldValue::Bytes(v) => f.debug_tuple("Bytes").field(v).finish(),
            FieldValue::Enum(v) => f.debug_tuple("Enum").field(v).finish(),
            FieldValue::Message(_) => f.write_str("Message(..)"),
        }
    }
}

/// Payload of a field the descriptor did not recognize, delivered to
/// [`MessageType::consume_unknown_field`] when unknown fields are not
/// ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum UnknownValue {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    LengthDelimited(Bytes),
    /// A group was skipped; its contents are not captured.
    Group,
}

/// The capability a caller supplies to drive decoding of one message type.
///
/// Descriptors are read-only during parsing and may be shared by any number
/// of readers. Nested-message references may form cycles (a tree of
/// self-referential messages, say); descriptors are handed around by
/// reference, never cloned.
pub trait MessageType {
    /// Produces a fresh, mutable message object.
    fn create_message(&self) -> DynMessage;

    /// Looks up what is declared for `field_number`, returning
    /// [`FieldInfo::unknown`] for tags outside the schema.
    fn field_info(&self, field_number: u32) -> FieldInfo<'_>;

    /// Delivers one decoded value. The variant is statically consistent
    /// with the declared type returned by
    /// [`field_info`](MessageType::field_info).
    fn consume_field(&self, message: &mut DynMessage, field_number: u32, value: FieldValue);

    /// Finalizes the message and returns the caller-visible object.
    fn complete_message(&self, message: DynMessage) -> DynMessage {
        message
    }

    /// Receives the payload of an unrecognized field when
    /// [`ignore_unknown_fields`](MessageType::ignore_unknown_fields) is
    /// false. The default discards it.
    fn consume_unknown_field(&self, message: &mut DynMessage, key: FieldKey, value: UnknownValue) {
        let _ = (message, key, value);
    }

    /// Whether unrecognized fields are consumed silently.
    fn ignore_unknown_fields(&self) -> bool {
        true
    }
}

/// Decodes a message spanning the entire input.
pub fn decode<S: ByteSource>(
    source: S,
    message_type: &dyn MessageType,
) -> Result<DynMessage, DecodeError> {
    let mut reader = ProtoReader::new(source);
    let message = read_message(&mut reader, message_type)?;
    reader.expect_end()?;
    Ok(message)
}

/// Decodes one message body, reading fields until end of input or the
/// active limit.
///
/// The last `(key, field info)` pair is cached, so runs of an identical tag
/// (the common shape of repeated fields) skip the descriptor lookup.
pub fn read_message<S: ByteSource>(
    reader: &mut ProtoReader<S>,
    message_type: &dyn MessageType,
) -> Result<DynMessage, DecodeError> {
    let mut message = message_type.create_message();
    let mut cached: Option<(FieldKey, FieldInfo)> = None;
    while let Some(key) = reader.read_tag()? {
        let info = match cached {
            Some((cached_key, info)) if cached_key == key => info,
            _ => {
                let info = message_type.field_info(key.field_number());
                cached = Some((key, info));
                info
            }
        };
        read_field(reader, message_type, &mut message, key, info)?;
    }
    Ok(message_type.complete_message(message))
}

/// Reads a length prefix and decodes the message body under the pushed
/// limit, one recursion level down.
///
/// The limit is released on every exit path. A body that stops short of its
/// limit is a truncated message.
pub fn read_delimited_message<S: ByteSource>(
    reader: &mut ProtoReader<S>,
    message_type: &dyn MessageType,
) -> Result<DynMessage, DecodeError> {
    let len = reader.read_length()?;
    reader.enter_recursion()?;
    if let Err(e) = reader.push_limit(len) {
        reader.leave_recursion();
        return Err(e);
    }
    let result = read_message(reader, message_type).and_then(|message| {
        if reader.reached_limit() {
            Ok(message)
        } else {
            Err(reader.err(DecodeErrorKind::TruncatedMessage))
        }
    });
    reader.pop_limit();
    reader.leave_recursion();
    result
}

fn read_field<S: ByteSource>(
    reader: &mut ProtoReader<S>,
    message_type: &dyn MessageType,
    message: &mut DynMessage,
    key: FieldKey,
    info: FieldInfo<'_>,
) -> Result<(), DecodeError> {
    match info.kind {
        FieldKind::Unknown => read_unknown_field(reader, message_type, message, key),
        FieldKind::Message(nested_type) => match key.wire_type() {
            WireType::LengthDelimited => {
                let nested = read_delimited_message(reader, nested_type)?;
                message_type.consume_field(message, key.field_number(), FieldValue::Message(nested));
                Ok(())
            }
            WireType::StartGroup => reader.skip_group(key),
            WireType::EndGroup => Err(reader.err(DecodeErrorKind::UnexpectedEndGroup {
                field_number: key.field_number(),
            })),
            other => Err(reader.err(DecodeErrorKind::WireTypeMismatch {
                field_number: key.field_number(),
                field_type: FieldType::Message,
                wire_type: other,
            })),
        },
        FieldKind::Scalar(field_type) => {
            let wire_type = key.wire_type();
            match wire_type {
                WireType::StartGroup => return reader.skip_group(key),
                WireType::EndGroup => {
                    return Err(reader.err(DecodeErrorKind::UnexpectedEndGroup {
                        field_number: key.field_number(),
                    }))
                }
                _ => {}
            }
            let Some(declared) = field_type.wire_type() else {
                return read_unknown_field(reader, message_type, message, key);
            };
            if wire_type == declared {
                let value = read_scalar_value(reader, field_type)?;
                message_type.consume_field(message, key.field_number(), value);
                Ok(())
            } else if wire_type == WireType::LengthDelimited && field_type.is_packable() {
                read_packed_field(reader, message_type, message, key, field_type)
            } else {
                Err(reader.err(DecodeErrorKind::WireTypeMismatch {
                    field_number: key.field_number(),
                    field_type,
                    wire_type,
                }))
            }
        }
    }
}

fn read_scalar_value<S: ByteSource>(
    reader: &mut ProtoReader<S>,
    field_type: FieldType,
) -> Result<FieldValue, DecodeError> {
    Ok(match field_type {
        FieldType::Double => FieldValue::Double(reader.read_double()?),
        FieldType::Float => FieldValue::Float(reader.read_float()?),
        FieldType::Int32 => FieldValue::Int32(reader.read_int32()?),
        FieldType::Int64 => FieldValue::Int64(reader.read_int64()?),
        FieldType::UInt32 => FieldValue::UInt32(reader.read_uint32()?),
        FieldType::UInt64 => FieldValue::UInt64(reader.read_uint64()?),
        FieldType::SInt32 => FieldValue::SInt32(reader.read_sint32()?),
        FieldType::SInt64 => FieldValue::SInt64(reader.read_sint64()?),
        FieldType::Fixed32 => FieldValue::Fixed32(reader.read_fixed32()?),
        FieldType::Fixed64 => FieldValue::Fixed64(reader.read_fixed64()?),
        FieldType::SFixed32 => FieldValue::SFixed32(reader.read_sfixed32()?),
        FieldType::SFixed64 => FieldValue::SFixed64(reader.read_sfixed64()?),
        FieldType::Bool => FieldValue::Bool(reader.read_bool()?),
        FieldType::String => FieldValue::String(reader.read_string()?),
        FieldType::Bytes => FieldValue::Bytes(reader.read_bytes()?),
        FieldType::Enum => FieldValue::Enum(reader.read_enum()?),
        // Both are routed away before any scalar read.
        FieldType::Message | FieldType::Unknown => unreachable!("not a scalar field type"),
    })
}

/// Reads a packed repeated payload: un-tagged values of the field's scalar
/// type, back to back under one pushed limit.
fn read_packed_field<S: ByteSource>(
    reader: &mut ProtoReader<S>,
    message_type: &dyn MessageType,
    message: &mut DynMessage,
    key: FieldKey,
    field_type: FieldType,
) -> Result<(), DecodeError> {
    let len = reader.read_length()?;
    reader.push_limit(len)?;
    while !reader.reached_limit() {
        match read_scalar_value(reader, field_type) {
            Ok(value) => message_type.consume_field(message, key.field_number(), value),
            Err(e) => {
                reader.pop_limit();
                return Err(e);
            }
        }
    }
    reader.pop_limit();
    Ok(())
}

fn read_unknown_field<S: ByteSource>(
    reader: &mut ProtoReader<S>,
    message_type: &dyn MessageType,
    message: &mut DynMessage,
    key: FieldKey,
) -> Result<(), DecodeError> {
    if message_type.ignore_unknown_fields() {
        return reader.skip_field(key);
    }
    let value = match key.wire_type() {
        WireType::Varint => UnknownValue::Varint(reader.read_varint64()?),
        WireType::Fixed64 => UnknownValue::Fixed64(reader.read_fixed64()?),
        WireType::LengthDelimited => UnknownValue::LengthDelimited(reader.read_bytes()?),
        WireType::StartGroup => {
            reader.skip_group(key)?;
            UnknownValue::Group
        }
        WireType::EndGroup => {
            return Err(reader.err(DecodeErrorKind::UnexpectedEndGroup {
                field_number: key.field_number(),
            }))
        }
        WireType::Fixed32 => UnknownValue::Fixed32(reader.read_fixed32()?),
    };
    message_type.consume_unknown_field(message, key, value);
    Ok(())
}

/// Reads the body of a well-known wrapper message: a length-delimited
/// message whose field 1 holds a single primitive. An empty body yields the
/// default.
fn read_wrapper_body<S, T, F>(
    reader: &mut ProtoReader<S>,
    value_wire_type: WireType,
    default: T,
    mut read_value: F,
) -> Result<T, DecodeError>
where
    S: ByteSource,
    F: FnMut(&mut ProtoReader<S>) -> Result<T, DecodeError>,
{
    let len = reader.read_length()?;
    reader.enter_recursion()?;
    if let Err(e) = reader.push_limit(len) {
        reader.leave_recursion();
        return Err(e);
    }
    let mut value = default;
    let result = loop {
        match reader.read_tag() {
            Ok(Some(key)) => {
                if key.field_number() == 1 && key.wire_type() == value_wire_type {
                    match read_value(reader) {
                        Ok(v) => value = v,
                        Err(e) => break Err(e),
                    }
                } else if let Err(e) = reader.skip_field(key) {
                    break Err(e);
                }
            }
            Ok(None) => {
                break if unlikely(!reader.reached_limit()) {
                    Err(reader.err(DecodeErrorKind::TruncatedMessage))
                } else {
                    Ok(())
                }
            }
            Err(e) => break Err(e),
        }
    };
    reader.pop_limit();
    reader.leave_recursion();
    result.map(|()| value)
}

macro_rules! impl_read_wrapped {
    ($(#[$meta:meta])* $name:ident, $ty:ty, $wire:expr, $read:ident, $default:expr) => {
        $(#[$meta])*
        pub fn $name<S: ByteSource>(reader: &mut ProtoReader<S>) -> Result<$ty, DecodeError> {
            read_wrapper_body(reader, $wire, $default, |reader| reader.$read())
        }
    };
}

impl_read_wrapped!(
    /// Reads a `google.protobuf.DoubleValue` payload.
    read_wrapped_double, f64, WireType::Fixed64, read_double, 0.0
);
impl_read_wrapped!(
    /// Reads a `google.protobuf.FloatValue` payload.
    read_wrapped_float, f32, WireType::Fixed32, read_float, 0.0
);
impl_read_wrapped!(
    /// Reads a `google.protobuf.Int32Value` payload.
    read_wrapped_int32, i32, WireType::Varint, read_int32, 0
);
impl_read_wrapped!(
    /// Reads a `google.protobuf.Int64Value` payload.
    read_wrapped_int64, i64, WireType::Varint, read_int64, 0
);
impl_read_wrapped!(
    /// Reads a `google.protobuf.UInt32Value` payload.
    read_wrapped_uint32, u32, WireType::Varint, read_uint32, 0
);
impl_read_wrapped!(
    /// Reads a `google.protobuf.UInt64Value` payload.
    read_wrapped_uint64, u64, WireType::Varint, read_uint64, 0
);
impl_read_wrapped!(
    /// Reads a `google.protobuf.BoolValue` payload.
    read_wrapped_bool, bool, WireType::Varint, read_bool, false
);
impl_read_wrapped!(
    /// Reads a `google.protobuf.StringValue` payload.
    read_wrapped_string, ProtoString, WireType::LengthDelimited, read_string,
    ProtoString::default()
);
impl_read_wrapped!(
    /// Reads a `google.protobuf.BytesValue` payload.
    read_wrapped_bytes, Bytes, WireType::LengthDelimited, read_bytes, Bytes::new()
);
