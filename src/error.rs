//! Error types surfaced by the decode and encode paths.

use crate::message::FieldType;
use crate::wire::WireType;

/// An error raised while decoding a wire-format stream.
///
/// Carries the [`DecodeErrorKind`] describing the violation together with the
/// absolute byte offset at which it was observed. Decoding never rolls back
/// partial work; after an error the reader and any in-flight message should
/// be discarded.
#[derive(Debug, thiserror::Error)]
#[error("{kind} at byte offset {offset}")]
pub struct DecodeError {
    #[source]
    kind: DecodeErrorKind,
    offset: u64,
}

impl DecodeError {
    pub(crate) fn new(kind: DecodeErrorKind, offset: u64) -> Self {
        DecodeError { kind, offset }
    }

    /// What went wrong.
    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }

    /// Absolute byte offset of the input cursor when the error was raised.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// A varint ran for ten bytes without a terminating byte.
    #[error("malformed varint")]
    MalformedVarint,
    /// A field key decoded to field number zero or an undefined wire type.
    #[error("invalid tag (raw value {raw})")]
    InvalidTag { raw: u32 },
    /// The input (or the active length limit) ended in the middle of a value.
    #[error("truncated message")]
    TruncatedMessage,
    /// A length prefix was negative when interpreted as a 32-bit signed value.
    #[error("length prefix is negative")]
    NegativeSize,
    /// Embedded messages and groups nested deeper than the configured bound.
    #[error("recursion limit of {limit} exceeded")]
    RecursionLimitExceeded { limit: u32 },
    /// More bytes were consumed than the configured size limit allows.
    #[error("size limit of {limit} bytes exceeded")]
    SizeLimitExceeded { limit: u64 },
    /// An end-group tag closed a group opened by a different field number.
    #[error("malformed group (start field {start}, end field {end})")]
    MalformedGroup { start: u32, end: u32 },
    /// An end-group tag appeared with no group open.
    #[error("end-group tag for field {field_number} with no open group")]
    UnexpectedEndGroup { field_number: u32 },
    /// A field arrived with a wire type its declared type cannot decode from.
    #[error("field {field_number} declared as {field_type:?} cannot be decoded from wire type {wire_type:?}")]
    WireTypeMismatch {
        field_number: u32,
        field_type: FieldType,
        wire_type: WireType,
    },
    /// The caller expected end of input but the stream holds trailing bytes.
    #[error("more data available after end of message")]
    MoreDataAvailable,
    /// An I/O failure reported by a streaming byte source.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An error raised while encoding to an output sink.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// A fixed-size output buffer has no room for the next write.
    #[error("output buffer out of space")]
    OutOfSpace,
    /// An I/O failure reported by a streaming sink.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
