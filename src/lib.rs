//! Wire-format codec core for Google's Protocol Buffers, aka
//! [protobuf](https://protobuf.dev).
//!
//! The crate is organized leaves-first:
//!
//! * [`leb128`] and [`wire`] hold the primitive codec: varints with a
//!   fast/slow path split, zig-zag, and packed field keys.
//! * [`source`] and [`reader`] form the input side: one cursor abstraction
//!   over a contiguous range, a sequence of discontiguous ranges, or a
//!   pull-based byte stream, with limit, size, and recursion enforcement.
//! * [`message`] is the reflective dispatcher: it walks the field stream and
//!   drives a caller-supplied [`MessageType`] descriptor.
//! * [`sink`] and [`writer`] form the symmetric output side, including the
//!   `encoded_*_len` size family used to emit length prefixes without
//!   backpatching.
//!
//! # Example
//!
//! Decoding is driven by a [`MessageType`] descriptor the caller supplies;
//! the codec parses the byte stream and hands every decoded field back:
//!
//! ```
//! use protowire::{
//!     decode, BytesSource, DynMessage, FieldInfo, FieldType, FieldValue, MessageType,
//! };
//!
//! /// Schema for `message Test { int32 a = 1; }`.
//! struct TestSchema;
//!
//! impl MessageType for TestSchema {
//!     fn create_message(&self) -> DynMessage {
//!         Box::new(Vec::<(u32, i32)>::new())
//!     }
//!
//!     fn field_info(&self, field_number: u32) -> FieldInfo<'_> {
//!         match field_number {
//!             1 => FieldInfo::scalar(FieldType::Int32),
//!             _ => FieldInfo::unknown(),
//!         }
//!     }
//!
//!     fn consume_field(&self, message: &mut DynMessage, field_number: u32, value: FieldValue) {
//!         if let (Some(fields), FieldValue::Int32(v)) =
//!             (message.downcast_mut::<Vec<(u32, i32)>>(), value)
//!         {
//!             fields.push((field_number, v));
//!         }
//!     }
//! }
//!
//! let message = decode(BytesSource::new(&[0x08, 0x96, 0x01][..]), &TestSchema)?;
//! let fields = message.downcast::<Vec<(u32, i32)>>().unwrap();
//! assert_eq!(*fields, vec![(1, 150)]);
//! # Ok::<(), protowire::DecodeError>(())
//! ```

pub mod error;
pub mod leb128;
pub mod message;
pub mod reader;
pub mod sink;
pub mod source;
mod util;
pub mod wire;
pub mod writer;

pub use error::{DecodeError, DecodeErrorKind, EncodeError};
pub use message::{
    decode, read_delimited_message, read_message, DynMessage, FieldInfo, FieldType, FieldValue,
    MessageType, ProtoString, UnknownValue,
};
pub use reader::ProtoReader;
pub use sink::{SliceSink, StreamSink, WriteSink};
pub use source::{ByteSource, BytesSource, SegmentedSource, StreamSource};
pub use wire::{FieldKey, WireType};
pub use writer::{MessageWrite, ProtoWriter};
