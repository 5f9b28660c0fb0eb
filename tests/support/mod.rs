//! A hand-built descriptor for exercising the dispatcher, playing the role
//! generated reflection code does in a real deployment.

#![allow(dead_code)]

use std::collections::BTreeMap;

use protowire::{
    decode, BytesSource, DecodeError, DynMessage, FieldInfo, FieldKey, FieldType, FieldValue,
    MessageType, UnknownValue,
};

/// A decoded field value captured by [`Schema`], flattened to plain Rust
/// types for easy assertions.
#[derive(Debug, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Data(Vec<u8>),
    Enum(i32),
    Msg(Record),
}

/// The message object [`Schema`] builds: every delivered field in arrival
/// order.
#[derive(Debug, PartialEq, Default)]
pub struct Record {
    pub fields: Vec<(u32, Value)>,
    pub unknown: Vec<(u32, UnknownValue)>,
    pub completed: bool,
}

enum Decl {
    Scalar(FieldType),
    Nested(Box<Schema>),
    /// A message field whose type is this schema itself; descriptors may be
    /// cyclic.
    SelfRef,
}

/// A message descriptor assembled field by field.
pub struct Schema {
    fields: BTreeMap<u32, Decl>,
    ignore_unknown: bool,
}

impl Schema {
    pub fn new() -> Schema {
        Schema {
            fields: BTreeMap::new(),
            ignore_unknown: true,
        }
    }

    pub fn field(mut self, field_number: u32, field_type: FieldType) -> Schema {
        self.fields.insert(field_number, Decl::Scalar(field_type));
        self
    }

    pub fn nested(mut self, field_number: u32, schema: Schema) -> Schema {
        self.fields
            .insert(field_number, Decl::Nested(Box::new(schema)));
        self
    }

    pub fn self_referential(mut self, field_number: u32) -> Schema {
        self.fields.insert(field_number, Decl::SelfRef);
        self
    }

    /// Routes unrecognized fields to the unknown-field hook instead of
    /// silently dropping them.
    pub fn keep_unknown(mut self) -> Schema {
        self.ignore_unknown = false;
        self
    }
}

impl MessageType for Schema {
    fn create_message(&self) -> DynMessage {
        Box::new(Record::default())
    }

    fn field_info(&self, field_number: u32) -> FieldInfo<'_> {
        match self.fields.get(&field_number) {
            Some(Decl::Scalar(field_type)) => FieldInfo::scalar(*field_type),
            Some(Decl::Nested(schema)) => FieldInfo::message(schema.as_ref()),
            Some(Decl::SelfRef) => FieldInfo::message(self),
            None => FieldInfo::unknown(),
        }
    }

    fn consume_field(&self, message: &mut DynMessage, field_number: u32, value: FieldValue) {
        let Some(record) = message.downcast_mut::<Record>() else {
            return;
        };
        let value = match value {
            FieldValue::Double(v) => Value::F64(v),
            FieldValue::Float(v) => Value::F32(v),
            FieldValue::Int32(v) | FieldValue::SInt32(v) | FieldValue::SFixed32(v) => Value::I32(v),
            FieldValue::Int64(v) | FieldValue::SInt64(v) | FieldValue::SFixed64(v) => Value::I64(v),
            FieldValue::UInt32(v) | FieldValue::Fixed32(v) => Value::U32(v),
            FieldValue::UInt64(v) | FieldValue::Fixed64(v) => Value::U64(v),
            FieldValue::Bool(v) => Value::Bool(v),
            FieldValue::String(v) => Value::Str(v.as_str().to_owned()),
            FieldValue::Bytes(v) => Value::Data(v.to_vec()),
            FieldValue::Enum(v) => Value::Enum(v),
            FieldValue::Message(m) => Value::Msg(*m.downcast::<Record>().expect("nested record")),
        };
        record.fields.push((field_number, value));
    }

    fn complete_message(&self, mut message: DynMessage) -> DynMessage {
        if let Some(record) = message.downcast_mut::<Record>() {
            record.completed = true;
        }
        message
    }

    fn consume_unknown_field(&self, message: &mut DynMessage, key: FieldKey, value: UnknownValue) {
        if let Some(record) = message.downcast_mut::<Record>() {
            record.unknown.push((key.field_number(), value));
        }
    }

    fn ignore_unknown_fields(&self) -> bool {
        self.ignore_unknown
    }
}

/// Decodes `data` as one whole message and unwraps the captured record.
pub fn decode_record(data: &[u8], schema: &Schema) -> Record {
    let message = decode(BytesSource::new(data.to_vec()), schema).expect("decode failed");
    *message.downcast::<Record>().expect("record message")
}

/// Decodes `data`, expecting the parse to fail.
pub fn decode_err(data: &[u8], schema: &Schema) -> DecodeError {
    decode(BytesSource::new(data.to_vec()), schema).err().expect("decode succeeded")
}
