//! Round-trips across the three input shapes and the three output sinks.

mod support;

use bytes::Bytes;
use proptest::prelude::*;
use protowire::message::{
    read_wrapped_bool, read_wrapped_bytes, read_wrapped_double, read_wrapped_int32,
    read_wrapped_string, read_wrapped_uint64,
};
use protowire::writer::{encoded_tag_len, encoded_uint64_len};
use protowire::{
    read_message, BytesSource, FieldType, ProtoReader, ProtoWriter, SegmentedSource, SliceSink,
    StreamSink, StreamSource, WireType,
};
use support::{decode_record, Record, Schema, Value};

fn sample_schema() -> Schema {
    Schema::new()
        .field(1, FieldType::Int32)
        .field(2, FieldType::String)
        .nested(3, Schema::new().field(1, FieldType::UInt64))
        .field(4, FieldType::SInt64)
        .field(5, FieldType::Double)
        .field(6, FieldType::Bytes)
}

fn write_sample<S: protowire::WriteSink>(writer: &mut ProtoWriter<S>) {
    writer.write_tag(1, WireType::Varint).unwrap();
    writer.write_int32(-7).unwrap();
    writer.write_tag(2, WireType::LengthDelimited).unwrap();
    writer.write_string("héllo wörld").unwrap();
    writer.write_tag(3, WireType::LengthDelimited).unwrap();
    writer
        .write_length(encoded_tag_len(1) + encoded_uint64_len(1 << 40))
        .unwrap();
    writer.write_tag(1, WireType::Varint).unwrap();
    writer.write_uint64(1 << 40).unwrap();
    writer.write_tag(4, WireType::Varint).unwrap();
    writer.write_sint64(-1_234_567).unwrap();
    writer.write_tag(5, WireType::Fixed64).unwrap();
    writer.write_double(3.25).unwrap();
    writer.write_tag(6, WireType::LengthDelimited).unwrap();
    writer.write_bytes(&[1, 2, 3, 250]).unwrap();
}

fn sample_bytes() -> Vec<u8> {
    let mut writer = ProtoWriter::new(Vec::new());
    write_sample(&mut writer);
    writer.into_inner()
}

fn expected_record() -> Record {
    Record {
        fields: vec![
            (1, Value::I32(-7)),
            (2, Value::Str("héllo wörld".into())),
            (
                3,
                Value::Msg(Record {
                    fields: vec![(1, Value::U64(1 << 40))],
                    unknown: vec![],
                    completed: true,
                }),
            ),
            (4, Value::I64(-1_234_567)),
            (5, Value::F64(3.25)),
            (6, Value::Data(vec![1, 2, 3, 250])),
        ],
        unknown: vec![],
        completed: true,
    }
}

#[test]
fn test_roundtrip_contiguous() {
    let record = decode_record(&sample_bytes(), &sample_schema());
    assert_eq!(record, expected_record());
}

#[test]
fn test_roundtrip_segmented_every_split_point() {
    let data = sample_bytes();
    let schema = sample_schema();
    for split in 0..=data.len() {
        let segments = vec![
            Bytes::copy_from_slice(&data[..split]),
            Bytes::copy_from_slice(&data[split..]),
        ];
        let mut reader = ProtoReader::new(SegmentedSource::new(segments));
        let message = read_message(&mut reader, &schema).unwrap();
        let record = *message.downcast::<Record>().unwrap();
        assert_eq!(record, expected_record(), "split at {split}");
    }
}

#[test]
fn test_roundtrip_segmented_one_byte_segments() {
    let data = sample_bytes();
    let segments = data
        .iter()
        .map(|&b| Bytes::copy_from_slice(&[b]))
        .collect::<Vec<_>>();
    let mut reader = ProtoReader::new(SegmentedSource::new(segments));
    let message = read_message(&mut reader, &sample_schema()).unwrap();
    assert_eq!(*message.downcast::<Record>().unwrap(), expected_record());
}

#[test]
fn test_roundtrip_streaming_odd_buffer_sizes() {
    let data = sample_bytes();
    for capacity in [1, 2, 3, 7, 64] {
        let mut reader = ProtoReader::new(StreamSource::with_capacity(capacity, &data[..]));
        let message = read_message(&mut reader, &sample_schema()).unwrap();
        let record = *message.downcast::<Record>().unwrap();
        assert_eq!(record, expected_record(), "buffer capacity {capacity}");
    }
}

#[test]
fn test_all_sinks_produce_identical_bytes() {
    let via_vec = sample_bytes();

    let mut fixed = vec![0u8; via_vec.len()];
    let mut writer = ProtoWriter::new(SliceSink::new(&mut fixed));
    write_sample(&mut writer);
    assert_eq!(writer.position(), via_vec.len() as u64);
    assert_eq!(fixed, via_vec);

    let mut writer = ProtoWriter::new(StreamSink::with_capacity(5, Vec::new()));
    write_sample(&mut writer);
    writer.flush().unwrap();
    let streamed = writer.into_inner().into_inner().unwrap();
    assert_eq!(streamed, via_vec);
}

#[test]
fn test_wrapped_primitives_roundtrip() {
    let mut writer = ProtoWriter::new(Vec::new());
    writer.write_wrapped_double(-2.5).unwrap();
    writer.write_wrapped_int32(i32::MIN).unwrap();
    writer.write_wrapped_uint64(u64::MAX).unwrap();
    writer.write_wrapped_bool(true).unwrap();
    writer.write_wrapped_string("wrapped").unwrap();
    writer.write_wrapped_bytes(&[0xde, 0xad]).unwrap();
    writer.write_wrapped_int32(0).unwrap();
    let data = writer.into_inner();

    let mut reader = ProtoReader::new(BytesSource::new(data));
    assert_eq!(read_wrapped_double(&mut reader).unwrap(), -2.5);
    assert_eq!(read_wrapped_int32(&mut reader).unwrap(), i32::MIN);
    assert_eq!(read_wrapped_uint64(&mut reader).unwrap(), u64::MAX);
    assert!(read_wrapped_bool(&mut reader).unwrap());
    assert_eq!(read_wrapped_string(&mut reader).unwrap().as_str(), "wrapped");
    assert_eq!(&read_wrapped_bytes(&mut reader).unwrap()[..], [0xde, 0xad]);
    // The default wrapper is an empty body yielding the default value.
    assert_eq!(read_wrapped_int32(&mut reader).unwrap(), 0);
    assert!(reader.is_at_end().unwrap());
}

#[test]
fn test_wrapped_sizes_agree_with_writers() {
    use protowire::writer::{
        encoded_wrapped_bool_len, encoded_wrapped_bytes_len, encoded_wrapped_double_len,
        encoded_wrapped_int32_len, encoded_wrapped_string_len, encoded_wrapped_uint64_len,
    };

    fn written(write: impl FnOnce(&mut ProtoWriter<Vec<u8>>)) -> usize {
        let mut writer = ProtoWriter::new(Vec::new());
        write(&mut writer);
        writer.into_inner().len()
    }

    assert_eq!(
        written(|w| w.write_wrapped_double(-2.5).unwrap()),
        encoded_wrapped_double_len(-2.5)
    );
    assert_eq!(
        written(|w| w.write_wrapped_int32(i32::MIN).unwrap()),
        encoded_wrapped_int32_len(i32::MIN)
    );
    assert_eq!(
        written(|w| w.write_wrapped_uint64(1).unwrap()),
        encoded_wrapped_uint64_len(1)
    );
    assert_eq!(
        written(|w| w.write_wrapped_bool(false).unwrap()),
        encoded_wrapped_bool_len(false)
    );
    assert_eq!(
        written(|w| w.write_wrapped_string("s").unwrap()),
        encoded_wrapped_string_len("s")
    );
    assert_eq!(
        written(|w| w.write_wrapped_bytes(&[]).unwrap()),
        encoded_wrapped_bytes_len(&[])
    );
}

#[test]
fn proptest_scalar_fields_roundtrip() {
    let schema = Schema::new()
        .field(1, FieldType::Int32)
        .field(2, FieldType::UInt64)
        .field(3, FieldType::String)
        .field(4, FieldType::Bytes)
        .field(5, FieldType::SInt32);

    fn roundtrip(a: i32, b: u64, s: &str, data: &[u8], z: i32, schema: &Schema) {
        let mut writer = ProtoWriter::new(Vec::new());
        writer.write_tag(1, WireType::Varint).unwrap();
        writer.write_int32(a).unwrap();
        writer.write_tag(2, WireType::Varint).unwrap();
        writer.write_uint64(b).unwrap();
        writer.write_tag(3, WireType::LengthDelimited).unwrap();
        writer.write_string(s).unwrap();
        writer.write_tag(4, WireType::LengthDelimited).unwrap();
        writer.write_bytes(data).unwrap();
        writer.write_tag(5, WireType::Varint).unwrap();
        writer.write_sint32(z).unwrap();

        let record = decode_record(&writer.into_inner(), schema);
        assert_eq!(
            record.fields,
            vec![
                (1, Value::I32(a)),
                (2, Value::U64(b)),
                (3, Value::Str(s.to_owned())),
                (4, Value::Data(data.to_vec())),
                (5, Value::I32(z)),
            ]
        );
    }

    let strat = (
        any::<i32>(),
        any::<u64>(),
        any::<String>(),
        proptest::collection::vec(any::<u8>(), 0..256),
        any::<i32>(),
    );
    proptest!(|((a, b, s, data, z) in strat)| {
        roundtrip(a, b, &s, &data, z, &schema)
    });
}
