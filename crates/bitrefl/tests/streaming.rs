// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! File-backed encode/decode, bounded buffering and progress reporting.

mod common;

use bitrefl::io::DataStream;
use bitrefl::rtti::{ObjectRef, RttiStatic};
use bitrefl::{
    BinarySerializer, DecodeOptions, Error, FileDataStream, FileDecoder, FileEncoder, MemoryDataStream,
    SerializerConfig, SerializerFlags,
};
use common::*;

#[test]
fn test_file_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sample.bin");
    let original = Sample::filled();

    for flags in ALL_FLAGS {
        let stats = FileEncoder::new(&path)
            .encode(&ObjectRef::new(original.clone()), flags, None)
            .expect("encode");
        assert_eq!(stats.objects, 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), stats.bytes);

        let mut options = DecodeOptions::new(flags);
        if !flags.has_meta() {
            options = options.with_schema(Sample::rtti_static().schema());
        }
        let decoded = FileDecoder::new(&path).decode(options).expect("decode");
        let back = decoded.downcast::<Sample>().expect("Sample root");
        assert_eq!(*back.borrow(), original, "flags {:?}", flags);
    }
}

#[test]
fn test_large_blob_streams_through_small_buffers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("blob.bin");
    let data: Vec<u8> = (0..4 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();

    let config = SerializerConfig::default()
        .with_buffer_size(4096)
        .with_reader_limits(4096, 16 * 1024);
    let stats = FileEncoder::new(&path)
        .with_config(config)
        .encode(&ObjectRef::new(Blob { data: data.clone() }), SerializerFlags::empty(), None)
        .expect("encode");
    assert!(stats.bytes > data.len() as u64);
    // The working buffer stays a few chunks wide, not the size of the blob.
    assert!(
        stats.peak_buffer_bits <= 64 * 1024 * 8,
        "peak buffer {} bits",
        stats.peak_buffer_bits
    );

    let decoded = FileDecoder::new(&path)
        .with_config(config)
        .decode(DecodeOptions::new(SerializerFlags::empty()))
        .expect("decode");
    let back = decoded.downcast::<Blob>().expect("Blob root");
    assert!(back.borrow().data == data);
}

#[test]
fn test_many_objects_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cloud.bin");
    let flags = SerializerFlags::COMPRESS;
    let (preload, max_buffer) = (512, 2048);
    let config = SerializerConfig::default().with_reader_limits(preload, max_buffer);

    let stats = FileEncoder::new(&path)
        .encode(&ObjectRef::new(Cloud::with_points(20_000)), flags, None)
        .expect("encode");
    let decoded = FileDecoder::new(&path)
        .with_config(config)
        .decode(DecodeOptions::new(flags))
        .expect("decode");
    let back = decoded.downcast::<Cloud>().expect("Cloud root");
    assert_eq!(back.borrow().points.len(), 20_000);
    let point = back.borrow().points[14_321].clone().expect("point");
    assert_eq!(*point.borrow(), Point::new(14_321, -14_321));

    // Consumed bytes are dropped once the trim threshold is passed, so the
    // reader never holds more than a couple of windows of a much larger file.
    let bound = 2 * (preload + max_buffer) as u64 * 8;
    assert!(stats.bytes * 8 > 10 * bound, "file of {} bytes", stats.bytes);
    assert!(
        decoded.peak_buffer_bits <= bound,
        "peak reader buffer {} bits",
        decoded.peak_buffer_bits
    );
}

#[test]
fn test_decode_respects_start_and_length() {
    let mut serializer = BinarySerializer::new();
    let mut out = MemoryDataStream::new();
    out.write(b"HDR!").unwrap();
    serializer
        .encode(&ObjectRef::new(Point::new(5, 6)), &mut out, SerializerFlags::empty(), None)
        .unwrap();
    let end_of_first = out.tell();
    serializer
        .encode(&ObjectRef::new(Point::new(7, 8)), &mut out, SerializerFlags::empty(), None)
        .unwrap();

    let mut input = MemoryDataStream::from_vec(out.into_inner());
    input.seek(4).unwrap();
    let first = serializer
        .decode(&mut input, end_of_first - 4, DecodeOptions::new(SerializerFlags::empty()))
        .unwrap();
    assert!(first.is_clean());
    assert_eq!(*first.downcast::<Point>().unwrap().borrow(), Point::new(5, 6));

    input.seek(end_of_first).unwrap();
    let remaining = input.size() - end_of_first;
    let second = serializer
        .decode(&mut input, remaining, DecodeOptions::new(SerializerFlags::empty()))
        .unwrap();
    assert_eq!(*second.downcast::<Point>().unwrap().borrow(), Point::new(7, 8));
}

#[test]
fn test_file_streams_decode_from_offset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("offset.bin");
    let mut serializer = BinarySerializer::new();
    {
        let mut file = FileDataStream::create(&path).unwrap();
        file.write(&[0xEE; 3]).unwrap();
        serializer
            .encode(&ObjectRef::new(Point::new(-9, 9)), &mut file, SerializerFlags::COMPRESS, None)
            .unwrap();
        file.sync().unwrap();
    }
    let mut file = FileDataStream::open(&path).unwrap();
    file.seek(3).unwrap();
    let length = file.size() - 3;
    let decoded = serializer
        .decode(&mut file, length, DecodeOptions::new(SerializerFlags::COMPRESS))
        .unwrap();
    assert_eq!(*decoded.downcast::<Point>().unwrap().borrow(), Point::new(-9, 9));
}

#[test]
fn test_progress_is_monotonic_and_completes() {
    let bytes = bitrefl::MemorySerializer::new()
        .encode_to_vec(&ObjectRef::new(Cloud::with_points(3_000)), SerializerFlags::empty())
        .unwrap();

    let mut reports = Vec::new();
    let mut progress = |fraction: f32| {
        reports.push(fraction);
        true
    };
    let config = SerializerConfig::default().with_progress_interval(1024);
    let mut input = MemoryDataStream::from_vec(bytes.clone());
    BinarySerializer::with_config(config)
        .decode(
            &mut input,
            bytes.len() as u64,
            DecodeOptions::new(SerializerFlags::empty()).with_progress(&mut progress),
        )
        .expect("decode");

    assert!(reports.len() > 2, "{} reports", reports.len());
    assert_eq!(reports.first().copied(), Some(0.0));
    assert_eq!(reports.last().copied(), Some(1.0));
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_progress_callback_cancels() {
    let bytes = bitrefl::MemorySerializer::new()
        .encode_to_vec(&ObjectRef::new(Cloud::with_points(100)), SerializerFlags::empty())
        .unwrap();

    let mut calls = 0;
    let mut progress = |_: f32| {
        calls += 1;
        false
    };
    let mut input = MemoryDataStream::from_vec(bytes.clone());
    let err = BinarySerializer::new()
        .decode(
            &mut input,
            bytes.len() as u64,
            DecodeOptions::new(SerializerFlags::empty()).with_progress(&mut progress),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(calls, 1);
}
