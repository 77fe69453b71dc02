// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object graph semantics: identity, sharing, weak and strong cycles,
//! lifecycle hooks and deep copies.

mod common;

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use bitrefl::rtti::ObjectRef;
use bitrefl::{
    clone_object, BinarySerializer, DecodeOptions, Error, MemoryDataStream, MemorySerializer,
    SerializerFlags,
};
use common::*;

fn family() -> NodeRef {
    let root = Node::named("root");
    let left = Node::named("left");
    let right = Node::named("right");
    Node::adopt(&root, &left);
    Node::adopt(&root, &right);
    left.borrow_mut().next = Some(right.clone());
    root
}

#[test]
fn test_shared_reference_is_preserved() {
    let shared = Rc::new(RefCell::new(Point::new(1, 2)));
    let other = Rc::new(RefCell::new(Point::new(1, 2)));
    let cloud = Cloud {
        points: vec![Some(shared.clone()), Some(shared), None, Some(other)],
    };
    let root = ObjectRef::new(cloud);

    for flags in ALL_FLAGS {
        let back = roundtrip(&root, flags).downcast::<Cloud>().expect("Cloud root");
        let back = back.borrow();
        let first = back.points[0].clone().expect("first");
        let second = back.points[1].clone().expect("second");
        let fourth = back.points[3].clone().expect("fourth");
        assert!(Rc::ptr_eq(&first, &second), "flags {:?}", flags);
        assert!(!Rc::ptr_eq(&first, &fourth));
        assert!(back.points[2].is_none());
        assert_eq!(*fourth.borrow(), Point::new(1, 2));
    }
}

#[test]
fn test_weak_back_references_close_cycles() {
    let root = ObjectRef::from_rc(family());
    for flags in ALL_FLAGS {
        let decoded = roundtrip(&root, flags);
        assert!(decoded.is_clean());
        let back = decoded.downcast::<Node>().expect("Node root");

        let left = back.borrow().child(0);
        let right = back.borrow().child(1);
        assert_eq!(left.borrow().name, "left");
        assert_eq!(right.borrow().name, "right");

        let parent = left.borrow().parent.clone().expect("parent");
        assert!(Rc::ptr_eq(&parent, &back), "flags {:?}", flags);
        let next = left.borrow().next.clone().expect("sibling");
        assert!(Rc::ptr_eq(&next, &right));
        assert!(back.borrow().parent.is_none());
    }
}

#[test]
fn test_weak_self_reference() {
    let node = Node::named("loop");
    node.borrow_mut().parent = Some(node.clone());
    let back = roundtrip(&ObjectRef::from_rc(node), SerializerFlags::COMPRESS)
        .downcast::<Node>()
        .expect("Node root");
    let parent = back.borrow().parent.clone().expect("self");
    assert!(Rc::ptr_eq(&parent, &back));
}

#[test]
fn test_strong_cycle_is_rejected() {
    let a = Node::named("a");
    let b = Node::named("b");
    a.borrow_mut().next = Some(b.clone());
    b.borrow_mut().next = Some(a.clone());

    let mut serializer = MemorySerializer::new();
    let root = ObjectRef::from_rc(a);
    for flags in ALL_FLAGS {
        let bytes = serializer.encode_to_vec(&root, flags).expect("cycles encode fine");
        let schema = (!flags.has_meta()).then(|| root.rtti().schema());
        let err = serializer.decode_from_slice(&bytes, flags, schema).unwrap_err();
        assert!(
            matches!(err, Error::CircularReference { object_id: 1 }),
            "flags {:?}: {}",
            flags,
            err
        );
    }
}

#[test]
fn test_many_objects_get_sequential_ids() {
    let root = ObjectRef::new(Cloud::with_points(10_000));
    let mut out = MemoryDataStream::new();
    let stats = BinarySerializer::new()
        .encode(&root, &mut out, SerializerFlags::COMPRESS, None)
        .expect("encode");
    assert_eq!(stats.objects, 10_001);
    assert_eq!(stats.bytes, out.as_slice().len() as u64);

    let graph = bitrefl::decode_intermediate(out.as_slice(), SerializerFlags::COMPRESS).expect("intermediate");
    assert_eq!(graph.root, 1);
    assert_eq!(graph.objects.len(), 10_001);
    assert_eq!(graph.objects.keys().last().copied(), Some(10_001));

    let back = roundtrip(&root, SerializerFlags::COMPRESS)
        .downcast::<Cloud>()
        .expect("Cloud root");
    let last = back.borrow().points[9_999].clone().expect("last point");
    assert_eq!(*last.borrow(), Point::new(9_999, -9_999));
}

#[test]
fn test_borrowed_object_fails_encode() {
    let root = family();
    let left = root.borrow().child(0);
    let _guard = left.borrow_mut();

    let err = MemorySerializer::new()
        .encode_to_vec(&ObjectRef::from_rc(root.clone()), SerializerFlags::empty())
        .unwrap_err();
    assert!(matches!(err, Error::ObjectBorrowed { object_id: 2 }));
}

#[test]
fn test_hooks_run_base_first_with_context() {
    let tracked = Rc::new(RefCell::new(Tracked {
        values: vec![1, 2, 3, 4],
        ..Default::default()
    }));
    let root = ObjectRef::from_rc(tracked.clone());

    let mut log = HookLog::new();
    let mut out = MemoryDataStream::new();
    let mut serializer = BinarySerializer::new();
    serializer
        .encode(&root, &mut out, SerializerFlags::empty(), Some(&mut log as &mut dyn Any))
        .expect("encode");
    assert_eq!(
        log,
        ["base:encode-start", "derived:encode-start", "base:encode-end", "derived:encode-end"]
    );
    // The start hook runs before the fields are written.
    assert_eq!(tracked.borrow().base.revision, 1);

    log.clear();
    let mut input = MemoryDataStream::from_vec(out.into_inner());
    let length = input.as_slice().len() as u64;
    let decoded = serializer
        .decode(
            &mut input,
            length,
            DecodeOptions::new(SerializerFlags::empty()).with_context(&mut log),
        )
        .expect("decode");
    let back = decoded.downcast::<Tracked>().expect("Tracked root");
    assert_eq!(back.borrow().base.revision, 1);
    assert_eq!(back.borrow().cached_sum, 10);
    assert_eq!(
        log,
        ["base:decode-start", "derived:decode-start", "base:decode-end", "derived:decode-end"]
    );
}

#[test]
fn test_hooks_without_context_are_harmless() {
    let root = ObjectRef::new(Tracked {
        values: vec![5],
        ..Default::default()
    });
    let back = roundtrip(&root, SerializerFlags::COMPRESS)
        .downcast::<Tracked>()
        .expect("Tracked root");
    assert_eq!(back.borrow().cached_sum, 5);
}

#[test]
fn test_clone_object_is_deep() {
    let original = family();
    let root = ObjectRef::from_rc(original.clone());

    for flags in [SerializerFlags::empty(), SerializerFlags::COMPRESS | SerializerFlags::NO_META] {
        let copy = clone_object(&root, flags).expect("clone");
        assert!(!copy.ptr_eq(&root));
        let copy = copy.downcast::<Node>().expect("Node copy");

        original.borrow().child(0).borrow_mut().name = "changed".into();
        assert_eq!(copy.borrow().child(0).borrow().name, "left");
        original.borrow().child(0).borrow_mut().name = "left".into();

        let parent = copy.borrow().child(1).borrow().parent.clone().expect("parent");
        assert!(Rc::ptr_eq(&parent, &copy));
    }
}

// ---------------------------------------------------------------------------
// Hand-built streams (uncompressed, with metadata)
// ---------------------------------------------------------------------------

const NODE_NEXT_WORD: u32 = (3 << 16) | (3 << 2);
const NODE_PARENT_WORD: u32 = (2 << 16) | (3 << 2);
const TERMINATOR: u32 = 0x40;

fn object_word(id: u32) -> u32 {
    (id << 2) | 1
}

fn words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn decode_words(stream: &[u32]) -> bitrefl::Result<bitrefl::Decoded> {
    bitrefl::rtti::registry()
        .ensure_registered(<Node as bitrefl::RttiStatic>::rtti_static())
        .expect("register");
    MemorySerializer::new().decode_from_slice(&words(stream), SerializerFlags::empty(), None)
}

#[test]
fn test_hand_built_stream_decodes() {
    let decoded = decode_words(&[
        object_word(1),
        TID_NODE,
        NODE_NEXT_WORD,
        2,
        TERMINATOR,
        object_word(2),
        TID_NODE,
        NODE_PARENT_WORD,
        1,
        TERMINATOR,
    ])
    .expect("decode");
    let root = decoded.downcast::<Node>().expect("Node root");
    let next = root.borrow().next.clone().expect("next");
    let parent = next.borrow().parent.clone().expect("parent");
    assert!(Rc::ptr_eq(&parent, &root));
}

#[test]
fn test_reference_to_missing_object_is_dangling() {
    for field in [NODE_NEXT_WORD, NODE_PARENT_WORD] {
        let err = decode_words(&[object_word(1), TID_NODE, field, 7, TERMINATOR]).unwrap_err();
        assert!(
            matches!(err, Error::DanglingReference { object_id: 7 }),
            "field {:#x}: {}",
            field,
            err
        );
    }
}

#[test]
fn test_unterminated_object_is_rejected() {
    let err = decode_words(&[object_word(1), TID_NODE, NODE_NEXT_WORD, 0]).unwrap_err();
    assert!(matches!(err, Error::MissingTerminator { object_id: 1 }), "{err}");

    // The next top-level object starts before the first one ends.
    let err = decode_words(&[object_word(1), TID_NODE, object_word(2), TID_NODE, TERMINATOR]).unwrap_err();
    assert!(matches!(err, Error::MissingTerminator { object_id: 1 }), "{err}");
}

#[test]
fn test_corrupt_field_word_is_rejected() {
    // Builtin flag with an id that names no builtin.
    let bad_builtin = (48 << 8) | 0x10;
    let err = decode_words(&[object_word(1), TID_NODE, bad_builtin, 0, TERMINATOR]).unwrap_err();
    assert!(matches!(err, Error::CorruptMetadata { .. }), "{err}");

    // An element count that runs past the end of the stream.
    let children = (1 << 16) | (3 << 2) | 0x02;
    let err = decode_words(&[object_word(1), TID_NODE, children, 1_000_000, TERMINATOR]).unwrap_err();
    assert!(matches!(err, Error::UnexpectedEof { .. }), "{err}");
}
