// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared reflectable fixtures for the integration tests.
//!
//! Type ids live in the 5000 range; each test binary only pulls in the
//! fixtures it needs.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::OnceLock;

use bitrefl::bitstream::Bitstream;
use bitrefl::math::{Color, Quaternion, Vector3};
use bitrefl::rtti::plain::VersionedPlainType;
use bitrefl::rtti::{FieldInfo, ObjectRef, PlainType, RttiStatic, RttiType, RttiTypeBuilder, SerializationContext};
use bitrefl::{impl_versioned_plain_type, Decoded, MemorySerializer, SerializerFlags};

pub const TID_POINT: u32 = 5000;
pub const TID_SAMPLE: u32 = 5001;
pub const TID_NODE: u32 = 5010;
pub const TID_ENTITY: u32 = 5020;
pub const TID_ACTOR: u32 = 5021;
pub const TID_PLAYER: u32 = 5022;
pub const TID_SCENE: u32 = 5030;
pub const TID_TRACKED_BASE: u32 = 5040;
pub const TID_TRACKED: u32 = 5041;
pub const TID_RIG_OLD: u32 = 5050;
pub const TID_RIG_NEW: u32 = 5051;
pub const TID_PANEL: u32 = 5052;
pub const TID_RECORD_V1: u32 = 5060;
pub const TID_RECORD_V2: u32 = 5061;
pub const TID_RECORD_WIDE: u32 = 5062;
pub const TID_RECORD_SHAPE: u32 = 5063;
pub const TID_BLOB: u32 = 5070;
pub const TID_CLOUD: u32 = 5071;
pub const TID_SHAPE: u32 = 5080;
pub const TID_CIRCLE: u32 = 5081;

pub const TID_JOINT: u32 = 5100;
pub const TID_TOGGLE: u32 = 5101;

/// Every flag combination the serializer accepts.
pub const ALL_FLAGS: [SerializerFlags; 4] = [
    SerializerFlags::empty(),
    SerializerFlags::COMPRESS,
    SerializerFlags::NO_META,
    SerializerFlags(SerializerFlags::COMPRESS.0 | SerializerFlags::NO_META.0),
];

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl RttiStatic for Point {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Point>::new("Point", TID_POINT)
                .plain_field("x", 0, |p| &p.x, |p, v| p.x = v)
                .plain_field("y", 1, |p| &p.y, |p, v| p.y = v)
                .finish()
        })
    }
}

/// One field of every category the builder offers, minus pointers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Sample {
    pub flag: bool,
    pub small: u8,
    pub signed: i8,
    pub short: i16,
    pub ushort: u16,
    pub count: u32,
    pub delta: i32,
    pub big: u64,
    pub offset: i64,
    pub ratio: f32,
    pub precise: f64,
    pub name: String,
    pub path: PathBuf,
    pub tags: Vec<String>,
    pub scores: HashMap<String, u32>,
    pub ordered: BTreeMap<u32, String>,
    pub pair: (u16, String),
    pub maybe: Option<u32>,
    pub position: Vector3,
    pub rotation: Quaternion,
    pub tint: Color,
    pub samples: Vec<i32>,
    pub blob: Vec<u8>,
    pub origin: Point,
    pub waypoints: Vec<Point>,
}

impl Sample {
    pub fn filled() -> Self {
        Self {
            flag: true,
            small: 200,
            signed: -100,
            short: -30_000,
            ushort: 65_000,
            count: 123_456,
            delta: -7,
            big: u64::MAX - 3,
            offset: i64::MIN + 9,
            ratio: 0.375,
            precise: std::f64::consts::PI,
            name: "sample".into(),
            path: PathBuf::from("assets/meshes/crate.mesh"),
            tags: vec!["red".into(), String::new(), "blue".into()],
            scores: HashMap::from([("alice".to_string(), 12), ("bob".to_string(), 0)]),
            ordered: BTreeMap::from([(1, "one".to_string()), (70_000, "many".to_string())]),
            pair: (9, "nine".into()),
            maybe: Some(0),
            position: Vector3::new(1.0, -2.5, 3.25),
            rotation: Quaternion::new(0.0, 0.7071, 0.0, 0.7071),
            tint: Color::new(0.1, 0.2, 0.3, 0.4),
            samples: vec![0, -1, i32::MAX, i32::MIN],
            blob: (0..=255).collect(),
            origin: Point::new(-1, 1),
            waypoints: vec![Point::new(0, 0), Point::new(10, -10)],
        }
    }
}

impl RttiStatic for Sample {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Sample>::new("Sample", TID_SAMPLE)
                .plain_field("flag", 0, |s| &s.flag, |s, v| s.flag = v)
                .plain_field("small", 1, |s| &s.small, |s, v| s.small = v)
                .plain_field("signed", 2, |s| &s.signed, |s, v| s.signed = v)
                .plain_field("short", 3, |s| &s.short, |s, v| s.short = v)
                .plain_field("ushort", 4, |s| &s.ushort, |s, v| s.ushort = v)
                .plain_field("count", 5, |s| &s.count, |s, v| s.count = v)
                .plain_field("delta", 6, |s| &s.delta, |s, v| s.delta = v)
                .plain_field("big", 7, |s| &s.big, |s, v| s.big = v)
                .plain_field("offset", 8, |s| &s.offset, |s, v| s.offset = v)
                .plain_field("ratio", 9, |s| &s.ratio, |s, v| s.ratio = v)
                .plain_field("precise", 10, |s| &s.precise, |s, v| s.precise = v)
                .plain_field("name", 11, |s| &s.name, |s, v| s.name = v)
                .plain_field("path", 12, |s| &s.path, |s, v| s.path = v)
                .plain_field("tags", 13, |s| &s.tags, |s, v| s.tags = v)
                .plain_field("scores", 14, |s| &s.scores, |s, v| s.scores = v)
                .plain_field("ordered", 15, |s| &s.ordered, |s, v| s.ordered = v)
                .plain_field("pair", 16, |s| &s.pair, |s, v| s.pair = v)
                .plain_field("maybe", 17, |s| &s.maybe, |s, v| s.maybe = v)
                .plain_field("position", 18, |s| &s.position, |s, v| s.position = v)
                .plain_field("rotation", 19, |s| &s.rotation, |s, v| s.rotation = v)
                .plain_field("tint", 20, |s| &s.tint, |s, v| s.tint = v)
                .plain_array_field("samples", 21, |s| &s.samples, |s| &mut s.samples)
                .data_block_field("blob", 22, |s| s.blob.as_slice(), |s, v| s.blob = v)
                .reflectable_field("origin", 23, |s| &s.origin, |s| &mut s.origin)
                .reflectable_array_field("waypoints", 24, |s| &s.waypoints, |s| &mut s.waypoints)
                .finish()
        })
    }
}

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

pub type NodeRef = Rc<RefCell<Node>>;

/// Tree node: strong children, weak parent, optional strong sibling link.
#[derive(Debug, Default)]
pub struct Node {
    pub name: String,
    pub children: Vec<Option<NodeRef>>,
    pub parent: Option<NodeRef>,
    pub next: Option<NodeRef>,
}

impl Node {
    pub fn named(name: &str) -> NodeRef {
        Rc::new(RefCell::new(Self {
            name: name.to_string(),
            ..Default::default()
        }))
    }

    pub fn adopt(parent: &NodeRef, child: &NodeRef) {
        child.borrow_mut().parent = Some(parent.clone());
        parent.borrow_mut().children.push(Some(child.clone()));
    }

    pub fn child(&self, index: usize) -> NodeRef {
        self.children[index].clone().expect("child present")
    }
}

impl RttiStatic for Node {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Node>::new("Node", TID_NODE)
                .plain_field("name", 0, |n| &n.name, |n, v| n.name = v)
                .reflectable_ptr_array_field::<Node>(
                    "children",
                    1,
                    |n| n.children.len(),
                    |n, len| n.children.resize(len, None),
                    |n, i| n.children[i].clone(),
                    |n, i, v| n.children[i] = v,
                )
                .reflectable_ptr_field::<Node>("parent", 2, |n| n.parent.clone(), |n, v| n.parent = v)
                .weak()
                .reflectable_ptr_field::<Node>("next", 3, |n| n.next.clone(), |n, v| n.next = v)
                .finish()
        })
    }
}

/// Root of the inheritance chain `Entity <- Actor <- Player`.
#[derive(Debug, Default, Clone)]
pub struct Entity {
    pub name: String,
    pub health: u32,
}

impl RttiStatic for Entity {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Entity>::new("Entity", TID_ENTITY)
                .plain_field("name", 0, |e| &e.name, |e, v| e.name = v)
                .plain_field("health", 1, |e| &e.health, |e, v| e.health = v)
                .finish()
        })
    }
}

#[derive(Debug, Default)]
pub struct Actor {
    pub entity: Entity,
    pub speed: f32,
    pub target: Option<ObjectRef>,
}

impl RttiStatic for Actor {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Actor>::new("Actor", TID_ACTOR)
                .base::<Entity>(|a| &a.entity, |a| &mut a.entity)
                .plain_field("speed", 0, |a| &a.speed, |a, v| a.speed = v)
                .dyn_ptr_field::<Entity>("target", 1, |a| a.target.clone(), |a, v| a.target = v)
                .weak()
                .finish()
        })
    }
}

#[derive(Debug, Default)]
pub struct Player {
    pub actor: Actor,
    pub score: u64,
    pub inventory: Vec<String>,
}

impl RttiStatic for Player {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Player>::new("Player", TID_PLAYER)
                .base::<Actor>(|p| &p.actor, |p| &mut p.actor)
                .plain_field("score", 0, |p| &p.score, |p, v| p.score = v)
                .plain_field("inventory", 1, |p| &p.inventory, |p, v| p.inventory = v)
                .finish()
        })
    }
}

/// Polymorphic container: pointers declared as `Entity`, holding anything derived.
#[derive(Debug, Default)]
pub struct Scene {
    pub entities: Vec<Option<ObjectRef>>,
    pub focus: Option<ObjectRef>,
}

impl RttiStatic for Scene {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Scene>::new("Scene", TID_SCENE)
                .dyn_ptr_array_field::<Entity>(
                    "entities",
                    0,
                    |s| s.entities.len(),
                    |s, len| s.entities.resize(len, None),
                    |s, i| s.entities[i].clone(),
                    |s, i, v| s.entities[i] = v,
                )
                .dyn_ptr_field::<Entity>("focus", 1, |s| s.focus.clone(), |s, v| s.focus = v)
                .finish()
        })
    }
}

/// Abstract base; only `Circle` can be instantiated.
#[derive(Debug, Default)]
pub struct Shape {
    pub label: String,
}

impl RttiStatic for Shape {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Shape>::new_abstract("Shape", TID_SHAPE)
                .plain_field("label", 0, |s| &s.label, |s, v| s.label = v)
                .finish()
        })
    }
}

#[derive(Debug, Default)]
pub struct Circle {
    pub shape: Shape,
    pub radius: f32,
}

impl RttiStatic for Circle {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Circle>::new("Circle", TID_CIRCLE)
                .base::<Shape>(|c| &c.shape, |c| &mut c.shape)
                .plain_field("radius", 0, |c| &c.radius, |c, v| c.radius = v)
                .finish()
        })
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Log of hook calls, handed to the serializer as the user context.
pub type HookLog = Vec<String>;

fn record(ctx: &mut SerializationContext<'_>, event: &str) {
    if let Some(log) = ctx.user_mut::<HookLog>() {
        log.push(event.to_string());
    }
}

#[derive(Debug, Default)]
pub struct TrackedBase {
    pub revision: u32,
}

impl RttiStatic for TrackedBase {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<TrackedBase>::new("TrackedBase", TID_TRACKED_BASE)
                .plain_field("revision", 0, |t| &t.revision, |t, v| t.revision = v)
                .on_serialization_started(|_, ctx| record(ctx, "base:encode-start"))
                .on_serialization_ended(|_, ctx| record(ctx, "base:encode-end"))
                .on_deserialization_started(|_, ctx| record(ctx, "base:decode-start"))
                .on_deserialization_ended(|_, ctx| record(ctx, "base:decode-end"))
                .finish()
        })
    }
}

/// Keeps `cached` out of the stream and rebuilds it after decoding.
#[derive(Debug, Default)]
pub struct Tracked {
    pub base: TrackedBase,
    pub values: Vec<u32>,
    pub cached_sum: u64,
}

impl RttiStatic for Tracked {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Tracked>::new("Tracked", TID_TRACKED)
                .base::<TrackedBase>(|t| &t.base, |t| &mut t.base)
                .plain_field("values", 0, |t| &t.values, |t, v| t.values = v)
                .on_serialization_started(|t, ctx| {
                    t.base.revision += 1;
                    record(ctx, "derived:encode-start");
                })
                .on_serialization_ended(|_, ctx| record(ctx, "derived:encode-end"))
                .on_deserialization_started(|_, ctx| record(ctx, "derived:decode-start"))
                .on_deserialization_ended(|t, ctx| {
                    t.cached_sum = t.values.iter().map(|&v| u64::from(v)).sum();
                    record(ctx, "derived:decode-end");
                })
                .finish()
        })
    }
}

// ---------------------------------------------------------------------------
// Schema evolution
// ---------------------------------------------------------------------------

/// Joint payload as written by an older build.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JointV1 {
    pub name: String,
}

impl VersionedPlainType for JointV1 {
    const TYPE_ID: u32 = TID_JOINT;
    const VERSION: u32 = 1;
    const TYPE_NAME: &'static str = "Joint";

    fn write_payload(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> bitrefl::Result<()> {
        self.name.to_stream(stream, info, compress)?;
        Ok(())
    }

    fn read_payload(
        &mut self,
        _version: u32,
        stream: &mut Bitstream<'_>,
        info: &FieldInfo,
        compress: bool,
    ) -> bitrefl::Result<()> {
        self.name.from_stream(stream, info, compress)?;
        Ok(())
    }
}

impl_versioned_plain_type!(JointV1);

/// Joint payload of the current build; reads every version up to 3.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JointV3 {
    pub name: String,
    pub stiffness: f32,
    pub limits: (f32, f32),
}

impl VersionedPlainType for JointV3 {
    const TYPE_ID: u32 = TID_JOINT;
    const VERSION: u32 = 3;
    const TYPE_NAME: &'static str = "Joint";

    fn write_payload(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> bitrefl::Result<()> {
        self.name.to_stream(stream, info, compress)?;
        self.stiffness.to_stream(stream, info, compress)?;
        self.limits.to_stream(stream, info, compress)?;
        Ok(())
    }

    fn read_payload(
        &mut self,
        version: u32,
        stream: &mut Bitstream<'_>,
        info: &FieldInfo,
        compress: bool,
    ) -> bitrefl::Result<()> {
        self.name.from_stream(stream, info, compress)?;
        if version >= 2 {
            self.stiffness.from_stream(stream, info, compress)?;
        }
        if version >= 3 {
            self.limits.from_stream(stream, info, compress)?;
        }
        Ok(())
    }

    fn accepts(version: u32) -> bool {
        (1..=3).contains(&version)
    }
}

impl_versioned_plain_type!(JointV3);

#[derive(Debug, Default)]
pub struct RigOld {
    pub joint: JointV1,
    pub bones: u32,
}

impl RttiStatic for RigOld {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<RigOld>::new("RigOld", TID_RIG_OLD)
                .plain_field("joint", 0, |r| &r.joint, |r, v| r.joint = v)
                .plain_field("bones", 1, |r| &r.bones, |r, v| r.bones = v)
                .finish()
        })
    }
}

#[derive(Debug, Default)]
pub struct RigNew {
    pub joint: JointV3,
    pub bones: u32,
}

impl RttiStatic for RigNew {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<RigNew>::new("RigNew", TID_RIG_NEW)
                .plain_field("joint", 0, |r| &r.joint, |r, v| r.joint = v)
                .plain_field("bones", 1, |r| &r.bones, |r, v| r.bones = v)
                .finish()
        })
    }
}

/// Versioned payload that is a single raw bit.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Toggle {
    pub on: bool,
}

impl VersionedPlainType for Toggle {
    const TYPE_ID: u32 = TID_TOGGLE;
    const VERSION: u32 = 1;
    const TYPE_NAME: &'static str = "Toggle";

    fn write_payload(&self, stream: &mut Bitstream<'_>, _info: &FieldInfo, _compress: bool) -> bitrefl::Result<()> {
        stream.write_bits_u64(u64::from(self.on), 1)
    }

    fn read_payload(
        &mut self,
        _version: u32,
        stream: &mut Bitstream<'_>,
        _info: &FieldInfo,
        _compress: bool,
    ) -> bitrefl::Result<()> {
        self.on = stream.read_bits_u64(1)? == 1;
        Ok(())
    }
}

impl_versioned_plain_type!(Toggle);

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Panel {
    pub toggle: Toggle,
    pub after: u32,
}

impl RttiStatic for Panel {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Panel>::new("Panel", TID_PANEL)
                .plain_field("toggle", 0, |p| &p.toggle, |p, v| p.toggle = v)
                .plain_field("after", 1, |p| &p.after, |p, v| p.after = v)
                .finish()
        })
    }
}

/// First revision of a record: `id` and `value`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordV1 {
    pub id: u32,
    pub value: i32,
}

impl RttiStatic for RecordV1 {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<RecordV1>::new("RecordV1", TID_RECORD_V1)
                .plain_field("id", 0, |r| &r.id, |r, v| r.id = v)
                .plain_field("value", 1, |r| &r.value, |r, v| r.value = v)
                .finish()
        })
    }
}

/// Second revision: adds `note` (field 2).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordV2 {
    pub id: u32,
    pub value: i32,
    pub note: String,
}

impl RttiStatic for RecordV2 {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<RecordV2>::new("RecordV2", TID_RECORD_V2)
                .plain_field("id", 0, |r| &r.id, |r, v| r.id = v)
                .plain_field("value", 1, |r| &r.value, |r, v| r.value = v)
                .plain_field("note", 2, |r| &r.note, |r, v| r.note = v)
                .finish()
        })
    }
}

/// `value` widened to 64 bits.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordWide {
    pub id: u32,
    pub value: i64,
}

impl RttiStatic for RecordWide {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<RecordWide>::new("RecordWide", TID_RECORD_WIDE)
                .plain_field("id", 0, |r| &r.id, |r, v| r.id = v)
                .plain_field("value", 1, |r| &r.value, |r, v| r.value = v)
                .finish()
        })
    }
}

/// `value` turned into an embedded point.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordShape {
    pub id: u32,
    pub value: Point,
}

impl RttiStatic for RecordShape {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<RecordShape>::new("RecordShape", TID_RECORD_SHAPE)
                .plain_field("id", 0, |r| &r.id, |r, v| r.id = v)
                .reflectable_field("value", 1, |r| &r.value, |r| &mut r.value)
                .finish()
        })
    }
}

// ---------------------------------------------------------------------------
// Bulk data
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl RttiStatic for Blob {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Blob>::new("Blob", TID_BLOB)
                .data_block_field("data", 0, |b| b.data.as_slice(), |b, v| b.data = v)
                .finish()
        })
    }
}

/// Many small shared objects behind one root.
#[derive(Debug, Default)]
pub struct Cloud {
    pub points: Vec<Option<Rc<RefCell<Point>>>>,
}

impl Cloud {
    pub fn with_points(count: usize) -> Self {
        Self {
            points: (0..count)
                .map(|i| Some(Rc::new(RefCell::new(Point::new(i as i32, -(i as i32))))))
                .collect(),
        }
    }
}

impl RttiStatic for Cloud {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<Cloud>::new("Cloud", TID_CLOUD)
                .reflectable_ptr_array_field::<Point>(
                    "points",
                    0,
                    |c| c.points.len(),
                    |c, len| c.points.resize(len, None),
                    |c, i| c.points[i].clone(),
                    |c, i, v| c.points[i] = v,
                )
                .finish()
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Encode `root` and decode it back, passing the root schema when `flags`
/// drop metadata.
pub fn roundtrip(root: &ObjectRef, flags: SerializerFlags) -> Decoded {
    let mut serializer = MemorySerializer::new();
    let bytes = serializer.encode_to_vec(root, flags).expect("encode");
    let schema = (!flags.has_meta()).then(|| root.rtti().schema());
    serializer
        .decode_from_slice(&bytes, flags, schema)
        .expect("decode")
}

/// Rewrite the root type id of an uncompressed metadata stream, standing in
/// for a build whose type changed under the same stream.
pub fn retype_root(bytes: &mut [u8], from: u32, to: u32) {
    let found = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    assert_eq!(found, from, "root type id");
    bytes[4..8].copy_from_slice(&to.to_le_bytes());
}
