// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Snapshots, diffs and patches over [`SerializedGraph`].
//!
//! [`SerializedGraph::from_object`] captures a live graph; [`SerializedGraph::diff`]
//! compares two captures and keeps only what changed:
//!
//! - objects new to the graph, or whose type changed, go in whole;
//! - other objects keep the fields whose encoded bits differ, level by level
//!   through the inheritance chain;
//! - arrays are replaced whole, embedded values are diffed while their type
//!   stays the same.
//!
//! Objects are matched by stream id. Ids come from the encoder's
//! breadth-first walk, so two captures of the same structure line up.
//!
//! A diff applies to a capture ([`SerializedGraph::apply_diff`]) or onto the
//! live objects it was taken from ([`apply_diff`]).

use std::collections::{BTreeMap, BTreeSet};

use crate::bitstream::Bitstream;
use crate::config::{SerializerConfig, NULL_OBJECT_ID};
use crate::error::{Error, Result};
use crate::io::MemoryDataStream;
use crate::rtti::field::{FieldAccess, RttiField};
use crate::rtti::reflectable::{ObjectRef, Reflectable};
use crate::rtti::registry::registry;
use crate::rtti::rtti_type::{HookKind, RttiType, SerializationContext};
use crate::serializer::decoder::locate_part;
use crate::serializer::encoder::Encoder;
use crate::serializer::flags::SerializerFlags;
use crate::serializer::intermediate::{
    decode_intermediate, SerializedField, SerializedGraph, SerializedObject, SerializedValue,
};
use crate::serializer::metadata::FieldMeta;

impl SerializedGraph {
    /// Capture the graph reachable from `root`.
    ///
    /// Only [`SerializerFlags::COMPRESS`] and [`SerializerFlags::SHALLOW`]
    /// apply; a capture always carries metadata, so `NO_META` is
    /// [`Error::MissingSchema`].
    pub fn from_object(root: &ObjectRef, flags: SerializerFlags) -> Result<Self> {
        capture(root, flags).map(|(graph, _)| graph)
    }

    /// Fresh objects built from this capture; returns the root.
    ///
    /// Every type id must be registered. Deserialization hooks run on each
    /// object and embedded value, as in a regular decode.
    pub fn to_object(&self) -> Result<ObjectRef> {
        let mut objects = BTreeMap::new();
        for (&id, object) in &self.objects {
            objects.insert(id, registry().resolve(object.type_id)?.new_object()?);
        }
        let patcher = Patcher {
            objects,
            flags: flags_for(self.compressed),
        };
        for (&id, object) in &self.objects {
            patcher.patch_object(id, object)?;
        }
        patcher
            .resolve(self.root)?
            .ok_or(Error::DanglingReference { object_id: self.root })
    }

    /// Changes that turn `old` into `new`.
    ///
    /// Fields that still hold the same reference are kept when the target's
    /// type changed, so the patch re-points them at the replacement object.
    pub fn diff(old: &Self, new: &Self) -> Result<Self> {
        if old.compressed != new.compressed {
            return Err(Error::IncompatibleDiff {
                reason: "captures use different plain encodings",
            });
        }
        let retyped: BTreeSet<u32> = new
            .objects
            .iter()
            .filter(|(id, object)| {
                old.objects
                    .get(id)
                    .is_some_and(|prev| prev.type_id != object.type_id)
            })
            .map(|(&id, _)| id)
            .collect();

        let mut objects = BTreeMap::new();
        for (&id, object) in &new.objects {
            let change = match old.objects.get(&id) {
                Some(prev) if prev.type_id == object.type_id => diff_parts(prev, object, &retyped),
                _ => Some(object.clone()),
            };
            if let Some(change) = change {
                objects.insert(id, change);
            }
        }
        log::debug!(
            "[diff] {} of {} objects changed ({} retyped)",
            objects.len(),
            new.objects.len(),
            retyped.len()
        );
        Ok(Self {
            root: new.root,
            objects,
            compressed: new.compressed,
        })
    }

    /// This capture with `diff` merged in. Objects the new root no longer
    /// reaches are dropped.
    pub fn apply_diff(&self, diff: &Self) -> Result<Self> {
        if self.compressed != diff.compressed {
            return Err(Error::IncompatibleDiff {
                reason: "capture and diff use different plain encodings",
            });
        }
        let mut merged = self.clone();
        for (&id, change) in &diff.objects {
            match merged.objects.get_mut(&id) {
                Some(object) => object.apply_diff(change),
                None => {
                    merged.objects.insert(id, change.clone());
                }
            }
        }
        merged.root = diff.root;
        let reachable = merged.reachable();
        merged.objects.retain(|id, _| reachable.contains(id));
        Ok(merged)
    }

    /// Ids reachable from the root through references.
    pub fn reachable(&self) -> BTreeSet<u32> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            if id == NULL_OBJECT_ID || !seen.insert(id) {
                continue;
            }
            if let Some(object) = self.objects.get(&id) {
                object.visit_references(&mut |target| pending.push(target));
            }
        }
        seen
    }
}

impl SerializedObject {
    /// Changes from `self` to `new`; `None` when nothing differs. A different
    /// type yields `new` whole.
    pub fn diff(&self, new: &SerializedObject) -> Option<SerializedObject> {
        if self.type_id != new.type_id {
            return Some(new.clone());
        }
        diff_parts(self, new, &BTreeSet::new())
    }

    /// Merge a change produced by [`diff`](Self::diff).
    pub fn apply_diff(&mut self, change: &SerializedObject) {
        if self.type_id != change.type_id {
            *self = change.clone();
            return;
        }
        for field in &change.fields {
            match self.fields.iter_mut().find(|f| f.id == field.id) {
                Some(current) => current.apply_change(field),
                None => self.fields.push(field.clone()),
            }
        }
        if let Some(base_change) = &change.base {
            match &mut self.base {
                Some(base) => base.apply_diff(base_change),
                None => self.base = Some(base_change.clone()),
            }
        }
    }

    fn visit_references(&self, visit: &mut dyn FnMut(u32)) {
        for field in &self.fields {
            field.value.visit_references(visit);
        }
        if let Some(base) = &self.base {
            base.visit_references(visit);
        }
    }
}

impl SerializedField {
    fn apply_change(&mut self, change: &SerializedField) {
        if let (SerializedValue::Embedded(current), SerializedValue::Embedded(sub)) = (&mut self.value, &change.value) {
            current.apply_diff(sub);
            return;
        }
        *self = change.clone();
    }

    fn describe(&self) -> String {
        if self.value.is_array() {
            format!("{} array", self.kind)
        } else {
            self.kind.to_string()
        }
    }
}

impl SerializedValue {
    fn visit_references(&self, visit: &mut dyn FnMut(u32)) {
        match self {
            Self::Reference(id) => visit(*id),
            Self::ReferenceArray(ids) => {
                for &id in ids {
                    visit(id);
                }
            }
            Self::Embedded(object) => object.visit_references(visit),
            Self::EmbeddedArray(objects) => {
                for object in objects {
                    object.visit_references(visit);
                }
            }
            Self::Plain(_) | Self::PlainArray(_) | Self::DataBlock(_) => {}
        }
    }

    fn mentions(&self, ids: &BTreeSet<u32>) -> bool {
        if ids.is_empty() {
            return false;
        }
        let mut found = false;
        self.visit_references(&mut |id| found |= ids.contains(&id));
        found
    }
}

/// Changed fields of two same-typed objects, level by level.
fn diff_parts(old: &SerializedObject, new: &SerializedObject, retyped: &BTreeSet<u32>) -> Option<SerializedObject> {
    let fields: Vec<SerializedField> = new
        .fields
        .iter()
        .filter_map(|field| diff_field(old.field(field.id), field, retyped))
        .collect();
    let base = match (&old.base, &new.base) {
        (Some(prev), Some(next)) if prev.type_id == next.type_id => diff_parts(prev, next, retyped).map(Box::new),
        (_, Some(next)) => Some(next.clone()),
        (_, None) => None,
    };
    if fields.is_empty() && base.is_none() {
        return None;
    }
    Some(SerializedObject {
        object_id: new.object_id,
        type_id: new.type_id,
        fields,
        base,
    })
}

fn diff_field(old: Option<&SerializedField>, new: &SerializedField, retyped: &BTreeSet<u32>) -> Option<SerializedField> {
    let Some(old) = old.filter(|old| old.kind == new.kind) else {
        return Some(new.clone());
    };
    match (&old.value, &new.value) {
        (SerializedValue::Embedded(prev), SerializedValue::Embedded(next)) if prev.type_id == next.type_id => {
            diff_parts(prev, next, retyped).map(|sub| SerializedField {
                id: new.id,
                kind: new.kind,
                value: SerializedValue::Embedded(Box::new(sub)),
            })
        }
        (prev, next) if prev == next && !next.mentions(retyped) => None,
        _ => Some(new.clone()),
    }
}

/// Diff of two live graphs; see [`SerializedGraph::diff`].
pub fn diff_objects(old: &ObjectRef, new: &ObjectRef, compress: bool) -> Result<SerializedGraph> {
    let flags = flags_for(compress);
    SerializedGraph::diff(
        &SerializedGraph::from_object(old, flags)?,
        &SerializedGraph::from_object(new, flags)?,
    )
}

/// Patch the live graph rooted at `root` with `diff`, in place.
///
/// Objects are matched by the ids a fresh encode of `root` gives them, the
/// same numbering [`diff_objects`] and [`SerializedGraph::from_object`] use.
/// Carried fields are overwritten; ids the graph lacks, or whose type
/// changed, get new objects. The root keeps its identity, so a diff that
/// changes its type or moves it is [`Error::IncompatibleDiff`].
pub fn apply_diff(root: &ObjectRef, diff: &SerializedGraph) -> Result<()> {
    let (_, mut objects) = encode_numbered(root, flags_for(diff.compressed))?;
    let root_id = objects.keys().next().copied().unwrap_or(NULL_OBJECT_ID);
    if diff.root != root_id {
        return Err(Error::IncompatibleDiff {
            reason: "diff is rooted at a different object",
        });
    }
    if diff
        .objects
        .get(&root_id)
        .is_some_and(|change| change.type_id != root.type_id())
    {
        return Err(Error::IncompatibleDiff {
            reason: "diff changes the root's type",
        });
    }

    let mut created = 0usize;
    for (&id, change) in &diff.objects {
        let reusable = objects
            .get(&id)
            .is_some_and(|object| object.type_id() == change.type_id);
        if !reusable {
            objects.insert(id, registry().resolve(change.type_id)?.new_object()?);
            created += 1;
        }
    }
    let patcher = Patcher {
        objects,
        flags: flags_for(diff.compressed),
    };
    for (&id, change) in &diff.objects {
        patcher.patch_object(id, change)?;
    }
    log::debug!(
        "[diff] patched {} objects of {} ({} created)",
        diff.objects.len(),
        root.rtti().name(),
        created
    );
    Ok(())
}

fn flags_for(compress: bool) -> SerializerFlags {
    if compress {
        SerializerFlags::COMPRESS
    } else {
        SerializerFlags::empty()
    }
}

/// Encode `root` in memory, keeping the object behind every stream id.
fn encode_numbered(root: &ObjectRef, flags: SerializerFlags) -> Result<(Vec<u8>, BTreeMap<u32, ObjectRef>)> {
    if !flags.has_meta() {
        return Err(Error::MissingSchema);
    }
    let mut sink = MemoryDataStream::new();
    let (_, objects) = Encoder::new(&mut sink, &SerializerConfig::default(), flags, None).encode_collect(root)?;
    Ok((sink.into_inner(), objects))
}

fn capture(root: &ObjectRef, flags: SerializerFlags) -> Result<(SerializedGraph, BTreeMap<u32, ObjectRef>)> {
    let (bytes, objects) = encode_numbered(root, flags)?;
    Ok((decode_intermediate(&bytes, flags)?, objects))
}

/// Writes serialized fields onto live objects.
struct Patcher {
    objects: BTreeMap<u32, ObjectRef>,
    flags: SerializerFlags,
}

impl Patcher {
    fn resolve(&self, id: u32) -> Result<Option<ObjectRef>> {
        if id == NULL_OBJECT_ID {
            return Ok(None);
        }
        self.objects
            .get(&id)
            .cloned()
            .map(Some)
            .ok_or(Error::DanglingReference { object_id: id })
    }

    fn patch_object(&self, id: u32, change: &SerializedObject) -> Result<()> {
        let object = self.resolve(id)?.ok_or(Error::DanglingReference { object_id: id })?;
        let mut guard = object
            .try_borrow_mut()
            .map_err(|_| Error::ObjectBorrowed { object_id: id })?;
        self.patch_value(id, &mut *guard, change)
    }

    /// One object or embedded value, wrapped in its deserialization hooks.
    fn patch_value(&self, object_id: u32, obj: &mut dyn Reflectable, change: &SerializedObject) -> Result<()> {
        let rtti = obj.rtti();
        let mut ctx = SerializationContext::new(self.flags, None);
        rtti.run_hook(HookKind::DeserializationStarted, obj, &mut ctx)?;
        let mut level = Some(change);
        while let Some(part_change) = level {
            match locate_part(rtti, &mut *obj, part_change.type_id)? {
                Some((part_rtti, part)) => {
                    for field in &part_change.fields {
                        self.patch_field(object_id, part_rtti, &mut *part, field)?;
                    }
                }
                None => log::warn!(
                    "[diff] object {}: {} has no part of type {}, skipped",
                    object_id,
                    rtti.name(),
                    part_change.type_id
                ),
            }
            level = part_change.base.as_deref();
        }
        rtti.run_hook(HookKind::DeserializationEnded, obj, &mut ctx)
    }

    fn patch_field(
        &self,
        object_id: u32,
        rtti: &'static RttiType,
        part: &mut dyn Reflectable,
        change: &SerializedField,
    ) -> Result<()> {
        let Some(field) = rtti.find_field(change.id) else {
            log::debug!("[diff] {} has no field {}, skipped", rtti.name(), change.id);
            return Ok(());
        };
        let compress = self.flags.is_compressed();
        match (&field.access, &change.value) {
            (FieldAccess::Plain(access), SerializedValue::Plain(plain)) => {
                let mut stream = Bitstream::from_vec(plain.data.clone());
                keep_on_unknown_version(rtti, field, access.decode(part, &mut stream, &field.info, compress))?;
            }
            (FieldAccess::PlainArray(access), SerializedValue::PlainArray(items)) => {
                access.resize(part, items.len())?;
                for (index, item) in items.iter().enumerate() {
                    let mut stream = Bitstream::from_vec(item.data.clone());
                    let decoded = access.decode_elem(&mut *part, index, &mut stream, &field.info, compress);
                    keep_on_unknown_version(rtti, field, decoded)?;
                }
            }
            (FieldAccess::DataBlock(access), SerializedValue::DataBlock(data)) => {
                access.set(part, data.clone())?;
            }
            (FieldAccess::Reflectable(access), SerializedValue::Embedded(sub)) => {
                self.patch_value(object_id, access.get_mut(part)?, sub)?;
            }
            (FieldAccess::ReflectableArray(access), SerializedValue::EmbeddedArray(items)) => {
                access.resize(part, items.len())?;
                for (index, item) in items.iter().enumerate() {
                    self.patch_value(object_id, access.elem_mut(&mut *part, index)?, item)?;
                }
            }
            (FieldAccess::ReflectablePtr(access), SerializedValue::Reference(id)) => {
                access.set(part, self.resolve(*id)?)?;
            }
            (FieldAccess::ReflectablePtrArray(access), SerializedValue::ReferenceArray(ids)) => {
                access.resize(part, ids.len())?;
                for (index, &id) in ids.iter().enumerate() {
                    access.set(&mut *part, index, self.resolve(id)?)?;
                }
            }
            _ => {
                return Err(Error::FieldCategoryMismatch {
                    type_name: rtti.name(),
                    field_id: change.id,
                    expected: FieldMeta::for_field(field).describe(),
                    found: change.describe(),
                })
            }
        }
        Ok(())
    }
}

/// Unknown payload versions leave the field as it was.
fn keep_on_unknown_version<T>(rtti: &RttiType, field: &RttiField, result: Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.is_recoverable() => {
            log::error!("[diff] {}.{}: {}; keeping current value", rtti.name(), field.name(), err);
            Ok(())
        }
        Err(err) => Err(err),
    }
}
