// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object graph decoder.
//!
//! Two passes over the stream:
//!
//! 1. **Scan** - walk the top-level entries, recording each object's offset
//!    and type id. Without metadata the types come from the schema: the root
//!    has the schema's type, every other object the declared type of the
//!    first pointer field that references it.
//! 2. **Materialise** - decode depth-first from the root. A strong reference
//!    decodes its target before the holder finishes; reaching an object that
//!    is still being decoded is a [`Error::CircularReference`]. A weak
//!    reference gets the target's handle straight away (allocating it if
//!    needed) and the target is filled in later.
//!
//! Objects left over after the root (weak-only targets, objects referenced
//! only from skipped fields) are decoded in id order.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::bitstream::{Bitstream, BufferedBitstreamReader};
use crate::config::{SerializerConfig, NULL_OBJECT_ID};
use crate::error::{Diagnostic, DiagnosticKind, Error, Result};
use crate::rtti::field::{FieldAccess, FieldKind, RttiField};
use crate::rtti::reflectable::{ObjectRef, Reflectable};
use crate::rtti::registry::registry;
use crate::rtti::rtti_type::{HookKind, RttiType, SerializationContext};
use crate::rtti::schema::{RttiFieldSchema, RttiSchema};
use crate::serializer::flags::SerializerFlags;
use crate::serializer::Decoded;
use crate::serializer::metadata::{
    peek_entry, plain_value_len, read_base_header, read_field_meta, read_object_header,
    read_terminator, read_u32_value, skip_entry_meta, skip_entry_schema, skip_value_meta,
    skip_value_schema, EntryKind, FieldMeta, PlainLayout,
};

enum SlotState {
    Pending,
    /// Handed out to a weak reference, not decoded yet.
    Allocated(ObjectRef),
    InProgress(ObjectRef),
    Done(ObjectRef),
}

struct Slot {
    /// Bit offset of the object word.
    offset: u64,
    type_id: u32,
    state: SlotState,
}

/// How the current field is described on the wire.
#[derive(Clone, Copy)]
enum Layout<'s> {
    Meta(FieldMeta),
    Schema(&'s RttiFieldSchema, &'s RttiSchema),
}

impl Layout<'_> {
    fn plain(&self) -> PlainLayout {
        match self {
            Self::Meta(meta) => meta.plain,
            Self::Schema(field, _) => FieldMeta::for_schema(field).plain,
        }
    }
}

pub(crate) struct Decoder<'r, 'c, 'p> {
    reader: BufferedBitstreamReader<'r>,
    flags: SerializerFlags,
    schema: Option<Arc<RttiSchema>>,
    context: Option<&'c mut dyn Any>,
    progress: Option<&'p mut dyn FnMut(f32) -> bool>,
    progress_interval: u64,
    last_progress: Option<u64>,
    slots: BTreeMap<u32, Slot>,
    diagnostics: Vec<Diagnostic>,
}

impl<'r, 'c, 'p> Decoder<'r, 'c, 'p> {
    pub(crate) fn new(
        reader: BufferedBitstreamReader<'r>,
        config: &SerializerConfig,
        flags: SerializerFlags,
        schema: Option<Arc<RttiSchema>>,
        context: Option<&'c mut dyn Any>,
        progress: Option<&'p mut dyn FnMut(f32) -> bool>,
    ) -> Self {
        Self {
            reader,
            flags,
            schema,
            context,
            progress,
            progress_interval: config.progress_interval.max(1) * 8,
            last_progress: None,
            slots: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn compress(&self) -> bool {
        self.flags.is_compressed()
    }

    /// Decode the whole stream, returning the root and any diagnostics.
    pub(crate) fn decode(mut self) -> Result<Decoded> {
        if !self.flags.has_meta() && self.schema.is_none() {
            return Err(Error::MissingSchema);
        }
        let start = self.reader.tell();
        self.scan()?;
        let root_id = match self.slots.keys().next() {
            Some(&id) => id,
            None => return Err(Error::corrupt(start, "stream holds no objects")),
        };
        log::debug!(
            "[decoder] scanned {} objects, root {}",
            self.slots.len(),
            root_id
        );

        let root = self.decode_object(root_id)?;

        let leftovers: Vec<u32> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot.state, SlotState::Pending | SlotState::Allocated(_)))
            .map(|(&id, _)| id)
            .collect();
        for id in leftovers {
            let pending_type = match self.slots.get(&id) {
                Some(Slot {
                    state: SlotState::Pending,
                    type_id,
                    ..
                }) => Some(*type_id),
                _ => None,
            };
            if let Some(type_id) = pending_type {
                if !registry().contains(type_id) {
                    self.diagnose(
                        DiagnosticKind::UnknownType,
                        id,
                        type_id,
                        None,
                        format!("unreferenced object of unregistered type {type_id} skipped"),
                    );
                    continue;
                }
            }
            self.decode_object(id)?;
        }

        if let Some(progress) = self.progress.as_deref_mut() {
            if !progress(1.0) {
                return Err(Error::Cancelled);
            }
        }
        log::debug!(
            "[decoder] decoded {} objects, {} diagnostics",
            self.slots.len(),
            self.diagnostics.len()
        );
        Ok(Decoded {
            root,
            diagnostics: self.diagnostics,
            peak_buffer_bits: self.reader.peak_capacity(),
        })
    }

    // ===================================================================
    // Pass 1: scan
    // ===================================================================

    fn scan(&mut self) -> Result<()> {
        let compress = self.compress();
        let schema = self.schema.clone();
        let mut inferred: HashMap<u32, u32> = HashMap::new();
        if let Some(schema) = &schema {
            inferred.insert(1, schema.type_id);
        }

        while self.reader.remaining() >= 8 {
            let offset = self.reader.tell();
            let (object, type_id) = read_object_header(&mut self.reader, compress, self.flags.has_meta())?;
            if object.is_base || object.id == NULL_OBJECT_ID {
                return Err(Error::corrupt(offset, "expected a top-level object entry"));
            }
            if self.slots.contains_key(&object.id) {
                return Err(Error::corrupt(offset, format!("object {} appears twice", object.id)));
            }

            let type_id = match (type_id, &schema) {
                (Some(type_id), _) => {
                    skip_entry_meta(&mut self.reader, object.id, compress)?;
                    type_id
                }
                (None, Some(schema)) => {
                    let type_id = *inferred.get(&object.id).ok_or_else(|| {
                        Error::corrupt(offset, format!("no reference gives object {} a type", object.id))
                    })?;
                    let part = schema.find(type_id).ok_or(Error::UnknownType { type_id })?;
                    skip_entry_schema(
                        &mut self.reader,
                        part,
                        object.id,
                        schema,
                        compress,
                        &mut |target: u32, field: &RttiFieldSchema| {
                            inferred.entry(target).or_insert(field.type_id);
                        },
                    )?;
                    type_id
                }
                (None, None) => return Err(Error::MissingSchema),
            };

            self.slots.insert(
                object.id,
                Slot {
                    offset,
                    type_id,
                    state: SlotState::Pending,
                },
            );
        }
        Ok(())
    }

    // ===================================================================
    // Pass 2: objects
    // ===================================================================

    fn new_for_slot(&self, id: u32) -> Result<ObjectRef> {
        let slot = self.slots.get(&id).ok_or(Error::DanglingReference { object_id: id })?;
        registry().resolve(slot.type_id)?.new_object()
    }

    /// Handle for a weak reference target, allocated on first use.
    fn allocate(&mut self, id: u32) -> Result<ObjectRef> {
        let existing = match self.slots.get(&id) {
            None => return Err(Error::DanglingReference { object_id: id }),
            Some(slot) => match &slot.state {
                SlotState::Pending => None,
                SlotState::Allocated(obj) | SlotState::InProgress(obj) | SlotState::Done(obj) => {
                    Some(obj.clone())
                }
            },
        };
        if let Some(object) = existing {
            return Ok(object);
        }
        let object = self.new_for_slot(id)?;
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.state = SlotState::Allocated(object.clone());
        }
        Ok(object)
    }

    fn decode_object(&mut self, id: u32) -> Result<ObjectRef> {
        let (offset, existing) = match self.slots.get(&id) {
            None => return Err(Error::DanglingReference { object_id: id }),
            Some(slot) => match &slot.state {
                SlotState::Done(obj) => return Ok(obj.clone()),
                SlotState::InProgress(_) => return Err(Error::CircularReference { object_id: id }),
                SlotState::Allocated(obj) => (slot.offset, Some(obj.clone())),
                SlotState::Pending => (slot.offset, None),
            },
        };
        self.report_progress(offset)?;

        let object = match existing {
            Some(object) => object,
            None => self.new_for_slot(id)?,
        };
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.state = SlotState::InProgress(object.clone());
        }

        let resume = self.reader.tell();
        self.reader.seek(offset);
        {
            let rtti = object.rtti();
            let mut guard = object
                .try_borrow_mut()
                .map_err(|_| Error::ObjectBorrowed { object_id: id })?;
            let obj: &mut dyn Reflectable = &mut *guard;
            log::trace!("[decoder] object {} ({}) at bit {}", id, rtti.name(), offset);

            self.run_hook(rtti, HookKind::DeserializationStarted, obj)?;
            self.read_top_level(id, rtti, obj)?;
            self.run_hook(rtti, HookKind::DeserializationEnded, obj)?;
        }
        self.reader.seek(resume);

        if let Some(slot) = self.slots.get_mut(&id) {
            slot.state = SlotState::Done(object.clone());
        }
        Ok(object)
    }

    fn read_top_level(&mut self, id: u32, rtti: &'static RttiType, obj: &mut dyn Reflectable) -> Result<()> {
        let compress = self.compress();
        let has_meta = self.flags.has_meta();
        let offset = self.reader.tell();
        let (object, type_id) = read_object_header(&mut self.reader, compress, has_meta)?;
        if object.id != id || object.is_base {
            return Err(Error::corrupt(offset, format!("expected object {id}, found {}", object.id)));
        }
        match type_id {
            Some(_) => self.read_parts_meta(id, rtti, obj),
            None => {
                let root = self.schema.clone().ok_or(Error::MissingSchema)?;
                let part = root
                    .find(rtti.type_id())
                    .ok_or(Error::UnknownType { type_id: rtti.type_id() })?;
                self.read_parts_schema(id, Some((rtti, obj)), part, &root)
            }
        }
    }

    fn read_embedded(&mut self, part: &mut dyn Reflectable, layout: Layout<'_>) -> Result<()> {
        let compress = self.compress();
        let has_meta = self.flags.has_meta();
        let offset = self.reader.tell();
        let (object, type_id) = read_object_header(&mut self.reader, compress, has_meta)?;
        if object.id != NULL_OBJECT_ID || object.is_base {
            return Err(Error::corrupt(offset, "expected an embedded object entry"));
        }
        let rtti = part.rtti();
        if let Some(type_id) = type_id {
            if type_id != rtti.type_id() {
                log::debug!(
                    "[decoder] embedded {} stored as type {}, matching fields by id",
                    rtti.name(),
                    type_id
                );
            }
        }

        self.run_hook(rtti, HookKind::DeserializationStarted, part)?;
        match layout {
            Layout::Meta(_) => self.read_parts_meta(NULL_OBJECT_ID, rtti, part)?,
            Layout::Schema(field, root) => {
                let schema = root
                    .find(field.type_id)
                    .ok_or(Error::UnknownType { type_id: field.type_id })?;
                self.read_parts_schema(NULL_OBJECT_ID, Some((rtti, &mut *part)), schema, root)?;
            }
        }
        self.run_hook(rtti, HookKind::DeserializationEnded, part)
    }

    // -- metadata mode ----------------------------------------------------

    /// Fields and base parts up to the terminator.
    fn read_parts_meta(&mut self, object_id: u32, rtti: &'static RttiType, obj: &mut dyn Reflectable) -> Result<()> {
        let compress = self.compress();
        let mut part_type = rtti.type_id();
        loop {
            match peek_entry(&mut self.reader)? {
                None => return Err(Error::MissingTerminator { object_id }),
                Some(EntryKind::Terminator) => return read_terminator(&mut self.reader, compress),
                Some(EntryKind::Object) => {
                    let (object, type_id) = read_object_header(&mut self.reader, compress, true)?;
                    if !object.is_base || object.id != object_id {
                        return Err(Error::MissingTerminator { object_id });
                    }
                    part_type = type_id.unwrap_or_default();
                }
                Some(EntryKind::Field) => {
                    let meta = read_field_meta(&mut self.reader, compress)?;
                    match locate_part(rtti, &mut *obj, part_type)? {
                        Some((part_rtti, part)) => {
                            self.read_field_meta(object_id, part_rtti, part, meta)?;
                        }
                        None => {
                            skip_value_meta(&mut self.reader, &meta, compress)?;
                            self.diagnose(
                                DiagnosticKind::UnknownField,
                                object_id,
                                part_type,
                                Some(meta.id),
                                format!("base part {part_type} is not part of {}", rtti.name()),
                            );
                        }
                    }
                }
            }
        }
    }

    fn read_field_meta(
        &mut self,
        object_id: u32,
        rtti: &'static RttiType,
        part: &mut dyn Reflectable,
        meta: FieldMeta,
    ) -> Result<()> {
        let compress = self.compress();
        let Some(field) = rtti.find_field(meta.id) else {
            skip_value_meta(&mut self.reader, &meta, compress)?;
            self.diagnose(
                DiagnosticKind::UnknownField,
                object_id,
                rtti.type_id(),
                Some(meta.id),
                format!("{} declares no field {}", rtti.name(), meta.id),
            );
            return Ok(());
        };
        if field.kind() != meta.kind || field.is_array() != meta.is_array {
            return Err(Error::FieldCategoryMismatch {
                type_name: rtti.name(),
                field_id: meta.id,
                expected: FieldMeta::for_field(field).describe(),
                found: meta.describe(),
            });
        }
        if field.kind() == FieldKind::Plain && FieldMeta::for_field(field).plain != meta.plain {
            skip_value_meta(&mut self.reader, &meta, compress)?;
            self.diagnose(
                DiagnosticKind::SizeMismatch,
                object_id,
                rtti.type_id(),
                Some(meta.id),
                format!("`{}` layout changed, value skipped", field.name()),
            );
            return Ok(());
        }
        self.read_field_value(object_id, rtti, field, part, Layout::Meta(meta))
    }

    // -- schema mode --------------------------------------------------------

    /// Fields in schema order, then each base part behind its object word.
    fn read_parts_schema(
        &mut self,
        object_id: u32,
        mut live: Option<(&'static RttiType, &mut dyn Reflectable)>,
        schema: &RttiSchema,
        root: &RttiSchema,
    ) -> Result<()> {
        let compress = self.compress();
        for field_schema in &schema.field_schemas {
            let target = match live.as_mut() {
                Some((rtti, obj)) => {
                    let rtti: &'static RttiType = rtti;
                    rtti.find_field(field_schema.id).map(|f| (rtti, f, &mut **obj))
                }
                None => None,
            };
            let Some((rtti, field, part)) = target else {
                skip_value_schema(&mut self.reader, field_schema, root, compress, &mut |_: u32, _: &RttiFieldSchema| {})?;
                self.diagnose(
                    DiagnosticKind::UnknownField,
                    object_id,
                    schema.type_id,
                    Some(field_schema.id),
                    format!("type {} has no live field {}", schema.type_id, field_schema.id),
                );
                continue;
            };
            let stored = FieldMeta::for_schema(field_schema);
            let declared = FieldMeta::for_field(field);
            if declared.kind != stored.kind || declared.is_array != stored.is_array {
                return Err(Error::FieldCategoryMismatch {
                    type_name: rtti.name(),
                    field_id: field_schema.id,
                    expected: declared.describe(),
                    found: stored.describe(),
                });
            }
            if declared.kind == FieldKind::Plain && declared.plain != stored.plain {
                skip_value_schema(&mut self.reader, field_schema, root, compress, &mut |_: u32, _: &RttiFieldSchema| {})?;
                self.diagnose(
                    DiagnosticKind::SizeMismatch,
                    object_id,
                    rtti.type_id(),
                    Some(field_schema.id),
                    format!("`{}` layout changed, value skipped", field.name()),
                );
                continue;
            }
            self.read_field_value(object_id, rtti, field, part, Layout::Schema(field_schema, root))?;
        }

        let Some(base_schema) = schema.base_schema() else {
            return Ok(());
        };
        read_base_header(&mut self.reader, object_id, compress)?;
        let base_live = match live {
            Some((rtti, obj)) => match (rtti.base(), rtti.base_part_mut(obj)?) {
                (Some(base), Some(part)) if base.type_id() == base_schema.type_id => Some((base, part)),
                _ => None,
            },
            None => None,
        };
        self.read_parts_schema(object_id, base_live, base_schema, root)
    }

    // -- values -------------------------------------------------------------

    fn read_field_value(
        &mut self,
        object_id: u32,
        rtti: &'static RttiType,
        field: &RttiField,
        part: &mut dyn Reflectable,
        layout: Layout<'_>,
    ) -> Result<()> {
        let compress = self.compress();
        #[cfg(feature = "trace")]
        log::trace!(
            "[decoder] field {}.{} at bit {}",
            rtti.name(),
            field.name(),
            self.reader.tell()
        );

        match &field.access {
            FieldAccess::Plain(access) => {
                self.read_plain(object_id, rtti, field, &layout.plain(), |stream| {
                    access.decode(part, stream, &field.info, compress).map(drop)
                })?;
            }
            FieldAccess::PlainArray(access) => {
                let len = self.read_len()?;
                access.resize(part, len)?;
                for index in 0..len {
                    self.read_plain(object_id, rtti, field, &layout.plain(), |stream| {
                        access
                            .decode_elem(&mut *part, index, stream, &field.info, compress)
                            .map(drop)
                    })?;
                }
            }
            FieldAccess::DataBlock(access) => {
                let len = self.read_len()?;
                if len as u64 * 8 > self.reader.remaining() {
                    return Err(Error::UnexpectedEof {
                        cursor: self.reader.tell(),
                        requested: len as u64 * 8,
                        size: self.reader.length_bits(),
                    });
                }
                let mut data = vec![0u8; len];
                self.reader.read_bytes(&mut data)?;
                access.set(part, data)?;
            }
            FieldAccess::Reflectable(access) => {
                self.read_embedded(access.get_mut(part)?, layout)?;
            }
            FieldAccess::ReflectableArray(access) => {
                let len = self.read_len()?;
                access.resize(part, len)?;
                for index in 0..len {
                    self.read_embedded(access.elem_mut(&mut *part, index)?, layout)?;
                }
            }
            FieldAccess::ReflectablePtr(access) => {
                let id = read_u32_value(&mut self.reader, compress)?;
                let target = self.resolve_reference(id, field.is_weak())?;
                access.set(part, target)?;
            }
            FieldAccess::ReflectablePtrArray(access) => {
                let len = self.read_len()?;
                access.resize(part, len)?;
                for index in 0..len {
                    let id = read_u32_value(&mut self.reader, compress)?;
                    let target = self.resolve_reference(id, field.is_weak())?;
                    access.set(&mut *part, index, target)?;
                }
            }
        }
        Ok(())
    }

    /// Decode one plain value in place. Unknown versions are recorded and the
    /// field keeps its current value.
    fn read_plain<F>(
        &mut self,
        object_id: u32,
        rtti: &'static RttiType,
        field: &RttiField,
        layout: &PlainLayout,
        decode: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Bitstream<'r>) -> Result<()>,
    {
        let compress = self.compress();
        let start = self.reader.tell();
        let len = plain_value_len(&mut self.reader, layout, compress)?;
        let stream = self.reader.ensure(len.get_bits())?;
        match decode(stream) {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                log::error!(
                    "[decoder] {}.{}: {}; keeping default",
                    rtti.name(),
                    field.name(),
                    err
                );
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::UnknownVersion,
                    object_id,
                    type_id: rtti.type_id(),
                    field_id: Some(field.id()),
                    message: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
        self.reader.seek(start + len.get_bits());
        Ok(())
    }

    /// Element count, rejected when the stream cannot possibly hold it.
    fn read_len(&mut self) -> Result<usize> {
        let compress = self.compress();
        let offset = self.reader.tell();
        let len = read_u32_value(&mut self.reader, compress)?;
        if u64::from(len) > self.reader.remaining() {
            return Err(Error::corrupt(offset, format!("count {len} exceeds the remaining stream")));
        }
        Ok(len as usize)
    }

    fn resolve_reference(&mut self, id: u32, weak: bool) -> Result<Option<ObjectRef>> {
        if id == NULL_OBJECT_ID {
            return Ok(None);
        }
        if weak {
            return self.allocate(id).map(Some);
        }
        self.decode_object(id).map(Some)
    }

    // -- plumbing -----------------------------------------------------------

    fn run_hook(&mut self, rtti: &RttiType, kind: HookKind, obj: &mut dyn Reflectable) -> Result<()> {
        let mut ctx = SerializationContext::new(self.flags, self.context.as_deref_mut());
        rtti.run_hook(kind, obj, &mut ctx)
    }

    fn report_progress(&mut self, offset: u64) -> Result<()> {
        let Some(progress) = self.progress.as_deref_mut() else {
            return Ok(());
        };
        if let Some(last) = self.last_progress {
            if offset.abs_diff(last) < self.progress_interval {
                return Ok(());
            }
        }
        self.last_progress = Some(offset);
        let total = self.reader.length_bits().max(1);
        if !progress(offset as f32 / total as f32) {
            log::info!("[decoder] cancelled by progress callback at bit {}", offset);
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn diagnose(
        &mut self,
        kind: DiagnosticKind,
        object_id: u32,
        type_id: u32,
        field_id: Option<u16>,
        message: String,
    ) {
        log::warn!("[decoder] object {}: {}", object_id, message);
        self.diagnostics.push(Diagnostic {
            kind,
            object_id,
            type_id,
            field_id,
            message,
        });
    }
}

/// Part of `obj` that belongs to `type_id` in its inheritance chain.
pub(crate) fn locate_part<'a>(
    rtti: &'static RttiType,
    obj: &'a mut dyn Reflectable,
    type_id: u32,
) -> Result<Option<(&'static RttiType, &'a mut dyn Reflectable)>> {
    if rtti.type_id() == type_id {
        return Ok(Some((rtti, obj)));
    }
    match (rtti.base(), rtti.base_part_mut(obj)?) {
        (Some(base), Some(part)) => locate_part(base, part, type_id),
        _ => Ok(None),
    }
}
