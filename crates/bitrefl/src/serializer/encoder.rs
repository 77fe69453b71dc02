// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object graph encoder.
//!
//! Objects are written breadth-first from the root. Each pointer target gets
//! the next free id the first time it is seen and is queued; later references
//! reuse that id. Embedded values are written inline as id-0 entries.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::bitstream::BufferedBitstreamWriter;
use crate::config::{SerializerConfig, DATA_BLOCK_CHUNK, MAX_OBJECT_ID, NULL_OBJECT_ID};
use crate::error::{Error, Result};
use crate::io::DataStream;
use crate::rtti::field::{FieldAccess, RttiField};
use crate::rtti::plain::write_count;
use crate::rtti::reflectable::{ObjectRef, Reflectable};
use crate::rtti::registry::registry;
use crate::rtti::rtti_type::{HookKind, RttiType, SerializationContext};
use crate::serializer::flags::SerializerFlags;
use crate::serializer::metadata::{object_word, write_terminator, write_word, FieldMeta};

/// What an encode produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Top-level objects written (root included).
    pub objects: u32,
    /// Bytes handed to the output stream.
    pub bytes: u64,
    /// Largest working-buffer capacity seen, in bits.
    pub peak_buffer_bits: u64,
}

pub(crate) struct Encoder<'w, 'c> {
    writer: BufferedBitstreamWriter<'w>,
    flags: SerializerFlags,
    context: Option<&'c mut dyn Any>,
    ids: HashMap<usize, u32>,
    queue: VecDeque<(u32, ObjectRef)>,
    /// Holds every written object until the encode returns, so addresses
    /// used as identities cannot be recycled mid-encode.
    written: Vec<ObjectRef>,
    next_id: u32,
}

impl<'w, 'c> Encoder<'w, 'c> {
    pub(crate) fn new(
        sink: &'w mut dyn DataStream,
        config: &SerializerConfig,
        flags: SerializerFlags,
        context: Option<&'c mut dyn Any>,
    ) -> Self {
        Self {
            writer: BufferedBitstreamWriter::new(sink, config),
            flags,
            context,
            ids: HashMap::new(),
            queue: VecDeque::new(),
            written: Vec::new(),
            next_id: 1,
        }
    }

    pub(crate) fn encode(self, root: &ObjectRef) -> Result<EncodeStats> {
        self.encode_collect(root).map(|(stats, _)| stats)
    }

    /// Encode, also handing back every written object keyed by its stream id.
    pub(crate) fn encode_collect(mut self, root: &ObjectRef) -> Result<(EncodeStats, BTreeMap<u32, ObjectRef>)> {
        log::debug!(
            "[encoder] encoding {} (flags {:#04x})",
            root.rtti().name(),
            self.flags.0
        );
        self.assign_id(root.clone())?;

        while let Some((id, object)) = self.queue.pop_front() {
            self.encode_object(id, &object)?;
            self.written.push(object);
            self.writer.flush(false)?;
        }
        self.writer.flush(true)?;

        let stats = EncodeStats {
            objects: self.written.len() as u32,
            bytes: self.writer.flushed_bytes(),
            peak_buffer_bits: self.writer.peak_capacity(),
        };
        log::debug!(
            "[encoder] wrote {} objects, {} bytes",
            stats.objects,
            stats.bytes
        );
        let ids = self.ids;
        let objects = self
            .written
            .into_iter()
            .filter_map(|object| ids.get(&object.addr()).map(|&id| (id, object)))
            .collect();
        Ok((stats, objects))
    }

    fn assign_id(&mut self, object: ObjectRef) -> Result<u32> {
        if let Some(&id) = self.ids.get(&object.addr()) {
            return Ok(id);
        }
        if self.next_id > MAX_OBJECT_ID {
            return Err(Error::TooManyObjects { max: MAX_OBJECT_ID });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(object.addr(), id);
        self.queue.push_back((id, object));
        Ok(id)
    }

    /// Id written for a pointer field value.
    fn reference(&mut self, target: Option<ObjectRef>, field: &RttiField) -> Result<u32> {
        let Some(target) = target else {
            return Ok(NULL_OBJECT_ID);
        };
        if self.flags.is_shallow() {
            return Ok(NULL_OBJECT_ID);
        }
        // Without metadata the reader instantiates the declared type.
        if !self.flags.has_meta() {
            if let Some(declared) = field.reflectable_type() {
                if declared.type_id() != target.type_id() {
                    return Err(Error::TypeMismatch {
                        expected: declared.name(),
                    });
                }
            }
        }
        self.assign_id(target)
    }

    fn run_hook(&mut self, rtti: &RttiType, kind: HookKind, obj: &mut dyn Reflectable) -> Result<()> {
        let mut ctx = SerializationContext::new(self.flags, self.context.as_deref_mut());
        rtti.run_hook(kind, obj, &mut ctx)
    }

    fn encode_object(&mut self, id: u32, object: &ObjectRef) -> Result<()> {
        let rtti = object.rtti();
        registry().ensure_registered(rtti)?;

        let mut guard = object
            .try_borrow_mut()
            .map_err(|_| Error::ObjectBorrowed { object_id: id })?;
        let obj: &mut dyn Reflectable = &mut *guard;

        log::trace!("[encoder] object {} ({}) at bit {}", id, rtti.name(), self.writer.tell());
        self.run_hook(rtti, HookKind::SerializationStarted, obj)?;
        self.write_entry(id, rtti, obj)?;
        self.run_hook(rtti, HookKind::SerializationEnded, obj)
    }

    fn write_entry(&mut self, id: u32, rtti: &RttiType, obj: &mut dyn Reflectable) -> Result<()> {
        self.write_object_header(id, false, rtti)?;
        self.write_parts(id, rtti, obj)?;
        if self.flags.has_meta() {
            write_terminator(self.writer.stream(), self.flags.is_compressed())?;
        }
        Ok(())
    }

    fn write_object_header(&mut self, id: u32, is_base: bool, rtti: &RttiType) -> Result<()> {
        let compress = self.flags.is_compressed();
        let stream = self.writer.stream();
        write_word(stream, object_word(id, is_base), compress)?;
        if self.flags.has_meta() {
            write_word(stream, rtti.type_id(), compress)?;
        }
        Ok(())
    }

    /// Fields of `rtti`, then each base part under its own header.
    fn write_parts(&mut self, id: u32, rtti: &RttiType, obj: &mut dyn Reflectable) -> Result<()> {
        for field in rtti.fields() {
            self.write_field(field, obj)?;
        }
        if let (Some(base), Some(part)) = (rtti.base(), rtti.base_part_mut(obj)?) {
            self.write_object_header(id, true, base)?;
            self.write_parts(id, base, part)?;
        }
        Ok(())
    }

    fn write_embedded(&mut self, part: &mut dyn Reflectable) -> Result<()> {
        let rtti = part.rtti();
        self.run_hook(rtti, HookKind::SerializationStarted, part)?;
        self.write_entry(NULL_OBJECT_ID, rtti, part)?;
        self.run_hook(rtti, HookKind::SerializationEnded, part)
    }

    fn write_field(&mut self, field: &RttiField, obj: &mut dyn Reflectable) -> Result<()> {
        let compress = self.flags.is_compressed();
        if self.flags.has_meta() {
            write_word(self.writer.stream(), FieldMeta::for_field(field).encode(), compress)?;
        }
        #[cfg(feature = "trace")]
        log::trace!(
            "[encoder] field {} (id {}) at bit {}",
            field.name(),
            field.id(),
            self.writer.tell()
        );

        match &field.access {
            FieldAccess::Plain(access) => {
                access.encode(&*obj, self.writer.stream(), &field.info, compress)?;
            }
            FieldAccess::PlainArray(access) => {
                let len = access.len(&*obj)?;
                write_count(self.writer.stream(), len, compress)?;
                for index in 0..len {
                    access.encode_elem(&*obj, index, self.writer.stream(), &field.info, compress)?;
                }
            }
            FieldAccess::DataBlock(access) => {
                let data = access.get(&*obj)?;
                write_count(self.writer.stream(), data.len(), compress)?;
                for chunk in data.chunks(DATA_BLOCK_CHUNK) {
                    self.writer.stream().write_bytes(chunk)?;
                    self.writer.flush(false)?;
                }
            }
            FieldAccess::Reflectable(access) => {
                self.write_embedded(access.get_mut(obj)?)?;
            }
            FieldAccess::ReflectableArray(access) => {
                let len = access.len(&*obj)?;
                write_count(self.writer.stream(), len, compress)?;
                for index in 0..len {
                    self.write_embedded(access.elem_mut(obj, index)?)?;
                }
            }
            FieldAccess::ReflectablePtr(access) => {
                let target = access.get(&*obj)?;
                let id = self.reference(target, field)?;
                write_word(self.writer.stream(), id, compress)?;
            }
            FieldAccess::ReflectablePtrArray(access) => {
                let len = access.len(&*obj)?;
                write_count(self.writer.stream(), len, compress)?;
                for index in 0..len {
                    let target = access.get(&*obj, index)?;
                    let id = self.reference(target, field)?;
                    write_word(self.writer.stream(), id, compress)?;
                }
            }
        }
        Ok(())
    }
}
