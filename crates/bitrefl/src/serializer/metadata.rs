// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object and field metadata words, and the skip logic built on them.
//!
//! ```text
//! object word : id << 2 | is_base << 1 | 1              (+ type id unless NO_META)
//! field word  : id << 16 | size_or_builtin << 8 | dyn << 5 | builtin << 4
//!               | category << 2 | array << 1
//! terminator  : 0x40
//! ```
//!
//! Words are u32 raw, or varints under COMPRESS. Varints keep bits 0-6 in
//! their first byte, so peeking one byte classifies the next entry in both
//! modes.

use crate::bitstream::varint::MAX_VARINT_LEN_32;
use crate::bitstream::{BitLength, Bitstream, BufferedBitstreamReader};
use crate::config::{
    META_FIELD_ARRAY, META_FIELD_BUILTIN, META_FIELD_CATEGORY_MASK, META_FIELD_CATEGORY_SHIFT,
    META_FIELD_DYNAMIC, META_FIELD_ID_SHIFT, META_FIELD_SIZE_SHIFT, META_OBJECT_BASE,
    META_OBJECT_ID_SHIFT, META_OBJECT_TAG, META_TERMINATOR,
};
use crate::error::{Error, Result};
use crate::rtti::field::{FieldKind, RttiField};
use crate::rtti::plain::{builtin_max_bits, is_builtin, peek_size_header, skip_builtin};
use crate::rtti::schema::{RttiFieldSchema, RttiSchema};

/// Longest metadata word on the wire, in bits.
pub(crate) const MAX_WORD_BITS: u64 = (MAX_VARINT_LEN_32 * 8) as u64;

/// Longest size header on the wire, in bits.
const MAX_SIZE_HEADER_BITS: u64 = 80;

pub(crate) const fn object_word(id: u32, is_base: bool) -> u32 {
    (id << META_OBJECT_ID_SHIFT) | ((is_base as u32) << 1) | META_OBJECT_TAG
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ObjectMeta {
    pub id: u32,
    pub is_base: bool,
}

impl ObjectMeta {
    pub(crate) fn decode(word: u32, offset: u64) -> Result<Self> {
        if word & META_OBJECT_TAG == 0 {
            return Err(Error::corrupt(offset, format!("{word:#x} is not an object word")));
        }
        Ok(Self {
            id: word >> META_OBJECT_ID_SHIFT,
            is_base: word & META_OBJECT_BASE != 0,
        })
    }
}

/// Plain value layout: what a reader needs to skip one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlainLayout {
    /// Builtin type id, when the value is a builtin scalar.
    pub builtin: Option<u32>,
    pub dynamic: bool,
    /// Static byte size (non-builtin, non-dynamic values).
    pub size: u32,
}

impl PlainLayout {
    pub(crate) fn new(type_id: u32, dynamic: bool, size: u32) -> Self {
        let builtin = is_builtin(type_id).then_some(type_id);
        Self {
            builtin,
            dynamic,
            size: if builtin.is_some() || dynamic { 0 } else { size },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldMeta {
    pub id: u16,
    pub kind: FieldKind,
    pub is_array: bool,
    pub plain: PlainLayout,
}

impl FieldMeta {
    pub(crate) fn for_field(field: &RttiField) -> Self {
        Self {
            id: field.id(),
            kind: field.kind(),
            is_array: field.is_array(),
            plain: PlainLayout::new(
                field.plain_type_id(),
                field.has_dynamic_size(),
                field.static_size(),
            ),
        }
    }

    pub(crate) fn for_schema(schema: &RttiFieldSchema) -> Self {
        let plain = match schema.kind {
            FieldKind::Plain => PlainLayout::new(schema.type_id, schema.has_dynamic_size, schema.size),
            _ => PlainLayout::new(0, schema.has_dynamic_size, 0),
        };
        Self {
            id: schema.id,
            kind: schema.kind,
            is_array: schema.is_array,
            plain,
        }
    }

    pub(crate) fn encode(&self) -> u32 {
        let mut word = u32::from(self.id) << META_FIELD_ID_SHIFT;
        word |= (self.kind.bits() & META_FIELD_CATEGORY_MASK) << META_FIELD_CATEGORY_SHIFT;
        if self.is_array {
            word |= META_FIELD_ARRAY;
        }
        if self.kind == FieldKind::Plain {
            if let Some(builtin) = self.plain.builtin {
                word |= META_FIELD_BUILTIN | (builtin << META_FIELD_SIZE_SHIFT);
            } else if self.plain.dynamic {
                word |= META_FIELD_DYNAMIC;
            } else {
                word |= (self.plain.size & 0xFF) << META_FIELD_SIZE_SHIFT;
            }
        } else if self.plain.dynamic {
            word |= META_FIELD_DYNAMIC;
        }
        word
    }

    pub(crate) fn decode(word: u32, offset: u64) -> Result<Self> {
        if word & (META_OBJECT_TAG | META_TERMINATOR) != 0 {
            return Err(Error::corrupt(offset, format!("{word:#x} is not a field word")));
        }
        let category = (word >> META_FIELD_CATEGORY_SHIFT) & META_FIELD_CATEGORY_MASK;
        let kind = FieldKind::from_bits(category)
            .ok_or_else(|| Error::corrupt(offset, format!("bad field category {category}")))?;
        let size_or_id = (word >> META_FIELD_SIZE_SHIFT) & 0xFF;
        let builtin = word & META_FIELD_BUILTIN != 0;
        let dynamic = word & META_FIELD_DYNAMIC != 0;
        if builtin && !is_builtin(size_or_id) {
            return Err(Error::corrupt(offset, format!("bad builtin id {size_or_id}")));
        }
        Ok(Self {
            id: (word >> META_FIELD_ID_SHIFT) as u16,
            kind,
            is_array: word & META_FIELD_ARRAY != 0,
            plain: PlainLayout {
                builtin: builtin.then_some(size_or_id),
                dynamic,
                size: if builtin || dynamic { 0 } else { size_or_id },
            },
        })
    }

    /// Short description for error messages.
    pub(crate) fn describe(&self) -> String {
        if self.is_array {
            format!("{} array", self.kind)
        } else {
            self.kind.to_string()
        }
    }
}

/// Kind of the next entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Object,
    Field,
    Terminator,
}

pub(crate) fn classify(low_byte: u8) -> EntryKind {
    let byte = u32::from(low_byte);
    if byte & META_OBJECT_TAG != 0 {
        EntryKind::Object
    } else if byte & META_TERMINATOR != 0 {
        EntryKind::Terminator
    } else {
        EntryKind::Field
    }
}

// =======================================================================
// Writing
// =======================================================================

pub(crate) fn write_word(stream: &mut Bitstream<'_>, word: u32, compress: bool) -> Result<()> {
    if compress {
        stream.write_varint(word)
    } else {
        stream.write(&word)
    }
}

pub(crate) fn write_terminator(stream: &mut Bitstream<'_>, compress: bool) -> Result<()> {
    if compress {
        stream.write(&(META_TERMINATOR as u8))
    } else {
        stream.write(&META_TERMINATOR)
    }
}

// =======================================================================
// Reading
// =======================================================================

pub(crate) fn read_word(reader: &mut BufferedBitstreamReader<'_>, compress: bool) -> Result<u32> {
    if compress {
        reader.ensure(MAX_WORD_BITS)?.read_varint()
    } else {
        reader.read_u32()
    }
}

/// Peek the next entry kind; `None` at the end of the stream.
pub(crate) fn peek_entry(reader: &mut BufferedBitstreamReader<'_>) -> Result<Option<EntryKind>> {
    if reader.remaining() < 8 {
        return Ok(None);
    }
    let byte = reader.peek_bits_u64(8)? as u8;
    Ok(Some(classify(byte)))
}

pub(crate) fn read_terminator(reader: &mut BufferedBitstreamReader<'_>, compress: bool) -> Result<()> {
    let offset = reader.tell();
    let word = if compress {
        reader.read_bits_u64(8)? as u32
    } else {
        reader.read_u32()?
    };
    if word != META_TERMINATOR {
        return Err(Error::corrupt(offset, format!("expected terminator, found {word:#x}")));
    }
    Ok(())
}

/// Object word and (when `meta`) the type id that follows it.
pub(crate) fn read_object_header(
    reader: &mut BufferedBitstreamReader<'_>,
    compress: bool,
    meta: bool,
) -> Result<(ObjectMeta, Option<u32>)> {
    let offset = reader.tell();
    let object = ObjectMeta::decode(read_word(reader, compress)?, offset)?;
    let type_id = if meta {
        Some(read_word(reader, compress)?)
    } else {
        None
    };
    Ok((object, type_id))
}

pub(crate) fn read_field_meta(reader: &mut BufferedBitstreamReader<'_>, compress: bool) -> Result<FieldMeta> {
    let offset = reader.tell();
    FieldMeta::decode(read_word(reader, compress)?, offset)
}

/// Element count, data block length or object id.
pub(crate) fn read_u32_value(reader: &mut BufferedBitstreamReader<'_>, compress: bool) -> Result<u32> {
    read_word(reader, compress)
}

pub(crate) fn skip_bits(reader: &mut BufferedBitstreamReader<'_>, bits: u64) -> Result<()> {
    if bits > reader.remaining() {
        return Err(Error::UnexpectedEof {
            cursor: reader.tell(),
            requested: bits,
            size: reader.length_bits(),
        });
    }
    reader.skip(bits as i64);
    Ok(())
}

/// Preload a whole plain value and return its encoded length.
pub(crate) fn plain_value_len(
    reader: &mut BufferedBitstreamReader<'_>,
    layout: &PlainLayout,
    compress: bool,
) -> Result<BitLength> {
    if let Some(builtin) = layout.builtin {
        let stream = reader.ensure(builtin_max_bits(builtin))?;
        let start = stream.tell();
        let len = skip_builtin(stream, builtin, compress)?;
        stream.seek(start);
        return Ok(len);
    }
    if layout.dynamic {
        let total = peek_size_header(reader.ensure(MAX_SIZE_HEADER_BITS)?, compress)?;
        reader.ensure(total.get_bits())?;
        return Ok(total);
    }
    let len = BitLength::from_bytes(layout.size);
    reader.ensure(len.get_bits())?;
    Ok(len)
}

pub(crate) fn skip_plain(
    reader: &mut BufferedBitstreamReader<'_>,
    layout: &PlainLayout,
    compress: bool,
) -> Result<()> {
    if layout.dynamic {
        let total = peek_size_header(reader.ensure(MAX_SIZE_HEADER_BITS)?, compress)?;
        return skip_bits(reader, total.get_bits());
    }
    let len = plain_value_len(reader, layout, compress)?;
    skip_bits(reader, len.get_bits())
}

/// Skip one field value described by stream metadata.
pub(crate) fn skip_value_meta(
    reader: &mut BufferedBitstreamReader<'_>,
    meta: &FieldMeta,
    compress: bool,
) -> Result<()> {
    let count = if meta.is_array {
        read_u32_value(reader, compress)?
    } else {
        1
    };
    match meta.kind {
        FieldKind::Plain => {
            for _ in 0..count {
                skip_plain(reader, &meta.plain, compress)?;
            }
        }
        FieldKind::DataBlock => {
            let len = read_u32_value(reader, compress)?;
            skip_bits(reader, u64::from(len) * 8)?;
        }
        FieldKind::Reflectable => {
            for _ in 0..count {
                let (object, _) = read_object_header(reader, compress, true)?;
                skip_entry_meta(reader, object.id, compress)?;
            }
        }
        FieldKind::ReflectablePtr => {
            for _ in 0..count {
                read_u32_value(reader, compress)?;
            }
        }
    }
    Ok(())
}

/// Skip the body of a metadata-mode entry (after its header), terminator included.
pub(crate) fn skip_entry_meta(
    reader: &mut BufferedBitstreamReader<'_>,
    object_id: u32,
    compress: bool,
) -> Result<()> {
    loop {
        match peek_entry(reader)? {
            None => return Err(Error::MissingTerminator { object_id }),
            Some(EntryKind::Terminator) => return read_terminator(reader, compress),
            Some(EntryKind::Field) => {
                let meta = read_field_meta(reader, compress)?;
                skip_value_meta(reader, &meta, compress)?;
            }
            Some(EntryKind::Object) => {
                let (object, _) = read_object_header(reader, compress, true)?;
                if !object.is_base {
                    return Err(Error::MissingTerminator { object_id });
                }
            }
        }
    }
}

/// Skip one field value described by a schema (NO_META streams).
pub(crate) fn skip_value_schema(
    reader: &mut BufferedBitstreamReader<'_>,
    field: &RttiFieldSchema,
    root: &RttiSchema,
    compress: bool,
    found_ref: &mut dyn FnMut(u32, &RttiFieldSchema),
) -> Result<()> {
    let count = if field.is_array {
        read_u32_value(reader, compress)?
    } else {
        1
    };
    match field.kind {
        FieldKind::Plain => {
            let layout = FieldMeta::for_schema(field).plain;
            for _ in 0..count {
                skip_plain(reader, &layout, compress)?;
            }
        }
        FieldKind::DataBlock => {
            let len = read_u32_value(reader, compress)?;
            skip_bits(reader, u64::from(len) * 8)?;
        }
        FieldKind::Reflectable => {
            let schema = root
                .find(field.type_id)
                .ok_or(Error::UnknownType { type_id: field.type_id })?;
            for _ in 0..count {
                let (object, _) = read_object_header(reader, compress, false)?;
                skip_entry_schema(reader, schema, object.id, root, compress, found_ref)?;
            }
        }
        FieldKind::ReflectablePtr => {
            for _ in 0..count {
                let id = read_u32_value(reader, compress)?;
                if id != 0 {
                    found_ref(id, field);
                }
            }
        }
    }
    Ok(())
}

/// Skip the body of a NO_META entry (after its header) using `schema`.
pub(crate) fn skip_entry_schema(
    reader: &mut BufferedBitstreamReader<'_>,
    schema: &RttiSchema,
    object_id: u32,
    root: &RttiSchema,
    compress: bool,
    found_ref: &mut dyn FnMut(u32, &RttiFieldSchema),
) -> Result<()> {
    let mut part = Some(schema);
    while let Some(current) = part {
        for field in &current.field_schemas {
            skip_value_schema(reader, field, root, compress, found_ref)?;
        }
        part = current.base_schema();
        if part.is_some() {
            read_base_header(reader, object_id, compress)?;
        }
    }
    Ok(())
}

/// Object word announcing a base part in a NO_META stream.
pub(crate) fn read_base_header(
    reader: &mut BufferedBitstreamReader<'_>,
    object_id: u32,
    compress: bool,
) -> Result<()> {
    let offset = reader.tell();
    let (object, _) = read_object_header(reader, compress, false)?;
    if !object.is_base || object.id != object_id {
        return Err(Error::corrupt(
            offset,
            format!(
                "expected base part of object {object_id}, found object {} (base: {})",
                object.id, object.is_base
            ),
        ));
    }
    Ok(())
}
