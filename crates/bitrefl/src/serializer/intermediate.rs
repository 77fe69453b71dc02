// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type-free view of an encoded stream.
//!
//! [`decode_intermediate`] reads a metadata stream into a tree of ids and raw
//! payloads without touching the type registry. Useful for inspecting data
//! whose types are not linked into the current binary, and for tooling.

use std::collections::BTreeMap;

use crate::bitstream::{Bitstream, BufferedBitstreamReader};
use crate::config::{SerializerConfig, NULL_OBJECT_ID};
use crate::error::{Error, Result};
use crate::io::MemoryDataStream;
use crate::rtti::field::{FieldInfo, FieldKind};
use crate::rtti::plain::PlainType;
use crate::serializer::flags::SerializerFlags;
use crate::serializer::metadata::{
    peek_entry, read_field_meta, read_object_header, read_terminator, read_u32_value, skip_plain,
    EntryKind, FieldMeta, PlainLayout,
};

/// Every top-level object of a stream, keyed by object id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializedGraph {
    pub root: u32,
    pub objects: BTreeMap<u32, SerializedObject>,
    /// Whether plain payloads use the compressed encoding.
    pub compressed: bool,
}

impl SerializedGraph {
    pub fn root(&self) -> Option<&SerializedObject> {
        self.objects.get(&self.root)
    }

    pub fn get(&self, object_id: u32) -> Option<&SerializedObject> {
        self.objects.get(&object_id)
    }
}

/// One object (or embedded value, with id 0). Base parts nest under `base`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializedObject {
    pub object_id: u32,
    pub type_id: u32,
    pub fields: Vec<SerializedField>,
    pub base: Option<Box<SerializedObject>>,
}

impl SerializedObject {
    pub fn field(&self, id: u16) -> Option<&SerializedField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// This part or the base part with the given type id.
    pub fn part(&self, type_id: u32) -> Option<&SerializedObject> {
        let mut current = Some(self);
        while let Some(part) = current {
            if part.type_id == type_id {
                return Some(part);
            }
            current = part.base.as_deref();
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerializedField {
    pub id: u16,
    pub kind: FieldKind,
    pub value: SerializedValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SerializedValue {
    Plain(SerializedPlain),
    PlainArray(Vec<SerializedPlain>),
    DataBlock(Vec<u8>),
    Embedded(Box<SerializedObject>),
    EmbeddedArray(Vec<SerializedObject>),
    /// Object id; 0 is null.
    Reference(u32),
    ReferenceArray(Vec<u32>),
}

impl SerializedValue {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::PlainArray(_) | Self::EmbeddedArray(_) | Self::ReferenceArray(_))
    }
}

/// Raw bits of one plain value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPlain {
    /// Builtin type id, when the field header named one.
    pub builtin: Option<u32>,
    pub bits: u64,
    pub data: Vec<u8>,
}

impl SerializedPlain {
    /// Interpret the payload as `V`, using the flags the stream was written with.
    pub fn decode<V: PlainType>(&self, compress: bool) -> Result<V> {
        let mut stream = Bitstream::from_vec(self.data.clone());
        let mut value = V::default();
        value.from_stream(&mut stream, &FieldInfo::default(), compress)?;
        Ok(value)
    }
}

/// Read an encoded byte buffer without instantiating any type.
///
/// Streams written with [`SerializerFlags::NO_META`] carry nothing to build
/// the tree from and fail with [`Error::MissingSchema`].
pub fn decode_intermediate(bytes: &[u8], flags: SerializerFlags) -> Result<SerializedGraph> {
    let mut source = MemoryDataStream::from_vec(bytes.to_vec());
    let reader = BufferedBitstreamReader::new(&mut source, bytes.len() as u64, &SerializerConfig::default());
    read_graph(reader, flags)
}

pub(crate) fn read_graph(reader: BufferedBitstreamReader<'_>, flags: SerializerFlags) -> Result<SerializedGraph> {
    if !flags.has_meta() {
        return Err(Error::MissingSchema);
    }
    let mut walker = Walker {
        reader,
        compress: flags.is_compressed(),
    };
    let mut graph = SerializedGraph {
        compressed: walker.compress,
        ..Default::default()
    };
    while walker.reader.remaining() >= 8 {
        let offset = walker.reader.tell();
        let (object, type_id) = read_object_header(&mut walker.reader, walker.compress, true)?;
        if object.is_base || object.id == NULL_OBJECT_ID {
            return Err(Error::corrupt(offset, "expected a top-level object entry"));
        }
        let entry = walker.read_body(object.id, type_id.unwrap_or_default())?;
        if graph.objects.is_empty() {
            graph.root = object.id;
        }
        graph.objects.insert(object.id, entry);
    }
    log::debug!("[intermediate] read {} objects", graph.objects.len());
    Ok(graph)
}

struct Walker<'r> {
    reader: BufferedBitstreamReader<'r>,
    compress: bool,
}

impl Walker<'_> {
    fn read_body(&mut self, object_id: u32, type_id: u32) -> Result<SerializedObject> {
        let mut parts = vec![SerializedObject {
            object_id,
            type_id,
            ..Default::default()
        }];
        loop {
            match peek_entry(&mut self.reader)? {
                None => return Err(Error::MissingTerminator { object_id }),
                Some(EntryKind::Terminator) => {
                    read_terminator(&mut self.reader, self.compress)?;
                    break;
                }
                Some(EntryKind::Object) => {
                    let (object, type_id) = read_object_header(&mut self.reader, self.compress, true)?;
                    if !object.is_base || object.id != object_id {
                        return Err(Error::MissingTerminator { object_id });
                    }
                    parts.push(SerializedObject {
                        object_id,
                        type_id: type_id.unwrap_or_default(),
                        ..Default::default()
                    });
                }
                Some(EntryKind::Field) => {
                    let meta = read_field_meta(&mut self.reader, self.compress)?;
                    let value = self.read_value(&meta)?;
                    if let Some(part) = parts.last_mut() {
                        part.fields.push(SerializedField {
                            id: meta.id,
                            kind: meta.kind,
                            value,
                        });
                    }
                }
            }
        }

        let mut nested: Option<SerializedObject> = None;
        while let Some(mut part) = parts.pop() {
            part.base = nested.take().map(Box::new);
            nested = Some(part);
        }
        nested.ok_or(Error::MissingTerminator { object_id })
    }

    fn read_value(&mut self, meta: &FieldMeta) -> Result<SerializedValue> {
        let value = match (meta.kind, meta.is_array) {
            (FieldKind::Plain, false) => SerializedValue::Plain(self.read_plain(&meta.plain)?),
            (FieldKind::Plain, true) => {
                let len = self.read_len()?;
                let items = (0..len)
                    .map(|_| self.read_plain(&meta.plain))
                    .collect::<Result<_>>()?;
                SerializedValue::PlainArray(items)
            }
            (FieldKind::DataBlock, _) => {
                let len = self.read_len()?;
                let mut data = vec![0u8; len as usize];
                self.reader.read_bytes(&mut data)?;
                SerializedValue::DataBlock(data)
            }
            (FieldKind::Reflectable, false) => SerializedValue::Embedded(Box::new(self.read_embedded()?)),
            (FieldKind::Reflectable, true) => {
                let len = self.read_len()?;
                let items = (0..len).map(|_| self.read_embedded()).collect::<Result<_>>()?;
                SerializedValue::EmbeddedArray(items)
            }
            (FieldKind::ReflectablePtr, false) => {
                SerializedValue::Reference(read_u32_value(&mut self.reader, self.compress)?)
            }
            (FieldKind::ReflectablePtr, true) => {
                let len = self.read_len()?;
                let ids = (0..len)
                    .map(|_| read_u32_value(&mut self.reader, self.compress))
                    .collect::<Result<_>>()?;
                SerializedValue::ReferenceArray(ids)
            }
        };
        Ok(value)
    }

    fn read_embedded(&mut self) -> Result<SerializedObject> {
        let offset = self.reader.tell();
        let (object, type_id) = read_object_header(&mut self.reader, self.compress, true)?;
        if object.id != NULL_OBJECT_ID || object.is_base {
            return Err(Error::corrupt(offset, "expected an embedded object entry"));
        }
        self.read_body(NULL_OBJECT_ID, type_id.unwrap_or_default())
    }

    fn read_plain(&mut self, layout: &PlainLayout) -> Result<SerializedPlain> {
        let start = self.reader.tell();
        skip_plain(&mut self.reader, layout, self.compress)?;
        let bits = self.reader.tell() - start;
        self.reader.seek(start);
        let mut data = vec![0u8; bits.div_ceil(8) as usize];
        self.reader.ensure(bits)?.read_bits(&mut data, bits)?;
        Ok(SerializedPlain {
            builtin: layout.builtin,
            bits,
            data,
        })
    }

    fn read_len(&mut self) -> Result<u32> {
        let offset = self.reader.tell();
        let len = read_u32_value(&mut self.reader, self.compress)?;
        if u64::from(len) > self.reader.remaining() {
            return Err(Error::corrupt(offset, format!("count {len} exceeds the remaining stream")));
        }
        Ok(len)
    }
}
