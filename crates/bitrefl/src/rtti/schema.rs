// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistable type layout.
//!
//! A schema records what a metadata-free stream cannot: every field's id,
//! category, shape, size and type. Schemas are reflectable themselves, so one
//! can be written next to (or ahead of) the data it describes.
//!
//! Reachable types are kept in a flat `dependencies` list rather than nested,
//! which keeps self-referencing types finite.

use std::sync::{Arc, OnceLock};

use crate::bitstream::{BitLength, Bitstream};
use crate::config::{TID_RTTI_FIELD_SCHEMA, TID_RTTI_SCHEMA};
use crate::error::{Error, Result};
use crate::rtti::field::{FieldFlags, FieldInfo, FieldKind};
use crate::rtti::plain::{type_ids, PlainType};
use crate::rtti::reflectable::RttiStatic;
use crate::rtti::rtti_type::{RttiType, RttiTypeBuilder};

/// Layout of one field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RttiFieldSchema {
    pub id: u16,
    pub kind: FieldKind,
    pub is_array: bool,
    pub has_dynamic_size: bool,
    /// Static byte size of plain values (0 when dynamic).
    pub size: u32,
    /// Plain type id, or RTTI type id of reflectable and pointer fields.
    pub type_id: u32,
    pub flags: FieldFlags,
}

impl RttiFieldSchema {
    pub fn is_weak(&self) -> bool {
        self.flags.contains(FieldFlags::WEAK_REF)
    }
}

/// Layout of a type, its base chain and the types it reaches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RttiSchema {
    pub type_id: u32,
    pub base: Option<Arc<RttiSchema>>,
    pub field_schemas: Vec<RttiFieldSchema>,
    pub dependencies: Vec<RttiSchema>,
}

impl RttiSchema {
    pub fn field(&self, id: u16) -> Option<&RttiFieldSchema> {
        self.field_schemas.iter().find(|f| f.id == id)
    }

    pub fn base_schema(&self) -> Option<&RttiSchema> {
        self.base.as_deref()
    }

    /// Schema of `type_id`: this type, one of its bases, or a dependency.
    pub fn find(&self, type_id: u32) -> Option<&RttiSchema> {
        fn in_chain(schema: &RttiSchema, type_id: u32) -> Option<&RttiSchema> {
            let mut current = Some(schema);
            while let Some(s) = current {
                if s.type_id == type_id {
                    return Some(s);
                }
                current = s.base_schema();
            }
            None
        }

        in_chain(self, type_id).or_else(|| {
            self.dependencies
                .iter()
                .find_map(|dep| in_chain(dep, type_id))
        })
    }
}

macro_rules! impl_byte_plain {
    ($ty:ty, $id:expr, |$v:ident| $to:expr, |$b:ident| $from:expr) => {
        impl PlainType for $ty {
            const TYPE_ID: u32 = $id;
            const HAS_DYNAMIC_SIZE: bool = false;
            const STATIC_SIZE: u32 = 1;

            fn to_stream(&self, stream: &mut Bitstream<'_>, _info: &FieldInfo, _compress: bool) -> Result<BitLength> {
                let $v = *self;
                stream.write::<u8>(&$to)?;
                Ok(BitLength::from_bytes(1))
            }

            fn from_stream(&mut self, stream: &mut Bitstream<'_>, _info: &FieldInfo, _compress: bool) -> Result<BitLength> {
                let offset = stream.tell();
                let $b = stream.read::<u8>()?;
                *self = $from.ok_or_else(|| {
                    Error::corrupt(offset, format!("invalid {} byte {:#04x}", stringify!($ty), $b))
                })?;
                Ok(BitLength::from_bytes(1))
            }

            fn encoded_size(&self, _compress: bool) -> BitLength {
                BitLength::from_bytes(1)
            }
        }
    };
}

impl_byte_plain!(
    FieldKind,
    type_ids::FIELD_KIND,
    |kind| kind.bits() as u8,
    |byte| FieldKind::from_bits(u32::from(byte))
);

impl_byte_plain!(
    FieldFlags,
    type_ids::FIELD_FLAGS,
    |flags| flags.0,
    |byte| Some(FieldFlags(byte))
);

impl RttiStatic for RttiFieldSchema {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<RttiFieldSchema>::new("RttiFieldSchema", TID_RTTI_FIELD_SCHEMA)
                .plain_field("id", 0, |f| &f.id, |f, v| f.id = v)
                .plain_field("kind", 1, |f| &f.kind, |f, v| f.kind = v)
                .plain_field("is_array", 2, |f| &f.is_array, |f, v| f.is_array = v)
                .plain_field("has_dynamic_size", 3, |f| &f.has_dynamic_size, |f, v| f.has_dynamic_size = v)
                .plain_field("size", 4, |f| &f.size, |f, v| f.size = v)
                .plain_field("type_id", 5, |f| &f.type_id, |f, v| f.type_id = v)
                .plain_field("flags", 6, |f| &f.flags, |f, v| f.flags = v)
                .finish()
        })
    }
}

impl RttiStatic for RttiSchema {
    fn rtti_static() -> &'static RttiType {
        static RTTI: OnceLock<RttiType> = OnceLock::new();
        RTTI.get_or_init(|| {
            RttiTypeBuilder::<RttiSchema>::new("RttiSchema", TID_RTTI_SCHEMA)
                .plain_field("type_id", 0, |s| &s.type_id, |s, v| s.type_id = v)
                .reflectable_array_field_indexed(
                    "base",
                    1,
                    |s| usize::from(s.base.is_some()),
                    |s, len| {
                        if len == 0 {
                            s.base = None;
                        } else if s.base.is_none() {
                            s.base = Some(Arc::default());
                        }
                    },
                    |s, index| if index == 0 { s.base.as_deref() } else { None },
                    |s, index| {
                        if index == 0 {
                            s.base.as_mut().map(Arc::make_mut)
                        } else {
                            None
                        }
                    },
                )
                .reflectable_array_field("field_schemas", 2, |s| &s.field_schemas, |s| &mut s.field_schemas)
                .reflectable_array_field("dependencies", 3, |s| &s.dependencies, |s| &mut s.dependencies)
                .finish()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(type_id: u32) -> RttiSchema {
        RttiSchema {
            type_id,
            field_schemas: vec![RttiFieldSchema {
                id: 0,
                kind: FieldKind::Plain,
                type_id: type_ids::I32,
                size: 4,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_find_searches_bases_and_dependencies() {
        let mut root = leaf(3000);
        root.base = Some(Arc::new(leaf(3001)));
        let mut dep = leaf(3002);
        dep.base = Some(Arc::new(leaf(3003)));
        root.dependencies.push(dep);

        assert_eq!(root.find(3000).map(|s| s.type_id), Some(3000));
        assert_eq!(root.find(3001).map(|s| s.type_id), Some(3001));
        assert_eq!(root.find(3003).map(|s| s.type_id), Some(3003));
        assert!(root.find(4000).is_none());
        assert_eq!(root.field(0).map(|f| f.size), Some(4));
    }

    #[test]
    fn test_schema_of_schema_is_finite() {
        let schema = RttiSchema::rtti_static().schema();
        assert_eq!(schema.type_id, TID_RTTI_SCHEMA);
        assert_eq!(schema.field_schemas.len(), 4);
        assert_eq!(schema.dependencies.len(), 1);
        assert_eq!(schema.dependencies[0].type_id, TID_RTTI_FIELD_SCHEMA);

        let base = schema.field(1).unwrap();
        assert_eq!(base.kind, FieldKind::Reflectable);
        assert!(base.is_array);
        assert_eq!(base.type_id, TID_RTTI_SCHEMA);
    }

    #[test]
    fn test_kind_byte_rejects_garbage() {
        let mut bs = Bitstream::new();
        bs.write(&9u8).unwrap();
        bs.seek(0);
        let mut kind = FieldKind::default();
        assert!(matches!(
            kind.from_stream(&mut bs, &FieldInfo::default(), false),
            Err(Error::CorruptMetadata { .. })
        ));
    }
}
