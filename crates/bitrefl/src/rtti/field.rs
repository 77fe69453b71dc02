// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field descriptors.
//!
//! A field is declared with plain `fn` accessors on the concrete type; the
//! builder wraps them in small typed structs and stores them behind the
//! object-safe `*Access` traits below, so the serializer can drive any field
//! through `&dyn Reflectable` without knowing the concrete type.

use std::any::Any;
use std::fmt;

use crate::bitstream::{BitLength, Bitstream};
use crate::error::{Error, Result};
use crate::rtti::plain::PlainType;
use crate::rtti::reflectable::{ObjectRef, PtrTarget, Reflectable, RttiStatic};
use crate::rtti::rtti_type::RttiType;
use crate::rtti::schema::RttiFieldSchema;

/// Field category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FieldKind {
    /// Value type, encoded by its [`PlainType`] codec.
    #[default]
    Plain = 0,
    /// Opaque byte blob.
    DataBlock = 1,
    /// Reflectable object stored by value.
    Reflectable = 2,
    /// Shared reference to a reflectable object.
    ReflectablePtr = 3,
}

impl FieldKind {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Plain),
            1 => Some(Self::DataBlock),
            2 => Some(Self::Reflectable),
            3 => Some(Self::ReflectablePtr),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::DataBlock => "data block",
            Self::Reflectable => "reflectable",
            Self::ReflectablePtr => "reflectable pointer",
        })
    }
}

/// Per-field flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldFlags(pub u8);

impl FieldFlags {
    /// Reference does not own its target; allowed to close a cycle.
    pub const WEAK_REF: Self = Self(0x01);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for FieldFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Static information handed to codecs alongside the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldInfo {
    pub flags: FieldFlags,
}

impl FieldInfo {
    pub const fn new(flags: FieldFlags) -> Self {
        Self { flags }
    }
}

// =======================================================================
// Type-erased access
// =======================================================================

pub(crate) fn cast<T: RttiStatic>(obj: &dyn Reflectable) -> Result<&T> {
    obj.as_any().downcast_ref::<T>().ok_or(Error::TypeMismatch {
        expected: T::rtti_static().name(),
    })
}

pub(crate) fn cast_mut<T: RttiStatic>(obj: &mut dyn Reflectable) -> Result<&mut T> {
    obj.as_any_mut().downcast_mut::<T>().ok_or(Error::TypeMismatch {
        expected: T::rtti_static().name(),
    })
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::corrupt(0, format!("array index {index} out of range (len {len})"))
}

pub(crate) trait PlainAccess: Send + Sync {
    fn encode(&self, obj: &dyn Reflectable, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength>;
    /// Decodes into a fresh value and only stores it on success.
    fn decode(&self, obj: &mut dyn Reflectable, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength>;
    fn encoded_size(&self, obj: &dyn Reflectable, compress: bool) -> Result<BitLength>;
    fn value<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a dyn Any>;
    fn set_value(&self, obj: &mut dyn Reflectable, value: Box<dyn Any>) -> Result<()>;
}

pub(crate) trait PlainArrayAccess: Send + Sync {
    fn len(&self, obj: &dyn Reflectable) -> Result<usize>;
    fn resize(&self, obj: &mut dyn Reflectable, len: usize) -> Result<()>;
    fn encode_elem(&self, obj: &dyn Reflectable, index: usize, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength>;
    fn decode_elem(&self, obj: &mut dyn Reflectable, index: usize, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength>;
    fn value<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a dyn Any>;
}

pub(crate) trait EmbeddedAccess: Send + Sync {
    fn get<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a dyn Reflectable>;
    fn get_mut<'a>(&self, obj: &'a mut dyn Reflectable) -> Result<&'a mut dyn Reflectable>;
}

pub(crate) trait EmbeddedArrayAccess: Send + Sync {
    fn len(&self, obj: &dyn Reflectable) -> Result<usize>;
    fn resize(&self, obj: &mut dyn Reflectable, len: usize) -> Result<()>;
    fn elem<'a>(&self, obj: &'a dyn Reflectable, index: usize) -> Result<&'a dyn Reflectable>;
    fn elem_mut<'a>(&self, obj: &'a mut dyn Reflectable, index: usize) -> Result<&'a mut dyn Reflectable>;
}

pub(crate) trait PtrAccess: Send + Sync {
    fn get(&self, obj: &dyn Reflectable) -> Result<Option<ObjectRef>>;
    fn set(&self, obj: &mut dyn Reflectable, value: Option<ObjectRef>) -> Result<()>;
}

pub(crate) trait PtrArrayAccess: Send + Sync {
    fn len(&self, obj: &dyn Reflectable) -> Result<usize>;
    fn resize(&self, obj: &mut dyn Reflectable, len: usize) -> Result<()>;
    fn get(&self, obj: &dyn Reflectable, index: usize) -> Result<Option<ObjectRef>>;
    fn set(&self, obj: &mut dyn Reflectable, index: usize, value: Option<ObjectRef>) -> Result<()>;
}

pub(crate) trait DataBlockAccess: Send + Sync {
    fn get<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a [u8]>;
    fn set(&self, obj: &mut dyn Reflectable, data: Vec<u8>) -> Result<()>;
}

pub(crate) struct PlainFns<T, V> {
    pub get: fn(&T) -> &V,
    pub set: fn(&mut T, V),
}

impl<T: RttiStatic, V: PlainType> PlainAccess for PlainFns<T, V> {
    fn encode(&self, obj: &dyn Reflectable, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        (self.get)(cast::<T>(obj)?).to_stream(stream, info, compress)
    }

    fn decode(&self, obj: &mut dyn Reflectable, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let target = cast_mut::<T>(obj)?;
        let mut value = V::default();
        let len = value.from_stream(stream, info, compress)?;
        (self.set)(target, value);
        Ok(len)
    }

    fn encoded_size(&self, obj: &dyn Reflectable, compress: bool) -> Result<BitLength> {
        Ok((self.get)(cast::<T>(obj)?).encoded_size(compress))
    }

    fn value<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a dyn Any> {
        Ok((self.get)(cast::<T>(obj)?))
    }

    fn set_value(&self, obj: &mut dyn Reflectable, value: Box<dyn Any>) -> Result<()> {
        let value = value.downcast::<V>().map_err(|_| Error::TypeMismatch {
            expected: std::any::type_name::<V>(),
        })?;
        (self.set)(cast_mut::<T>(obj)?, *value);
        Ok(())
    }
}

pub(crate) struct PlainVecFns<T, V> {
    pub get: fn(&T) -> &Vec<V>,
    pub get_mut: fn(&mut T) -> &mut Vec<V>,
}

impl<T: RttiStatic, V: PlainType> PlainArrayAccess for PlainVecFns<T, V> {
    fn len(&self, obj: &dyn Reflectable) -> Result<usize> {
        Ok((self.get)(cast::<T>(obj)?).len())
    }

    fn resize(&self, obj: &mut dyn Reflectable, len: usize) -> Result<()> {
        (self.get_mut)(cast_mut::<T>(obj)?).resize_with(len, V::default);
        Ok(())
    }

    fn encode_elem(&self, obj: &dyn Reflectable, index: usize, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let items = (self.get)(cast::<T>(obj)?);
        items
            .get(index)
            .ok_or_else(|| out_of_range(index, items.len()))?
            .to_stream(stream, info, compress)
    }

    fn decode_elem(&self, obj: &mut dyn Reflectable, index: usize, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let items = (self.get_mut)(cast_mut::<T>(obj)?);
        let len = items.len();
        let slot = items.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
        let mut value = V::default();
        let read = value.from_stream(stream, info, compress)?;
        *slot = value;
        Ok(read)
    }

    fn value<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a dyn Any> {
        Ok((self.get)(cast::<T>(obj)?))
    }
}

pub(crate) struct EmbeddedFns<T, U> {
    pub get: fn(&T) -> &U,
    pub get_mut: fn(&mut T) -> &mut U,
}

impl<T: RttiStatic, U: RttiStatic> EmbeddedAccess for EmbeddedFns<T, U> {
    fn get<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a dyn Reflectable> {
        Ok((self.get)(cast::<T>(obj)?))
    }

    fn get_mut<'a>(&self, obj: &'a mut dyn Reflectable) -> Result<&'a mut dyn Reflectable> {
        Ok((self.get_mut)(cast_mut::<T>(obj)?))
    }
}

pub(crate) struct EmbeddedVecFns<T, U> {
    pub get: fn(&T) -> &Vec<U>,
    pub get_mut: fn(&mut T) -> &mut Vec<U>,
}

impl<T: RttiStatic, U: RttiStatic + Default> EmbeddedArrayAccess for EmbeddedVecFns<T, U> {
    fn len(&self, obj: &dyn Reflectable) -> Result<usize> {
        Ok((self.get)(cast::<T>(obj)?).len())
    }

    fn resize(&self, obj: &mut dyn Reflectable, len: usize) -> Result<()> {
        (self.get_mut)(cast_mut::<T>(obj)?).resize_with(len, U::default);
        Ok(())
    }

    fn elem<'a>(&self, obj: &'a dyn Reflectable, index: usize) -> Result<&'a dyn Reflectable> {
        let items = (self.get)(cast::<T>(obj)?);
        match items.get(index) {
            Some(item) => Ok(item),
            None => Err(out_of_range(index, items.len())),
        }
    }

    fn elem_mut<'a>(&self, obj: &'a mut dyn Reflectable, index: usize) -> Result<&'a mut dyn Reflectable> {
        let items = (self.get_mut)(cast_mut::<T>(obj)?);
        let len = items.len();
        match items.get_mut(index) {
            Some(item) => Ok(item),
            None => Err(out_of_range(index, len)),
        }
    }
}

pub(crate) struct EmbeddedIndexedFns<T, U> {
    pub len: fn(&T) -> usize,
    pub resize: fn(&mut T, usize),
    pub elem: fn(&T, usize) -> Option<&U>,
    pub elem_mut: fn(&mut T, usize) -> Option<&mut U>,
}

impl<T: RttiStatic, U: RttiStatic> EmbeddedArrayAccess for EmbeddedIndexedFns<T, U> {
    fn len(&self, obj: &dyn Reflectable) -> Result<usize> {
        Ok((self.len)(cast::<T>(obj)?))
    }

    fn resize(&self, obj: &mut dyn Reflectable, len: usize) -> Result<()> {
        (self.resize)(cast_mut::<T>(obj)?, len);
        Ok(())
    }

    fn elem<'a>(&self, obj: &'a dyn Reflectable, index: usize) -> Result<&'a dyn Reflectable> {
        let target = cast::<T>(obj)?;
        match (self.elem)(target, index) {
            Some(item) => Ok(item),
            None => Err(out_of_range(index, (self.len)(target))),
        }
    }

    fn elem_mut<'a>(&self, obj: &'a mut dyn Reflectable, index: usize) -> Result<&'a mut dyn Reflectable> {
        let target = cast_mut::<T>(obj)?;
        let len = (self.len)(target);
        match (self.elem_mut)(target, index) {
            Some(item) => Ok(item),
            None => Err(out_of_range(index, len)),
        }
    }
}

pub(crate) struct PtrFns<T, P> {
    pub get: fn(&T) -> Option<P>,
    pub set: fn(&mut T, Option<P>),
}

impl<T: RttiStatic, P: PtrTarget> PtrAccess for PtrFns<T, P> {
    fn get(&self, obj: &dyn Reflectable) -> Result<Option<ObjectRef>> {
        Ok((self.get)(cast::<T>(obj)?).map(|p| p.to_object_ref()))
    }

    fn set(&self, obj: &mut dyn Reflectable, value: Option<ObjectRef>) -> Result<()> {
        let value = value.as_ref().map(P::from_object_ref).transpose()?;
        (self.set)(cast_mut::<T>(obj)?, value);
        Ok(())
    }
}

pub(crate) struct PtrArrayFns<T, P> {
    pub len: fn(&T) -> usize,
    pub resize: fn(&mut T, usize),
    pub get: fn(&T, usize) -> Option<P>,
    pub set: fn(&mut T, usize, Option<P>),
}

impl<T: RttiStatic, P: PtrTarget> PtrArrayAccess for PtrArrayFns<T, P> {
    fn len(&self, obj: &dyn Reflectable) -> Result<usize> {
        Ok((self.len)(cast::<T>(obj)?))
    }

    fn resize(&self, obj: &mut dyn Reflectable, len: usize) -> Result<()> {
        (self.resize)(cast_mut::<T>(obj)?, len);
        Ok(())
    }

    fn get(&self, obj: &dyn Reflectable, index: usize) -> Result<Option<ObjectRef>> {
        Ok((self.get)(cast::<T>(obj)?, index).map(|p| p.to_object_ref()))
    }

    fn set(&self, obj: &mut dyn Reflectable, index: usize, value: Option<ObjectRef>) -> Result<()> {
        let value = value.as_ref().map(P::from_object_ref).transpose()?;
        (self.set)(cast_mut::<T>(obj)?, index, value);
        Ok(())
    }
}

pub(crate) struct DataBlockFns<T> {
    pub get: fn(&T) -> &[u8],
    pub set: fn(&mut T, Vec<u8>),
}

impl<T: RttiStatic> DataBlockAccess for DataBlockFns<T> {
    fn get<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a [u8]> {
        Ok((self.get)(cast::<T>(obj)?))
    }

    fn set(&self, obj: &mut dyn Reflectable, data: Vec<u8>) -> Result<()> {
        (self.set)(cast_mut::<T>(obj)?, data);
        Ok(())
    }
}

/// Accessor storage, one variant per category and shape.
pub(crate) enum FieldAccess {
    Plain(Box<dyn PlainAccess>),
    PlainArray(Box<dyn PlainArrayAccess>),
    Reflectable(Box<dyn EmbeddedAccess>),
    ReflectableArray(Box<dyn EmbeddedArrayAccess>),
    ReflectablePtr(Box<dyn PtrAccess>),
    ReflectablePtrArray(Box<dyn PtrArrayAccess>),
    DataBlock(Box<dyn DataBlockAccess>),
}

impl FieldAccess {
    pub(crate) fn kind(&self) -> FieldKind {
        match self {
            Self::Plain(_) | Self::PlainArray(_) => FieldKind::Plain,
            Self::Reflectable(_) | Self::ReflectableArray(_) => FieldKind::Reflectable,
            Self::ReflectablePtr(_) | Self::ReflectablePtrArray(_) => FieldKind::ReflectablePtr,
            Self::DataBlock(_) => FieldKind::DataBlock,
        }
    }

    pub(crate) fn is_array(&self) -> bool {
        matches!(
            self,
            Self::PlainArray(_) | Self::ReflectableArray(_) | Self::ReflectablePtrArray(_)
        )
    }
}

// =======================================================================
// RttiField
// =======================================================================

/// One declared member of a reflectable type.
pub struct RttiField {
    pub(crate) name: &'static str,
    pub(crate) id: u16,
    pub(crate) info: FieldInfo,
    /// Plain type id for plain fields, 0 otherwise.
    pub(crate) plain_type_id: u32,
    pub(crate) has_dynamic_size: bool,
    pub(crate) static_size: u32,
    /// Declared type for reflectable and pointer fields.
    pub(crate) type_ref: Option<fn() -> &'static RttiType>,
    pub(crate) access: FieldAccess,
}

impl fmt::Debug for RttiField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RttiField")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("is_array", &self.is_array())
            .field("flags", &self.info.flags)
            .finish()
    }
}

impl RttiField {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn kind(&self) -> FieldKind {
        self.access.kind()
    }

    pub fn is_array(&self) -> bool {
        self.access.is_array()
    }

    pub fn info(&self) -> &FieldInfo {
        &self.info
    }

    pub fn is_weak(&self) -> bool {
        self.info.flags.contains(FieldFlags::WEAK_REF)
    }

    /// Plain type id (plain fields only).
    pub fn plain_type_id(&self) -> u32 {
        self.plain_type_id
    }

    pub fn has_dynamic_size(&self) -> bool {
        self.has_dynamic_size
    }

    /// Encoded byte size of static plain values.
    pub fn static_size(&self) -> u32 {
        self.static_size
    }

    /// Declared type of reflectable and pointer fields.
    pub fn reflectable_type(&self) -> Option<&'static RttiType> {
        self.type_ref.map(|f| f())
    }

    /// Fail with [`Error::ArrayMismatch`] unless the field's shape is `array`.
    pub fn check_is_array(&self, array: bool) -> Result<()> {
        if self.is_array() == array {
            Ok(())
        } else {
            Err(Error::ArrayMismatch {
                field: self.name,
                is_array: self.is_array(),
            })
        }
    }

    /// Persistable description of this field.
    pub fn schema(&self) -> RttiFieldSchema {
        RttiFieldSchema {
            id: self.id,
            kind: self.kind(),
            is_array: self.is_array(),
            has_dynamic_size: self.has_dynamic_size,
            size: self.static_size,
            type_id: match self.kind() {
                FieldKind::Plain => self.plain_type_id,
                FieldKind::Reflectable | FieldKind::ReflectablePtr => {
                    self.reflectable_type().map_or(0, RttiType::type_id)
                }
                FieldKind::DataBlock => 0,
            },
            flags: self.info.flags,
        }
    }

    /// Borrow a scalar plain field's value.
    pub fn value<'a, V: PlainType>(&self, obj: &'a dyn Reflectable) -> Result<&'a V> {
        self.check_is_array(false)?;
        let FieldAccess::Plain(access) = &self.access else {
            return Err(self.category_error(FieldKind::Plain));
        };
        access.value(obj)?.downcast_ref::<V>().ok_or(Error::TypeMismatch {
            expected: std::any::type_name::<V>(),
        })
    }

    /// Replace a scalar plain field's value.
    pub fn set_value<V: PlainType>(&self, obj: &mut dyn Reflectable, value: V) -> Result<()> {
        self.check_is_array(false)?;
        let FieldAccess::Plain(access) = &self.access else {
            return Err(self.category_error(FieldKind::Plain));
        };
        access.set_value(obj, Box::new(value))
    }

    /// Borrow a plain array field's elements.
    pub fn array_value<'a, V: PlainType>(&self, obj: &'a dyn Reflectable) -> Result<&'a [V]> {
        self.check_is_array(true)?;
        let FieldAccess::PlainArray(access) = &self.access else {
            return Err(self.category_error(FieldKind::Plain));
        };
        access
            .value(obj)?
            .downcast_ref::<Vec<V>>()
            .map(Vec::as_slice)
            .ok_or(Error::TypeMismatch {
                expected: std::any::type_name::<V>(),
            })
    }

    /// Element count of an array field.
    pub fn array_len(&self, obj: &dyn Reflectable) -> Result<usize> {
        self.check_is_array(true)?;
        match &self.access {
            FieldAccess::PlainArray(a) => a.len(obj),
            FieldAccess::ReflectableArray(a) => a.len(obj),
            FieldAccess::ReflectablePtrArray(a) => a.len(obj),
            _ => Err(self.category_error(self.kind())),
        }
    }

    /// Target of a scalar pointer field.
    pub fn ptr_value(&self, obj: &dyn Reflectable) -> Result<Option<ObjectRef>> {
        self.check_is_array(false)?;
        match &self.access {
            FieldAccess::ReflectablePtr(a) => a.get(obj),
            _ => Err(self.category_error(FieldKind::ReflectablePtr)),
        }
    }

    /// Point a scalar pointer field at `target`.
    pub fn set_ptr_value(&self, obj: &mut dyn Reflectable, target: Option<ObjectRef>) -> Result<()> {
        self.check_is_array(false)?;
        match &self.access {
            FieldAccess::ReflectablePtr(a) => a.set(obj, target),
            _ => Err(self.category_error(FieldKind::ReflectablePtr)),
        }
    }

    /// Borrow a scalar embedded reflectable.
    pub fn embedded<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a dyn Reflectable> {
        self.check_is_array(false)?;
        match &self.access {
            FieldAccess::Reflectable(a) => a.get(obj),
            _ => Err(self.category_error(FieldKind::Reflectable)),
        }
    }

    /// Bytes of a data block field.
    pub fn data_block<'a>(&self, obj: &'a dyn Reflectable) -> Result<&'a [u8]> {
        match &self.access {
            FieldAccess::DataBlock(a) => a.get(obj),
            _ => Err(self.category_error(FieldKind::DataBlock)),
        }
    }

    pub(crate) fn category_error(&self, requested: FieldKind) -> Error {
        Error::FieldCategoryMismatch {
            type_name: self.name,
            field_id: self.id,
            expected: self.kind().to_string(),
            found: requested.to_string(),
        }
    }
}
