// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime type descriptors and their builder.

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

use crate::config::MAX_STATIC_FIELD_SIZE;
use crate::error::{Error, Result};
use crate::rtti::field::{
    cast_mut, DataBlockFns, EmbeddedAccess, EmbeddedFns, EmbeddedIndexedFns, EmbeddedVecFns,
    FieldAccess, FieldFlags, FieldInfo, PlainFns, PlainVecFns, PtrArrayFns, PtrFns, RttiField,
};
use crate::rtti::plain::PlainType;
use crate::rtti::reflectable::{ObjectRef, Reflectable, RttiStatic};
use crate::rtti::schema::RttiSchema;
use crate::serializer::SerializerFlags;

/// State handed to serialization hooks.
pub struct SerializationContext<'a> {
    pub flags: SerializerFlags,
    /// Caller-supplied context object, if any.
    pub user: Option<&'a mut dyn Any>,
}

impl<'a> SerializationContext<'a> {
    pub fn new(flags: SerializerFlags, user: Option<&'a mut dyn Any>) -> Self {
        Self { flags, user }
    }

    /// Caller context downcast to `T`.
    pub fn user_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user.as_deref_mut()?.downcast_mut::<T>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookKind {
    SerializationStarted,
    SerializationEnded,
    DeserializationStarted,
    DeserializationEnded,
}

trait ErasedHook: Send + Sync {
    fn call(&self, obj: &mut dyn Reflectable, ctx: &mut SerializationContext<'_>) -> Result<()>;
}

struct TypedHook<T> {
    hook: fn(&mut T, &mut SerializationContext<'_>),
}

impl<T: RttiStatic> ErasedHook for TypedHook<T> {
    fn call(&self, obj: &mut dyn Reflectable, ctx: &mut SerializationContext<'_>) -> Result<()> {
        (self.hook)(cast_mut::<T>(obj)?, ctx);
        Ok(())
    }
}

#[derive(Default)]
struct Hooks {
    serialization_started: Option<Box<dyn ErasedHook>>,
    serialization_ended: Option<Box<dyn ErasedHook>>,
    deserialization_started: Option<Box<dyn ErasedHook>>,
    deserialization_ended: Option<Box<dyn ErasedHook>>,
}

impl Hooks {
    fn get(&self, kind: HookKind) -> Option<&dyn ErasedHook> {
        match kind {
            HookKind::SerializationStarted => self.serialization_started.as_deref(),
            HookKind::SerializationEnded => self.serialization_ended.as_deref(),
            HookKind::DeserializationStarted => self.deserialization_started.as_deref(),
            HookKind::DeserializationEnded => self.deserialization_ended.as_deref(),
        }
    }
}

struct BaseLink {
    rtti: fn() -> &'static RttiType,
    access: Box<dyn EmbeddedAccess>,
}

/// Runtime description of a reflectable type: identity, base, fields, hooks.
pub struct RttiType {
    name: &'static str,
    type_id: u32,
    base: Option<BaseLink>,
    fields: Vec<RttiField>,
    factory: Option<fn() -> ObjectRef>,
    hooks: Hooks,
    schema: OnceLock<Arc<RttiSchema>>,
}

impl fmt::Debug for RttiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RttiType")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("base", &self.base().map(RttiType::name))
            .field("fields", &self.fields)
            .finish()
    }
}

impl RttiType {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn base(&self) -> Option<&'static RttiType> {
        self.base.as_ref().map(|b| (b.rtti)())
    }

    /// Fields declared by this type (not its bases).
    pub fn fields(&self) -> &[RttiField] {
        &self.fields
    }

    pub fn find_field(&self, id: u16) -> Option<&RttiField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn find_field_by_name(&self, name: &str) -> Option<&RttiField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_abstract(&self) -> bool {
        self.factory.is_none()
    }

    /// Default-constructed instance.
    pub fn new_object(&self) -> Result<ObjectRef> {
        match self.factory {
            Some(factory) => Ok(factory()),
            None => Err(Error::AbstractType {
                type_name: self.name,
            }),
        }
    }

    /// Whether `self` is `other` or inherits from it.
    pub fn is_derived_from(&self, other: &RttiType) -> bool {
        let mut current = Some(self);
        while let Some(rtti) = current {
            if rtti.type_id == other.type_id {
                return true;
            }
            current = rtti.base();
        }
        false
    }

    /// Base part of `obj`, when this type has a base.
    pub fn base_part<'a>(&self, obj: &'a dyn Reflectable) -> Result<Option<&'a dyn Reflectable>> {
        match &self.base {
            Some(link) => link.access.get(obj).map(Some),
            None => Ok(None),
        }
    }

    pub fn base_part_mut<'a>(&self, obj: &'a mut dyn Reflectable) -> Result<Option<&'a mut dyn Reflectable>> {
        match &self.base {
            Some(link) => link.access.get_mut(obj).map(Some),
            None => Ok(None),
        }
    }

    /// Run a hook on every level of `obj`, base first.
    pub(crate) fn run_hook(
        &self,
        kind: HookKind,
        obj: &mut dyn Reflectable,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<()> {
        if let Some(link) = &self.base {
            let part = link.access.get_mut(obj)?;
            (link.rtti)().run_hook(kind, part, ctx)?;
        }
        if let Some(hook) = self.hooks.get(kind) {
            hook.call(obj, ctx)?;
        }
        Ok(())
    }

    /// Types this one refers to directly: its base and the declared types of
    /// its reflectable and pointer fields.
    pub fn referenced_types(&self) -> impl Iterator<Item = &'static RttiType> + '_ {
        self.base()
            .into_iter()
            .chain(self.fields.iter().filter_map(RttiField::reflectable_type))
    }

    /// Schema of this type alone: id, base chain and fields.
    pub(crate) fn local_schema(&self) -> RttiSchema {
        RttiSchema {
            type_id: self.type_id,
            base: self.base().map(|b| Arc::new(b.local_schema())),
            field_schemas: self.fields.iter().map(RttiField::schema).collect(),
            dependencies: Vec::new(),
        }
    }

    /// Full schema, including every type reachable through fields. Built once.
    pub fn schema(&self) -> Arc<RttiSchema> {
        self.schema
            .get_or_init(|| {
                let mut schema = self.local_schema();
                let mut seen = HashSet::from([self.type_id]);
                let mut queue: VecDeque<&'static RttiType> = self.referenced_types().collect();
                while let Some(rtti) = queue.pop_front() {
                    if !seen.insert(rtti.type_id) {
                        continue;
                    }
                    queue.extend(rtti.referenced_types());
                    schema.dependencies.push(rtti.local_schema());
                }
                log::debug!(
                    "[rtti] built schema for {} ({} dependencies)",
                    self.name,
                    schema.dependencies.len()
                );
                Arc::new(schema)
            })
            .clone()
    }
}

/// Declares a reflectable type.
///
/// Field ids and names must be unique within the type; violations are
/// reported by [`build`](Self::build).
pub struct RttiTypeBuilder<T> {
    name: &'static str,
    type_id: u32,
    base: Option<BaseLink>,
    fields: Vec<RttiField>,
    factory: Option<fn() -> ObjectRef>,
    hooks: Hooks,
    error: Option<Error>,
    _marker: PhantomData<fn() -> T>,
}

fn create_default<T: RttiStatic + Default>() -> ObjectRef {
    ObjectRef::new(T::default())
}

impl<T: RttiStatic + Default> RttiTypeBuilder<T> {
    /// Concrete type, instantiated with `T::default()` when decoding.
    pub fn new(name: &'static str, type_id: u32) -> Self {
        let mut builder = Self::new_abstract(name, type_id);
        builder.factory = Some(create_default::<T>);
        builder
    }
}

impl<T: RttiStatic> RttiTypeBuilder<T> {
    /// Type that cannot be created by the decoder.
    pub fn new_abstract(name: &'static str, type_id: u32) -> Self {
        Self {
            name,
            type_id,
            base: None,
            fields: Vec::new(),
            factory: None,
            hooks: Hooks::default(),
            error: None,
            _marker: PhantomData,
        }
    }

    /// Declare `B` as the base type, reached through an embedded member.
    pub fn base<B: RttiStatic>(mut self, get: fn(&T) -> &B, get_mut: fn(&mut T) -> &mut B) -> Self {
        self.base = Some(BaseLink {
            rtti: B::rtti_static,
            access: Box::new(EmbeddedFns { get, get_mut }),
        });
        self
    }

    pub fn plain_field<V: PlainType>(
        self,
        name: &'static str,
        id: u16,
        get: fn(&T) -> &V,
        set: fn(&mut T, V),
    ) -> Self {
        let access = FieldAccess::Plain(Box::new(PlainFns { get, set }));
        self.push_plain::<V>(name, id, access)
    }

    pub fn plain_array_field<V: PlainType>(
        self,
        name: &'static str,
        id: u16,
        get: fn(&T) -> &Vec<V>,
        get_mut: fn(&mut T) -> &mut Vec<V>,
    ) -> Self {
        let access = FieldAccess::PlainArray(Box::new(PlainVecFns { get, get_mut }));
        self.push_plain::<V>(name, id, access)
    }

    pub fn reflectable_field<U: RttiStatic>(
        self,
        name: &'static str,
        id: u16,
        get: fn(&T) -> &U,
        get_mut: fn(&mut T) -> &mut U,
    ) -> Self {
        let access = FieldAccess::Reflectable(Box::new(EmbeddedFns { get, get_mut }));
        self.push_typed(name, id, U::rtti_static, access)
    }

    pub fn reflectable_array_field<U: RttiStatic + Default>(
        self,
        name: &'static str,
        id: u16,
        get: fn(&T) -> &Vec<U>,
        get_mut: fn(&mut T) -> &mut Vec<U>,
    ) -> Self {
        let access = FieldAccess::ReflectableArray(Box::new(EmbeddedVecFns { get, get_mut }));
        self.push_typed(name, id, U::rtti_static, access)
    }

    /// Embedded array over storage other than a `Vec`.
    pub fn reflectable_array_field_indexed<U: RttiStatic>(
        self,
        name: &'static str,
        id: u16,
        len: fn(&T) -> usize,
        resize: fn(&mut T, usize),
        elem: fn(&T, usize) -> Option<&U>,
        elem_mut: fn(&mut T, usize) -> Option<&mut U>,
    ) -> Self {
        let access = FieldAccess::ReflectableArray(Box::new(EmbeddedIndexedFns {
            len,
            resize,
            elem,
            elem_mut,
        }));
        self.push_typed(name, id, U::rtti_static, access)
    }

    /// Pointer field holding `Rc<RefCell<U>>`.
    pub fn reflectable_ptr_field<U: RttiStatic>(
        self,
        name: &'static str,
        id: u16,
        get: fn(&T) -> Option<Rc<RefCell<U>>>,
        set: fn(&mut T, Option<Rc<RefCell<U>>>),
    ) -> Self {
        let access = FieldAccess::ReflectablePtr(Box::new(PtrFns { get, set }));
        self.push_typed(name, id, U::rtti_static, access)
    }

    /// Pointer field holding an untyped [`ObjectRef`], declared as `U` (or
    /// anything derived from it).
    pub fn dyn_ptr_field<U: RttiStatic>(
        self,
        name: &'static str,
        id: u16,
        get: fn(&T) -> Option<ObjectRef>,
        set: fn(&mut T, Option<ObjectRef>),
    ) -> Self {
        let access = FieldAccess::ReflectablePtr(Box::new(PtrFns { get, set }));
        self.push_typed(name, id, U::rtti_static, access)
    }

    pub fn reflectable_ptr_array_field<U: RttiStatic>(
        self,
        name: &'static str,
        id: u16,
        len: fn(&T) -> usize,
        resize: fn(&mut T, usize),
        get: fn(&T, usize) -> Option<Rc<RefCell<U>>>,
        set: fn(&mut T, usize, Option<Rc<RefCell<U>>>),
    ) -> Self {
        let access = FieldAccess::ReflectablePtrArray(Box::new(PtrArrayFns { len, resize, get, set }));
        self.push_typed(name, id, U::rtti_static, access)
    }

    pub fn dyn_ptr_array_field<U: RttiStatic>(
        self,
        name: &'static str,
        id: u16,
        len: fn(&T) -> usize,
        resize: fn(&mut T, usize),
        get: fn(&T, usize) -> Option<ObjectRef>,
        set: fn(&mut T, usize, Option<ObjectRef>),
    ) -> Self {
        let access = FieldAccess::ReflectablePtrArray(Box::new(PtrArrayFns { len, resize, get, set }));
        self.push_typed(name, id, U::rtti_static, access)
    }

    pub fn data_block_field(
        self,
        name: &'static str,
        id: u16,
        get: fn(&T) -> &[u8],
        set: fn(&mut T, Vec<u8>),
    ) -> Self {
        let access = FieldAccess::DataBlock(Box::new(DataBlockFns { get, set }));
        self.push(RttiField {
            name,
            id,
            info: FieldInfo::default(),
            plain_type_id: 0,
            has_dynamic_size: true,
            static_size: 0,
            type_ref: None,
            access,
        })
    }

    /// Set flags on the most recently declared field.
    pub fn field_flags(mut self, flags: FieldFlags) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.info.flags = field.info.flags | flags;
        }
        self
    }

    /// Shorthand for `field_flags(FieldFlags::WEAK_REF)`.
    pub fn weak(self) -> Self {
        self.field_flags(FieldFlags::WEAK_REF)
    }

    pub fn on_serialization_started(mut self, hook: fn(&mut T, &mut SerializationContext<'_>)) -> Self {
        self.hooks.serialization_started = Some(Box::new(TypedHook { hook }));
        self
    }

    pub fn on_serialization_ended(mut self, hook: fn(&mut T, &mut SerializationContext<'_>)) -> Self {
        self.hooks.serialization_ended = Some(Box::new(TypedHook { hook }));
        self
    }

    pub fn on_deserialization_started(mut self, hook: fn(&mut T, &mut SerializationContext<'_>)) -> Self {
        self.hooks.deserialization_started = Some(Box::new(TypedHook { hook }));
        self
    }

    pub fn on_deserialization_ended(mut self, hook: fn(&mut T, &mut SerializationContext<'_>)) -> Self {
        self.hooks.deserialization_ended = Some(Box::new(TypedHook { hook }));
        self
    }

    fn push_plain<V: PlainType>(self, name: &'static str, id: u16, access: FieldAccess) -> Self {
        self.push(RttiField {
            name,
            id,
            info: FieldInfo::default(),
            plain_type_id: V::TYPE_ID,
            has_dynamic_size: V::HAS_DYNAMIC_SIZE,
            static_size: if V::HAS_DYNAMIC_SIZE { 0 } else { V::STATIC_SIZE },
            type_ref: None,
            access,
        })
    }

    fn push_typed(
        self,
        name: &'static str,
        id: u16,
        type_ref: fn() -> &'static RttiType,
        access: FieldAccess,
    ) -> Self {
        self.push(RttiField {
            name,
            id,
            info: FieldInfo::default(),
            plain_type_id: 0,
            has_dynamic_size: true,
            static_size: 0,
            type_ref: Some(type_ref),
            access,
        })
    }

    fn push(mut self, field: RttiField) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.fields.iter().any(|f| f.id == field.id) {
            self.error = Some(Error::DuplicateFieldId {
                type_name: self.name,
                id: field.id,
            });
        } else if self.fields.iter().any(|f| f.name == field.name) {
            self.error = Some(Error::DuplicateFieldName {
                type_name: self.name,
                name: field.name,
            });
        } else if field.static_size > MAX_STATIC_FIELD_SIZE {
            self.error = Some(Error::StaticSizeTooLarge {
                type_name: self.name,
                field: field.name,
                size: field.static_size,
            });
        } else {
            self.fields.push(field);
        }
        self
    }

    /// Finish the declaration, reporting the first contract violation.
    pub fn build(self) -> Result<RttiType> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(RttiType {
            name: self.name,
            type_id: self.type_id,
            base: self.base,
            fields: self.fields,
            factory: self.factory,
            hooks: self.hooks,
            schema: OnceLock::new(),
        })
    }

    /// [`build`](Self::build) for static initializers.
    ///
    /// # Panics
    ///
    /// Panics on a contract violation (duplicate field id or name, oversized
    /// static field). These are declaration bugs, not runtime conditions.
    pub fn finish(self) -> RttiType {
        match self.build() {
            Ok(rtti) => rtti,
            Err(err) => panic!("invalid reflectable declaration: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Shape {
        label: String,
        visits: u32,
    }

    #[derive(Debug, Default)]
    struct Circle {
        shape: Shape,
        radius: f32,
    }

    impl RttiStatic for Shape {
        fn rtti_static() -> &'static RttiType {
            static RTTI: OnceLock<RttiType> = OnceLock::new();
            RTTI.get_or_init(|| {
                RttiTypeBuilder::<Shape>::new_abstract("Shape", 9100)
                    .plain_field("label", 0, |s| &s.label, |s, v| s.label = v)
                    .on_serialization_started(|s, _| s.visits += 1)
                    .finish()
            })
        }
    }

    impl RttiStatic for Circle {
        fn rtti_static() -> &'static RttiType {
            static RTTI: OnceLock<RttiType> = OnceLock::new();
            RTTI.get_or_init(|| {
                RttiTypeBuilder::<Circle>::new("Circle", 9101)
                    .base(|c| &c.shape, |c| &mut c.shape)
                    .plain_field("radius", 0, |c| &c.radius, |c, v| c.radius = v)
                    .on_serialization_started(|c, _| c.shape.visits += 10)
                    .finish()
            })
        }
    }

    #[test]
    fn test_inheritance_queries() {
        let circle = Circle::rtti_static();
        assert_eq!(circle.base().map(RttiType::name), Some("Shape"));
        assert!(circle.is_derived_from(Shape::rtti_static()));
        assert!(!Shape::rtti_static().is_derived_from(circle));
        assert!(Shape::rtti_static().is_abstract());
        assert!(matches!(
            Shape::rtti_static().new_object(),
            Err(Error::AbstractType { type_name: "Shape" })
        ));
        assert_eq!(circle.new_object().unwrap().type_id(), 9101);
    }

    #[test]
    fn test_hooks_run_base_first() {
        let mut circle = Circle::default();
        let mut ctx = SerializationContext::new(SerializerFlags::empty(), None);
        Circle::rtti_static()
            .run_hook(HookKind::SerializationStarted, &mut circle, &mut ctx)
            .unwrap();
        assert_eq!(circle.shape.visits, 11);
        Circle::rtti_static()
            .run_hook(HookKind::SerializationEnded, &mut circle, &mut ctx)
            .unwrap();
        assert_eq!(circle.shape.visits, 11);
    }

    #[test]
    fn test_duplicate_field_id_is_rejected() {
        let result = RttiTypeBuilder::<Circle>::new("Broken", 9102)
            .plain_field("a", 3, |c| &c.radius, |c, v| c.radius = v)
            .plain_field("b", 3, |c| &c.radius, |c, v| c.radius = v)
            .build();
        assert!(matches!(result, Err(Error::DuplicateFieldId { id: 3, .. })));

        let result = RttiTypeBuilder::<Circle>::new("Broken", 9102)
            .plain_field("a", 1, |c| &c.radius, |c, v| c.radius = v)
            .plain_field("a", 2, |c| &c.radius, |c, v| c.radius = v)
            .build();
        assert!(matches!(result, Err(Error::DuplicateFieldName { name: "a", .. })));
    }

    #[test]
    fn test_field_access_checks_shape() {
        let circle = Circle {
            radius: 2.5,
            ..Default::default()
        };
        let field = Circle::rtti_static().find_field_by_name("radius").unwrap();
        assert_eq!(*field.value::<f32>(&circle).unwrap(), 2.5);
        assert!(matches!(
            field.array_len(&circle),
            Err(Error::ArrayMismatch { is_array: false, .. })
        ));
        assert!(matches!(
            field.value::<u32>(&circle),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_user_context_downcast() {
        let mut counter = 5u32;
        let mut ctx = SerializationContext::new(SerializerFlags::COMPRESS, Some(&mut counter));
        *ctx.user_mut::<u32>().unwrap() += 1;
        assert!(ctx.user_mut::<String>().is_none());
        assert_eq!(counter, 6);
    }
}
