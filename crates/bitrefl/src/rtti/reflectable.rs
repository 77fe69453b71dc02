// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reflectable objects and shared object handles.

use std::any::Any;
use std::cell::{BorrowMutError, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::rtti::rtti_type::RttiType;

/// Upcast helper so `dyn Reflectable` can be downcast to its concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Object that exposes runtime type information.
///
/// Implemented automatically for every [`RttiStatic`] type.
pub trait Reflectable: AsAny {
    /// Most-derived type of this object.
    fn rtti(&self) -> &'static RttiType;
}

/// Type with a statically known [`RttiType`].
///
/// ```
/// use std::sync::OnceLock;
/// use bitrefl::rtti::{RttiStatic, RttiType, RttiTypeBuilder};
///
/// #[derive(Default)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl RttiStatic for Point {
///     fn rtti_static() -> &'static RttiType {
///         static RTTI: OnceLock<RttiType> = OnceLock::new();
///         RTTI.get_or_init(|| {
///             RttiTypeBuilder::<Point>::new("Point", 1001)
///                 .plain_field("x", 0, |p| &p.x, |p, v| p.x = v)
///                 .plain_field("y", 1, |p| &p.y, |p, v| p.y = v)
///                 .finish()
///         })
///     }
/// }
/// ```
pub trait RttiStatic: Any + Sized {
    fn rtti_static() -> &'static RttiType;
}

impl<T: RttiStatic> Reflectable for T {
    fn rtti(&self) -> &'static RttiType {
        T::rtti_static()
    }
}

/// Shared, interior-mutable handle to a reflectable object.
///
/// Object identity is the allocation address: two handles built from clones
/// of the same `Rc<RefCell<T>>` are the same object.
#[derive(Clone)]
pub struct ObjectRef {
    cell: Rc<RefCell<dyn Reflectable>>,
    any: Rc<dyn Any>,
    rtti: &'static RttiType,
}

impl ObjectRef {
    pub fn new<T: RttiStatic>(value: T) -> Self {
        Self::from_rc(Rc::new(RefCell::new(value)))
    }

    pub fn from_rc<T: RttiStatic>(rc: Rc<RefCell<T>>) -> Self {
        Self {
            any: rc.clone(),
            cell: rc,
            rtti: T::rtti_static(),
        }
    }

    /// Most-derived type of the object.
    pub fn rtti(&self) -> &'static RttiType {
        self.rtti
    }

    pub fn type_id(&self) -> u32 {
        self.rtti.type_id()
    }

    /// Allocation address, used as object identity.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.cell) as *const u8 as usize
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.addr() == other.addr()
    }

    /// Typed handle to the same allocation, if the object is a `T`.
    pub fn downcast<T: RttiStatic>(&self) -> Option<Rc<RefCell<T>>> {
        self.any.clone().downcast::<RefCell<T>>().ok()
    }

    pub fn is<T: RttiStatic>(&self) -> bool {
        self.any.is::<RefCell<T>>()
    }

    /// # Panics
    ///
    /// Panics if the object is mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, dyn Reflectable> {
        self.cell.borrow()
    }

    pub fn try_borrow_mut(&self) -> std::result::Result<RefMut<'_, dyn Reflectable>, BorrowMutError> {
        self.cell.try_borrow_mut()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type", &self.rtti.name())
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

/// Values a pointer field may hold.
pub trait PtrTarget: Sized + 'static {
    fn to_object_ref(&self) -> ObjectRef;
    /// Fails with [`Error::TypeMismatch`] when the object is of another type.
    fn from_object_ref(obj: &ObjectRef) -> Result<Self>;
}

impl<T: RttiStatic> PtrTarget for Rc<RefCell<T>> {
    fn to_object_ref(&self) -> ObjectRef {
        ObjectRef::from_rc(self.clone())
    }

    fn from_object_ref(obj: &ObjectRef) -> Result<Self> {
        obj.downcast::<T>().ok_or(Error::TypeMismatch {
            expected: T::rtti_static().name(),
        })
    }
}

impl PtrTarget for ObjectRef {
    fn to_object_ref(&self) -> ObjectRef {
        self.clone()
    }

    fn from_object_ref(obj: &ObjectRef) -> Result<Self> {
        Ok(obj.clone())
    }
}
