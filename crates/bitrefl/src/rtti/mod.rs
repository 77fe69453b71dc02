// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime type information.
//!
//! # Architecture
//!
//! ```text
//! RttiStatic::rtti_static() --> RttiType (OnceLock, built once)
//!                                  |-- base: fn() -> &RttiType + projection
//!                                  |-- fields: RttiField (typed fn accessors, erased)
//!                                  |-- hooks: serialization started/ended
//!                                  '-- schema(): Arc<RttiSchema> (persistable)
//! TypeRegistry (DashMap)  type id -> &'static RttiType, used by the decoder
//! ```
//!
//! Inheritance is modelled by composition: a derived type embeds its base and
//! hands the builder a projection to it. Nested type references are stored as
//! `fn() -> &'static RttiType` so self-referencing types initialise lazily.

pub mod field;
pub mod plain;
pub mod reflectable;
pub mod registry;
pub mod rtti_type;
pub mod schema;

pub use field::{FieldFlags, FieldInfo, FieldKind, RttiField};
pub use plain::{PlainType, VersionedPlainType};
pub use reflectable::{AsAny, ObjectRef, PtrTarget, Reflectable, RttiStatic};
pub use registry::{registry, TypeRegistry};
pub use rtti_type::{RttiType, RttiTypeBuilder, SerializationContext};
pub use schema::{RttiFieldSchema, RttiSchema};
