// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide type registry, keyed by RTTI type id.
//!
//! The decoder resolves type ids read from a stream here. Registering a type
//! also registers everything reachable from it (bases and field types).

use std::collections::VecDeque;
use std::sync::OnceLock;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::rtti::reflectable::RttiStatic;
use crate::rtti::rtti_type::RttiType;
use crate::rtti::schema::{RttiFieldSchema, RttiSchema};

static GLOBAL_REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Global registry. Schema types are registered on first access.
pub fn registry() -> &'static TypeRegistry {
    GLOBAL_REGISTRY.get_or_init(|| {
        let registry = TypeRegistry::new();
        for rtti in [RttiSchema::rtti_static(), RttiFieldSchema::rtti_static()] {
            registry.types.insert(rtti.type_id(), rtti);
        }
        registry
    })
}

/// Concurrent map from type id to type descriptor.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: DashMap<u32, &'static RttiType>,
}

impl TypeRegistry {
    /// Empty registry (see [`registry`] for the global one).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` and every type reachable from it.
    pub fn register<T: RttiStatic>(&self) -> Result<()> {
        self.ensure_registered(T::rtti_static())
    }

    /// Register a descriptor and every type reachable from it.
    ///
    /// Re-registering the same descriptor is a no-op; a different descriptor
    /// under a taken id is [`Error::DuplicateTypeId`].
    pub fn ensure_registered(&self, rtti: &'static RttiType) -> Result<()> {
        let mut queue = VecDeque::from([rtti]);
        while let Some(rtti) = queue.pop_front() {
            if let Some(existing) = self.types.get(&rtti.type_id()) {
                if std::ptr::eq(*existing, rtti) {
                    continue;
                }
                return Err(Error::DuplicateTypeId {
                    type_id: rtti.type_id(),
                    existing: existing.name(),
                    new: rtti.name(),
                });
            }
            log::debug!("[registry] registered {} (id {})", rtti.name(), rtti.type_id());
            self.types.insert(rtti.type_id(), rtti);
            queue.extend(rtti.referenced_types());
        }
        Ok(())
    }

    pub fn get(&self, type_id: u32) -> Option<&'static RttiType> {
        self.types.get(&type_id).map(|entry| *entry)
    }

    /// Like [`get`](Self::get), failing with [`Error::UnknownType`].
    pub fn resolve(&self, type_id: u32) -> Result<&'static RttiType> {
        self.get(type_id).ok_or(Error::UnknownType { type_id })
    }

    pub fn get_by_name(&self, name: &str) -> Option<&'static RttiType> {
        self.types
            .iter()
            .map(|entry| *entry.value())
            .find(|rtti| rtti.name() == name)
    }

    pub fn contains(&self, type_id: u32) -> bool {
        self.types.contains_key(&type_id)
    }

    /// Registered types whose direct base is `type_id`.
    pub fn derived_types(&self, type_id: u32) -> Vec<&'static RttiType> {
        let mut derived: Vec<_> = self
            .types
            .iter()
            .map(|entry| *entry.value())
            .filter(|rtti| rtti.base().is_some_and(|base| base.type_id() == type_id))
            .collect();
        derived.sort_by_key(|rtti| rtti.type_id());
        derived
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
