// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy shared by the bitstream, RTTI and serializer layers.
//!
//! Three families:
//!
//! - **Contract errors** - a reflectable type was declared or accessed wrongly
//!   (duplicate field id, scalar accessed as array, abstract instantiation).
//! - **Structural errors** - the stream cannot describe a valid graph (missing
//!   terminator, dangling reference, category mismatch, circular strong edge).
//!   These always abort the whole decode.
//! - **Recoverable errors** - [`Error::UnknownVersion`]. The decoder logs it,
//!   records a [`Diagnostic`], leaves the field at its default and continues.

use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure surfaced by bitrefl.
#[derive(Debug, Error)]
pub enum Error {
    // -- contract ---------------------------------------------------------
    #[error("type `{type_name}` declares field id {id} twice")]
    DuplicateFieldId { type_name: &'static str, id: u16 },

    #[error("type `{type_name}` declares field name `{name}` twice")]
    DuplicateFieldName {
        type_name: &'static str,
        name: &'static str,
    },

    #[error("field `{field}` of `{type_name}` has static size {size}, more than a field header can carry")]
    StaticSizeTooLarge {
        type_name: &'static str,
        field: &'static str,
        size: u32,
    },

    #[error("type id {type_id} is claimed by both `{existing}` and `{new}`")]
    DuplicateTypeId {
        type_id: u32,
        existing: &'static str,
        new: &'static str,
    },

    #[error("type `{type_name}` is abstract and cannot be instantiated")]
    AbstractType { type_name: &'static str },

    #[error("field `{field}` is {} but was accessed as {}", shape(.is_array, false), shape(.is_array, true))]
    ArrayMismatch { field: &'static str, is_array: bool },

    #[error("object is not a `{expected}`")]
    TypeMismatch { expected: &'static str },

    #[error("object {object_id} is already borrowed elsewhere")]
    ObjectBorrowed { object_id: u32 },

    #[error("stream was encoded without metadata and no schema was supplied")]
    MissingSchema,

    #[error("diff cannot be applied: {reason}")]
    IncompatibleDiff { reason: &'static str },

    // -- bitstream ----------------------------------------------------------
    #[error("read of {requested} bits at bit {cursor} runs past the end ({size} bits)")]
    UnexpectedEof {
        cursor: u64,
        requested: u64,
        size: u64,
    },

    #[error("varint does not fit in {bits} bits")]
    VarintOverflow { bits: u32 },

    #[error("write of {requested} bits exceeds external buffer capacity ({capacity} bits)")]
    ExternalCapacity { requested: u64, capacity: u64 },

    #[error("bitstream is a read-only view")]
    ReadOnly,

    #[error("invalid utf-8 in string payload")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // -- structural ---------------------------------------------------------
    #[error("object {object_id} is missing its field terminator")]
    MissingTerminator { object_id: u32 },

    #[error("corrupt metadata at bit {offset}: {reason}")]
    CorruptMetadata { offset: u64, reason: String },

    #[error("reference to object {object_id} has no matching entry in the stream")]
    DanglingReference { object_id: u32 },

    #[error("no registered type with id {type_id}")]
    UnknownType { type_id: u32 },

    #[error("field {field_id} of `{type_name}`: stream says {found}, type declares {expected}")]
    FieldCategoryMismatch {
        type_name: &'static str,
        field_id: u16,
        expected: String,
        found: String,
    },

    #[error("circular strong reference to object {object_id}; mark one edge of the cycle weak")]
    CircularReference { object_id: u32 },

    #[error("object id space exhausted (max {max})")]
    TooManyObjects { max: u32 },

    // -- recoverable --------------------------------------------------------
    #[error("`{type_name}` payload has unknown version {version}")]
    UnknownVersion { type_name: &'static str, version: u32 },

    // -- environment --------------------------------------------------------
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("operation cancelled by progress callback")]
    Cancelled,
}

fn shape(is_array: &bool, flipped: bool) -> &'static str {
    if *is_array != flipped {
        "an array"
    } else {
        "a scalar"
    }
}

impl Error {
    /// Whether the decoder may record this error as a diagnostic and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownVersion { .. })
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            offset,
            reason: reason.into(),
        }
    }
}

/// Why a [`Diagnostic`] was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Plain payload carried a version the reader does not understand.
    UnknownVersion,
    /// Field id not declared by the live type; skipped.
    UnknownField,
    /// Plain field's static size differs from the live declaration; skipped.
    SizeMismatch,
    /// Object entry whose type is not registered; skipped.
    UnknownType,
}

/// Non-fatal decode problem returned alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Object the field belongs to (0 for embedded values).
    pub object_id: u32,
    /// RTTI type id of the object (or base part) being decoded.
    pub type_id: u32,
    /// Field id, when the problem is field-local.
    pub field_id: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.field_id {
            Some(field) => write!(
                f,
                "{:?} (object {}, type {}, field {}): {}",
                self.kind, self.object_id, self.type_id, field, self.message
            ),
            None => write!(
                f,
                "{:?} (object {}, type {}): {}",
                self.kind, self.object_id, self.type_id, self.message
            ),
        }
    }
}
