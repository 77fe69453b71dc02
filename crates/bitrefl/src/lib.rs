// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # bitrefl - reflective bit-level binary serialization
//!
//! Types describe themselves once through an [`RttiType`](rtti::RttiType):
//! numbered fields, an optional base, lifecycle hooks. The
//! [`BinarySerializer`] walks those descriptions to write a compact,
//! self-describing stream that survives added and removed fields, shared and
//! cyclic references, and inheritance.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                           Serializer                                |
//! |   BinarySerializer | MemorySerializer | FileEncoder/FileDecoder     |
//! |   encoder (BFS ids) | decoder (scan + depth-first) | intermediate   |
//! |   snapshot diff / patch                                             |
//! +---------------------------------------------------------------------+
//! |                              RTTI                                   |
//! |   RttiType/RttiField | TypeRegistry | RttiSchema | PlainType codecs |
//! +---------------------------------------------------------------------+
//! |                            Bitstream                                |
//! |   Bitstream (bit cursor, varint, quantize) | Buffered reader/writer |
//! +---------------------------------------------------------------------+
//! |                               I/O                                   |
//! |   DataStream: MemoryDataStream (zero-copy) | FileDataStream         |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Flags
//!
//! | Flag | Effect |
//! |------|--------|
//! | [`SerializerFlags::SHALLOW`] | pointer fields are written as null |
//! | [`SerializerFlags::COMPRESS`] | varint metadata, bit-packed plain values |
//! | [`SerializerFlags::NO_META`] | no type or field tags; decode needs a schema |

// Clippy: No blanket suppressions. Fix issues properly or use inline #[allow] with justification.

/// Bit-level stream, varints, quantization and the buffered reader/writer.
pub mod bitstream;
/// Wire constants and runtime buffer configuration.
pub mod config;
/// Error taxonomy and decode diagnostics.
pub mod error;
/// Byte sources and sinks.
pub mod io;
/// POD value types (vectors, quaternions, colors).
pub mod math;
/// Runtime type information, plain codecs, type registry and schemas.
pub mod rtti;
/// Object graph encoder/decoder.
pub mod serializer;

pub use config::SerializerConfig;
pub use error::{Diagnostic, DiagnosticKind, Error, Result};
pub use io::{DataStream, FileDataStream, MemoryDataStream};
pub use rtti::{ObjectRef, Reflectable, RttiStatic, RttiType, RttiTypeBuilder};
pub use serializer::{
    apply_diff, clone_object, decode_intermediate, diff_objects, BinarySerializer, DecodeOptions,
    Decoded, EncodeStats, FileDecoder, FileEncoder, MemorySerializer, SerializedGraph,
    SerializerFlags,
};
