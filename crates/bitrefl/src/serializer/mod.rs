// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary object graph serializer.
//!
//! # Stream layout
//!
//! ```text
//! stream := entry*                       (root first, then breadth-first)
//! entry  := object_word type_id? part (object_word(base) type_id? part)* terminator?
//! part   := (field_word? value)*
//! value  := plain | count plain* | count bytes | entry(id 0) | count entry* | id | count id*
//! ```
//!
//! Without [`SerializerFlags::NO_META`], every object carries its type id and
//! every field a metadata word, so readers skip what they do not know and
//! match the rest by field id. With it, only object words remain and the
//! reader walks an [`RttiSchema`](crate::rtti::RttiSchema) instead.
//!
//! # Example
//!
//! ```
//! use std::sync::OnceLock;
//! use bitrefl::rtti::{ObjectRef, RttiStatic, RttiType, RttiTypeBuilder};
//! use bitrefl::serializer::{MemorySerializer, SerializerFlags};
//!
//! #[derive(Default)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl RttiStatic for Point {
//!     fn rtti_static() -> &'static RttiType {
//!         static RTTI: OnceLock<RttiType> = OnceLock::new();
//!         RTTI.get_or_init(|| {
//!             RttiTypeBuilder::<Point>::new("Point", 5000)
//!                 .plain_field("x", 0, |p| &p.x, |p, v| p.x = v)
//!                 .plain_field("y", 1, |p| &p.y, |p, v| p.y = v)
//!                 .finish()
//!         })
//!     }
//! }
//!
//! let mut serializer = MemorySerializer::new();
//! let bytes = serializer
//!     .encode_to_vec(&ObjectRef::new(Point { x: 3, y: -4 }), SerializerFlags::COMPRESS)
//!     .unwrap();
//! let decoded = serializer
//!     .decode_from_slice(&bytes, SerializerFlags::COMPRESS, None)
//!     .unwrap();
//! let point = decoded.downcast::<Point>().unwrap();
//! assert_eq!(point.borrow().y, -4);
//! ```

mod decoder;
pub mod diff;
mod encoder;
pub mod flags;
pub mod intermediate;
pub(crate) mod metadata;

use std::any::Any;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use crate::bitstream::BufferedBitstreamReader;
use crate::config::SerializerConfig;
use crate::error::{Diagnostic, Result};
use crate::io::{DataStream, FileDataStream, MemoryDataStream};
use crate::rtti::reflectable::{ObjectRef, RttiStatic};
use crate::rtti::schema::RttiSchema;

use decoder::Decoder;
use encoder::Encoder;

pub use diff::{apply_diff, diff_objects};
pub use encoder::EncodeStats;
pub use flags::SerializerFlags;
pub use intermediate::{
    decode_intermediate, SerializedField, SerializedGraph, SerializedObject, SerializedPlain,
    SerializedValue,
};

/// Per-call decode inputs.
#[derive(Default)]
pub struct DecodeOptions<'a> {
    /// Flags the stream was encoded with.
    pub flags: SerializerFlags,
    /// Handed to deserialization hooks.
    pub context: Option<&'a mut dyn Any>,
    /// Called with the fraction decoded; returning `false` cancels.
    pub progress: Option<&'a mut dyn FnMut(f32) -> bool>,
    /// Required when `flags` contains [`SerializerFlags::NO_META`].
    pub schema: Option<Arc<RttiSchema>>,
}

impl<'a> DecodeOptions<'a> {
    pub fn new(flags: SerializerFlags) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: &'a mut dyn Any) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'a mut dyn FnMut(f32) -> bool) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Arc<RttiSchema>) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Result of a successful decode.
#[derive(Debug)]
pub struct Decoded {
    pub root: ObjectRef,
    /// Recoverable problems met along the way, in stream order.
    pub diagnostics: Vec<Diagnostic>,
    /// Largest reader working-buffer capacity seen, in bits. Memory inputs
    /// are mapped whole, so this is their full length.
    pub peak_buffer_bits: u64,
}

impl Decoded {
    /// Root as its concrete type.
    pub fn downcast<T: RttiStatic>(&self) -> Option<Rc<RefCell<T>>> {
        self.root.downcast::<T>()
    }

    /// Whether the decode finished without diagnostics.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Encodes and decodes object graphs against [`DataStream`]s.
///
/// Not reentrant: one call at a time per instance. Instances are cheap, use
/// one per thread.
#[derive(Debug, Clone, Default)]
pub struct BinarySerializer {
    config: SerializerConfig,
}

impl BinarySerializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Encode the graph reachable from `root` into `output`.
    pub fn encode(
        &mut self,
        root: &ObjectRef,
        output: &mut dyn DataStream,
        flags: SerializerFlags,
        context: Option<&mut dyn Any>,
    ) -> Result<EncodeStats> {
        Encoder::new(output, &self.config, flags, context).encode(root)
    }

    /// Decode at most `length` bytes from `input`, starting at its current position.
    pub fn decode(&mut self, input: &mut dyn DataStream, length: u64, options: DecodeOptions<'_>) -> Result<Decoded> {
        let reader = BufferedBitstreamReader::new(input, length, &self.config);
        Decoder::new(
            reader,
            &self.config,
            options.flags,
            options.schema,
            options.context,
            options.progress,
        )
        .decode()
    }

    /// Type-free decode; see [`decode_intermediate`].
    pub fn decode_intermediate(
        &mut self,
        input: &mut dyn DataStream,
        length: u64,
        flags: SerializerFlags,
    ) -> Result<SerializedGraph> {
        let reader = BufferedBitstreamReader::new(input, length, &self.config);
        intermediate::read_graph(reader, flags)
    }
}

/// In-memory convenience over [`BinarySerializer`].
#[derive(Debug, Clone, Default)]
pub struct MemorySerializer {
    inner: BinarySerializer,
}

impl MemorySerializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: SerializerConfig) -> Self {
        Self {
            inner: BinarySerializer::with_config(config),
        }
    }

    pub fn encode_to_vec(&mut self, root: &ObjectRef, flags: SerializerFlags) -> Result<Vec<u8>> {
        let mut out = MemoryDataStream::new();
        self.inner.encode(root, &mut out, flags, None)?;
        Ok(out.into_inner())
    }

    pub fn decode_from_slice(
        &mut self,
        bytes: &[u8],
        flags: SerializerFlags,
        schema: Option<Arc<RttiSchema>>,
    ) -> Result<Decoded> {
        let mut input = MemoryDataStream::from_vec(bytes.to_vec());
        let options = DecodeOptions {
            flags,
            schema,
            ..Default::default()
        };
        self.inner.decode(&mut input, bytes.len() as u64, options)
    }
}

/// Encodes graphs into a file, through the buffered writer.
#[derive(Debug)]
pub struct FileEncoder {
    path: PathBuf,
    serializer: BinarySerializer,
}

impl FileEncoder {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            serializer: BinarySerializer::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SerializerConfig) -> Self {
        self.serializer = BinarySerializer::with_config(config);
        self
    }

    /// Create (or truncate) the file and write `root` into it.
    pub fn encode(
        &mut self,
        root: &ObjectRef,
        flags: SerializerFlags,
        context: Option<&mut dyn Any>,
    ) -> Result<EncodeStats> {
        let mut file = FileDataStream::create(&self.path)?;
        let stats = self.serializer.encode(root, &mut file, flags, context)?;
        file.sync()?;
        log::debug!("[serializer] wrote {} bytes to {}", stats.bytes, self.path.display());
        Ok(stats)
    }
}

/// Decodes graphs from a file without loading it whole.
#[derive(Debug)]
pub struct FileDecoder {
    path: PathBuf,
    serializer: BinarySerializer,
}

impl FileDecoder {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            serializer: BinarySerializer::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SerializerConfig) -> Self {
        self.serializer = BinarySerializer::with_config(config);
        self
    }

    pub fn decode(&mut self, options: DecodeOptions<'_>) -> Result<Decoded> {
        let mut file = FileDataStream::open(&self.path)?;
        let length = file.size();
        self.serializer.decode(&mut file, length, options)
    }
}

/// Deep copy of the graph reachable from `root`, by encoding and decoding it
/// in memory. Weak references inside the graph are preserved.
pub fn clone_object(root: &ObjectRef, flags: SerializerFlags) -> Result<ObjectRef> {
    let mut serializer = MemorySerializer::new();
    let bytes = serializer.encode_to_vec(root, flags)?;
    let schema = (!flags.has_meta()).then(|| root.rtti().schema());
    let decoded = serializer.decode_from_slice(&bytes, flags, schema)?;
    for diagnostic in &decoded.diagnostics {
        log::warn!("[serializer] clone of {}: {}", root.rtti().name(), diagnostic);
    }
    Ok(decoded.root)
}
