// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! bitrefl Global Configuration - Single Source of Truth
//!
//! This module centralizes ALL wire-format constants and runtime tunables.
//! **NEVER hardcode elsewhere!**
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: Compile-time constants (metadata bit layout, reserved ids)
//! - **Level 2 (Dynamic)**: [`SerializerConfig`] for buffer sizing and progress reporting
//!
//! # Exemple
//!
//! ```
//! use bitrefl::config::{SerializerConfig, DEFAULT_BUFFER_SIZE};
//!
//! let config = SerializerConfig::default().with_buffer_size(2 * DEFAULT_BUFFER_SIZE);
//! assert_eq!(config.flush_after, 3 * DEFAULT_BUFFER_SIZE / 2);
//! ```

// =======================================================================
// Object / field metadata layout
// =======================================================================

/// Low bit of every object metadata word. Field words and terminators keep it clear.
pub const META_OBJECT_TAG: u32 = 0x01;

/// Object metadata: the entry describes a base-class part of the current object.
pub const META_OBJECT_BASE: u32 = 0x02;

/// Number of low bits used by object metadata before the object id starts.
pub const META_OBJECT_ID_SHIFT: u32 = 2;

/// Field metadata: field is an array.
pub const META_FIELD_ARRAY: u32 = 0x02;

/// Field metadata: category occupies bits 2-3.
pub const META_FIELD_CATEGORY_SHIFT: u32 = 2;

/// Field metadata: category mask (after shifting).
pub const META_FIELD_CATEGORY_MASK: u32 = 0x03;

/// Field metadata: bits 8-15 hold a builtin plain type id instead of a byte size.
pub const META_FIELD_BUILTIN: u32 = 0x10;

/// Field metadata: value carries its own size header.
pub const META_FIELD_DYNAMIC: u32 = 0x20;

/// Terminator bit (also the full terminator byte).
pub const META_TERMINATOR: u32 = 0x40;

/// Field metadata: size/builtin id shift.
pub const META_FIELD_SIZE_SHIFT: u32 = 8;

/// Field metadata: field id shift.
pub const META_FIELD_ID_SHIFT: u32 = 16;

/// Largest object id representable in an object metadata word (30 bits).
pub const MAX_OBJECT_ID: u32 = (1 << 30) - 1;

/// Largest static plain size (bytes) representable in a field metadata word.
pub const MAX_STATIC_FIELD_SIZE: u32 = 0xFF;

/// Object id reserved for "null reference" and for embedded values.
pub const NULL_OBJECT_ID: u32 = 0;

// =======================================================================
// Reserved RTTI type ids
// =======================================================================

/// Type id of [`crate::rtti::RttiSchema`].
pub const TID_RTTI_SCHEMA: u32 = 1;

/// Type id of [`crate::rtti::RttiFieldSchema`].
pub const TID_RTTI_FIELD_SCHEMA: u32 = 2;

/// First type id available to user types. Ids below are reserved by the crate.
pub const TID_FIRST_USER: u32 = 1000;

// =======================================================================
// Buffering
// =======================================================================

/// Working buffer of the buffered writer (bytes).
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Flush threshold of the buffered writer (75% of the working buffer).
pub const FLUSH_AFTER: usize = DEFAULT_BUFFER_SIZE * 3 / 4;

/// Minimum read size of the buffered reader (bytes).
pub const DEFAULT_PRELOAD_SIZE: usize = 4096;

/// Buffered reader trims consumed bytes once its buffer grows past this (bytes).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 16 * 1024;

/// Progress callbacks fire each time this many bytes have been consumed.
pub const PROGRESS_REPORT_INTERVAL: u64 = 32 * 1024;

/// Data blocks are streamed through the writer in chunks of this many bytes.
pub const DATA_BLOCK_CHUNK: usize = 1024;

// =======================================================================
// Runtime configuration
// =======================================================================

/// Buffer sizing and reporting knobs used by [`crate::BinarySerializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializerConfig {
    /// Working buffer of the buffered writer (bytes).
    pub buffer_size: usize,
    /// Buffered writer flushes whole bytes once this many are pending.
    pub flush_after: usize,
    /// Minimum chunk read from a non-memory stream.
    pub preload_size: usize,
    /// Reader buffer size at which consumed bytes are discarded.
    pub max_buffer_size: usize,
    /// Bytes between two progress callbacks.
    pub progress_interval: u64,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_after: FLUSH_AFTER,
            preload_size: DEFAULT_PRELOAD_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            progress_interval: PROGRESS_REPORT_INTERVAL,
        }
    }
}

impl SerializerConfig {
    /// Resize the writer buffer, keeping the flush threshold at 75%.
    #[must_use]
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.max(1);
        self.flush_after = (self.buffer_size * 3 / 4).max(1);
        self
    }

    /// Set the reader chunk size and trim threshold.
    #[must_use]
    pub fn with_reader_limits(mut self, preload_size: usize, max_buffer_size: usize) -> Self {
        self.preload_size = preload_size.max(1);
        self.max_buffer_size = max_buffer_size.max(self.preload_size);
        self
    }

    /// Set the progress callback interval.
    #[must_use]
    pub fn with_progress_interval(mut self, bytes: u64) -> Self {
        self.progress_interval = bytes.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_bits_fit_in_first_varint_byte() {
        // Discrimination peeks one byte; every tag bit must sit below bit 7.
        for tag in [
            META_OBJECT_TAG,
            META_OBJECT_BASE,
            META_FIELD_ARRAY,
            META_FIELD_BUILTIN,
            META_FIELD_DYNAMIC,
            META_TERMINATOR,
        ] {
            assert!(tag < 0x80, "tag {tag:#x} leaks out of the first varint byte");
        }
        assert!((META_FIELD_CATEGORY_MASK << META_FIELD_CATEGORY_SHIFT) < 0x10);
    }

    #[test]
    fn test_default_flush_threshold_is_three_quarters() {
        let config = SerializerConfig::default();
        assert_eq!(config.flush_after * 4, config.buffer_size * 3);
    }

    #[test]
    fn test_reader_limits_never_undercut_preload() {
        let config = SerializerConfig::default().with_reader_limits(8192, 1024);
        assert_eq!(config.preload_size, 8192);
        assert_eq!(config.max_buffer_size, 8192);
    }
}
