// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

/// Encoding options. Readers must be given the same flags the writer used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SerializerFlags(pub u8);

impl SerializerFlags {
    /// Write referenced objects as null instead of following pointer fields.
    pub const SHALLOW: Self = Self(0x01);
    /// Varint metadata and compressed plain encodings.
    pub const COMPRESS: Self = Self(0x02);
    /// No per-object or per-field metadata; the reader needs a schema.
    pub const NO_META: Self = Self(0x04);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn is_shallow(self) -> bool {
        self.contains(Self::SHALLOW)
    }

    pub const fn is_compressed(self) -> bool {
        self.contains(Self::COMPRESS)
    }

    pub const fn has_meta(self) -> bool {
        !self.contains(Self::NO_META)
    }
}

impl std::ops::BitOr for SerializerFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SerializerFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
