// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Versioned plain payloads.
//!
//! Layout: size header, version (u32, varint when compressed), payload. The
//! frame lets a reader that does not know the version skip the value and
//! report [`Error::UnknownVersion`], which the decoder treats as recoverable.

use super::{read_with_size_header, write_with_size_header};
use crate::bitstream::{BitLength, Bitstream};
use crate::error::{Error, Result};
use crate::rtti::field::FieldInfo;

/// Plain value whose layout evolves over time.
///
/// Implement this, then `impl_versioned_plain_type!(MyType)` to obtain the
/// [`PlainType`](super::PlainType) impl.
pub trait VersionedPlainType: Default + 'static {
    const TYPE_ID: u32;
    /// Version written by this build.
    const VERSION: u32;
    const TYPE_NAME: &'static str;

    fn write_payload(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool) -> Result<()>;

    /// Decode a payload of `version`. Only called when [`accepts`] is true.
    ///
    /// [`accepts`]: VersionedPlainType::accepts
    fn read_payload(
        &mut self,
        version: u32,
        stream: &mut Bitstream<'_>,
        info: &FieldInfo,
        compress: bool,
    ) -> Result<()>;

    /// Versions this build can read.
    fn accepts(version: u32) -> bool {
        version == Self::VERSION
    }
}

#[doc(hidden)]
pub fn write_versioned<T: VersionedPlainType>(
    value: &T,
    stream: &mut Bitstream<'_>,
    info: &FieldInfo,
    compress: bool,
) -> Result<BitLength> {
    write_with_size_header(stream, compress, |s| {
        if compress {
            s.write_varint(T::VERSION)?;
        } else {
            s.write(&T::VERSION)?;
        }
        value.write_payload(s, info, compress)
    })
}

#[doc(hidden)]
pub fn read_versioned<T: VersionedPlainType>(
    value: &mut T,
    stream: &mut Bitstream<'_>,
    info: &FieldInfo,
    compress: bool,
) -> Result<BitLength> {
    read_with_size_header(stream, compress, |s, _| {
        let version: u32 = if compress { s.read_varint()? } else { s.read()? };
        if !T::accepts(version) {
            return Err(Error::UnknownVersion {
                type_name: T::TYPE_NAME,
                version,
            });
        }
        value.read_payload(version, s, info, compress)
    })
}

#[doc(hidden)]
pub fn versioned_size<T: VersionedPlainType>(value: &T, compress: bool) -> BitLength {
    let mut scratch = Bitstream::new();
    match write_versioned(value, &mut scratch, &FieldInfo::default(), compress) {
        Ok(len) => len,
        Err(err) => {
            log::warn!("[plain] sizing {} failed: {}", T::TYPE_NAME, err);
            BitLength::ZERO
        }
    }
}

/// Implement [`PlainType`](crate::rtti::plain::PlainType) for a
/// [`VersionedPlainType`].
#[macro_export]
macro_rules! impl_versioned_plain_type {
    ($ty:ty) => {
        impl $crate::rtti::plain::PlainType for $ty {
            const TYPE_ID: u32 = <$ty as $crate::rtti::plain::VersionedPlainType>::TYPE_ID;
            const HAS_DYNAMIC_SIZE: bool = true;
            const STATIC_SIZE: u32 = 0;

            fn to_stream(
                &self,
                stream: &mut $crate::bitstream::Bitstream<'_>,
                info: &$crate::rtti::FieldInfo,
                compress: bool,
            ) -> $crate::Result<$crate::bitstream::BitLength> {
                $crate::rtti::plain::versioned::write_versioned(self, stream, info, compress)
            }

            fn from_stream(
                &mut self,
                stream: &mut $crate::bitstream::Bitstream<'_>,
                info: &$crate::rtti::FieldInfo,
                compress: bool,
            ) -> $crate::Result<$crate::bitstream::BitLength> {
                $crate::rtti::plain::versioned::read_versioned(self, stream, info, compress)
            }

            fn encoded_size(&self, compress: bool) -> $crate::bitstream::BitLength {
                $crate::rtti::plain::versioned::versioned_size(self, compress)
            }
        }
    };
}
