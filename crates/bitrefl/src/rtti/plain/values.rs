// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Strings, paths and memcpy-able POD values.

use std::path::PathBuf;

use bytemuck::Pod;

use super::{framed_len, read_with_size_header, type_ids, write_with_size_header, PlainType};
use crate::bitstream::{BitLength, Bitstream};
use crate::error::{Error, Result};
use crate::math::{Color, Quaternion, Vector3};
use crate::rtti::field::FieldInfo;

fn read_framed_bytes(stream: &mut Bitstream<'_>, compress: bool) -> Result<(Vec<u8>, BitLength)> {
    let mut bytes = Vec::new();
    let total = read_with_size_header(stream, compress, |s, payload_bits| {
        if payload_bits % 8 != 0 {
            return Err(Error::corrupt(s.tell(), "byte payload is not byte sized"));
        }
        bytes.resize((payload_bits / 8) as usize, 0);
        s.read_bytes(&mut bytes)
    })?;
    Ok((bytes, total))
}

fn framed_bytes_size(len: usize, compress: bool) -> BitLength {
    let payload = BitLength::from_bytes(len as u32);
    framed_len(payload, compress)
}

impl PlainType for String {
    const TYPE_ID: u32 = type_ids::STRING;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, _info: &FieldInfo, compress: bool) -> Result<BitLength> {
        write_with_size_header(stream, compress, |s| s.write_bytes(self.as_bytes()))
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, _info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let (bytes, total) = read_framed_bytes(stream, compress)?;
        *self = String::from_utf8(bytes)?;
        Ok(total)
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        framed_bytes_size(self.len(), compress)
    }
}

impl PlainType for PathBuf {
    const TYPE_ID: u32 = type_ids::PATH;
    const HAS_DYNAMIC_SIZE: bool = true;
    const STATIC_SIZE: u32 = 0;

    fn to_stream(&self, stream: &mut Bitstream<'_>, _info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let text = self.to_string_lossy();
        write_with_size_header(stream, compress, |s| s.write_bytes(text.as_bytes()))
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, _info: &FieldInfo, compress: bool) -> Result<BitLength> {
        let (bytes, total) = read_framed_bytes(stream, compress)?;
        *self = PathBuf::from(String::from_utf8(bytes)?);
        Ok(total)
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        framed_bytes_size(self.to_string_lossy().len(), compress)
    }
}

// =======================================================================
// POD values
// =======================================================================

/// Encode a POD value as its raw bytes, framed when `framed`.
#[doc(hidden)]
pub fn write_pod<T: Pod>(value: &T, stream: &mut Bitstream<'_>, compress: bool, framed: bool) -> Result<BitLength> {
    let bytes = bytemuck::bytes_of(value);
    if framed {
        return write_with_size_header(stream, compress, |s| s.write_bytes(bytes));
    }
    stream.write_bytes(bytes)?;
    Ok(BitLength::from_bytes(bytes.len() as u32))
}

/// Decode a POD value written by [`write_pod`].
#[doc(hidden)]
pub fn read_pod<T: Pod>(value: &mut T, stream: &mut Bitstream<'_>, compress: bool, framed: bool) -> Result<BitLength> {
    if framed {
        let expected = std::mem::size_of::<T>() as u64 * 8;
        return read_with_size_header(stream, compress, |s, payload_bits| {
            if payload_bits != expected {
                return Err(Error::corrupt(
                    s.tell(),
                    format!("pod payload is {payload_bits} bits, expected {expected}"),
                ));
            }
            s.read_bytes(bytemuck::bytes_of_mut(value))
        });
    }
    stream.read_bytes(bytemuck::bytes_of_mut(value))?;
    Ok(BitLength::from_bytes(std::mem::size_of::<T>() as u32))
}

#[doc(hidden)]
pub fn pod_size<T: Pod>(compress: bool, framed: bool) -> BitLength {
    let payload = BitLength::from_bytes(std::mem::size_of::<T>() as u32);
    if framed {
        framed_len(payload, compress)
    } else {
        payload
    }
}

/// Implement [`PlainType`] for a `bytemuck::Pod` type by copying its bytes.
///
/// Values larger than a field metadata word can describe are framed with a
/// size header and reported as dynamic.
///
/// ```
/// use bitrefl::impl_pod_plain_type;
///
/// #[repr(C)]
/// #[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
/// struct Extent {
///     width: u32,
///     height: u32,
/// }
///
/// impl_pod_plain_type!(Extent, 1200);
/// ```
#[macro_export]
macro_rules! impl_pod_plain_type {
    ($ty:ty, $id:expr) => {
        impl $crate::rtti::plain::PlainType for $ty {
            const TYPE_ID: u32 = $id;
            const HAS_DYNAMIC_SIZE: bool =
                ::std::mem::size_of::<$ty>() > $crate::config::MAX_STATIC_FIELD_SIZE as usize;
            const STATIC_SIZE: u32 = ::std::mem::size_of::<$ty>() as u32;

            fn to_stream(
                &self,
                stream: &mut $crate::bitstream::Bitstream<'_>,
                _info: &$crate::rtti::FieldInfo,
                compress: bool,
            ) -> $crate::Result<$crate::bitstream::BitLength> {
                $crate::rtti::plain::values::write_pod(self, stream, compress, Self::HAS_DYNAMIC_SIZE)
            }

            fn from_stream(
                &mut self,
                stream: &mut $crate::bitstream::Bitstream<'_>,
                _info: &$crate::rtti::FieldInfo,
                compress: bool,
            ) -> $crate::Result<$crate::bitstream::BitLength> {
                $crate::rtti::plain::values::read_pod(self, stream, compress, Self::HAS_DYNAMIC_SIZE)
            }

            fn encoded_size(&self, compress: bool) -> $crate::bitstream::BitLength {
                $crate::rtti::plain::values::pod_size::<$ty>(compress, Self::HAS_DYNAMIC_SIZE)
            }
        }
    };
}

impl_pod_plain_type!(Vector3, type_ids::VECTOR3);
impl_pod_plain_type!(Quaternion, type_ids::QUATERNION);
impl_pod_plain_type!(Color, type_ids::COLOR);
