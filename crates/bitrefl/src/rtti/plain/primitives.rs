// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Builtin scalar codecs.

use super::{type_ids, PlainType};
use crate::bitstream::varint::varint_len;
use crate::bitstream::{BitLength, Bitstream, VarInt};
use crate::error::{Error, Result};
use crate::rtti::field::FieldInfo;

impl PlainType for bool {
    const TYPE_ID: u32 = type_ids::BOOL;
    const HAS_DYNAMIC_SIZE: bool = false;
    const STATIC_SIZE: u32 = 1;

    fn to_stream(&self, stream: &mut Bitstream<'_>, _info: &FieldInfo, compress: bool) -> Result<BitLength> {
        if compress {
            stream.write(self)?;
            Ok(BitLength::from_bits(1))
        } else {
            stream.write(&u8::from(*self))?;
            Ok(BitLength::from_bytes(1))
        }
    }

    fn from_stream(&mut self, stream: &mut Bitstream<'_>, _info: &FieldInfo, compress: bool) -> Result<BitLength> {
        if compress {
            *self = stream.read::<bool>()?;
            Ok(BitLength::from_bits(1))
        } else {
            *self = stream.read::<u8>()? != 0;
            Ok(BitLength::from_bytes(1))
        }
    }

    fn encoded_size(&self, compress: bool) -> BitLength {
        if compress {
            BitLength::from_bits(1)
        } else {
            BitLength::from_bytes(1)
        }
    }
}

/// Scalars stored at full width in both modes.
macro_rules! impl_raw_plain {
    ($($ty:ty => $id:expr),* $(,)?) => {
        $(
            impl PlainType for $ty {
                const TYPE_ID: u32 = $id;
                const HAS_DYNAMIC_SIZE: bool = false;
                const STATIC_SIZE: u32 = std::mem::size_of::<$ty>() as u32;

                #[inline]
                fn to_stream(&self, stream: &mut Bitstream<'_>, _info: &FieldInfo, _compress: bool) -> Result<BitLength> {
                    stream.write(self)?;
                    Ok(BitLength::from_bytes(Self::STATIC_SIZE))
                }

                #[inline]
                fn from_stream(&mut self, stream: &mut Bitstream<'_>, _info: &FieldInfo, _compress: bool) -> Result<BitLength> {
                    *self = stream.read::<$ty>()?;
                    Ok(BitLength::from_bytes(Self::STATIC_SIZE))
                }

                #[inline]
                fn encoded_size(&self, _compress: bool) -> BitLength {
                    BitLength::from_bytes(Self::STATIC_SIZE)
                }
            }
        )*
    };
}

impl_raw_plain!(
    u8 => type_ids::U8,
    i8 => type_ids::I8,
    f32 => type_ids::F32,
    f64 => type_ids::F64,
);

/// Integers that switch to varint (zig-zag when signed) under compression.
/// `$wide` is the varint carrier the value widens into.
macro_rules! impl_varint_plain {
    ($($ty:ty as $wide:ty => $id:expr),* $(,)?) => {
        $(
            impl PlainType for $ty {
                const TYPE_ID: u32 = $id;
                const HAS_DYNAMIC_SIZE: bool = false;
                const STATIC_SIZE: u32 = std::mem::size_of::<$ty>() as u32;

                fn to_stream(&self, stream: &mut Bitstream<'_>, _info: &FieldInfo, compress: bool) -> Result<BitLength> {
                    if !compress {
                        stream.write(self)?;
                        return Ok(BitLength::from_bytes(Self::STATIC_SIZE));
                    }
                    let wide = <$wide>::from(*self);
                    stream.write_varint(wide)?;
                    Ok(BitLength::from_bytes(varint_len(wide.fold()) as u32))
                }

                fn from_stream(&mut self, stream: &mut Bitstream<'_>, _info: &FieldInfo, compress: bool) -> Result<BitLength> {
                    if !compress {
                        *self = stream.read::<$ty>()?;
                        return Ok(BitLength::from_bytes(Self::STATIC_SIZE));
                    }
                    let start = stream.tell();
                    let wide: $wide = stream.read_varint()?;
                    *self = <$ty>::try_from(wide).map_err(|_| Error::VarintOverflow {
                        bits: <$ty>::BITS,
                    })?;
                    Ok(BitLength::from_bits(stream.tell() - start))
                }

                fn encoded_size(&self, compress: bool) -> BitLength {
                    if compress {
                        BitLength::from_bytes(varint_len(<$wide>::from(*self).fold()) as u32)
                    } else {
                        BitLength::from_bytes(Self::STATIC_SIZE)
                    }
                }
            }
        )*
    };
}

impl_varint_plain!(
    u16 as u32 => type_ids::U16,
    i16 as i32 => type_ids::I16,
    u32 as u32 => type_ids::U32,
    i32 as i32 => type_ids::I32,
    u64 as u64 => type_ids::U64,
    i64 as i64 => type_ids::I64,
);
