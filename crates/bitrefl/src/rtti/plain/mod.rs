// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plain (value) type codecs.
//!
//! A plain type is anything serialized as a value rather than walked field by
//! field: integers, floats, strings, containers, POD structs. Each one
//! implements [`PlainType`], which is the extension point for new value types.
//!
//! # Encodings
//!
//! | Type | uncompressed | compressed |
//! |------|--------------|------------|
//! | `bool` | 1 byte | 1 bit |
//! | `u8`/`i8` | 1 byte | 1 byte |
//! | `u16`..`i64` | full width | varint (signed: zig-zag) |
//! | `f32`/`f64` | full width | full width |
//! | dynamic types | u32 byte-count header + payload | varint bit-count header + payload |
//!
//! Size headers count themselves, so a reader that cannot interpret a payload
//! can always skip it: read the header, seek `start + total`.

pub mod containers;
pub mod primitives;
pub mod values;
pub mod versioned;

use crate::bitstream::varint::varint_len;
use crate::bitstream::{BitLength, Bitstream};
use crate::error::{Error, Result};
use crate::rtti::field::FieldInfo;

pub use versioned::VersionedPlainType;

/// Stable ids of plain types. Ids up to [`type_ids::MAX_BUILTIN`] are builtins
/// whose encoding a reader can skip from the id alone.
pub mod type_ids {
    pub const BOOL: u32 = 1;
    pub const U8: u32 = 2;
    pub const I8: u32 = 3;
    pub const U16: u32 = 4;
    pub const I16: u32 = 5;
    pub const U32: u32 = 6;
    pub const I32: u32 = 7;
    pub const U64: u32 = 8;
    pub const I64: u32 = 9;
    pub const F32: u32 = 10;
    pub const F64: u32 = 11;
    pub const MAX_BUILTIN: u32 = 15;

    pub const STRING: u32 = 20;
    pub const PATH: u32 = 21;

    pub const VEC: u32 = 30;
    pub const HASH_MAP: u32 = 31;
    pub const BTREE_MAP: u32 = 32;
    pub const PAIR: u32 = 33;
    pub const HASH_SET: u32 = 34;
    pub const BTREE_SET: u32 = 35;
    pub const OPTION: u32 = 36;

    pub const VECTOR3: u32 = 40;
    pub const QUATERNION: u32 = 41;
    pub const COLOR: u32 = 42;

    pub const FIELD_KIND: u32 = 50;
    pub const FIELD_FLAGS: u32 = 51;

    /// First id available to plain types defined outside this crate.
    pub const FIRST_USER: u32 = 1000;
}

/// Codec for a value type.
///
/// Implementations must be symmetric: `from_stream` consumes exactly what
/// `to_stream` produced for the same `compress` flag. Types with
/// `HAS_DYNAMIC_SIZE` must frame their payload with
/// [`write_with_size_header`] so unknown versions can be skipped.
pub trait PlainType: Default + 'static {
    /// Stable id; builtins use ids up to [`type_ids::MAX_BUILTIN`].
    const TYPE_ID: u32;
    /// Whether the encoded size depends on the value.
    const HAS_DYNAMIC_SIZE: bool;
    /// Encoded size in bytes when not dynamic (uncompressed form).
    const STATIC_SIZE: u32;

    /// Encode at the cursor, returning the bits written.
    fn to_stream(&self, stream: &mut Bitstream<'_>, info: &FieldInfo, compress: bool)
        -> Result<BitLength>;

    /// Decode at the cursor into `self`, returning the bits consumed.
    fn from_stream(
        &mut self,
        stream: &mut Bitstream<'_>,
        info: &FieldInfo,
        compress: bool,
    ) -> Result<BitLength>;

    /// Size `to_stream` would produce.
    fn encoded_size(&self, compress: bool) -> BitLength;
}

/// Whether `type_id` names a builtin scalar.
#[inline]
pub const fn is_builtin(type_id: u32) -> bool {
    type_id >= type_ids::BOOL && type_id <= type_ids::MAX_BUILTIN
}

/// Uncompressed byte width of a builtin scalar.
pub const fn builtin_size(type_id: u32) -> Option<u32> {
    match type_id {
        type_ids::BOOL | type_ids::U8 | type_ids::I8 => Some(1),
        type_ids::U16 | type_ids::I16 => Some(2),
        type_ids::U32 | type_ids::I32 | type_ids::F32 => Some(4),
        type_ids::U64 | type_ids::I64 | type_ids::F64 => Some(8),
        _ => None,
    }
}

/// Advance past one builtin scalar without interpreting it.
pub fn skip_builtin(stream: &mut Bitstream<'_>, type_id: u32, compress: bool) -> Result<BitLength> {
    let start = stream.tell();
    let Some(bytes) = builtin_size(type_id) else {
        return Err(Error::corrupt(start, format!("unknown builtin type id {type_id}")));
    };
    if !compress {
        return skip_checked(stream, u64::from(bytes) * 8);
    }
    match type_id {
        type_ids::BOOL => skip_checked(stream, 1),
        type_ids::U8 | type_ids::I8 | type_ids::F32 | type_ids::F64 => {
            skip_checked(stream, u64::from(bytes) * 8)
        }
        type_ids::U16 | type_ids::I16 | type_ids::U32 | type_ids::I32 => {
            stream.read_varint::<u32>()?;
            Ok(BitLength::from_bits(stream.tell() - start))
        }
        _ => {
            stream.read_varint::<u64>()?;
            Ok(BitLength::from_bits(stream.tell() - start))
        }
    }
}

/// Longest encoding of a builtin (compressed or not), for preloading.
pub const fn builtin_max_bits(type_id: u32) -> u64 {
    match builtin_size(type_id) {
        Some(bytes) => {
            let varint = if bytes == 8 { 10 } else { 5 };
            let raw = bytes as u64;
            (if raw > varint { raw } else { varint }) * 8
        }
        None => 0,
    }
}

fn skip_checked(stream: &mut Bitstream<'_>, bits: u64) -> Result<BitLength> {
    if bits > stream.remaining() {
        return Err(Error::UnexpectedEof {
            cursor: stream.tell(),
            requested: bits,
            size: stream.size(),
        });
    }
    stream.skip(bits as i64);
    Ok(BitLength::from_bits(bits))
}

// =======================================================================
// Size headers
// =======================================================================

/// Width of the uncompressed size header.
pub const SIZE_HEADER_BYTES: u32 = 4;

/// Header width needed in front of a payload of `payload` bits.
pub fn size_header_len(payload: BitLength, compress: bool) -> BitLength {
    if !compress {
        return BitLength::from_bytes(SIZE_HEADER_BYTES);
    }
    let payload = payload.get_bits();
    let mut header = 8u64;
    loop {
        let needed = varint_len(payload + header) as u64 * 8;
        if needed == header {
            return BitLength::from_bits(header);
        }
        header = needed;
    }
}

/// Total framed size (header included) of a `payload`-bit body.
///
/// Uncompressed frames are whole bytes, so the payload is padded up to the
/// next byte boundary.
pub fn framed_len(payload: BitLength, compress: bool) -> BitLength {
    let total = payload + size_header_len(payload, compress);
    if compress {
        total
    } else {
        BitLength::from_bits(total.get_bits().div_ceil(8) * 8)
    }
}

/// Frame `body` with a size header that counts itself.
///
/// Uncompressed: u32 byte count, backfilled after the payload, which is
/// zero-padded to a byte boundary. Compressed: varint bit count; the payload
/// is staged first so the header width is known.
pub fn write_with_size_header<F>(stream: &mut Bitstream<'_>, compress: bool, body: F) -> Result<BitLength>
where
    F: FnOnce(&mut Bitstream<'_>) -> Result<()>,
{
    if compress {
        let mut staged = Bitstream::new();
        body(&mut staged)?;
        let payload = BitLength::from_bits(staged.size());
        let total = payload + size_header_len(payload, true);
        stream.write_varint(total.get_bits())?;
        stream.write_bits(staged.as_bytes(), staged.size())?;
        return Ok(total);
    }

    let start = stream.tell();
    stream.write(&0u32)?;
    body(stream)?;
    let total_bits = (stream.tell() - start).div_ceil(8) * 8;
    let total_bytes = u32::try_from(total_bits / 8)
        .map_err(|_| Error::corrupt(start, "payload exceeds u32 byte count"))?;
    let pad = start + total_bits - stream.tell();
    if pad > 0 {
        stream.write_bits_u64(0, pad as u32)?;
    }
    let end = stream.tell();
    stream.seek(start);
    stream.write(&total_bytes)?;
    stream.seek(end);
    Ok(BitLength::from_bits(total_bits))
}

/// Read a size header, returning the framed total (header included).
pub fn read_size_header(stream: &mut Bitstream<'_>, compress: bool) -> Result<BitLength> {
    if compress {
        let bits: u64 = stream.read_varint()?;
        Ok(BitLength::from_bits(bits))
    } else {
        let bytes: u32 = stream.read()?;
        Ok(BitLength::from_bytes(bytes))
    }
}

/// Read a size header without moving the cursor.
pub fn peek_size_header(stream: &mut Bitstream<'_>, compress: bool) -> Result<BitLength> {
    let start = stream.tell();
    let total = read_size_header(stream, compress);
    stream.seek(start);
    total
}

/// Decode a framed payload: reads the header, runs `body`, then places the
/// cursor exactly at the end of the frame whatever `body` consumed.
///
/// `body` receives the payload length in bits.
pub fn read_with_size_header<F>(stream: &mut Bitstream<'_>, compress: bool, body: F) -> Result<BitLength>
where
    F: FnOnce(&mut Bitstream<'_>, u64) -> Result<()>,
{
    let start = stream.tell();
    let total = read_size_header(stream, compress)?;
    let header = stream.tell() - start;
    let end = start + total.get_bits();
    if total.get_bits() < header || end > stream.size() {
        return Err(Error::corrupt(
            start,
            format!("size header {} does not fit the stream", total),
        ));
    }
    let result = body(stream, total.get_bits() - header);
    stream.seek(end);
    result.map(|()| total)
}

/// Length prefix used by containers: u32, or varint when compressed.
pub(crate) fn write_count(stream: &mut Bitstream<'_>, count: usize, compress: bool) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| Error::VarintOverflow { bits: 32 })?;
    if compress {
        stream.write_varint(count)
    } else {
        stream.write(&count)
    }
}

pub(crate) fn read_count(stream: &mut Bitstream<'_>, compress: bool) -> Result<u32> {
    if compress {
        stream.read_varint()
    } else {
        stream.read()
    }
}

pub(crate) fn count_len(count: usize, compress: bool) -> BitLength {
    if compress {
        BitLength::from_bytes(varint_len(count as u64) as u32)
    } else {
        BitLength::from_bytes(4)
    }
}
