// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bit-addressable read/write buffer.
//!
//! # Layout
//!
//! Bits are stored LSB-first: stream bit `n` lives in byte `n / 8`, bit
//! `n % 8`. Multi-byte values are little-endian. A `u16` written at bit 3
//! therefore occupies bits 3..19 with its low byte first.
//!
//! # Storage
//!
//! - **Owned** - internal `Vec<u8>`, grows to `needed + 4*8 + needed/2` bits
//! - **External** - caller's `&mut [u8]`, never reallocated; overflowing it is an error
//! - **View** - caller's `&[u8]`, read-only (zero-copy decode of memory streams)
//!
//! # Example
//!
//! ```
//! use bitrefl::bitstream::Bitstream;
//!
//! let mut bs = Bitstream::new();
//! bs.write(&true).unwrap();
//! bs.write_varint(300u32).unwrap();
//! bs.write_range(987u32, 500, 1000).unwrap();
//! assert_eq!(bs.size(), 1 + 16 + 9);
//!
//! bs.seek(0);
//! assert!(bs.read::<bool>().unwrap());
//! assert_eq!(bs.read_varint::<u32>().unwrap(), 300);
//! assert_eq!(bs.read_range(500u32, 1000).unwrap(), 987);
//! ```

use crate::bitstream::quantize::{bits_for_range, uint_to_unorm, unorm_to_uint};
use crate::bitstream::varint::{read_varint_with, varint_bytes, VarInt};
use crate::error::{Error, Result};
use crate::math::{Quaternion, Vector3};

/// Default bit width of `write_norm` / float `write_range`.
pub const DEFAULT_NORM_BITS: u32 = 16;

#[derive(Debug)]
enum Storage<'a> {
    Owned(Vec<u8>),
    External(&'a mut [u8]),
    View(&'a [u8]),
}

/// Bit-granular buffer with a cursor.
///
/// Invariants: `cursor <= capacity` and `size <= capacity` (all in bits).
/// Writes past `size` extend it; reads past `size` fail.
#[derive(Debug)]
pub struct Bitstream<'a> {
    storage: Storage<'a>,
    size: u64,
    cursor: u64,
}

#[inline]
fn low_mask(bits: u32) -> u8 {
    if bits >= 8 {
        0xFF
    } else {
        (1u8 << bits) - 1
    }
}

impl Bitstream<'static> {
    /// Empty stream with internal, growable storage.
    pub fn new() -> Self {
        Self {
            storage: Storage::Owned(Vec::new()),
            size: 0,
            cursor: 0,
        }
    }

    /// Empty owned stream with room for `bytes` bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            storage: Storage::Owned(vec![0; bytes]),
            size: 0,
            cursor: 0,
        }
    }

    /// Take ownership of existing bytes; the whole vector is readable.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let size = data.len() as u64 * 8;
        Self {
            storage: Storage::Owned(data),
            size,
            cursor: 0,
        }
    }
}

impl Default for Bitstream<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Bitstream<'_> {
    /// Copies always own their buffer, whatever the source storage.
    fn clone(&self) -> Self {
        Self {
            storage: Storage::Owned(self.buffer().to_vec()),
            size: self.size,
            cursor: self.cursor,
        }
    }
}

impl<'a> Bitstream<'a> {
    /// Write into caller memory. The slice is never reallocated.
    pub fn wrap_mut(buf: &'a mut [u8]) -> Self {
        Self {
            storage: Storage::External(buf),
            size: 0,
            cursor: 0,
        }
    }

    /// Read-only view over caller memory; all bytes are readable.
    pub fn view(buf: &'a [u8]) -> Self {
        let size = buf.len() as u64 * 8;
        Self {
            storage: Storage::View(buf),
            size,
            cursor: 0,
        }
    }

    fn buffer(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(v) => v,
            Storage::External(b) => b,
            Storage::View(b) => b,
        }
    }

    fn buffer_mut(&mut self) -> Result<&mut [u8]> {
        match &mut self.storage {
            Storage::Owned(v) => Ok(v.as_mut_slice()),
            Storage::External(b) => Ok(&mut **b),
            Storage::View(_) => Err(Error::ReadOnly),
        }
    }

    /// Whether the buffer is internally owned (and may grow).
    pub fn owns_memory(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    /// Capacity in bits.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.buffer().len() as u64 * 8
    }

    /// Number of valid bits.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Cursor position in bits.
    #[inline]
    pub fn tell(&self) -> u64 {
        self.cursor
    }

    /// Bits between the cursor and the end of valid data.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.cursor)
    }

    /// Valid data, rounded up to whole bytes.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.size.div_ceil(8) as usize;
        &self.buffer()[..len]
    }

    /// Valid data as an owned vector (trailing partial byte zero-padded).
    pub fn into_vec(self) -> Vec<u8> {
        let len = self.size.div_ceil(8) as usize;
        match self.storage {
            Storage::Owned(mut v) => {
                v.truncate(len);
                v
            }
            Storage::External(b) => b[..len].to_vec(),
            Storage::View(b) => b[..len].to_vec(),
        }
    }

    fn ensure_capacity(&mut self, end_bits: u64) -> Result<()> {
        let capacity = self.capacity();
        if end_bits <= capacity {
            return Ok(());
        }
        match &mut self.storage {
            Storage::Owned(v) => {
                let grown = end_bits + 4 * 8 + end_bits / 2;
                v.resize(grown.div_ceil(8) as usize, 0);
                Ok(())
            }
            Storage::External(_) => Err(Error::ExternalCapacity {
                requested: end_bits,
                capacity,
            }),
            Storage::View(_) => Err(Error::ReadOnly),
        }
    }

    /// Make room for at least `bytes` bytes without touching content.
    pub fn reserve(&mut self, bytes: usize) -> Result<()> {
        let wanted = bytes as u64 * 8;
        let capacity = self.capacity();
        if wanted <= capacity {
            return Ok(());
        }
        match &mut self.storage {
            Storage::Owned(v) => {
                v.resize(bytes, 0);
                Ok(())
            }
            Storage::External(_) => Err(Error::ExternalCapacity {
                requested: wanted,
                capacity,
            }),
            Storage::View(_) => Err(Error::ReadOnly),
        }
    }

    /// Set the valid size to `bytes` bytes, growing capacity if needed.
    pub fn resize(&mut self, bytes: usize) -> Result<()> {
        self.reserve(bytes)?;
        self.size = bytes as u64 * 8;
        self.cursor = self.cursor.min(self.capacity());
        Ok(())
    }

    // ===================================================================
    // Raw bit access
    // ===================================================================

    /// Write the low `count` bits of `data` (LSB-first) at the cursor.
    ///
    /// Returns the number of bits written.
    pub fn write_bits(&mut self, data: &[u8], count: u64) -> Result<u64> {
        if count == 0 {
            return Ok(0);
        }
        if (data.len() as u64) * 8 < count {
            return Err(Error::UnexpectedEof {
                cursor: 0,
                requested: count,
                size: data.len() as u64 * 8,
            });
        }

        let cursor = self.cursor;
        let end = cursor + count;
        self.ensure_capacity(end)?;
        let buf = self.buffer_mut()?;

        let shift = (cursor % 8) as u32;
        let mut dst = (cursor / 8) as usize;

        if shift == 0 {
            // Aligned fast path: block copy, then the trailing partial byte.
            let whole = (count / 8) as usize;
            buf[dst..dst + whole].copy_from_slice(&data[..whole]);
            dst += whole;
            let rem = (count % 8) as u32;
            if rem > 0 {
                let mask = low_mask(rem);
                buf[dst] = (buf[dst] & !mask) | (data[whole] & mask);
            }
        } else {
            let mut remaining = count;
            for &byte in data {
                if remaining == 0 {
                    break;
                }
                let nbits = remaining.min(8) as u32;
                let mask = u16::from(low_mask(nbits)) << shift;
                let value = (u16::from(byte) << shift) & mask;
                buf[dst] = (buf[dst] & !(mask as u8)) | value as u8;
                if shift + nbits > 8 {
                    let hi_mask = (mask >> 8) as u8;
                    buf[dst + 1] = (buf[dst + 1] & !hi_mask) | (value >> 8) as u8;
                }
                dst += 1;
                remaining -= u64::from(nbits);
            }
        }

        self.cursor = end;
        self.size = self.size.max(end);
        Ok(count)
    }

    /// Read `count` bits at the cursor into `out` (LSB-first).
    ///
    /// Unused high bits of the last touched byte of `out` are cleared.
    pub fn read_bits(&mut self, out: &mut [u8], count: u64) -> Result<u64> {
        if count == 0 {
            return Ok(0);
        }
        let cursor = self.cursor;
        if cursor + count > self.size {
            return Err(Error::UnexpectedEof {
                cursor,
                requested: count,
                size: self.size,
            });
        }
        if (out.len() as u64) * 8 < count {
            return Err(Error::UnexpectedEof {
                cursor: 0,
                requested: count,
                size: out.len() as u64 * 8,
            });
        }

        let buf = self.buffer();
        let shift = (cursor % 8) as u32;
        let mut src = (cursor / 8) as usize;

        if shift == 0 {
            let whole = (count / 8) as usize;
            out[..whole].copy_from_slice(&buf[src..src + whole]);
            src += whole;
            let rem = (count % 8) as u32;
            if rem > 0 {
                out[whole] = buf[src] & low_mask(rem);
            }
        } else {
            let mut remaining = count;
            for slot in out.iter_mut() {
                if remaining == 0 {
                    break;
                }
                let nbits = remaining.min(8) as u32;
                let lo = u16::from(buf[src]);
                let hi = if shift + nbits > 8 {
                    u16::from(buf[src + 1])
                } else {
                    0
                };
                *slot = (((lo | (hi << 8)) >> shift) as u8) & low_mask(nbits);
                src += 1;
                remaining -= u64::from(nbits);
            }
        }

        self.cursor = cursor + count;
        Ok(count)
    }

    /// Write the low `count` (<= 64) bits of `value`.
    #[inline]
    pub fn write_bits_u64(&mut self, value: u64, count: u32) -> Result<()> {
        let count = count.min(64);
        self.write_bits(&value.to_le_bytes(), u64::from(count))?;
        Ok(())
    }

    /// Read `count` (<= 64) bits as an unsigned integer.
    #[inline]
    pub fn read_bits_u64(&mut self, count: u32) -> Result<u64> {
        let count = count.min(64);
        let mut bytes = [0u8; 8];
        self.read_bits(&mut bytes, u64::from(count))?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read `count` (<= 64) bits without moving the cursor.
    pub fn peek_bits_u64(&mut self, count: u32) -> Result<u64> {
        let cursor = self.cursor;
        let value = self.read_bits_u64(count);
        self.cursor = cursor;
        value
    }

    /// Byte-granularity write; never compressed.
    #[inline]
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.write_bits(data, data.len() as u64 * 8)?;
        Ok(())
    }

    /// Byte-granularity read filling `out` completely.
    #[inline]
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let count = out.len() as u64 * 8;
        self.read_bits(out, count)?;
        Ok(())
    }

    // ===================================================================
    // Typed values
    // ===================================================================

    /// Write a value at its natural width (`bool` takes exactly 1 bit).
    #[inline]
    pub fn write<T: BitPrimitive>(&mut self, value: &T) -> Result<()> {
        value.write_to(self)
    }

    /// Mirror of [`Bitstream::write`].
    #[inline]
    pub fn read<T: BitPrimitive>(&mut self) -> Result<T> {
        T::read_from(self)
    }

    /// Length-prefixed (varint) UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| Error::VarintOverflow { bits: 32 })?;
        self.write_varint(len)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len: u32 = self.read_varint()?;
        let needed = u64::from(len) * 8;
        if needed > self.remaining() {
            return Err(Error::UnexpectedEof {
                cursor: self.cursor,
                requested: needed,
                size: self.size,
            });
        }
        let mut bytes = vec![0u8; len as usize];
        self.read_bytes(&mut bytes)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// One "clean" bit, then the value only if it differs from `last`.
    pub fn write_delta<T: BitPrimitive>(&mut self, value: &T, last: &T) -> Result<()> {
        if value == last {
            self.write(&true)
        } else {
            self.write(&false)?;
            self.write(value)
        }
    }

    pub fn read_delta<T: BitPrimitive>(&mut self, last: &T) -> Result<T> {
        if self.read::<bool>()? {
            Ok(last.clone())
        } else {
            self.read()
        }
    }

    // ===================================================================
    // Varints
    // ===================================================================

    /// Base-128 varint; signed types are zig-zag folded.
    pub fn write_varint<T: VarInt>(&mut self, value: T) -> Result<()> {
        let (bytes, len) = varint_bytes(value.fold());
        self.write_bytes(&bytes[..len])
    }

    pub fn read_varint<T: VarInt>(&mut self) -> Result<T> {
        read_varint_with(|| Ok(self.read_bits_u64(8)? as u8))
    }

    pub fn write_varint_delta<T: VarInt>(&mut self, value: T, last: T) -> Result<()> {
        if value == last {
            self.write(&true)
        } else {
            self.write(&false)?;
            self.write_varint(value)
        }
    }

    pub fn read_varint_delta<T: VarInt>(&mut self, last: T) -> Result<T> {
        if self.read::<bool>()? {
            Ok(last)
        } else {
            self.read_varint()
        }
    }

    // ===================================================================
    // Quantized encodings
    // ===================================================================

    /// Quantize a normalized value to `bits` bits per component.
    ///
    /// `f32` is treated as `[0, 1]`; vectors and quaternions as `[-1, 1]` per
    /// component.
    pub fn write_norm<T: NormEncode>(&mut self, value: &T, bits: u32) -> Result<()> {
        value.write_norm(self, bits)
    }

    pub fn read_norm<T: NormEncode>(&mut self, bits: u32) -> Result<T> {
        T::read_norm(self, bits)
    }

    pub fn write_norm_delta<T: NormEncode>(&mut self, value: &T, last: &T, bits: u32) -> Result<()> {
        if value == last {
            self.write(&true)
        } else {
            self.write(&false)?;
            self.write_norm(value, bits)
        }
    }

    pub fn read_norm_delta<T: NormEncode>(&mut self, last: &T, bits: u32) -> Result<T> {
        if self.read::<bool>()? {
            Ok(*last)
        } else {
            self.read_norm(bits)
        }
    }

    /// Offset from `min` in exactly enough bits to hold `max - min`.
    pub fn write_range<T: RangeInt>(&mut self, value: T, min: T, max: T) -> Result<()> {
        let bits = bits_for_range(max.offset_from(min));
        let offset = value.clamp_to(min, max).offset_from(min);
        self.write_bits_u64(offset, bits)
    }

    pub fn read_range<T: RangeInt>(&mut self, min: T, max: T) -> Result<T> {
        let bits = bits_for_range(max.offset_from(min));
        let offset = self.read_bits_u64(bits)?;
        Ok(T::from_offset(min, offset))
    }

    pub fn write_range_delta<T: RangeInt>(&mut self, value: T, last: T, min: T, max: T) -> Result<()> {
        if value == last {
            self.write(&true)
        } else {
            self.write(&false)?;
            self.write_range(value, min, max)
        }
    }

    pub fn read_range_delta<T: RangeInt>(&mut self, last: T, min: T, max: T) -> Result<T> {
        if self.read::<bool>()? {
            Ok(last)
        } else {
            self.read_range(min, max)
        }
    }

    /// Float in `[min, max]` quantized to `bits` bits.
    pub fn write_range_f32(&mut self, value: f32, min: f32, max: f32, bits: u32) -> Result<()> {
        let span = max - min;
        let pct = if span.abs() <= f32::EPSILON {
            0.0
        } else {
            ((value - min) / span).clamp(0.0, 1.0)
        };
        self.write_norm(&pct, bits)
    }

    pub fn read_range_f32(&mut self, min: f32, max: f32, bits: u32) -> Result<f32> {
        let pct: f32 = self.read_norm(bits)?;
        Ok(min + (max - min) * pct)
    }

    pub fn write_range_f32_delta(
        &mut self,
        value: f32,
        last: f32,
        min: f32,
        max: f32,
        bits: u32,
    ) -> Result<()> {
        if value == last {
            self.write(&true)
        } else {
            self.write(&false)?;
            self.write_range_f32(value, min, max, bits)
        }
    }

    pub fn read_range_f32_delta(&mut self, last: f32, min: f32, max: f32, bits: u32) -> Result<f32> {
        if self.read::<bool>()? {
            Ok(last)
        } else {
            self.read_range_f32(min, max, bits)
        }
    }

    // ===================================================================
    // Cursor
    // ===================================================================

    /// Move the cursor by `count` bits, clamped to `[0, capacity]`.
    pub fn skip(&mut self, count: i64) {
        let target = if count < 0 {
            self.cursor.saturating_sub(count.unsigned_abs())
        } else {
            self.cursor.saturating_add(count as u64)
        };
        self.cursor = target.min(self.capacity());
    }

    /// Place the cursor at `pos` bits, clamped to capacity.
    pub fn seek(&mut self, pos: u64) {
        self.cursor = pos.min(self.capacity());
    }

    /// Advance to the next multiple of `bytes` bytes (no-op for 0).
    pub fn align(&mut self, bytes: u32) {
        if bytes == 0 {
            return;
        }
        let unit = u64::from(bytes) * 8;
        let rem = self.cursor % unit;
        if rem != 0 {
            // Aligning may land past the current end; grow so the cursor stays valid.
            let target = self.cursor + (unit - rem);
            if target > self.capacity() && self.ensure_capacity(target).is_err() {
                self.cursor = self.capacity();
                return;
            }
            self.cursor = target;
        }
    }

    // ===================================================================
    // Buffer maintenance for the buffered reader/writer
    // ===================================================================

    /// Drop the first `bytes` bytes, shifting the rest to the front.
    pub(crate) fn discard_front(&mut self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let bits = bytes as u64 * 8;
        if let Storage::Owned(v) = &mut self.storage {
            let valid = self.size.div_ceil(8) as usize;
            let bytes = bytes.min(valid);
            v.copy_within(bytes..valid, 0);
            // Bits past `size` must stay zero so a final flush pads with zeros.
            v[valid - bytes..valid].fill(0);
        }
        self.size = self.size.saturating_sub(bits);
        self.cursor = self.cursor.saturating_sub(bits);
    }

    /// Append raw bytes after the valid data (buffer refill).
    pub(crate) fn append_bytes(&mut self, data: &[u8]) -> Result<()> {
        let start = self.size.div_ceil(8) * 8;
        let end = start + data.len() as u64 * 8;
        self.ensure_capacity(end)?;
        let from = (start / 8) as usize;
        let buf = self.buffer_mut()?;
        buf[from..from + data.len()].copy_from_slice(data);
        self.size = end;
        Ok(())
    }

    /// Zero-length window with the cursor at `bit_offset` (< 8) into it.
    pub(crate) fn reset_window(&mut self, bit_offset: u64) {
        self.size = 0;
        self.cursor = bit_offset.min(7);
    }

    /// Forget all content, keeping the allocation. Owned buffers are zeroed.
    pub fn clear(&mut self) {
        let valid = self.size.div_ceil(8) as usize;
        if let Storage::Owned(v) = &mut self.storage {
            v[..valid].fill(0);
        }
        self.size = 0;
        self.cursor = 0;
    }
}

// =======================================================================
// Value traits
// =======================================================================

/// Types with a natural fixed-width bit representation.
pub trait BitPrimitive: Sized + Clone + PartialEq {
    fn write_to(&self, stream: &mut Bitstream<'_>) -> Result<()>;
    fn read_from(stream: &mut Bitstream<'_>) -> Result<Self>;
}

impl BitPrimitive for bool {
    fn write_to(&self, stream: &mut Bitstream<'_>) -> Result<()> {
        stream.write_bits(&[u8::from(*self)], 1)?;
        Ok(())
    }

    fn read_from(stream: &mut Bitstream<'_>) -> Result<Self> {
        let mut byte = [0u8; 1];
        stream.read_bits(&mut byte, 1)?;
        Ok(byte[0] != 0)
    }
}

macro_rules! impl_bit_primitive_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BitPrimitive for $ty {
                #[inline]
                fn write_to(&self, stream: &mut Bitstream<'_>) -> Result<()> {
                    stream.write_bytes(&self.to_le_bytes())
                }

                #[inline]
                fn read_from(stream: &mut Bitstream<'_>) -> Result<Self> {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    stream.read_bytes(&mut bytes)?;
                    Ok(<$ty>::from_le_bytes(bytes))
                }
            }
        )*
    };
}

impl_bit_primitive_le!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl BitPrimitive for String {
    fn write_to(&self, stream: &mut Bitstream<'_>) -> Result<()> {
        stream.write_str(self)
    }

    fn read_from(stream: &mut Bitstream<'_>) -> Result<Self> {
        stream.read_str()
    }
}

impl BitPrimitive for Vector3 {
    fn write_to(&self, stream: &mut Bitstream<'_>) -> Result<()> {
        stream.write_bytes(bytemuck::bytes_of(self))
    }

    fn read_from(stream: &mut Bitstream<'_>) -> Result<Self> {
        let mut value = Self::default();
        stream.read_bytes(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }
}

impl BitPrimitive for Quaternion {
    fn write_to(&self, stream: &mut Bitstream<'_>) -> Result<()> {
        stream.write_bytes(bytemuck::bytes_of(self))
    }

    fn read_from(stream: &mut Bitstream<'_>) -> Result<Self> {
        let mut value = Self::default();
        stream.read_bytes(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }
}

/// Integers that can be range-encoded as an offset from a minimum.
pub trait RangeInt: Copy + PartialOrd {
    fn offset_from(self, min: Self) -> u64;
    fn from_offset(min: Self, offset: u64) -> Self;

    fn clamp_to(self, min: Self, max: Self) -> Self {
        if self < min {
            min
        } else if self > max {
            max
        } else {
            self
        }
    }
}

macro_rules! impl_range_int {
    ($($ty:ty => $wide:ty),* $(,)?) => {
        $(
            impl RangeInt for $ty {
                #[inline]
                fn offset_from(self, min: Self) -> u64 {
                    (self as $wide).wrapping_sub(min as $wide) as u64
                }

                #[inline]
                fn from_offset(min: Self, offset: u64) -> Self {
                    (min as $wide).wrapping_add(offset as $wide) as $ty
                }
            }
        )*
    };
}

impl_range_int!(
    u8 => u64, u16 => u64, u32 => u64, u64 => u64,
    i8 => i64, i16 => i64, i32 => i64, i64 => i64,
);

/// Values with a normalized fixed-point encoding.
pub trait NormEncode: Copy + PartialEq {
    fn write_norm(&self, stream: &mut Bitstream<'_>, bits: u32) -> Result<()>;
    fn read_norm(stream: &mut Bitstream<'_>, bits: u32) -> Result<Self>;
}

impl NormEncode for f32 {
    fn write_norm(&self, stream: &mut Bitstream<'_>, bits: u32) -> Result<()> {
        let bits = bits.clamp(1, 32);
        stream.write_bits_u64(u64::from(unorm_to_uint(*self, bits)), bits)
    }

    fn read_norm(stream: &mut Bitstream<'_>, bits: u32) -> Result<Self> {
        let bits = bits.clamp(1, 32);
        let code = stream.read_bits_u64(bits)? as u32;
        Ok(uint_to_unorm(code, bits))
    }
}

impl NormEncode for Vector3 {
    fn write_norm(&self, stream: &mut Bitstream<'_>, bits: u32) -> Result<()> {
        for c in [self.x, self.y, self.z] {
            stream.write_range_f32(c, -1.0, 1.0, bits)?;
        }
        Ok(())
    }

    fn read_norm(stream: &mut Bitstream<'_>, bits: u32) -> Result<Self> {
        Ok(Vector3::new(
            stream.read_range_f32(-1.0, 1.0, bits)?,
            stream.read_range_f32(-1.0, 1.0, bits)?,
            stream.read_range_f32(-1.0, 1.0, bits)?,
        ))
    }
}

impl NormEncode for Quaternion {
    fn write_norm(&self, stream: &mut Bitstream<'_>, bits: u32) -> Result<()> {
        for c in [self.x, self.y, self.z, self.w] {
            stream.write_range_f32(c, -1.0, 1.0, bits)?;
        }
        Ok(())
    }

    fn read_norm(stream: &mut Bitstream<'_>, bits: u32) -> Result<Self> {
        Ok(Quaternion::new(
            stream.read_range_f32(-1.0, 1.0, bits)?,
            stream.read_range_f32(-1.0, 1.0, bits)?,
            stream.read_range_f32(-1.0, 1.0, bits)?,
            stream.read_range_f32(-1.0, 1.0, bits)?,
        ))
    }
}
