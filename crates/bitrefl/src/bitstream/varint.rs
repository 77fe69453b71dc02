// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Base-128 varints as the bitstream stores them.
//!
//! Seven value bits per byte, least significant group first, high bit set on
//! every byte but the last. The bytes go through the bit cursor, so a varint
//! may start at any bit offset. Signed integers are zig-zag folded so that
//! small magnitudes of either sign stay short.
//!
//! | value | bytes |
//! |-------|-------|
//! | `0..=127` | 1 |
//! | `128..=16383` | 2 |
//! | `u32::MAX` | 5 |
//! | `u64::MAX` | 10 |

use crate::error::{Error, Result};

/// Longest encoding of a 64-bit value.
pub const MAX_VARINT_LEN: usize = 10;

/// Longest encoding of a 32-bit value.
pub const MAX_VARINT_LEN_32: usize = 5;

const MORE: u8 = 0x80;
const GROUP: u64 = 0x7F;

/// Integers with a varint encoding.
pub trait VarInt: Copy + PartialEq {
    /// Payload width, bounds the encoded length (5 or 10 bytes).
    const BITS: u32;

    /// Map to the unsigned value that is actually encoded.
    fn fold(self) -> u64;

    /// Inverse of [`fold`](VarInt::fold); `None` when `raw` is out of range.
    fn unfold(raw: u64) -> Option<Self>;

    /// Longest encoding for this width.
    fn max_len() -> usize {
        if Self::BITS <= 32 {
            MAX_VARINT_LEN_32
        } else {
            MAX_VARINT_LEN
        }
    }
}

impl VarInt for u32 {
    const BITS: u32 = 32;
    fn fold(self) -> u64 {
        u64::from(self)
    }
    fn unfold(raw: u64) -> Option<Self> {
        u32::try_from(raw).ok()
    }
}

impl VarInt for i32 {
    const BITS: u32 = 32;
    fn fold(self) -> u64 {
        u64::from(((self << 1) ^ (self >> 31)) as u32)
    }
    fn unfold(raw: u64) -> Option<Self> {
        let raw = u32::try_from(raw).ok()?;
        Some(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }
}

impl VarInt for u64 {
    const BITS: u32 = 64;
    fn fold(self) -> u64 {
        self
    }
    fn unfold(raw: u64) -> Option<Self> {
        Some(raw)
    }
}

impl VarInt for i64 {
    const BITS: u32 = 64;
    fn fold(self) -> u64 {
        ((self << 1) ^ (self >> 63)) as u64
    }
    fn unfold(raw: u64) -> Option<Self> {
        Some(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }
}

/// Encoded length of an already folded value.
#[must_use]
pub const fn varint_len(folded: u64) -> usize {
    if folded == 0 {
        return 1;
    }
    let bits = 64 - folded.leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Split a folded value into its varint bytes; only the first `len` are used.
pub fn varint_bytes(mut folded: u64) -> ([u8; MAX_VARINT_LEN], usize) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        let group = (folded & GROUP) as u8;
        folded >>= 7;
        if folded == 0 {
            buf[len] = group;
            return (buf, len + 1);
        }
        buf[len] = group | MORE;
        len += 1;
    }
}

/// Reassemble a `T` from bytes pulled one at a time from `next`.
///
/// Stops at the first byte without the continuation bit. Encodings longer
/// than [`VarInt::max_len`] or values outside `T` are
/// [`Error::VarintOverflow`]; errors from `next` (end of stream) pass through.
pub fn read_varint_with<T, F>(mut next: F) -> Result<T>
where
    T: VarInt,
    F: FnMut() -> Result<u8>,
{
    let overflow = Error::VarintOverflow { bits: T::BITS };
    let mut raw = 0u64;
    for index in 0..T::max_len() {
        let byte = next()?;
        let group = u64::from(byte) & GROUP;
        let shift = 7 * index as u32;
        // Tenth byte of a u64 carries a single bit.
        if shift == 63 && group > 1 {
            return Err(overflow);
        }
        raw |= group << shift;
        if byte & MORE == 0 {
            return T::unfold(raw).ok_or(overflow);
        }
    }
    Err(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<T: VarInt>(bytes: &[u8]) -> Result<T> {
        let mut iter = bytes.iter().copied();
        read_varint_with(|| {
            iter.next().ok_or(Error::UnexpectedEof {
                cursor: 0,
                requested: 8,
                size: 0,
            })
        })
    }

    #[test]
    fn test_known_encodings() {
        let cases: [(u64, &[u8]); 5] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (300, &[0xAC, 0x02]),
            (16384, &[0x80, 0x80, 0x01]),
        ];
        for (value, expected) in cases {
            let (buf, len) = varint_bytes(value);
            assert_eq!(&buf[..len], expected, "value {}", value);
            assert_eq!(varint_len(value), len);
            assert_eq!(decode::<u64>(expected).unwrap(), value);
        }
    }

    #[test]
    fn test_length_boundaries() {
        for (value, len) in [(u64::from(u32::MAX), 5), (1 << 56, 9), (u64::MAX, 10)] {
            assert_eq!(varint_len(value), len);
            let (buf, written) = varint_bytes(value);
            assert_eq!(written, len);
            assert_eq!(decode::<u64>(&buf[..written]).unwrap(), value);
        }
    }

    #[test]
    fn test_zigzag_keeps_small_negatives_short() {
        assert_eq!((-1i32).fold(), 1);
        assert_eq!(1i32.fold(), 2);
        assert_eq!(i32::MIN.fold(), u64::from(u32::MAX));
        for value in [0i64, -1, 64, -65, i64::MAX, i64::MIN] {
            assert_eq!(i64::unfold(value.fold()), Some(value));
        }
        assert_eq!(i32::unfold(u64::from(u32::MAX) + 1), None);
    }

    #[test]
    fn test_truncated_input_reports_eof() {
        assert!(matches!(decode::<u32>(&[]), Err(Error::UnexpectedEof { .. })));
        assert!(matches!(decode::<u32>(&[0x80, 0x80]), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn test_width_overflow() {
        // Six bytes never fit a u32.
        let (buf, len) = varint_bytes(1 << 35);
        assert!(matches!(
            decode::<u32>(&buf[..len]),
            Err(Error::VarintOverflow { bits: 32 })
        ));
        // Five bytes that exceed u32::MAX.
        assert!(matches!(
            decode::<u32>(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]),
            Err(Error::VarintOverflow { bits: 32 })
        ));
        assert!(matches!(
            decode::<u64>(&[0xFF; 11]),
            Err(Error::VarintOverflow { bits: 64 })
        ));
    }
}
