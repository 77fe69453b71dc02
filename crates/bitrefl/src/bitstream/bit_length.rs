// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lengths that may end on a sub-byte boundary.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// A length expressed as whole bytes plus 0-7 leftover bits.
///
/// Invariant: `bits < 8`. Arithmetic carries between the two parts, and
/// subtraction saturates at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BitLength {
    bytes: u32,
    bits: u8,
}

impl BitLength {
    /// Zero length.
    pub const ZERO: Self = Self { bytes: 0, bits: 0 };

    /// Build from a byte count and an extra bit count; bits >= 8 carry into bytes.
    #[inline]
    pub const fn new(bytes: u32, bits: u32) -> Self {
        Self {
            bytes: bytes.saturating_add(bits / 8),
            bits: (bits % 8) as u8,
        }
    }

    /// Whole-byte length.
    #[inline]
    pub const fn from_bytes(bytes: u32) -> Self {
        Self { bytes, bits: 0 }
    }

    /// Length from a raw bit count (saturates at `u32::MAX` bytes).
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        let bytes = bits / 8;
        Self {
            bytes: if bytes > u32::MAX as u64 {
                u32::MAX
            } else {
                bytes as u32
            },
            bits: (bits % 8) as u8,
        }
    }

    /// Total length in bits.
    #[inline]
    pub const fn get_bits(self) -> u64 {
        self.bytes as u64 * 8 + self.bits as u64
    }

    /// Whole bytes part.
    #[inline]
    pub const fn bytes(self) -> u32 {
        self.bytes
    }

    /// Leftover bits part (always < 8).
    #[inline]
    pub const fn bits(self) -> u8 {
        self.bits
    }

    /// Bytes needed to hold this length (rounds a partial byte up).
    #[inline]
    pub const fn bytes_ceil(self) -> u32 {
        if self.bits > 0 {
            self.bytes.saturating_add(1)
        } else {
            self.bytes
        }
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.bytes == 0 && self.bits == 0
    }
}

impl Add for BitLength {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_bits(self.get_bits() + rhs.get_bits())
    }
}

impl AddAssign for BitLength {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for BitLength {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::from_bits(self.get_bits().saturating_sub(rhs.get_bits()))
    }
}

impl SubAssign for BitLength {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<u32> for BitLength {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self::from_bits(self.get_bits().saturating_mul(u64::from(rhs)))
    }
}

impl PartialOrd for BitLength {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BitLength {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get_bits().cmp(&other.get_bits())
    }
}

impl From<u32> for BitLength {
    fn from(bytes: u32) -> Self {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for BitLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bits == 0 {
            write!(f, "{}B", self.bytes)
        } else {
            write!(f, "{}B+{}b", self.bytes, self.bits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_carry() {
        let len = BitLength::new(2, 19);
        assert_eq!(len.bytes(), 4);
        assert_eq!(len.bits(), 3);
        assert_eq!(len.get_bits(), 35);
    }

    #[test]
    fn test_add_carries_across_byte_boundary() {
        let a = BitLength::new(1, 5);
        let b = BitLength::new(0, 6);
        let sum = a + b;
        assert_eq!(sum.bytes(), 2);
        assert_eq!(sum.bits(), 3);
    }

    #[test]
    fn test_add_then_sub_is_identity() {
        for bytes in [0u32, 1, 7, 255, 4096] {
            for bits in 0u32..8 {
                let a = BitLength::new(bytes, bits);
                for other in [BitLength::ZERO, BitLength::new(0, 7), BitLength::new(3, 1)] {
                    assert_eq!(a + other - other, a);
                }
            }
        }
    }

    #[test]
    fn test_sub_saturates_at_zero() {
        let a = BitLength::new(1, 2);
        let b = BitLength::new(3, 0);
        assert_eq!(a - b, BitLength::ZERO);
        assert!((a - b).is_zero());
    }

    #[test]
    fn test_mul_and_ordering() {
        let a = BitLength::new(0, 3) * 5;
        assert_eq!(a, BitLength::new(1, 7));
        assert!(BitLength::new(1, 7) < BitLength::from_bytes(2));
        assert!(BitLength::from_bytes(2) > BitLength::new(1, 7));
    }

    #[test]
    fn test_bytes_ceil_and_display() {
        assert_eq!(BitLength::new(3, 1).bytes_ceil(), 4);
        assert_eq!(BitLength::from_bytes(3).bytes_ceil(), 3);
        assert_eq!(BitLength::new(3, 1).to_string(), "3B+1b");
        assert_eq!(BitLength::from_bytes(3).to_string(), "3B");
    }
}
