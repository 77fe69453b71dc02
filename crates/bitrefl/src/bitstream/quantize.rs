// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-point quantization helpers backing `write_norm` / `write_range`.

/// Largest code representable in `bits` bits (bits clamped to 1..=32).
#[inline]
pub const fn max_code(bits: u32) -> u32 {
    let bits = if bits == 0 {
        1
    } else if bits > 32 {
        32
    } else {
        bits
    };
    ((1u64 << bits) - 1) as u32
}

/// Map a value in `[0, 1]` to a `bits`-wide unsigned code (clamped, rounded).
#[inline]
pub fn unorm_to_uint(value: f32, bits: u32) -> u32 {
    let max = f64::from(max_code(bits));
    let clamped = f64::from(value).clamp(0.0, 1.0);
    (clamped * max + 0.5) as u32
}

/// Inverse of [`unorm_to_uint`]. Precision is `1 / (2^bits - 1)`.
#[inline]
pub fn uint_to_unorm(code: u32, bits: u32) -> f32 {
    let max = max_code(bits);
    (f64::from(code.min(max)) / f64::from(max)) as f32
}

/// Index of the highest set bit (0 for input 0).
#[inline]
pub const fn most_significant_bit(value: u64) -> u32 {
    if value == 0 {
        0
    } else {
        63 - value.leading_zeros()
    }
}

/// Bits needed to store any offset in `[0, range]`.
#[inline]
pub const fn bits_for_range(range: u64) -> u32 {
    most_significant_bit(range) + 1
}
