// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bit-level encoding primitives.

pub mod bit_length;
pub mod buffered;
pub mod quantize;
pub mod stream;
pub mod varint;

pub use bit_length::BitLength;
pub use buffered::{BufferedBitstreamReader, BufferedBitstreamWriter};
pub use stream::{BitPrimitive, Bitstream, NormEncode, RangeInt, DEFAULT_NORM_BITS};
pub use varint::VarInt;
