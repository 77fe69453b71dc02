// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunked streaming between a [`Bitstream`] working buffer and a [`DataStream`].
//!
//! # Reader
//!
//! - Memory-backed sources are mapped directly (zero-copy view), no buffering.
//! - Otherwise `preload` pulls `max(preload_size, requested)` bytes into the
//!   tail of the working buffer, `clear_buffered` drops bytes behind the
//!   cursor once the buffer passes `max_buffer_size`, and a `seek` outside the
//!   buffered window collapses it so the next read refills from the target.
//!
//! # Writer
//!
//! Accumulates into the working buffer. `flush(false)` hands complete bytes to
//! the sink once `flush_after` bytes are pending (the trailing partial byte
//! stays buffered); `flush(true)` zero-pads the last byte and writes everything.

use crate::bitstream::stream::Bitstream;
use crate::bitstream::varint::{VarInt, MAX_VARINT_LEN};
use crate::config::SerializerConfig;
use crate::error::Result;
use crate::io::DataStream;

/// Streaming reader over a [`DataStream`].
pub struct BufferedBitstreamReader<'a> {
    bits: Bitstream<'a>,
    source: Option<&'a mut dyn DataStream>,
    /// Source byte offset of logical position 0.
    origin: u64,
    /// Readable bytes from `origin`.
    length: u64,
    /// Logical byte offset of the working buffer's first byte.
    window_start: u64,
    preload_size: usize,
    max_buffer_size: usize,
    scratch: Vec<u8>,
    peak_capacity: u64,
}

impl<'a> BufferedBitstreamReader<'a> {
    /// Read at most `length` bytes starting at the source's current position.
    pub fn new(source: &'a mut dyn DataStream, length: u64, config: &SerializerConfig) -> Self {
        let origin = source.tell();
        let length = length.min(source.size().saturating_sub(origin));

        if source.memory().is_some() {
            let shared: &'a dyn DataStream = source;
            let data = shared.memory().unwrap_or_default();
            let data = &data[..(length as usize).min(data.len())];
            log::debug!("[buffered] mapping {} bytes of memory stream", data.len());
            return Self {
                bits: Bitstream::view(data),
                source: None,
                origin,
                length: data.len() as u64,
                window_start: 0,
                preload_size: config.preload_size,
                max_buffer_size: config.max_buffer_size,
                scratch: Vec::new(),
                peak_capacity: 0,
            };
        }

        Self {
            bits: Bitstream::with_capacity(config.preload_size),
            source: Some(source),
            origin,
            length,
            window_start: 0,
            preload_size: config.preload_size,
            max_buffer_size: config.max_buffer_size,
            scratch: Vec::new(),
            peak_capacity: 0,
        }
    }

    /// Whether reads go straight to mapped memory.
    pub fn is_zero_copy(&self) -> bool {
        self.source.is_none()
    }

    /// Logical position in bits.
    pub fn tell(&self) -> u64 {
        self.window_start * 8 + self.bits.tell()
    }

    /// Total readable length in bits.
    pub fn length_bits(&self) -> u64 {
        self.length * 8
    }

    /// Bits between the cursor and the end of the readable range.
    pub fn remaining(&self) -> u64 {
        self.length_bits().saturating_sub(self.tell())
    }

    /// Largest working-buffer capacity observed, in bits.
    pub fn peak_capacity(&self) -> u64 {
        self.peak_capacity.max(self.bits.capacity())
    }

    /// Move to logical bit position `pos`.
    pub fn seek(&mut self, pos: u64) {
        if self.source.is_none() {
            self.bits.seek(pos);
            return;
        }
        let start = self.window_start * 8;
        let end = start + self.bits.size();
        if pos >= start && pos <= end {
            self.bits.seek(pos - start);
        } else {
            log::trace!("[buffered] seek to bit {} leaves window, collapsing", pos);
            self.window_start = pos / 8;
            self.bits.reset_window(pos % 8);
        }
    }

    /// Move forward/backward by `count` bits.
    pub fn skip(&mut self, count: i64) {
        let target = if count < 0 {
            self.tell().saturating_sub(count.unsigned_abs())
        } else {
            self.tell().saturating_add(count as u64)
        };
        self.seek(target.min(self.length_bits()));
    }

    /// Make `count` bits after the cursor resident (as far as the source allows).
    pub fn preload(&mut self, count: u64) -> Result<()> {
        if self.source.is_none() {
            return Ok(());
        }
        let needed_end = self.bits.tell() + count;
        if needed_end <= self.bits.size() {
            return Ok(());
        }

        self.clear_buffered(false);

        let needed_end = self.bits.tell() + count;
        let missing = needed_end.saturating_sub(self.bits.size()).div_ceil(8);
        let next_byte = self.window_start + self.bits.size().div_ceil(8);
        let available = self.length.saturating_sub(next_byte);
        let to_read = (missing.max(self.preload_size as u64)).min(available) as usize;
        if to_read == 0 {
            return Ok(());
        }

        let Some(source) = self.source.as_mut() else {
            return Ok(());
        };
        let absolute = self.origin + next_byte;
        if source.tell() != absolute {
            source.seek(absolute)?;
        }
        self.scratch.resize(to_read, 0);
        let mut filled = 0;
        while filled < to_read {
            let n = source.read(&mut self.scratch[filled..to_read])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.bits.append_bytes(&self.scratch[..filled])?;
        self.peak_capacity = self.peak_capacity.max(self.bits.capacity());
        Ok(())
    }

    /// Drop bytes strictly behind the cursor once the buffer is over budget.
    pub fn clear_buffered(&mut self, force: bool) {
        if self.source.is_none() {
            return;
        }
        let buffered = self.bits.size().div_ceil(8) as usize;
        if !force && buffered <= self.max_buffer_size {
            return;
        }
        let consumed = (self.bits.tell() / 8) as usize;
        if consumed == 0 {
            return;
        }
        self.bits.discard_front(consumed);
        self.window_start += consumed as u64;
    }

    /// Working stream with `count` bits preloaded after the cursor.
    pub fn ensure(&mut self, count: u64) -> Result<&mut Bitstream<'a>> {
        self.preload(count)?;
        Ok(&mut self.bits)
    }

    /// Working stream with everything up to `end` (logical bits) preloaded.
    pub fn ensure_until(&mut self, end: u64) -> Result<&mut Bitstream<'a>> {
        let count = end.saturating_sub(self.tell());
        self.ensure(count)
    }

    pub fn read_bits_u64(&mut self, count: u32) -> Result<u64> {
        self.ensure(u64::from(count))?.read_bits_u64(count)
    }

    pub fn peek_bits_u64(&mut self, count: u32) -> Result<u64> {
        self.ensure(u64::from(count))?.peek_bits_u64(count)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(32)?.read::<u32>()
    }

    pub fn read_varint<T: VarInt>(&mut self) -> Result<T> {
        self.ensure(MAX_VARINT_LEN as u64 * 8)?.read_varint()
    }

    /// Fill `out` from the stream, preloading at most one chunk at a time.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let chunk = self.preload_size.max(1);
        for part in out.chunks_mut(chunk) {
            self.ensure(part.len() as u64 * 8)?.read_bytes(part)?;
        }
        Ok(())
    }
}

/// Streaming writer into a [`DataStream`].
pub struct BufferedBitstreamWriter<'a> {
    bits: Bitstream<'static>,
    sink: &'a mut dyn DataStream,
    flush_after: usize,
    flushed_bytes: u64,
    peak_capacity: u64,
}

impl<'a> BufferedBitstreamWriter<'a> {
    pub fn new(sink: &'a mut dyn DataStream, config: &SerializerConfig) -> Self {
        Self {
            bits: Bitstream::with_capacity(config.buffer_size),
            sink,
            flush_after: config.flush_after,
            flushed_bytes: 0,
            peak_capacity: 0,
        }
    }

    /// Working stream. Values written here reach the sink on the next flush.
    pub fn stream(&mut self) -> &mut Bitstream<'static> {
        &mut self.bits
    }

    /// Logical position in bits since the writer was created.
    pub fn tell(&self) -> u64 {
        self.flushed_bytes * 8 + self.bits.tell()
    }

    /// Bytes already handed to the sink.
    pub fn flushed_bytes(&self) -> u64 {
        self.flushed_bytes
    }

    /// Largest working-buffer capacity observed, in bits.
    pub fn peak_capacity(&self) -> u64 {
        self.peak_capacity.max(self.bits.capacity())
    }

    /// Hand buffered bytes to the sink.
    ///
    /// Without `force`, nothing happens until `flush_after` whole bytes are
    /// pending, and a trailing partial byte stays buffered.
    pub fn flush(&mut self, force: bool) -> Result<()> {
        self.peak_capacity = self.peak_capacity.max(self.bits.capacity());
        let whole = (self.bits.size() / 8) as usize;

        if force {
            let total = self.bits.size().div_ceil(8) as usize;
            if total > 0 {
                self.sink.write(&self.bits.as_bytes()[..total])?;
                self.flushed_bytes += total as u64;
            }
            self.bits.clear();
            return Ok(());
        }

        if whole < self.flush_after {
            return Ok(());
        }
        self.sink.write(&self.bits.as_bytes()[..whole])?;
        self.flushed_bytes += whole as u64;
        self.bits.discard_front(whole);
        Ok(())
    }
}
