// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backing data streams for the buffered bitstream reader/writer.
//!
//! A [`DataStream`] is a seekable byte source/sink. Memory-backed streams
//! additionally expose their bytes through [`DataStream::memory`], which lets
//! the reader decode in place without copying into a scratch buffer.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Seekable byte stream.
pub trait DataStream {
    /// Read up to `buf.len()` bytes, returning how many were read (0 at end).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `buf`.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Absolute byte position.
    fn seek(&mut self, pos: u64) -> Result<()>;

    fn tell(&self) -> u64;

    /// Total length in bytes.
    fn size(&self) -> u64;

    fn is_eof(&self) -> bool {
        self.tell() >= self.size()
    }

    /// Bytes from the current position to the end, for memory-backed streams.
    fn memory(&self) -> Option<&[u8]> {
        None
    }
}

/// Growable in-memory stream.
#[derive(Debug, Default, Clone)]
pub struct MemoryDataStream {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryDataStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing bytes, positioned at the start.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl DataStream for MemoryDataStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let count = buf.len().min(available);
        buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = usize::try_from(pos)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn memory(&self) -> Option<&[u8]> {
        Some(&self.data[self.pos..])
    }
}

/// File-backed stream. Always goes through the buffered (copying) path.
#[derive(Debug)]
pub struct FileDataStream {
    file: File,
    pos: u64,
    len: u64,
}

impl FileDataStream {
    /// Open an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, pos: 0, len })
    }

    /// Create (or truncate) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            pos: 0,
            len: 0,
        })
    }

    /// Flush OS buffers.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

impl DataStream for FileDataStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        self.pos += total as u64;
        Ok(total)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf)?;
        self.pos += buf.len() as u64;
        self.len = self.len.max(self.pos);
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> u64 {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_stream_read_write_seek() {
        let mut stream = MemoryDataStream::new();
        stream.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(stream.size(), 4);
        assert!(stream.is_eof());

        stream.seek(1).unwrap();
        assert_eq!(stream.memory(), Some(&[2u8, 3, 4][..]));

        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[2, 3, 4]);

        stream.seek(2).unwrap();
        stream.write(&[9, 9, 9]).unwrap();
        assert_eq!(stream.as_slice(), &[1, 2, 9, 9, 9]);

        stream.seek(100).unwrap();
        assert_eq!(stream.tell(), 5);
    }

    #[test]
    fn test_file_stream_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("payload.bin");

        let mut out = FileDataStream::create(&path).expect("create");
        out.write(&[10, 20, 30]).unwrap();
        out.sync().unwrap();
        assert_eq!(out.size(), 3);
        assert!(out.memory().is_none());
        drop(out);

        let mut input = FileDataStream::open(&path).expect("open");
        assert_eq!(input.size(), 3);
        input.seek(1).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(input.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[20, 30]);
        assert!(input.is_eof());
    }
}
