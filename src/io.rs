// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Byte-stream ports for the transcoder.
//!
//! The core only ever talks to [`DecoderReader`] and [`DecoderWriter`]; it
//! never assumes seekability. Two implementations are provided: thin
//! adapters over any `std::io` stream, and [`MemReadWriter`], an owned
//! in-memory buffer that supports swapping in an existing `Vec<u8>` and an
//! explicit read cursor (useful for resuming a decode mid-stream or
//! prepending already-known header bytes).

use crate::error::{JpegError, Result};

/// Source of JPEG or ARHC bytes.
///
/// `read` fills as much of `buf` as it can and returns the number of bytes
/// written; `Ok(0)` signals end of stream.
pub trait DecoderReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release any resources held by the reader. Default is a no-op.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink for JPEG or ARHC bytes.
pub trait DecoderWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Release any resources held by the writer. Default is a no-op.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write the whole buffer, looping over short writes.
    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(JpegError::Io("writer accepted 0 bytes".into()));
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}

impl<T: DecoderReader + ?Sized> DecoderReader for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: DecoderWriter + ?Sized> DecoderWriter for &mut T {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Adapter making any `std::io::Read` usable as a [`DecoderReader`].
pub struct StreamReader<R: std::io::Read> {
    inner: R,
}

impl<R: std::io::Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: std::io::Read> DecoderReader for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(JpegError::Io(e.to_string())),
            }
        }
    }
}

/// Adapter making any `std::io::Write` usable as a [`DecoderWriter`].
pub struct StreamWriter<W: std::io::Write> {
    inner: W,
}

impl<W: std::io::Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: std::io::Write> DecoderWriter for StreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.inner.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(JpegError::Io(e.to_string())),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| JpegError::Io(e.to_string()))
    }
}

/// In-memory buffer implementing both ports.
///
/// Reads consume from an explicit cursor over the owned buffer; writes
/// append to the end. The buffer can be swapped in without copying
/// ([`MemReadWriter::from_vec`]) or copied in ([`MemReadWriter::copy_in`]).
#[derive(Debug, Default, Clone)]
pub struct MemReadWriter {
    buf: Vec<u8>,
    pos: usize,
}

impl MemReadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an existing buffer; the read cursor starts at 0.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    /// Take ownership of an existing buffer with the read cursor placed at
    /// `offset`, e.g. to resume a decode whose prefix was already consumed.
    pub fn with_read_offset(buf: Vec<u8>, offset: usize) -> Self {
        let pos = offset.min(buf.len());
        Self { buf, pos }
    }

    /// Replace the contents with a copy of `data` and rewind the cursor.
    pub fn copy_in(&mut self, data: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(data);
        self.pos = 0;
    }

    /// The full underlying buffer, including already-read bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the wrapper, returning the underlying buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn read_offset(&self) -> usize {
        self.pos
    }

    pub fn set_read_offset(&mut self, offset: usize) {
        self.pos = offset.min(self.buf.len());
    }
}

impl DecoderReader for MemReadWriter {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.buf.len() - self.pos);
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl DecoderWriter for MemReadWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Drain a reader to the end, appending to `out`. Returns the number of
/// bytes read.
pub(crate) fn read_to_end(r: &mut (impl DecoderReader + ?Sized), out: &mut Vec<u8>) -> Result<usize> {
    let mut chunk = [0u8; 4096];
    let mut total = 0;
    loop {
        let n = r.read(&mut chunk)?;
        if n == 0 {
            return Ok(total);
        }
        out.extend_from_slice(&chunk[..n]);
        total += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_read_write() {
        let mut m = MemReadWriter::new();
        m.write_all(&[1, 2, 3, 4, 5]).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(m.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(m.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(m.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn mem_read_offset() {
        let m = MemReadWriter::with_read_offset(vec![9, 8, 7, 6], 2);
        let mut m = m;
        let mut buf = [0u8; 4];
        assert_eq!(m.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[7, 6]);
    }

    #[test]
    fn mem_swap_in() {
        let mut m = MemReadWriter::from_vec(vec![0xFF, 0xD8]);
        let mut b = [0u8; 1];
        assert_eq!(m.read(&mut b).unwrap(), 1);
        assert_eq!(b[0], 0xFF);
        m.copy_in(&[1, 2]);
        assert_eq!(m.read_offset(), 0);
        assert_eq!(m.data(), &[1, 2]);
    }

    #[test]
    fn stream_adapters() {
        let src: &[u8] = &[10, 20, 30];
        let mut r = StreamReader::new(src);
        let mut out = Vec::new();
        read_to_end(&mut r, &mut out).unwrap();
        assert_eq!(out, vec![10, 20, 30]);

        let mut sink = Vec::new();
        {
            let mut w = StreamWriter::new(&mut sink);
            w.write_all(&out).unwrap();
            w.close().unwrap();
        }
        assert_eq!(sink, vec![10, 20, 30]);
    }
}
