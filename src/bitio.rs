// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Bit-level I/O for JPEG entropy-coded data and ARHC plane streams.
//!
//! [`BitStream`] is an owned byte/bit buffer used in both directions: the
//! re-encoder emits Huffman codes into it with byte-stuffing
//! (0xFF -> 0xFF 0x00, T.81 F.1.2.3), and the ARHC transform reads plane
//! values back out of it. Bits are MSB-first throughout.
//!
//! The second half of this module is the parser-side machinery: a [`Bits`]
//! accumulator fed by a fixed 4096-byte lookahead window over a
//! [`DecoderReader`], with support for un-consuming up to two bytes after
//! the 8-bit Huffman lookahead overshoots past a stuffed `FF 00` pair.

use crate::error::{JpegError, Result};
use crate::io::DecoderReader;

#[derive(Debug, Clone, Copy)]
struct Undo {
    len: usize,
    wacc: u32,
    wbits: u8,
}

/// Byte-exact, bit-exact read/write buffer with JPEG byte-stuffing.
#[derive(Debug, Default, Clone)]
pub struct BitStream {
    bytes: Vec<u8>,
    /// Pending write bits, right-aligned (low `wbits` bits valid).
    wacc: u32,
    wbits: u8,
    /// Read cursor state.
    spos: usize,
    sacc: u32,
    sbits: u8,
    /// Snapshot taken before the most recent append, for [`BitStream::pop`].
    undo: Option<Undo>,
}

impl BitStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing byte buffer for reading.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }

    fn snapshot(&mut self) {
        self.undo = Some(Undo {
            len: self.bytes.len(),
            wacc: self.wacc,
            wbits: self.wbits,
        });
    }

    /// Append one already-aligned byte.
    pub fn append_byte(&mut self, byte: u8) {
        debug_assert_eq!(self.wbits, 0, "append_byte with pending bits");
        self.snapshot();
        self.bytes.push(byte);
    }

    /// Append a run of already-aligned bytes.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.wbits, 0, "append_bytes with pending bits");
        self.snapshot();
        self.bytes.extend_from_slice(bytes);
    }

    /// Shift the low `n_bits` bits of `code` (1-16) into the stream,
    /// MSB-first. Whenever a full `0xFF` byte is flushed and `stuff_zeros`
    /// is set, a `0x00` byte is inserted immediately after it.
    pub fn emit_bits(&mut self, code: u32, n_bits: u8, stuff_zeros: bool) {
        debug_assert!(n_bits >= 1 && n_bits <= 16);
        self.snapshot();
        self.wacc = (self.wacc << n_bits) | (code & ((1u32 << n_bits) - 1));
        self.wbits += n_bits;
        while self.wbits >= 8 {
            let byte = (self.wacc >> (self.wbits - 8)) as u8;
            self.bytes.push(byte);
            if byte == 0xFF && stuff_zeros {
                self.bytes.push(0x00);
            }
            self.wbits -= 8;
        }
        self.wacc &= (1u32 << self.wbits) - 1;
    }

    /// Pad any pending bits with 1s (T.81 F.1.2.3) and flush them.
    /// Must be called at scan and restart-interval boundaries.
    pub fn flush_bits(&mut self, stuff_zeros: bool) {
        if self.wbits > 0 {
            let pad = 8 - self.wbits;
            self.emit_bits((1u32 << pad) - 1, pad, stuff_zeros);
        }
    }

    /// Undo the most recent append call (`append_byte`, `append_bytes`,
    /// `emit_bits` or the flush padding). Supports speculative emission
    /// during re-encode, e.g. removing a restart marker that turned out to
    /// fall after the final MCU.
    pub fn pop(&mut self) {
        if let Some(u) = self.undo.take() {
            self.bytes.truncate(u.len);
            self.wacc = u.wacc;
            self.wbits = u.wbits;
        }
    }

    /// Read `n_bits` (1-16) from the buffer, undoing byte-stuffing when
    /// `stuff_zeros` is set. `ERR_EOF` when the buffer is exhausted;
    /// `ERR_FF00` when de-stuffing finds a bare `0xFF`.
    pub fn scan_bits(&mut self, n_bits: u8, stuff_zeros: bool) -> Result<u32> {
        debug_assert!(n_bits >= 1 && n_bits <= 16);
        while self.sbits < n_bits {
            if self.spos >= self.bytes.len() {
                return Err(JpegError::UnexpectedEof);
            }
            let b = self.bytes[self.spos];
            self.spos += 1;
            if b == 0xFF && stuff_zeros {
                if self.spos >= self.bytes.len() {
                    return Err(JpegError::UnexpectedEof);
                }
                if self.bytes[self.spos] != 0x00 {
                    return Err(JpegError::MissingStuffedZero);
                }
                self.spos += 1;
            }
            self.sacc = (self.sacc << 8) | u32::from(b);
            self.sbits += 8;
        }
        self.sbits -= n_bits;
        let v = (self.sacc >> self.sbits) & ((1u32 << n_bits) - 1);
        self.sacc &= (1u32 << self.sbits) - 1;
        Ok(v)
    }

    /// [`BitStream::scan_bits`] without de-stuffing.
    pub fn scan_bits_no_stuffed_zeros(&mut self, n_bits: u8) -> Result<u32> {
        self.scan_bits(n_bits, false)
    }

    /// Read the next full byte; the read cursor must be byte-aligned.
    pub fn scan_aligned_byte(&mut self) -> Result<u8> {
        debug_assert_eq!(self.sbits, 0, "scan_aligned_byte while mid-byte");
        if self.spos >= self.bytes.len() {
            return Err(JpegError::UnexpectedEof);
        }
        let b = self.bytes[self.spos];
        self.spos += 1;
        Ok(b)
    }

    /// Rewind the read cursor to the start of the buffer.
    pub fn reset_scan(&mut self) {
        self.spos = 0;
        self.sacc = 0;
        self.sbits = 0;
    }

    /// Number of whole bytes currently in the buffer.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() && self.wbits == 0
    }

    /// Conservative upper bound on the byte size after a flush: accounts for
    /// the pending partial byte and its possible stuffed zero.
    pub fn estimated_byte_size(&self) -> usize {
        self.bytes.len() + if self.wbits > 0 { 2 } else { 0 }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        debug_assert_eq!(self.wbits, 0, "into_bytes with unflushed bits");
        self.bytes
    }
}

/// Size of the reader lookahead window.
const LOOKAHEAD: usize = 4096;

/// The bit accumulator feeding Huffman decode.
///
/// `a` holds the most recently read bits with the next readable bit under
/// mask `m`; `n` counts valid bits. Reset at scan and restart boundaries.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Bits {
    pub a: u32,
    pub m: u32,
    pub n: i32,
}

/// Fixed-size lookahead window over the underlying reader.
///
/// `n_unreadable` records how many bytes can be un-consumed (0, 1 or 2):
/// the 8-bit Huffman lookahead may pull a byte-stuffed `FF 00` pair past
/// what the code actually needed. Invariant: `i <= j <= buf.len()`.
struct ByteWindow {
    buf: [u8; LOOKAHEAD],
    i: usize,
    j: usize,
    n_unreadable: usize,
}

impl ByteWindow {
    fn new() -> Self {
        Self {
            buf: [0; LOOKAHEAD],
            i: 0,
            j: 0,
            n_unreadable: 0,
        }
    }
}

/// Entropy-layer reader: lookahead window + bit accumulator over a
/// [`DecoderReader`].
pub(crate) struct EntropyReader<R: DecoderReader> {
    r: R,
    window: ByteWindow,
    pub(crate) bits: Bits,
    consumed: u64,
}

impl<R: DecoderReader> EntropyReader<R> {
    pub fn new(r: R) -> Self {
        Self {
            r,
            window: ByteWindow::new(),
            bits: Bits::default(),
            consumed: 0,
        }
    }

    /// Total bytes pulled from the underlying reader so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    fn fill(&mut self) -> Result<()> {
        let w = &mut self.window;
        debug_assert_eq!(w.i, w.j, "fill called with unread bytes in window");
        // Keep the last two bytes at the front so they stay un-consumable.
        if w.j > 2 {
            w.buf[0] = w.buf[w.j - 2];
            w.buf[1] = w.buf[w.j - 1];
            w.i = 2;
            w.j = 2;
        }
        let j = w.j;
        let n = self.r.read(&mut w.buf[j..])?;
        if n == 0 {
            return Err(JpegError::UnexpectedEof);
        }
        w.j += n;
        self.consumed += n as u64;
        Ok(())
    }

    /// Read one raw byte (no de-stuffing). Clears the unread backup.
    pub fn read_byte(&mut self) -> Result<u8> {
        while self.window.i == self.window.j {
            self.fill()?;
        }
        let x = self.window.buf[self.window.i];
        self.window.i += 1;
        self.window.n_unreadable = 0;
        Ok(x)
    }

    /// Like [`EntropyReader::read_byte`] but reports end-of-stream as `None`
    /// instead of an error. Used for trailer capture after EOI.
    pub fn try_read_byte(&mut self) -> Result<Option<u8>> {
        while self.window.i == self.window.j {
            match self.fill() {
                Ok(()) => {}
                Err(JpegError::UnexpectedEof) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        let x = self.window.buf[self.window.i];
        self.window.i += 1;
        self.window.n_unreadable = 0;
        Ok(Some(x))
    }

    /// Read `n` raw bytes into a fresh vector.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_byte()?);
        }
        Ok(out)
    }

    /// Read one byte of entropy-coded data, transparently removing
    /// `FF 00` stuffing. A `0xFF` followed by anything other than `0x00`
    /// (i.e. a marker) yields [`JpegError::MissingStuffedZero`] with the
    /// offending bytes still un-consumable.
    pub fn read_byte_stuffed_byte(&mut self) -> Result<u8> {
        let w = &mut self.window;
        if w.i + 2 <= w.j {
            let x = w.buf[w.i];
            w.i += 1;
            w.n_unreadable = 1;
            if x != 0xFF {
                return Ok(x);
            }
            if w.buf[w.i] != 0x00 {
                return Err(JpegError::MissingStuffedZero);
            }
            w.i += 1;
            w.n_unreadable = 2;
            return Ok(0xFF);
        }
        self.window.n_unreadable = 0;
        let x = self.read_byte()?;
        self.window.n_unreadable = 1;
        if x != 0xFF {
            return Ok(x);
        }
        let y = self.read_byte()?;
        self.window.n_unreadable = 2;
        if y != 0x00 {
            return Err(JpegError::MissingStuffedZero);
        }
        Ok(0xFF)
    }

    /// Un-consume the bytes of the most recent
    /// [`EntropyReader::read_byte_stuffed_byte`], and drop that byte from
    /// the accumulator if it was never used.
    pub fn unread_byte_stuffed_byte(&mut self) {
        self.window.i -= self.window.n_unreadable;
        self.window.n_unreadable = 0;
        if self.bits.n >= 8 {
            self.bits.a >>= 8;
            self.bits.n -= 8;
            self.bits.m >>= 8;
        }
    }

    /// Give back any lookahead overshoot before reading marker bytes with
    /// [`EntropyReader::read_byte`].
    pub fn prepare_marker_read(&mut self) {
        if self.window.n_unreadable != 0 {
            if self.bits.n >= 8 {
                self.unread_byte_stuffed_byte();
            } else {
                self.window.n_unreadable = 0;
            }
        }
    }

    /// Discard the accumulator, e.g. at scan and restart boundaries.
    pub fn reset_bits(&mut self) {
        self.bits = Bits::default();
    }

    /// Top up the accumulator to at least `n` bits of entropy-coded data.
    pub fn ensure_n_bits(&mut self, n: i32) -> Result<()> {
        while self.bits.n < n {
            let c = self.read_byte_stuffed_byte()?;
            self.bits.a = (self.bits.a << 8) | u32::from(c);
            self.bits.n += 8;
            if self.bits.m == 0 {
                self.bits.m = 1 << 7;
            } else {
                self.bits.m <<= 8;
            }
        }
        Ok(())
    }

    /// Read a single bit.
    pub fn decode_bit(&mut self) -> Result<bool> {
        if self.bits.n == 0 {
            self.ensure_n_bits(1)?;
        }
        let bit = self.bits.a & self.bits.m != 0;
        self.bits.n -= 1;
        self.bits.m >>= 1;
        Ok(bit)
    }

    /// Read `n` bits (1-16) as an unsigned value.
    pub fn decode_bits(&mut self, n: u8) -> Result<u32> {
        debug_assert!(n >= 1 && n <= 16);
        if self.bits.n < i32::from(n) {
            self.ensure_n_bits(i32::from(n))?;
        }
        self.bits.n -= i32::from(n);
        self.bits.m >>= n;
        Ok((self.bits.a >> self.bits.n) & ((1u32 << n) - 1))
    }

    /// The RECEIVE and EXTEND procedures of T.81 F.2.2.1: read a
    /// `t`-bit magnitude and sign-extend it per Table F.1.
    pub fn receive_extend(&mut self, t: u8) -> Result<i32> {
        debug_assert!(t >= 1 && t <= 16);
        if self.bits.n < i32::from(t) {
            self.ensure_n_bits(i32::from(t))?;
        }
        self.bits.n -= i32::from(t);
        self.bits.m >>= t;
        let mut x = ((self.bits.a >> self.bits.n) & ((1u32 << t) - 1)) as i32;
        if x < 1 << (t - 1) {
            x += (-1i32 << t) + 1;
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemReadWriter;

    #[test]
    fn emit_basic() {
        let mut bs = BitStream::new();
        bs.emit_bits(0b1010, 4, true);
        bs.emit_bits(0b0101, 4, true);
        assert_eq!(bs.as_slice(), &[0xA5]);
    }

    #[test]
    fn emit_byte_stuffing() {
        let mut bs = BitStream::new();
        bs.emit_bits(0xFF, 8, true);
        assert_eq!(bs.as_slice(), &[0xFF, 0x00]);

        let mut raw = BitStream::new();
        raw.emit_bits(0xFF, 8, false);
        assert_eq!(raw.as_slice(), &[0xFF]);
    }

    #[test]
    fn flush_pads_with_ones() {
        let mut bs = BitStream::new();
        bs.emit_bits(0b110, 3, true);
        bs.flush_bits(true);
        // 110_11111 = 0xDF
        assert_eq!(bs.as_slice(), &[0xDF]);
    }

    #[test]
    fn flush_padding_can_stuff() {
        let mut bs = BitStream::new();
        bs.emit_bits(0b111, 3, true);
        bs.flush_bits(true);
        // 111 + 11111 padding = 0xFF, which must be stuffed
        assert_eq!(bs.as_slice(), &[0xFF, 0x00]);
    }

    #[test]
    fn emit_scan_roundtrip_across_ff() {
        let seq: &[(u32, u8)] = &[(0xFF8, 12), (0x3, 2), (0xFFFF, 16), (0x1, 1)];
        let mut bs = BitStream::new();
        for &(code, n) in seq {
            bs.emit_bits(code, n, true);
        }
        bs.flush_bits(true);
        for &(code, n) in seq {
            assert_eq!(bs.scan_bits(n, true).unwrap(), code & ((1 << n) - 1));
        }
    }

    #[test]
    fn emit_scan_roundtrip_unstuffed() {
        let mut bs = BitStream::new();
        bs.emit_bits(0xABCD, 16, false);
        bs.emit_bits(0x5, 3, false);
        bs.flush_bits(false);
        assert_eq!(bs.scan_bits_no_stuffed_zeros(16).unwrap(), 0xABCD);
        assert_eq!(bs.scan_bits_no_stuffed_zeros(3).unwrap(), 0x5);
    }

    #[test]
    fn scan_eof_and_ff00() {
        let mut bs = BitStream::from_vec(vec![0xAB]);
        assert_eq!(bs.scan_bits(8, true).unwrap(), 0xAB);
        assert_eq!(bs.scan_bits(1, true), Err(JpegError::UnexpectedEof));

        let mut bad = BitStream::from_vec(vec![0xFF, 0xD9]);
        assert_eq!(bad.scan_bits(8, true), Err(JpegError::MissingStuffedZero));
    }

    #[test]
    fn aligned_byte_reads() {
        let mut bs = BitStream::new();
        bs.append_bytes(&[1, 2, 3]);
        assert_eq!(bs.scan_aligned_byte().unwrap(), 1);
        assert_eq!(bs.scan_aligned_byte().unwrap(), 2);
        assert_eq!(bs.scan_aligned_byte().unwrap(), 3);
        assert_eq!(bs.scan_aligned_byte(), Err(JpegError::UnexpectedEof));
    }

    #[test]
    fn pop_undoes_last_append() {
        let mut bs = BitStream::new();
        bs.emit_bits(0x2, 3, true);
        bs.flush_bits(true);
        let len = bs.len();
        bs.append_bytes(&[0xFF, 0xD0]); // speculative restart marker
        assert_eq!(bs.len(), len + 2);
        bs.pop();
        assert_eq!(bs.len(), len);
    }

    #[test]
    fn estimated_size_is_conservative() {
        let mut bs = BitStream::new();
        bs.emit_bits(0x7, 3, true);
        assert_eq!(bs.len(), 0);
        assert!(bs.estimated_byte_size() >= 1);
        bs.flush_bits(true);
        assert!(bs.len() <= bs.estimated_byte_size());
    }

    #[test]
    fn entropy_reader_destuffs() {
        let r = MemReadWriter::from_vec(vec![0xFF, 0x00, 0x80]);
        let mut er = EntropyReader::new(r);
        er.ensure_n_bits(16).unwrap();
        assert_eq!(er.decode_bits(16).unwrap(), 0xFF80);
    }

    #[test]
    fn entropy_reader_marker_is_unconsumable() {
        // 0xAB then a marker: decoding 8 bits works, the next ensure fails
        // with a stuffing error, and after unread the marker bytes are
        // readable through the raw path.
        let r = MemReadWriter::from_vec(vec![0xAB, 0xFF, 0xD9]);
        let mut er = EntropyReader::new(r);
        assert_eq!(er.decode_bits(8).unwrap(), 0xAB);
        assert_eq!(er.ensure_n_bits(8), Err(JpegError::MissingStuffedZero));
        er.unread_byte_stuffed_byte();
        assert_eq!(er.read_byte().unwrap(), 0xFF);
        assert_eq!(er.read_byte().unwrap(), 0xD9);
    }

    #[test]
    fn receive_extend_signs() {
        // 0 with t=1 extends to -1, 1 stays +1 (T.81 Table F.1)
        let r = MemReadWriter::from_vec(vec![0b0100_0000]);
        let mut er = EntropyReader::new(r);
        assert_eq!(er.receive_extend(1).unwrap(), -1);
        assert_eq!(er.receive_extend(1).unwrap(), 1);
    }

    #[test]
    fn eof_is_reported() {
        let r = MemReadWriter::from_vec(vec![0xAA]);
        let mut er = EntropyReader::new(r);
        assert_eq!(er.decode_bits(8).unwrap(), 0xAA);
        assert_eq!(er.ensure_n_bits(1), Err(JpegError::UnexpectedEof));
    }

    #[test]
    fn trailer_reads_stop_at_eof() {
        let r = MemReadWriter::from_vec(vec![1, 2]);
        let mut er = EntropyReader::new(r);
        assert_eq!(er.try_read_byte().unwrap(), Some(1));
        assert_eq!(er.try_read_byte().unwrap(), Some(2));
        assert_eq!(er.try_read_byte().unwrap(), None);
        assert_eq!(er.bytes_consumed(), 2);
    }
}
