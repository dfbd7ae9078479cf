// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Canonical Huffman tables for JPEG entropy decoding and re-encoding.
//!
//! One [`HuffmanTable`] is built per DHT entry (T.81 Annex C): an 8-bit
//! lookahead LUT covers the common case in O(1), with a bit-by-bit walk over
//! per-length code ranges as the slow path. The same build also produces the
//! reverse mapping (symbol -> code bits + length) that the ARHC decompression
//! path needs to regenerate identical Huffman codes from recovered symbols.

use crate::bitio::EntropyReader;
use crate::error::{JpegError, Result};
use crate::io::DecoderReader;

/// Maximum code length in bits.
pub const MAX_CODE_LENGTH: usize = 16;

/// Canonical Huffman decode/encode table.
pub struct HuffmanTable {
    /// Fast path: indexed by the next 8 bits of the stream. High byte is the
    /// decoded symbol, low byte is `1 + code length`; 0 means the code is
    /// longer than 8 bits and the slow path must run.
    lut: [u16; 256],
    /// Smallest code of each length (sentinel -1: no codes of that length).
    min_codes: [i32; MAX_CODE_LENGTH],
    /// Largest code of each length (sentinel -1).
    max_codes: [i32; MAX_CODE_LENGTH],
    /// Index into `vals` of the first symbol of each length (sentinel -1).
    vals_indices: [i32; MAX_CODE_LENGTH],
    /// Symbol values in code order.
    vals: Vec<u8>,
    /// Re-encoding table: for each symbol, its code bits and code length
    /// (length 0 = symbol absent from this table).
    encode: [(u16, u8); 256],
}

impl HuffmanTable {
    /// Build a table from a DHT entry: `bits[i]` is the number of codes of
    /// length `i + 1`, `huffval` the symbols in code order.
    ///
    /// Malformed tables (more codes of a length than the code space can
    /// represent, or a count/value mismatch) are rejected here so decode
    /// never indexes out of bounds.
    pub fn build(bits: &[u8; 16], huffval: &[u8]) -> Result<Self> {
        let n_codes: usize = bits.iter().map(|&b| usize::from(b)).sum();
        if n_codes == 0 || n_codes > 256 {
            return Err(JpegError::InvalidHuffmanTable("bad total code count"));
        }
        if huffval.len() != n_codes {
            return Err(JpegError::InvalidHuffmanTable("code count/value mismatch"));
        }

        let mut lut = [0u16; 256];
        let mut min_codes = [-1i32; MAX_CODE_LENGTH];
        let mut max_codes = [-1i32; MAX_CODE_LENGTH];
        let mut vals_indices = [-1i32; MAX_CODE_LENGTH];
        let mut encode = [(0u16, 0u8); 256];

        let mut code: u32 = 0;
        let mut si = 0usize;

        for length in 1..=MAX_CODE_LENGTH {
            let count = usize::from(bits[length - 1]);
            if count == 0 {
                code <<= 1;
                continue;
            }
            if code + count as u32 > 1u32 << length {
                return Err(JpegError::InvalidHuffmanTable(
                    "too many codes for code length",
                ));
            }
            min_codes[length - 1] = code as i32;
            max_codes[length - 1] = (code + count as u32 - 1) as i32;
            vals_indices[length - 1] = si as i32;

            for _ in 0..count {
                let symbol = huffval[si];
                encode[usize::from(symbol)] = (code as u16, length as u8);
                if length <= 8 {
                    // This code, left-aligned to 8 bits, owns 2^(8-length)
                    // LUT entries.
                    let base = (code << (8 - length)) as usize;
                    let fill = 1usize << (8 - length);
                    let entry = (u16::from(symbol) << 8) | (length as u16 + 1);
                    for e in &mut lut[base..base + fill] {
                        *e = entry;
                    }
                }
                code += 1;
                si += 1;
            }
            code <<= 1;
        }

        Ok(Self {
            lut,
            min_codes,
            max_codes,
            vals_indices,
            vals: huffval.to_vec(),
            encode,
        })
    }

    /// Decode one Huffman symbol from the entropy reader.
    ///
    /// Peeks 8 bits through the LUT; on a miss (or when fewer than 8 bits
    /// remain before the scan ends) falls back to the bit-by-bit walk over
    /// `min_codes`/`max_codes`. No match within 16 bits is
    /// `ERR_SHORT_HUFFMAN`.
    pub fn decode<R: DecoderReader>(&self, er: &mut EntropyReader<R>) -> Result<u8> {
        if er.bits.n < 8 {
            match er.ensure_n_bits(8) {
                Ok(()) => {}
                Err(JpegError::MissingStuffedZero) => {
                    // The lookahead ran into a marker: give the bytes back
                    // and decode from whatever bits remain.
                    er.unread_byte_stuffed_byte();
                    return self.decode_slow(er);
                }
                Err(JpegError::UnexpectedEof) => return self.decode_slow(er),
                Err(e) => return Err(e),
            }
        }
        let v = self.lut[((er.bits.a >> (er.bits.n - 8)) & 0xFF) as usize];
        if v != 0 {
            let len = i32::from(v & 0xFF) - 1;
            er.bits.n -= len;
            er.bits.m >>= len;
            return Ok((v >> 8) as u8);
        }
        self.decode_slow(er)
    }

    fn decode_slow<R: DecoderReader>(&self, er: &mut EntropyReader<R>) -> Result<u8> {
        let mut code: i32 = 0;
        for length in 0..MAX_CODE_LENGTH {
            if er.bits.n == 0 {
                er.ensure_n_bits(1)?;
            }
            if er.bits.a & er.bits.m != 0 {
                code |= 1;
            }
            er.bits.n -= 1;
            er.bits.m >>= 1;
            if self.max_codes[length] >= 0 && code <= self.max_codes[length] && code >= self.min_codes[length] {
                let idx = self.vals_indices[length] + code - self.min_codes[length];
                return Ok(self.vals[idx as usize]);
            }
            code <<= 1;
        }
        Err(JpegError::ShortHuffmanCode)
    }

    /// Look up the code for `symbol` in the re-encoding table.
    pub fn encode(&self, symbol: u8) -> Result<(u16, u8)> {
        let (code, len) = self.encode[usize::from(symbol)];
        if len == 0 {
            return Err(JpegError::MissingEncodeSymbol(symbol));
        }
        Ok((code, len))
    }

    /// Number of symbols in this table.
    pub fn n_codes(&self) -> usize {
        self.vals.len()
    }
}

/// Encode a signed value into its JPEG magnitude-category representation.
/// Returns (magnitude bits, category). Negative values use the
/// one's-complement form of T.81 F.1.2.1.
pub fn encode_value(value: i32) -> (u32, u8) {
    if value == 0 {
        return (0, 0);
    }
    let abs = value.unsigned_abs();
    let size = (32 - abs.leading_zeros()) as u8;
    let bits = if value > 0 {
        value as u32
    } else {
        value.wrapping_sub(1) as u32
    };
    let mask = if size >= 32 { u32::MAX } else { (1u32 << size) - 1 };
    (bits & mask, size)
}

/// Sign-extend a `bits`-bit magnitude per T.81 Table F.1. Inverse of
/// [`encode_value`] for nonzero categories.
pub fn extend_sign(value: u32, bits: u8) -> i32 {
    if bits == 0 {
        return 0;
    }
    let half = 1i64 << (bits - 1);
    if i64::from(value) < half {
        (i64::from(value) - (1i64 << bits) + 1) as i32
    } else {
        value as i32
    }
}
