// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Error types for JPEG parsing and ARHC transcoding.
//!
//! Every fallible operation in the crate returns [`JpegError`]. The enum is
//! deliberately fine-grained for diagnostics, but each variant maps onto one
//! of four wire-level conditions via [`JpegError::code`]: reader exhaustion,
//! a byte-stuffing violation, an unterminated Huffman code, or a catch-all
//! for everything else (malformed segments, unsupported features, internal
//! ARHC inconsistencies).

use thiserror::Error;

/// The closed error taxonomy of the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Reader exhausted before the expected data.
    Eof,
    /// A literal `0xFF` inside entropy-coded data was not followed by `0x00`.
    Ff00,
    /// No canonical Huffman code matched within 16 bits.
    ShortHuffman,
    /// Everything else.
    Misc,
}

/// Errors that can occur during JPEG parsing, re-encoding, or ARHC
/// container handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JpegError {
    /// Input data is too short or truncated.
    #[error("unexpected end of data")]
    UnexpectedEof,
    /// A `0xFF` byte inside entropy-coded data lacked its stuffed `0x00`.
    #[error("0xFF byte not followed by stuffed 0x00")]
    MissingStuffedZero,
    /// No canonical Huffman code matched within the 16-bit maximum length.
    #[error("no Huffman code matched within 16 bits")]
    ShortHuffmanCode,
    /// Missing SOI (0xFFD8) at the start of data.
    #[error("missing SOI marker (not a JPEG)")]
    InvalidSoi,
    /// Encountered a frame type this transcoder does not handle
    /// (arithmetic coding, lossless, differential, hierarchical).
    #[error("unsupported JPEG marker: 0xFF{0:02X}")]
    UnsupportedMarker(u8),
    /// Only 8-bit sample precision is supported.
    #[error("unsupported sample precision: {0}-bit")]
    UnsupportedPrecision(u8),
    /// Only grayscale (1) and YCbCr (3) component counts are supported;
    /// 4-component CMYK is rejected here.
    #[error("unsupported component count: {0}")]
    UnsupportedComponentCount(u8),
    /// A marker segment has invalid or inconsistent length/content.
    #[error("invalid marker data: {0}")]
    InvalidMarkerData(&'static str),
    /// Quantization table ID out of range (0-3).
    #[error("invalid quantization table ID: {0}")]
    InvalidQuantTableId(u8),
    /// A DHT entry could not be turned into a valid canonical table.
    #[error("invalid Huffman table: {0}")]
    InvalidHuffmanTable(&'static str),
    /// A scan referenced a Huffman table slot that was never defined.
    #[error("missing Huffman table: class {class}, id {id}")]
    MissingHuffmanTable { class: u8, id: u8 },
    /// Component ID referenced in SOS not found in SOF.
    #[error("unknown component ID in SOS: {0}")]
    UnknownComponentId(u8),
    /// Image dimensions or sampling factors are invalid.
    #[error("invalid image dimensions or sampling factors")]
    InvalidDimensions,
    /// Restart markers must cycle RST0..RST7 in order.
    #[error("restart marker out of sequence: expected RST{expected}, found RST{found}")]
    RestartOutOfSequence { expected: u8, found: u8 },
    /// The session memory budget was exceeded.
    #[error("memory limit exceeded while allocating {0}")]
    MemoryLimit(&'static str),
    /// The input is not an ARHC container.
    #[error("not an ARHC container")]
    NotArhc,
    /// Compression input already carries the ARHC magic; refusing to
    /// double-wrap.
    #[error("input is already ARHC-compressed")]
    AlreadyArhc,
    /// The ARHC container contradicts itself (plane exhausted early,
    /// geometry mismatch, bad chunk framing).
    #[error("inconsistent ARHC container: {0}")]
    ArhcInconsistent(&'static str),
    /// The re-encoded JPEG did not reproduce the input byte-for-byte.
    #[error("round-trip verification failed: re-encoded JPEG differs from input")]
    RoundTripMismatch,
    /// The Huffman encode table has no code for a symbol the re-encoder
    /// needs.
    #[error("Huffman table missing code for symbol 0x{0:02X}")]
    MissingEncodeSymbol(u8),
    /// An underlying I/O error from a reader or writer port.
    #[error("I/O error: {0}")]
    Io(String),
    /// Worker pool construction failed.
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

impl JpegError {
    /// Collapse this error onto the closed four-code taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnexpectedEof => ErrorCode::Eof,
            Self::MissingStuffedZero => ErrorCode::Ff00,
            Self::ShortHuffmanCode => ErrorCode::ShortHuffman,
            _ => ErrorCode::Misc,
        }
    }
}

pub type Result<T> = std::result::Result<T, JpegError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping() {
        assert_eq!(JpegError::UnexpectedEof.code(), ErrorCode::Eof);
        assert_eq!(JpegError::MissingStuffedZero.code(), ErrorCode::Ff00);
        assert_eq!(JpegError::ShortHuffmanCode.code(), ErrorCode::ShortHuffman);
        assert_eq!(JpegError::InvalidSoi.code(), ErrorCode::Misc);
        assert_eq!(JpegError::RoundTripMismatch.code(), ErrorCode::Misc);
        assert_eq!(
            JpegError::RestartOutOfSequence { expected: 1, found: 3 }.code(),
            ErrorCode::Misc
        );
    }
}
