// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! # arhc
//!
//! Lossless JPEG ⇄ ARHC structural transcoder.
//!
//! Parses a standard JFIF/JPEG byte stream down to its Huffman-coded scan
//! data, demultiplexes the entropy-coded payload into per-(coefficient,
//! component) plane streams — the ARHC form — and reconstructs the original
//! JPEG byte-for-byte from it, including any bytes trailing the EOI marker.
//! Grouping statistically similar values (the same DCT frequency across the
//! whole image) contiguously lets a downstream general-purpose byte
//! compressor squeeze the result further than the original Huffman coding
//! allows, without touching a single quantized value.
//!
//! This is *not* a pixel decoder: there is no IDCT, no color conversion, no
//! raster output anywhere in the crate.
//!
//! Supports:
//! - Baseline sequential DCT (SOF0), 8-bit precision
//! - Progressive DCT (SOF2): spectral selection, successive approximation,
//!   end-of-band runs
//! - Grayscale and YCbCr; 4:2:0, 4:2:2, 4:4:4 subsampling
//! - Restart markers (DRI/RST), strictly validated to cycle in order
//! - Trailer bytes after EOI, preserved verbatim
//!
//! Does NOT support:
//! - Arithmetic coding, lossless, hierarchical frames -- rejected at parse
//! - 12-bit precision -- rejected at parse
//! - 4-component (CMYK) images -- rejected at parse
//!
//! # Quick start
//!
//! ```rust,ignore
//! use arhc::{compress_jpeg_to_arhc, decompress_arhc_to_jpeg, CompressOptions, MemReadWriter};
//!
//! let jpeg = std::fs::read("photo.jpg").unwrap();
//! let mut packed = MemReadWriter::new();
//! compress_jpeg_to_arhc(
//!     MemReadWriter::from_vec(jpeg.clone()),
//!     &mut packed,
//!     &CompressOptions::default(),
//! ).unwrap();
//!
//! let mut restored = MemReadWriter::new();
//! decompress_arhc_to_jpeg(MemReadWriter::from_vec(packed.into_inner()), &mut restored).unwrap();
//! assert_eq!(restored.data(), jpeg.as_slice());
//! ```

pub mod alloc;
pub mod arhc;
pub mod bitio;
pub mod coeffs;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod huffman;
pub mod io;
pub mod marker;
pub mod parser;
pub mod planes;
pub mod tables;
pub mod zigzag;

pub use alloc::MemoryBudget;
pub use arhc::{
    compress_jpeg_to_arhc, compress_jpeg_to_arhc_multi, decode, decode_is_7z, decode_is_arhc,
    decompress_arhc_to_jpeg, decompress_arhc_to_jpeg_multi, CompressOptions, ThreadContext,
};
pub use bitio::BitStream;
pub use coeffs::CoeffGrid;
pub use error::{ErrorCode, JpegError, Result};
pub use frame::{Component, FrameInfo};
pub use huffman::HuffmanTable;
pub use io::{DecoderReader, DecoderWriter, MemReadWriter, StreamReader, StreamWriter};
pub use parser::ParsedJpeg;
pub use planes::PlaneSet;
pub use tables::QuantTable;
