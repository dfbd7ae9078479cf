// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! The ARHC container and the public transcode entry points.
//!
//! Compression parses a JPEG, demultiplexes its coefficients into plane
//! streams and writes the container: a small header, the captured
//! header/marker bytes as tagged chunks (raw bytes interleaved with scan
//! placeholders), the 192 length-prefixed plane streams, and the verbatim
//! trailer blob. Decompression reverses it: rebuild the coefficient grids
//! from the planes, replay the raw chunks, and re-encode each scan at its
//! placeholder. The container layout is private; the only compatibility
//! requirement is self-consistency between the two directions.
//!
//! By default compression *verifies*: it decompresses the freshly built
//! container in memory and requires byte identity with the input before
//! emitting anything. A JPEG whose entropy coding this re-encoder cannot
//! reproduce (non-canonical EOB-run segmentation, exotic padding) is
//! rejected with [`JpegError::RoundTripMismatch`] instead of silently
//! producing a container that would not round-trip.

use rayon::prelude::*;

use crate::alloc::MemoryBudget;
use crate::bitio::BitStream;
use crate::coeffs::CoeffGrid;
use crate::encoder;
use crate::error::{JpegError, Result};
use crate::frame::{parse_sof, FrameInfo};
use crate::huffman::HuffmanTable;
use crate::io::{read_to_end, DecoderReader, DecoderWriter, MemReadWriter, StreamReader};
use crate::marker;
use crate::parser::{HeaderChunk, ParsedJpeg, ScanInfo};
use crate::planes::{self, PlaneSet, TOTAL_PLANES};
use crate::tables::parse_dht;

const ARHC_MAGIC: [u8; 4] = *b"ARHC";
const ARHC_VERSION: u8 = 1;
const SEVEN_Z_MAGIC: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Pure magic-byte check: does this prefix start an ARHC container?
pub fn decode_is_arhc(prefix: &[u8]) -> bool {
    prefix.len() >= ARHC_MAGIC.len() && prefix[..ARHC_MAGIC.len()] == ARHC_MAGIC
}

/// Pure magic-byte check: does this prefix start a 7z archive?
pub fn decode_is_7z(prefix: &[u8]) -> bool {
    prefix.len() >= SEVEN_Z_MAGIC.len() && prefix[..SEVEN_Z_MAGIC.len()] == SEVEN_Z_MAGIC
}

/// Compression tuning knobs.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Plane packing level: 0 stores raw values, >= 1 adds block-to-block
    /// deltas on the DC planes.
    pub level: u8,
    /// Requested component-coalescing bitmask over
    /// [`planes::COALESCE_PAIRS`]; reduced to its applicable bits.
    pub coalescing: u8,
    /// Decompress the container in memory and require byte identity with
    /// the input before emitting anything.
    pub verify: bool,
    /// Session memory limit in bytes.
    pub memory_limit: usize,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: 1,
            coalescing: 0,
            verify: true,
            memory_limit: crate::alloc::DEFAULT_MEMORY_LIMIT,
        }
    }
}

/// Opaque work-dispatch collaborator for the `*_multi` entry points.
pub struct ThreadContext {
    pool: rayon::ThreadPool,
}

impl ThreadContext {
    /// Build a worker pool with `num_threads` threads (0 = one per core).
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| JpegError::ThreadPool(e.to_string()))?;
        Ok(Self { pool })
    }

    fn install<T: Send>(&self, f: impl FnOnce() -> T + Send) -> T {
        self.pool.install(f)
    }
}

/// Parse a JPEG from `reader` and write the byte-identical reconstruction
/// to `writer`. Validates the stream end to end without producing ARHC.
pub fn decode<R: DecoderReader, W: DecoderWriter>(mut reader: R, mut writer: W) -> Result<()> {
    let parsed = ParsedJpeg::read_from(&mut reader, MemoryBudget::default())?;
    let out = render_jpeg(&parsed.chunks, &parsed.coeffs, None)?;
    writer.write_all(&out)?;
    writer.write_all(&parsed.trailer)?;
    writer.close()
}

/// Losslessly repack a JPEG into an ARHC container.
pub fn compress_jpeg_to_arhc<R: DecoderReader, W: DecoderWriter>(
    mut reader: R,
    mut writer: W,
    options: &CompressOptions,
) -> Result<()> {
    compress_impl(&mut reader, &mut writer, options, None)
}

/// [`compress_jpeg_to_arhc`] with per-component plane work dispatched onto
/// the worker pool.
pub fn compress_jpeg_to_arhc_multi<R: DecoderReader, W: DecoderWriter>(
    mut reader: R,
    mut writer: W,
    options: &CompressOptions,
    ctx: &ThreadContext,
) -> Result<()> {
    compress_impl(&mut reader, &mut writer, options, Some(ctx))
}

/// Reconstruct the original JPEG, byte for byte, from an ARHC container.
pub fn decompress_arhc_to_jpeg<R: DecoderReader, W: DecoderWriter>(
    mut reader: R,
    mut writer: W,
) -> Result<()> {
    let mut data = Vec::new();
    read_to_end(&mut reader, &mut data)?;
    decompress_bytes(&data, &mut writer, None)
}

/// [`decompress_arhc_to_jpeg`] with restart-interval-bounded scan segments
/// encoded on the worker pool.
pub fn decompress_arhc_to_jpeg_multi<R: DecoderReader, W: DecoderWriter>(
    mut reader: R,
    mut writer: W,
    ctx: &ThreadContext,
) -> Result<()> {
    let mut data = Vec::new();
    read_to_end(&mut reader, &mut data)?;
    decompress_bytes(&data, &mut writer, Some(ctx))
}

fn compress_impl(
    reader: &mut dyn DecoderReader,
    writer: &mut dyn DecoderWriter,
    options: &CompressOptions,
    ctx: Option<&ThreadContext>,
) -> Result<()> {
    let mut input = Vec::new();
    read_to_end(reader, &mut input)?;
    if decode_is_arhc(&input) {
        return Err(JpegError::AlreadyArhc);
    }

    let budget = MemoryBudget::new(options.memory_limit);
    let parsed = ParsedJpeg::read_from(StreamReader::new(input.as_slice()), budget)?;

    let effective = planes::effective_coalescing(&parsed.coeffs, options.coalescing);
    let plane_set = match ctx {
        None => PlaneSet::demux(&parsed.coeffs, options.level, options.coalescing),
        Some(ctx) => ctx.install(|| {
            let streams: Vec<_> = (0..parsed.coeffs.len())
                .into_par_iter()
                .map(|ci| {
                    planes::demux_component_streams(&parsed.coeffs, ci, options.level, effective)
                })
                .collect();
            PlaneSet::from_component_streams(streams, options.level, effective)
        }),
    };

    let container = write_container(&parsed, plane_set);
    log::debug!(
        "ARHC container: {} bytes from {} input bytes",
        container.len(),
        input.len()
    );

    if options.verify {
        let mut reproduced = MemReadWriter::new();
        decompress_bytes(&container, &mut reproduced, ctx)?;
        if reproduced.data() != input.as_slice() {
            return Err(JpegError::RoundTripMismatch);
        }
    }

    writer.write_all(&container)?;
    writer.close()
}

fn decompress_bytes(
    data: &[u8],
    writer: &mut dyn DecoderWriter,
    ctx: Option<&ThreadContext>,
) -> Result<()> {
    let container = read_container(data)?;

    // The frame header lives inside the captured chunks; find it first so
    // the plane geometry is known.
    let frame = find_frame(&container.chunks)?;
    if frame.components.len() != usize::from(container.n_components)
        || frame.width != container.width
        || frame.height != container.height
    {
        return Err(JpegError::ArhcInconsistent("header disagrees with SOF"));
    }
    if frame.progressive != (container.flags & 1 != 0) {
        return Err(JpegError::ArhcInconsistent("progressive flag disagrees with SOF"));
    }

    let mut budget = MemoryBudget::default();
    let shapes: Vec<(usize, usize)> = (0..frame.components.len())
        .map(|ci| (frame.blocks_wide(ci), frame.blocks_tall(ci)))
        .collect();
    for &(bw, bt) in &shapes {
        budget.charge(CoeffGrid::storage_bytes(bw, bt), "coefficient grid")?;
    }

    let mut plane_set =
        PlaneSet::from_streams(container.planes, container.level, container.coalescing)?;
    let coeffs = plane_set.rebuild(&shapes)?;

    let out = render_jpeg(&container.chunks, &coeffs, ctx)?;
    if (out.len() + container.trailer.len()) as u64 != container.original_size {
        return Err(JpegError::ArhcInconsistent("reconstructed size mismatch"));
    }
    writer.write_all(&out)?;
    writer.write_all(&container.trailer)?;
    writer.close()
}

/// Replay captured chunks, re-encoding each scan at its placeholder.
///
/// The raw chunks are re-interpreted as they stream past so that DHT/DRI
/// state and the pending SOS header are exactly what the original decode
/// saw at the same point.
fn render_jpeg(
    chunks: &[HeaderChunk],
    coeffs: &[CoeffGrid],
    ctx: Option<&ThreadContext>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut huff: [[Option<HuffmanTable>; 4]; 2] = Default::default();
    let mut restart_interval = 0u16;
    let mut frame: Option<FrameInfo> = None;
    let mut pending_scan: Option<ScanInfo> = None;

    for chunk in chunks {
        match chunk {
            HeaderChunk::Raw(bytes) => {
                out.extend_from_slice(bytes);
                marker::walk_segments(bytes, |m, body| {
                    match m {
                        marker::DHT => {
                            for spec in parse_dht(body)? {
                                let t = HuffmanTable::build(&spec.bits, &spec.huffval)?;
                                huff[usize::from(spec.class)][usize::from(spec.id)] = Some(t);
                            }
                        }
                        marker::DRI => restart_interval = marker::parse_dri(body)?,
                        marker::SOF0 | marker::SOF2 => {
                            frame = Some(parse_sof(body, m == marker::SOF2)?);
                        }
                        marker::SOS => {
                            let f = frame
                                .as_ref()
                                .ok_or(JpegError::ArhcInconsistent("SOS before SOF"))?;
                            pending_scan =
                                Some(ScanInfo::from_sos(f, body, restart_interval)?);
                        }
                        _ => {}
                    }
                    Ok(())
                })?;
            }
            HeaderChunk::Scan(_) => {
                let f = frame
                    .as_ref()
                    .ok_or(JpegError::ArhcInconsistent("scan before SOF"))?;
                let scan = pending_scan
                    .take()
                    .ok_or(JpegError::ArhcInconsistent("scan without SOS header"))?;
                let bytes = encode_scan_bytes(f, &scan, coeffs, &huff, ctx)?;
                out.extend_from_slice(&bytes);
            }
        }
    }
    Ok(out)
}

/// Encode one scan's entropy bytes, serial or segment-parallel.
fn encode_scan_bytes(
    frame: &FrameInfo,
    scan: &ScanInfo,
    coeffs: &[CoeffGrid],
    huff: &[[Option<HuffmanTable>; 4]; 2],
    ctx: Option<&ThreadContext>,
) -> Result<Vec<u8>> {
    match ctx {
        Some(ctx) if scan.restart_interval > 0 => {
            // Each restart-interval segment starts byte-aligned with reset
            // predictors, so segments encode independently and concatenate
            // in order.
            let segments = encoder::scan_segments(frame, scan);
            let parts: Result<Vec<Vec<u8>>> = ctx.install(|| {
                segments
                    .par_iter()
                    .map(|&(start, end)| {
                        let mut bs = BitStream::new();
                        encoder::encode_scan_segment(
                            &mut bs, frame, scan, coeffs, huff, start, end,
                        )?;
                        Ok(bs.into_bytes())
                    })
                    .collect()
            });
            let parts = parts?;
            let mut out = Vec::new();
            for (i, part) in parts.iter().enumerate() {
                out.extend_from_slice(part);
                if i + 1 < parts.len() {
                    out.push(0xFF);
                    out.push(marker::RST0 + (i as u8 & 7));
                }
            }
            Ok(out)
        }
        _ => {
            let mut bs = BitStream::new();
            encoder::encode_scan(&mut bs, frame, scan, coeffs, huff)?;
            Ok(bs.into_bytes())
        }
    }
}

fn find_frame(chunks: &[HeaderChunk]) -> Result<FrameInfo> {
    let mut frame: Option<FrameInfo> = None;
    for chunk in chunks {
        if let HeaderChunk::Raw(bytes) = chunk {
            marker::walk_segments(bytes, |m, body| {
                if m == marker::SOF0 || m == marker::SOF2 {
                    frame = Some(parse_sof(body, m == marker::SOF2)?);
                }
                Ok(())
            })?;
            if frame.is_some() {
                break;
            }
        }
    }
    frame.ok_or(JpegError::ArhcInconsistent("no SOF in captured header"))
}

struct Container {
    flags: u8,
    level: u8,
    coalescing: u8,
    n_components: u8,
    width: u16,
    height: u16,
    original_size: u64,
    chunks: Vec<HeaderChunk>,
    planes: Vec<BitStream>,
    trailer: Vec<u8>,
}

fn write_container(parsed: &ParsedJpeg, plane_set: PlaneSet) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&ARHC_MAGIC);
    out.push(ARHC_VERSION);
    let mut flags = 0u8;
    if parsed.frame.progressive {
        flags |= 1;
    }
    out.push(flags);
    out.push(plane_set.level());
    out.push(plane_set.coalescing());
    out.push(parsed.frame.components.len() as u8);
    out.extend_from_slice(&parsed.frame.width.to_be_bytes());
    out.extend_from_slice(&parsed.frame.height.to_be_bytes());
    out.extend_from_slice(&parsed.original_size.to_be_bytes());

    out.extend_from_slice(&(parsed.chunks.len() as u32).to_be_bytes());
    for chunk in &parsed.chunks {
        match chunk {
            HeaderChunk::Raw(bytes) => {
                out.push(0);
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
            HeaderChunk::Scan(_) => out.push(1),
        }
    }

    for stream in plane_set.into_streams() {
        let bytes = stream.into_bytes();
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&bytes);
    }

    out.extend_from_slice(&(parsed.trailer.len() as u32).to_be_bytes());
    out.extend_from_slice(&parsed.trailer);
    out
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(JpegError::UnexpectedEof);
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let s = self.take(2)?;
        Ok(u16::from_be_bytes([s[0], s[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let s = self.take(4)?;
        Ok(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let s = self.take(8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(s);
        Ok(u64::from_be_bytes(b))
    }
}

fn read_container(data: &[u8]) -> Result<Container> {
    if !decode_is_arhc(data) {
        return Err(JpegError::NotArhc);
    }
    let mut c = Cursor {
        data,
        pos: ARHC_MAGIC.len(),
    };
    let version = c.u8()?;
    if version != ARHC_VERSION {
        return Err(JpegError::ArhcInconsistent("unknown container version"));
    }
    let flags = c.u8()?;
    let level = c.u8()?;
    let coalescing = c.u8()?;
    let n_components = c.u8()?;
    let width = c.u16()?;
    let height = c.u16()?;
    let original_size = c.u64()?;

    let n_chunks = c.u32()? as usize;
    let mut chunks = Vec::with_capacity(n_chunks);
    let mut n_scans = 0usize;
    for _ in 0..n_chunks {
        match c.u8()? {
            0 => {
                let len = c.u32()? as usize;
                chunks.push(HeaderChunk::Raw(c.take(len)?.to_vec()));
            }
            1 => {
                chunks.push(HeaderChunk::Scan(n_scans));
                n_scans += 1;
            }
            _ => return Err(JpegError::ArhcInconsistent("bad chunk tag")),
        }
    }
    if n_scans == 0 {
        return Err(JpegError::ArhcInconsistent("container holds no scans"));
    }

    let mut planes = Vec::with_capacity(TOTAL_PLANES);
    for _ in 0..TOTAL_PLANES {
        let len = c.u32()? as usize;
        planes.push(BitStream::from_vec(c.take(len)?.to_vec()));
    }

    let trailer_len = c.u32()? as usize;
    let trailer = c.take(trailer_len)?.to_vec();
    if c.pos != data.len() {
        return Err(JpegError::ArhcInconsistent("trailing container bytes"));
    }

    Ok(Container {
        flags,
        level,
        coalescing,
        n_components,
        width,
        height,
        original_size,
        chunks,
        planes,
        trailer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_arhc_magic() {
        assert!(decode_is_arhc(b"ARHC\x01rest"));
        assert!(!decode_is_arhc(b"ARH"));
        assert!(!decode_is_arhc(&[0xFF, 0xD8, 0xFF, 0xE0]));
    }

    #[test]
    fn sniff_7z_magic() {
        assert!(decode_is_7z(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0, 0]));
        assert!(!decode_is_7z(b"ARHC\x01\x00"));
        assert!(!decode_is_7z(&[0x37, 0x7A]));
    }

    #[test]
    fn truncated_container_is_eof() {
        assert_eq!(
            read_container(b"ARHC\x01\x00\x01\x00").map(|_| ()),
            Err(JpegError::UnexpectedEof)
        );
    }

    #[test]
    fn non_arhc_is_rejected() {
        assert_eq!(
            read_container(&[0xFF, 0xD8, 0xFF, 0xD9]).map(|_| ()),
            Err(JpegError::NotArhc)
        );
    }

    #[test]
    fn default_options() {
        let o = CompressOptions::default();
        assert_eq!(o.level, 1);
        assert_eq!(o.coalescing, 0);
        assert!(o.verify);
    }
}
