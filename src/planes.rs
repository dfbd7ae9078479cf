// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Coefficient-plane separation: the heart of the ARHC transform.
//!
//! The entropy-coded payload of a JPEG interleaves all 64 DCT frequencies of
//! every block. This module demultiplexes them into 192 independent bit
//! streams, one per (zigzag position, component): values of the same
//! frequency are statistically similar, so grouping them contiguously is
//! what lets a downstream byte compressor squeeze the result. The inverse
//! direction drains the planes in the same block-raster order to hand every
//! block back to the scan re-encoder.
//!
//! Values are stored as a 5-bit magnitude category followed by the VLI
//! magnitude bits. Two optional predictions shrink the distributions:
//! block-to-block deltas on the DC plane (`level >= 1`), and component
//! coalescing, where one component's planes are stored as deltas against
//! another's (exploiting chroma correlation).

use crate::bitio::BitStream;
use crate::coeffs::{CoeffGrid, BLOCK_SIZE};
use crate::error::{JpegError, Result};
use crate::frame::MAX_COMPONENTS;
use crate::huffman::{encode_value, extend_sign};

/// Plane streams per component: one per zigzag position.
pub const PLANES_PER_COMPONENT: usize = BLOCK_SIZE;

/// Total plane streams in a set.
pub const TOTAL_PLANES: usize = PLANES_PER_COMPONENT * MAX_COMPONENTS;

/// The component pairs addressable by the coalescing bitmask, in priority
/// order; bit N stores the pair's second component as deltas against the
/// first.
pub const COALESCE_PAIRS: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];

/// Reduce a requested coalescing mask to the bits that can actually be
/// applied: both components present, equal block counts, and at most one
/// reference per target component (lowest bit wins).
pub fn effective_coalescing(coeffs: &[CoeffGrid], requested: u8) -> u8 {
    let mut eff = 0u8;
    let mut targeted = [false; MAX_COMPONENTS];
    for (bit, &(a, b)) in COALESCE_PAIRS.iter().enumerate() {
        if requested & (1 << bit) == 0 {
            continue;
        }
        if a >= coeffs.len() || b >= coeffs.len() {
            continue;
        }
        if coeffs[a].total_blocks() != coeffs[b].total_blocks() {
            continue;
        }
        if targeted[b] {
            continue;
        }
        targeted[b] = true;
        eff |= 1 << bit;
    }
    eff
}

/// The reference component for `ci` under an effective mask, if any.
fn reference_of(ci: usize, coalescing: u8) -> Option<usize> {
    COALESCE_PAIRS
        .iter()
        .enumerate()
        .find(|&(bit, &(_, b))| b == ci && coalescing & (1 << bit) != 0)
        .map(|(_, &(a, _))| a)
}

fn write_value(bs: &mut BitStream, v: i32) {
    let (bits, size) = encode_value(v);
    bs.emit_bits(u32::from(size), 5, false);
    if size == 0 {
        return;
    }
    if size <= 16 {
        bs.emit_bits(bits, size, false);
    } else {
        bs.emit_bits(bits >> 16, size - 16, false);
        bs.emit_bits(bits & 0xFFFF, 16, false);
    }
}

fn read_value(bs: &mut BitStream) -> Result<i32> {
    let size = bs.scan_bits_no_stuffed_zeros(5)? as u8;
    if size == 0 {
        return Ok(0);
    }
    let bits = if size <= 16 {
        bs.scan_bits_no_stuffed_zeros(size)?
    } else {
        let hi = bs.scan_bits_no_stuffed_zeros(size - 16)?;
        let lo = bs.scan_bits_no_stuffed_zeros(16)?;
        (hi << 16) | lo
    };
    Ok(extend_sign(bits, size))
}

/// Demultiplex one component's grid into its 64 plane streams.
///
/// Independent per component (the reference grid is read-only), which is
/// what the parallel compression path exploits.
pub fn demux_component_streams(
    coeffs: &[CoeffGrid],
    ci: usize,
    level: u8,
    coalescing: u8,
) -> Vec<BitStream> {
    let mut planes = vec![BitStream::new(); PLANES_PER_COMPONENT];
    let grid = &coeffs[ci];
    let reference = reference_of(ci, coalescing).map(|a| &coeffs[a]);
    let mut prev_dc = 0i32;

    for b in 0..grid.total_blocks() {
        let block = grid.block(b);
        let rblock = reference.map(|r| r.block(b));
        for (pos, plane) in planes.iter_mut().enumerate() {
            let mut v = block[pos];
            if let Some(rb) = rblock {
                v = v.wrapping_sub(rb[pos]);
            }
            if pos == 0 && level >= 1 {
                let d = v.wrapping_sub(prev_dc);
                prev_dc = v;
                v = d;
            }
            write_value(plane, v);
        }
    }
    for plane in &mut planes {
        plane.flush_bits(false);
    }
    planes
}

/// The 192 coefficient-plane buffers of one image, plus the packing
/// parameters needed to reverse them.
pub struct PlaneSet {
    /// Component-major: `planes[ci * 64 + pos]`.
    planes: Vec<BitStream>,
    level: u8,
    /// Effective coalescing mask (already reduced).
    coalescing: u8,
}

impl PlaneSet {
    /// Demultiplex all components. `requested_coalescing` is reduced to its
    /// applicable bits first.
    pub fn demux(coeffs: &[CoeffGrid], level: u8, requested_coalescing: u8) -> Self {
        let coalescing = effective_coalescing(coeffs, requested_coalescing);
        Self::from_component_streams(
            (0..coeffs.len())
                .map(|ci| demux_component_streams(coeffs, ci, level, coalescing))
                .collect(),
            level,
            coalescing,
        )
    }

    /// Assemble a set from per-component stream bundles (the parallel
    /// compression path builds the bundles concurrently).
    pub fn from_component_streams(
        per_component: Vec<Vec<BitStream>>,
        level: u8,
        coalescing: u8,
    ) -> Self {
        let mut planes = Vec::with_capacity(TOTAL_PLANES);
        for comp in per_component {
            debug_assert_eq!(comp.len(), PLANES_PER_COMPONENT);
            planes.extend(comp);
        }
        planes.resize_with(TOTAL_PLANES, BitStream::new);
        Self {
            planes,
            level,
            coalescing,
        }
    }

    /// Rehydrate a set from raw plane streams read out of a container.
    pub fn from_streams(planes: Vec<BitStream>, level: u8, coalescing: u8) -> Result<Self> {
        if planes.len() != TOTAL_PLANES {
            return Err(JpegError::ArhcInconsistent("wrong plane stream count"));
        }
        Ok(Self {
            planes,
            level,
            coalescing,
        })
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn coalescing(&self) -> u8 {
        self.coalescing
    }

    pub fn plane(&self, ci: usize, pos: usize) -> &BitStream {
        &self.planes[ci * PLANES_PER_COMPONENT + pos]
    }

    pub fn into_streams(self) -> Vec<BitStream> {
        self.planes
    }

    /// Reconstruct per-component grids. `shapes` gives each component's
    /// padded (blocks_wide, blocks_tall); any inconsistency between the
    /// planes and the requested geometry aborts.
    pub fn rebuild(&mut self, shapes: &[(usize, usize)]) -> Result<Vec<CoeffGrid>> {
        if shapes.len() > MAX_COMPONENTS {
            return Err(JpegError::ArhcInconsistent("too many components"));
        }
        // References always have a lower index than their targets, so
        // ascending order sees reconstructed reference values.
        let mut grids: Vec<CoeffGrid> = Vec::with_capacity(shapes.len());
        for (ci, &(bw, bt)) in shapes.iter().enumerate() {
            let mut grid = CoeffGrid::new(bw, bt);
            let reference = reference_of(ci, self.coalescing);
            if let Some(a) = reference {
                if grids[a].total_blocks() != grid.total_blocks() {
                    return Err(JpegError::ArhcInconsistent(
                        "coalesced components disagree on block count",
                    ));
                }
            }
            let mut prev_dc = 0i32;
            for b in 0..grid.total_blocks() {
                for pos in 0..PLANES_PER_COMPONENT {
                    let plane = &mut self.planes[ci * PLANES_PER_COMPONENT + pos];
                    let mut v = read_value(plane)
                        .map_err(|_| JpegError::ArhcInconsistent("plane stream exhausted"))?;
                    if pos == 0 && self.level >= 1 {
                        v = prev_dc.wrapping_add(v);
                        prev_dc = v;
                    }
                    if let Some(a) = reference {
                        v = v.wrapping_add(grids[a].block(b)[pos]);
                    }
                    grid.block_mut(b)[pos] = v;
                }
            }
            grids.push(grid);
        }
        Ok(grids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_grid(seed: i32, bw: usize, bt: usize) -> CoeffGrid {
        let mut g = CoeffGrid::new(bw, bt);
        let mut x = seed;
        for b in 0..g.total_blocks() {
            let block = g.block_mut(b);
            for v in block.iter_mut() {
                // Small deterministic pseudo-noise.
                x = x.wrapping_mul(1103515245).wrapping_add(12345);
                *v = (x >> 24) % 50;
            }
        }
        g
    }

    #[test]
    fn value_codec_roundtrip() {
        let mut bs = BitStream::new();
        let values = [
            0, 1, -1, 42, -42, 255, -256, 32767, -32768, 65535, -65534,
            // Wide values exercise the split emission above 16 bits.
            100_000, -100_000, 1 << 22, -(1 << 22),
        ];
        for &v in &values {
            write_value(&mut bs, v);
        }
        bs.flush_bits(false);
        for &v in &values {
            assert_eq!(read_value(&mut bs).unwrap(), v);
        }
    }

    #[test]
    fn demux_rebuild_roundtrip_plain() {
        let coeffs = vec![test_grid(1, 2, 2), test_grid(2, 1, 1), test_grid(3, 1, 1)];
        let shapes = [(2, 2), (1, 1), (1, 1)];
        for level in [0u8, 1] {
            let mut set = PlaneSet::demux(&coeffs, level, 0);
            assert_eq!(set.coalescing(), 0);
            let rebuilt = set.rebuild(&shapes).unwrap();
            assert_eq!(rebuilt, coeffs);
        }
    }

    #[test]
    fn demux_rebuild_roundtrip_coalesced() {
        let coeffs = vec![test_grid(1, 1, 1), test_grid(2, 1, 1), test_grid(3, 1, 1)];
        let shapes = [(1, 1), (1, 1), (1, 1)];
        // All three pairs requested; (1,2) loses to (0,2) on component 2.
        let mut set = PlaneSet::demux(&coeffs, 1, 0b111);
        assert_eq!(set.coalescing(), 0b011);
        let rebuilt = set.rebuild(&shapes).unwrap();
        assert_eq!(rebuilt, coeffs);
    }

    #[test]
    fn mismatched_geometry_disables_coalescing() {
        let coeffs = vec![test_grid(1, 2, 2), test_grid(2, 1, 1)];
        assert_eq!(effective_coalescing(&coeffs, 0b001), 0);
        // Chroma pair with equal counts still qualifies.
        let coeffs3 = vec![test_grid(1, 2, 2), test_grid(2, 1, 1), test_grid(3, 1, 1)];
        assert_eq!(effective_coalescing(&coeffs3, 0b100), 0b100);
    }

    #[test]
    fn grayscale_populates_one_component() {
        let coeffs = vec![test_grid(7, 2, 2)];
        let set = PlaneSet::demux(&coeffs, 1, 0);
        for pos in 0..PLANES_PER_COMPONENT {
            assert!(set.plane(0, pos).len() > 0, "plane {pos} empty");
            assert_eq!(set.plane(1, pos).len(), 0);
            assert_eq!(set.plane(2, pos).len(), 0);
        }
    }

    #[test]
    fn exhausted_plane_is_detected() {
        let coeffs = vec![test_grid(1, 1, 1)];
        let mut set = PlaneSet::demux(&coeffs, 0, 0);
        // Ask for more blocks than were stored.
        let err = set.rebuild(&[(2, 1)]).unwrap_err();
        assert_eq!(err, JpegError::ArhcInconsistent("plane stream exhausted"));
    }
}
