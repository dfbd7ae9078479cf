// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Frame header (SOF0/SOF2) parsing and block geometry.
//!
//! Interleaved scans cover the padded (MCU-rounded) grid; non-interleaved
//! single-component scans cover the tight grid derived from the component's
//! own sample dimensions (T.81 A.2.2). Both geometries live here so the
//! decoder and the re-encoder share one definition.

use crate::error::{JpegError, Result};

/// Maximum number of color components this transcoder handles.
pub const MAX_COMPONENTS: usize = 3;

/// One image component from SOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Component ID (typically 1=Y, 2=Cb, 3=Cr).
    pub id: u8,
    /// Horizontal sampling factor (1-4).
    pub h_sampling: u8,
    /// Vertical sampling factor (1-4).
    pub v_sampling: u8,
    /// Quantization table selector (0-3).
    pub quant_table_id: u8,
}

/// Frame information parsed from SOF0/SOF2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Sample precision in bits (always 8 here).
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub components: Vec<Component>,
    pub max_h_sampling: u8,
    pub max_v_sampling: u8,
    /// Number of MCUs horizontally / vertically.
    pub mcus_wide: usize,
    pub mcus_tall: usize,
    /// True for SOF2 (progressive DCT).
    pub progressive: bool,
}

impl FrameInfo {
    /// Padded blocks per row for a component (interleaved/MCU geometry).
    pub fn blocks_wide(&self, comp_idx: usize) -> usize {
        self.mcus_wide * usize::from(self.components[comp_idx].h_sampling)
    }

    /// Padded block rows for a component.
    pub fn blocks_tall(&self, comp_idx: usize) -> usize {
        self.mcus_tall * usize::from(self.components[comp_idx].v_sampling)
    }

    /// Tight blocks per row for a component (non-interleaved geometry):
    /// ceil(ceil(width * h / h_max) / 8).
    pub fn tight_blocks_wide(&self, comp_idx: usize) -> usize {
        let c = &self.components[comp_idx];
        let samples = (usize::from(self.width) * usize::from(c.h_sampling))
            .div_ceil(usize::from(self.max_h_sampling));
        samples.div_ceil(8)
    }

    /// Tight block rows for a component.
    pub fn tight_blocks_tall(&self, comp_idx: usize) -> usize {
        let c = &self.components[comp_idx];
        let samples = (usize::from(self.height) * usize::from(c.v_sampling))
            .div_ceil(usize::from(self.max_v_sampling));
        samples.div_ceil(8)
    }
}

/// Parse a SOF segment body (after the 2-byte length field).
pub fn parse_sof(data: &[u8], progressive: bool) -> Result<FrameInfo> {
    if data.len() < 6 {
        return Err(JpegError::InvalidMarkerData("SOF segment too short"));
    }

    let precision = data[0];
    if precision != 8 {
        return Err(JpegError::UnsupportedPrecision(precision));
    }

    let height = u16::from_be_bytes([data[1], data[2]]);
    let width = u16::from_be_bytes([data[3], data[4]]);
    let n_components = data[5];

    if width == 0 || height == 0 {
        return Err(JpegError::InvalidDimensions);
    }
    // Baseline/progressive DCT with 1 or 3 components only; 4-component
    // CMYK is out of scope for this transcoder.
    if n_components != 1 && n_components != 3 {
        return Err(JpegError::UnsupportedComponentCount(n_components));
    }
    if data.len() != 6 + usize::from(n_components) * 3 {
        return Err(JpegError::InvalidMarkerData("SOF length mismatch"));
    }

    let mut components = Vec::with_capacity(usize::from(n_components));
    let mut max_h = 0u8;
    let mut max_v = 0u8;

    for i in 0..usize::from(n_components) {
        let off = 6 + i * 3;
        let id = data[off];
        let sampling = data[off + 1];
        let h_sampling = sampling >> 4;
        let v_sampling = sampling & 0x0F;
        let quant_table_id = data[off + 2];

        if h_sampling == 0 || v_sampling == 0 || h_sampling > 4 || v_sampling > 4 {
            return Err(JpegError::InvalidDimensions);
        }
        if quant_table_id > 3 {
            return Err(JpegError::InvalidQuantTableId(quant_table_id));
        }
        if components.iter().any(|c: &Component| c.id == id) {
            return Err(JpegError::InvalidMarkerData("duplicate component id"));
        }

        max_h = max_h.max(h_sampling);
        max_v = max_v.max(v_sampling);
        components.push(Component {
            id,
            h_sampling,
            v_sampling,
            quant_table_id,
        });
    }

    let mcu_width = usize::from(max_h) * 8;
    let mcu_height = usize::from(max_v) * 8;
    let mcus_wide = usize::from(width).div_ceil(mcu_width);
    let mcus_tall = usize::from(height).div_ceil(mcu_height);

    Ok(FrameInfo {
        precision,
        height,
        width,
        components,
        max_h_sampling: max_h,
        max_v_sampling: max_v,
        mcus_wide,
        mcus_tall,
        progressive,
    })
}
