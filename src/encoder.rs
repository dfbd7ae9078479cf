// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Scan re-encoding: coefficients back to entropy-coded bytes.
//!
//! This is the exact mirror of the parser's scan decode. Baseline blocks use
//! the canonical run-length choices of T.81 F.2; progressive scans use the
//! deterministic end-of-band-run policy (accumulate, flush on a nonzero
//! block, at restart boundaries, at scan end, and at the 0x7FFF cap) and
//! buffer refinement correction bits so they land after the symbol that
//! implies them (G.1.2.3). Restart markers are emitted speculatively after
//! each interval and the trailing one is removed with [`BitStream::pop`].
//!
//! Scans are encoded in restart-interval-bounded segments. Every segment
//! starts byte-aligned with fresh DC predictors and a zero EOB run, which is
//! what makes segments independent units of work for the parallel path.

use crate::bitio::BitStream;
use crate::coeffs::CoeffGrid;
use crate::error::{JpegError, Result};
use crate::frame::FrameInfo;
use crate::huffman::{encode_value, HuffmanTable};
use crate::marker;
use crate::parser::{visit_mcu_blocks, ScanInfo};

/// Correction-bit buffer cap, matching libjpeg's MAX_CORR_BITS discipline:
/// force an EOB-run flush before the buffer could overflow in the next MCU.
const MAX_CORR_BITS: usize = 1000;

/// Restart-interval-bounded MCU ranges of a scan, in order.
pub fn scan_segments(frame: &FrameInfo, scan: &ScanInfo) -> Vec<(usize, usize)> {
    let total = scan.total_mcus(frame);
    let ri = usize::from(scan.restart_interval);
    if ri == 0 {
        return vec![(0, total)];
    }
    let mut segs = Vec::with_capacity(total.div_ceil(ri));
    let mut start = 0;
    while start < total {
        let end = (start + ri).min(total);
        segs.push((start, end));
        start = end;
    }
    segs
}

/// Encode one whole scan (entropy bytes plus restart markers) into `out`.
pub fn encode_scan(
    out: &mut BitStream,
    frame: &FrameInfo,
    scan: &ScanInfo,
    coeffs: &[CoeffGrid],
    huff: &[[Option<HuffmanTable>; 4]; 2],
) -> Result<()> {
    let segments = scan_segments(frame, scan);
    let restarts = scan.restart_interval > 0;
    for (i, &(start, end)) in segments.iter().enumerate() {
        encode_scan_segment(out, frame, scan, coeffs, huff, start, end)?;
        if restarts {
            out.append_bytes(&[0xFF, marker::RST0 + (i as u8 & 7)]);
        }
    }
    if restarts {
        // The marker emitted after the final segment has no next interval.
        out.pop();
    }
    Ok(())
}

/// Encode the MCUs `[start, end)` of a scan as one self-contained segment:
/// fresh DC predictors and EOB state, 1-padded flush at the end.
pub fn encode_scan_segment(
    out: &mut BitStream,
    frame: &FrameInfo,
    scan: &ScanInfo,
    coeffs: &[CoeffGrid],
    huff: &[[Option<HuffmanTable>; 4]; 2],
    start: usize,
    end: usize,
) -> Result<()> {
    let p = scan.params;
    let prog = frame.progressive;
    let needs_dc = !prog || (p.ss == 0 && p.ah == 0);
    let needs_ac = !prog || p.ss > 0;
    for sc in &scan.components {
        if needs_dc && huff[0][sc.dc_table].is_none() {
            return Err(JpegError::MissingHuffmanTable {
                class: 0,
                id: sc.dc_table as u8,
            });
        }
        if needs_ac && huff[1][sc.ac_table].is_none() {
            return Err(JpegError::MissingHuffmanTable {
                class: 1,
                id: sc.ac_table as u8,
            });
        }
    }

    let mut state = SegmentState {
        dc_pred: vec![0i32; scan.components.len()],
        eob_run: 0,
        corr: Vec::new(),
    };

    for mcu in start..end {
        visit_mcu_blocks(frame, scan, mcu, |sci, comp_idx, block_idx| {
            let sc = &scan.components[sci];
            let block = coeffs[comp_idx].block(block_idx);
            if !prog {
                let dc_tab = huff[0][sc.dc_table].as_ref().expect("validated");
                let ac_tab = huff[1][sc.ac_table].as_ref().expect("validated");
                encode_block_baseline(out, dc_tab, ac_tab, &mut state.dc_pred[sci], block)
            } else if p.ss == 0 {
                if p.ah == 0 {
                    let dc_tab = huff[0][sc.dc_table].as_ref().expect("validated");
                    encode_dc_first(out, dc_tab, &mut state.dc_pred[sci], p.al, block)
                } else {
                    out.emit_bits(((block[0] >> p.al) & 1) as u32, 1, true);
                    Ok(())
                }
            } else {
                let ac_tab = huff[1][sc.ac_table].as_ref().expect("validated");
                if p.ah == 0 {
                    encode_ac_first(out, ac_tab, p.ss, p.se, p.al, &mut state, block)
                } else {
                    encode_ac_refine(out, ac_tab, p.ss, p.se, p.al, &mut state, block)
                }
            }
        })?;
    }

    if prog && p.ss > 0 {
        let ac_tab = huff[1][scan.components[0].ac_table]
            .as_ref()
            .expect("validated");
        flush_eob_run(out, ac_tab, &mut state)?;
    }
    out.flush_bits(true);
    Ok(())
}

struct SegmentState {
    dc_pred: Vec<i32>,
    eob_run: u32,
    /// Buffered refinement correction bits riding with the pending EOB run.
    corr: Vec<u8>,
}

fn emit_symbol(out: &mut BitStream, tab: &HuffmanTable, symbol: u8) -> Result<()> {
    let (code, len) = tab.encode(symbol)?;
    out.emit_bits(u32::from(code), len, true);
    Ok(())
}

fn encode_block_baseline(
    out: &mut BitStream,
    dc_tab: &HuffmanTable,
    ac_tab: &HuffmanTable,
    dc_pred: &mut i32,
    block: &[i32],
) -> Result<()> {
    let diff = block[0].wrapping_sub(*dc_pred);
    *dc_pred = block[0];
    let (bits, size) = encode_value(diff);
    emit_symbol(out, dc_tab, size)?;
    if size > 0 {
        out.emit_bits(bits, size, true);
    }

    let mut k = 1usize;
    while k < 64 {
        let mut run = 0usize;
        while k + run < 64 && block[k + run] == 0 {
            run += 1;
        }
        if k + run >= 64 {
            emit_symbol(out, ac_tab, 0x00)?; // EOB
            break;
        }
        while run >= 16 {
            emit_symbol(out, ac_tab, 0xF0)?; // ZRL
            run -= 16;
            k += 16;
        }
        k += run;
        let (bits, size) = encode_value(block[k]);
        debug_assert!(size <= 15, "baseline AC magnitude too wide");
        emit_symbol(out, ac_tab, ((run as u8) << 4) | size)?;
        out.emit_bits(bits, size, true);
        k += 1;
    }
    Ok(())
}

fn encode_dc_first(
    out: &mut BitStream,
    dc_tab: &HuffmanTable,
    dc_pred: &mut i32,
    al: u8,
    block: &[i32],
) -> Result<()> {
    // Point transform: the value known at this scan is the final DC with
    // the low `al` bits still unknown.
    let v = block[0] >> al;
    let diff = v.wrapping_sub(*dc_pred);
    *dc_pred = v;
    let (bits, size) = encode_value(diff);
    emit_symbol(out, dc_tab, size)?;
    if size > 0 {
        out.emit_bits(bits, size, true);
    }
    Ok(())
}

fn flush_eob_run(out: &mut BitStream, ac_tab: &HuffmanTable, state: &mut SegmentState) -> Result<()> {
    if state.eob_run > 0 {
        let mut nbits = 0u8;
        let mut tmp = state.eob_run >> 1;
        while tmp != 0 {
            nbits += 1;
            tmp >>= 1;
        }
        emit_symbol(out, ac_tab, nbits << 4)?;
        if nbits > 0 {
            out.emit_bits(state.eob_run & ((1u32 << nbits) - 1), nbits, true);
        }
        state.eob_run = 0;
        for &b in &state.corr {
            out.emit_bits(u32::from(b), 1, true);
        }
        state.corr.clear();
    }
    Ok(())
}

fn encode_ac_first(
    out: &mut BitStream,
    ac_tab: &HuffmanTable,
    ss: u8,
    se: u8,
    al: u8,
    state: &mut SegmentState,
    block: &[i32],
) -> Result<()> {
    let mut r = 0u32;
    for k in usize::from(ss)..=usize::from(se) {
        let v = block[k];
        // Point transform with rounding toward zero.
        let t = if v >= 0 { v >> al } else { -((-v) >> al) };
        if t == 0 {
            r += 1;
            continue;
        }
        flush_eob_run(out, ac_tab, state)?;
        while r > 15 {
            emit_symbol(out, ac_tab, 0xF0)?;
            r -= 16;
        }
        let (bits, size) = encode_value(t);
        debug_assert!(size <= 15, "AC magnitude too wide");
        emit_symbol(out, ac_tab, ((r as u8) << 4) | size)?;
        out.emit_bits(bits, size, true);
        r = 0;
    }
    if r > 0 {
        state.eob_run += 1;
        if state.eob_run == 0x7FFF {
            flush_eob_run(out, ac_tab, state)?;
        }
    }
    Ok(())
}

fn encode_ac_refine(
    out: &mut BitStream,
    ac_tab: &HuffmanTable,
    ss: u8,
    se: u8,
    al: u8,
    state: &mut SegmentState,
    block: &[i32],
) -> Result<()> {
    let ss = usize::from(ss);
    let se = usize::from(se);

    // Magnitudes at this precision; remember the last newly-nonzero index.
    let mut abs = [0i32; 64];
    let mut eob_k: i32 = ss as i32 - 1;
    for k in ss..=se {
        let t = block[k].abs() >> al;
        abs[k] = t;
        if t == 1 {
            eob_k = k as i32;
        }
    }

    let mut r = 0u32; // run of zero-history positions
    let mut br: Vec<u8> = Vec::new(); // correction bits since the last symbol
    for k in ss..=se {
        let t = abs[k];
        if t == 0 {
            r += 1;
            continue;
        }
        // ZRLs are only emitted while a newly-nonzero coefficient still
        // follows; trailing runs fold into the EOB.
        while r > 15 && (k as i32) <= eob_k {
            flush_eob_run(out, ac_tab, state)?;
            emit_symbol(out, ac_tab, 0xF0)?;
            r -= 16;
            for &b in &br {
                out.emit_bits(u32::from(b), 1, true);
            }
            br.clear();
        }
        if t > 1 {
            // Previously nonzero: the next bit of its magnitude.
            br.push((t & 1) as u8);
            continue;
        }
        // Newly nonzero at this precision.
        flush_eob_run(out, ac_tab, state)?;
        debug_assert!(r <= 15);
        emit_symbol(out, ac_tab, ((r as u8) << 4) | 1)?;
        out.emit_bits(u32::from(block[k] >= 0), 1, true);
        for &b in &br {
            out.emit_bits(u32::from(b), 1, true);
        }
        br.clear();
        r = 0;
    }

    if r > 0 || !br.is_empty() {
        state.eob_run += 1;
        state.corr.extend_from_slice(&br);
        if state.eob_run == 0x7FFF || state.corr.len() > MAX_CORR_BITS - 64 + 1 {
            flush_eob_run(out, ac_tab, state)?;
        }
    }
    Ok(())
}
