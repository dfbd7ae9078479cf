// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Marker-driven JPEG parsing down to quantized coefficients.
//!
//! The parser walks `Start -> (APPn|COM|DQT|DHT|DRI)* -> SOF -> ... ->
//! SOS-scan(s) -> EOI -> trailer`, decoding every scan (baseline and all
//! four progressive scan kinds) into per-component [`CoeffGrid`]s. All
//! non-entropy bytes are captured verbatim, in order, into a replayable
//! chunk list with one placeholder per scan; that capture is what lets the
//! re-encoder reproduce the original file byte-for-byte.
//!
//! There is no partial-success mode: the first error aborts the parse.

use crate::alloc::MemoryBudget;
use crate::bitio::EntropyReader;
use crate::coeffs::CoeffGrid;
use crate::error::{JpegError, Result};
use crate::frame::{parse_sof, FrameInfo};
use crate::huffman::HuffmanTable;
use crate::io::DecoderReader;
use crate::marker::{self, parse_dri, parse_sos, SosParams};
use crate::tables::{parse_dht, parse_dqt, QuantTable};

/// Component selector for one scan component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanComponent {
    /// Index into `FrameInfo::components`.
    pub comp_idx: usize,
    /// DC Huffman table slot.
    pub dc_table: usize,
    /// AC Huffman table slot.
    pub ac_table: usize,
}

/// Everything needed to decode or re-encode one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanInfo {
    pub components: Vec<ScanComponent>,
    pub params: SosParams,
    /// Restart interval in effect for this scan (0 = none).
    pub restart_interval: u16,
}

impl ScanInfo {
    /// Build a validated [`ScanInfo`] from an SOS segment body.
    pub fn from_sos(frame: &FrameInfo, body: &[u8], restart_interval: u16) -> Result<Self> {
        let (selectors, params) = parse_sos(body)?;
        let mut components = Vec::with_capacity(selectors.len());
        for (comp_id, dc_id, ac_id) in selectors {
            if dc_id > 3 || ac_id > 3 {
                return Err(JpegError::InvalidMarkerData("bad SOS table selector"));
            }
            let comp_idx = frame
                .components
                .iter()
                .position(|c| c.id == comp_id)
                .ok_or(JpegError::UnknownComponentId(comp_id))?;
            if components.iter().any(|sc: &ScanComponent| sc.comp_idx == comp_idx) {
                return Err(JpegError::InvalidMarkerData("duplicate scan component"));
            }
            components.push(ScanComponent {
                comp_idx,
                dc_table: usize::from(dc_id),
                ac_table: usize::from(ac_id),
            });
        }

        if frame.progressive {
            let SosParams { ss, se, ah, al } = params;
            if ss > 63 || se > 63 || ss > se {
                return Err(JpegError::InvalidMarkerData("bad spectral selection"));
            }
            if ss == 0 && se != 0 {
                return Err(JpegError::InvalidMarkerData("progressive DC scan with Se != 0"));
            }
            if ss > 0 && components.len() != 1 {
                return Err(JpegError::InvalidMarkerData(
                    "progressive AC scan must be single-component",
                ));
            }
            if al > 13 || (ah != 0 && ah != al + 1) {
                return Err(JpegError::InvalidMarkerData("bad successive approximation"));
            }
        }

        Ok(Self {
            components,
            params,
            restart_interval,
        })
    }

    /// Whether blocks are traversed in interleaved MCU order.
    pub fn interleaved(&self) -> bool {
        self.components.len() > 1
    }

    /// Number of MCUs in this scan: padded MCU count when interleaved, the
    /// tight block count of the single component otherwise.
    pub fn total_mcus(&self, frame: &FrameInfo) -> usize {
        if self.interleaved() {
            frame.mcus_wide * frame.mcus_tall
        } else {
            let ci = self.components[0].comp_idx;
            frame.tight_blocks_wide(ci) * frame.tight_blocks_tall(ci)
        }
    }
}

/// One captured piece of the original byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderChunk {
    /// Verbatim non-entropy bytes (markers, segments, EOI).
    Raw(Vec<u8>),
    /// Placeholder for the entropy-coded data of scan `n`.
    Scan(usize),
}

/// A fully parsed JPEG: frame metadata, quantized coefficients, the
/// captured header stream, and any trailer bytes after EOI.
#[derive(Debug)]
pub struct ParsedJpeg {
    pub frame: FrameInfo,
    pub quant: [Option<QuantTable>; 4],
    /// One grid per component, padded (MCU-rounded) geometry.
    pub coeffs: Vec<CoeffGrid>,
    /// Captured stream: raw bytes interleaved with scan placeholders.
    pub chunks: Vec<HeaderChunk>,
    /// Verbatim bytes following EOI.
    pub trailer: Vec<u8>,
    /// Size of the original file in bytes.
    pub original_size: u64,
}

impl ParsedJpeg {
    /// Parse a JPEG byte stream down to its coefficients.
    pub fn read_from<R: DecoderReader>(reader: R, budget: MemoryBudget) -> Result<Self> {
        JpegParser::new(reader, budget).parse()
    }

    pub fn frame_info(&self) -> &FrameInfo {
        &self.frame
    }

    pub fn num_components(&self) -> usize {
        self.coeffs.len()
    }

    pub fn quant_table(&self, id: usize) -> Option<&QuantTable> {
        self.quant[id].as_ref()
    }

    pub fn coeff_grid(&self, comp_idx: usize) -> &CoeffGrid {
        &self.coeffs[comp_idx]
    }
}

/// Visit every block of one MCU in the standard traversal order, calling
/// `f(scan_component_index, component_index, block_raster_index)`.
///
/// The same function drives decode and re-encode, so the two sides cannot
/// disagree on ordering.
pub fn visit_mcu_blocks(
    frame: &FrameInfo,
    scan: &ScanInfo,
    mcu: usize,
    mut f: impl FnMut(usize, usize, usize) -> Result<()>,
) -> Result<()> {
    if scan.interleaved() {
        let mx = mcu % frame.mcus_wide;
        let my = mcu / frame.mcus_wide;
        for (sci, sc) in scan.components.iter().enumerate() {
            let comp = &frame.components[sc.comp_idx];
            let bw = frame.blocks_wide(sc.comp_idx);
            for v in 0..usize::from(comp.v_sampling) {
                for h in 0..usize::from(comp.h_sampling) {
                    let br = my * usize::from(comp.v_sampling) + v;
                    let bc = mx * usize::from(comp.h_sampling) + h;
                    f(sci, sc.comp_idx, br * bw + bc)?;
                }
            }
        }
    } else {
        let sc = &scan.components[0];
        let tw = frame.tight_blocks_wide(sc.comp_idx);
        let br = mcu / tw;
        let bc = mcu % tw;
        f(0, sc.comp_idx, br * frame.blocks_wide(sc.comp_idx) + bc)?;
    }
    Ok(())
}

struct JpegParser<R: DecoderReader> {
    er: EntropyReader<R>,
    budget: MemoryBudget,
    frame: Option<FrameInfo>,
    quant: [Option<QuantTable>; 4],
    /// Live Huffman tables, `[class][id]`; a DHT replaces the slot.
    huff: [[Option<HuffmanTable>; 4]; 2],
    restart_interval: u16,
    chunks: Vec<HeaderChunk>,
    cur_raw: Vec<u8>,
    n_scans: usize,
    coeffs: Vec<CoeffGrid>,
}

impl<R: DecoderReader> JpegParser<R> {
    fn new(reader: R, budget: MemoryBudget) -> Self {
        Self {
            er: EntropyReader::new(reader),
            budget,
            frame: None,
            quant: [None, None, None, None],
            huff: Default::default(),
            restart_interval: 0,
            chunks: Vec::new(),
            cur_raw: Vec::new(),
            n_scans: 0,
            coeffs: Vec::new(),
        }
    }

    fn cap(&mut self, bytes: &[u8]) {
        self.cur_raw.extend_from_slice(bytes);
    }

    fn close_raw_chunk(&mut self) {
        if !self.cur_raw.is_empty() {
            self.chunks.push(HeaderChunk::Raw(std::mem::take(&mut self.cur_raw)));
        }
    }

    fn parse(mut self) -> Result<ParsedJpeg> {
        let b0 = self.er.read_byte().map_err(|e| match e {
            JpegError::UnexpectedEof => JpegError::InvalidSoi,
            e => e,
        })?;
        let b1 = self.er.read_byte().map_err(|e| match e {
            JpegError::UnexpectedEof => JpegError::InvalidSoi,
            e => e,
        })?;
        if b0 != 0xFF || b1 != marker::SOI {
            return Err(JpegError::InvalidSoi);
        }
        self.cap(&[0xFF, marker::SOI]);

        loop {
            let b = self.er.read_byte()?;
            if b != 0xFF {
                return Err(JpegError::InvalidMarkerData("expected marker"));
            }
            let mut m = self.er.read_byte()?;
            while m == 0xFF {
                // Fill byte; preserve it verbatim.
                self.cap(&[0xFF]);
                m = self.er.read_byte()?;
            }
            if m == 0x00 {
                return Err(JpegError::InvalidMarkerData("stuffed byte outside scan"));
            }
            if m == marker::EOI {
                self.cap(&[0xFF, marker::EOI]);
                self.close_raw_chunk();
                break;
            }
            if marker::is_rst(m) {
                return Err(JpegError::InvalidMarkerData("restart marker outside scan"));
            }
            if m == marker::SOI {
                return Err(JpegError::InvalidMarkerData("nested SOI"));
            }
            if marker::is_unsupported(m) {
                return Err(JpegError::UnsupportedMarker(m));
            }

            let l0 = self.er.read_byte()?;
            let l1 = self.er.read_byte()?;
            let length = usize::from(u16::from_be_bytes([l0, l1]));
            if length < 2 {
                return Err(JpegError::InvalidMarkerData("segment length below 2"));
            }
            self.budget.charge(length - 2, "marker segment")?;
            let payload = self.er.read_bytes(length - 2)?;
            self.cap(&[0xFF, m, l0, l1]);
            self.cap(&payload);

            match m {
                marker::DQT => {
                    for (id, qt) in parse_dqt(&payload)? {
                        self.quant[usize::from(id)] = Some(qt);
                    }
                }
                marker::DHT => {
                    for spec in parse_dht(&payload)? {
                        let table = HuffmanTable::build(&spec.bits, &spec.huffval)?;
                        self.huff[usize::from(spec.class)][usize::from(spec.id)] = Some(table);
                    }
                }
                marker::DRI => {
                    self.restart_interval = parse_dri(&payload)?;
                    log::debug!("restart interval = {}", self.restart_interval);
                }
                marker::SOF0 | marker::SOF2 => {
                    if self.frame.is_some() {
                        return Err(JpegError::InvalidMarkerData("multiple SOF markers"));
                    }
                    let frame = parse_sof(&payload, m == marker::SOF2)?;
                    log::debug!(
                        "SOF: {}x{}, {} component(s), progressive={}",
                        frame.width,
                        frame.height,
                        frame.components.len(),
                        frame.progressive
                    );
                    for ci in 0..frame.components.len() {
                        let bw = frame.blocks_wide(ci);
                        let bt = frame.blocks_tall(ci);
                        self.budget
                            .charge(CoeffGrid::storage_bytes(bw, bt), "coefficient grid")?;
                        self.coeffs.push(CoeffGrid::new(bw, bt));
                    }
                    self.frame = Some(frame);
                }
                marker::SOS => {
                    let frame = self
                        .frame
                        .as_ref()
                        .ok_or(JpegError::InvalidMarkerData("SOS before SOF"))?;
                    let scan = ScanInfo::from_sos(frame, &payload, self.restart_interval)?;
                    log::debug!(
                        "scan {}: {} component(s), Ss={} Se={} Ah={} Al={}",
                        self.n_scans,
                        scan.components.len(),
                        scan.params.ss,
                        scan.params.se,
                        scan.params.ah,
                        scan.params.al
                    );
                    self.close_raw_chunk();
                    self.decode_scan(&scan)?;
                    self.chunks.push(HeaderChunk::Scan(self.n_scans));
                    self.n_scans += 1;
                }
                _ => {
                    // APPn, COM and anything else: captured verbatim,
                    // replayed unchanged.
                }
            }
        }

        if self.n_scans == 0 {
            return Err(JpegError::InvalidMarkerData("no scan before EOI"));
        }

        // Everything after EOI is trailer, preserved verbatim.
        let mut trailer = Vec::new();
        while let Some(b) = self.er.try_read_byte()? {
            if trailer.len() % 4096 == 0 {
                self.budget.charge(4096, "trailer")?;
            }
            trailer.push(b);
        }

        let frame = self.frame.take().ok_or(JpegError::InvalidMarkerData("no SOF marker"))?;
        Ok(ParsedJpeg {
            frame,
            quant: self.quant,
            coeffs: self.coeffs,
            chunks: self.chunks,
            trailer,
            original_size: self.er.bytes_consumed(),
        })
    }

    fn decode_scan(&mut self, scan: &ScanInfo) -> Result<()> {
        let frame = self.frame.clone().expect("frame checked by caller");
        let prog = frame.progressive;
        let p = scan.params;
        let needs_dc = !prog || (p.ss == 0 && p.ah == 0);
        let needs_ac = !prog || p.ss > 0;
        for sc in &scan.components {
            if needs_dc && self.huff[0][sc.dc_table].is_none() {
                return Err(JpegError::MissingHuffmanTable {
                    class: 0,
                    id: sc.dc_table as u8,
                });
            }
            if needs_ac && self.huff[1][sc.ac_table].is_none() {
                return Err(JpegError::MissingHuffmanTable {
                    class: 1,
                    id: sc.ac_table as u8,
                });
            }
        }

        self.er.reset_bits();
        let mut dc_pred = vec![0i32; scan.components.len()];
        let mut eob_run: u32 = 0;
        let mut expected_rst: u8 = 0;
        let ri = usize::from(scan.restart_interval);
        let total_mcus = scan.total_mcus(&frame);

        for mcu in 0..total_mcus {
            if ri > 0 && mcu > 0 && mcu % ri == 0 {
                self.read_restart_marker(expected_rst)?;
                expected_rst = (expected_rst + 1) & 7;
                for pred in &mut dc_pred {
                    *pred = 0;
                }
                eob_run = 0;
            }
            decode_mcu_blocks(
                &mut self.er,
                &mut self.coeffs,
                &self.huff,
                &frame,
                scan,
                mcu,
                &mut dc_pred,
                &mut eob_run,
            )?;
        }

        // Give back any lookahead overshoot and drop the pad bits.
        self.er.prepare_marker_read();
        self.er.reset_bits();
        Ok(())
    }

    fn read_restart_marker(&mut self, expected: u8) -> Result<()> {
        self.er.prepare_marker_read();
        self.er.reset_bits();
        let b0 = self.er.read_byte()?;
        if b0 != 0xFF {
            return Err(JpegError::InvalidMarkerData("expected restart marker"));
        }
        let mut b1 = self.er.read_byte()?;
        while b1 == 0xFF {
            b1 = self.er.read_byte()?;
        }
        if !marker::is_rst(b1) {
            return Err(JpegError::InvalidMarkerData("expected restart marker"));
        }
        let found = b1 & 0x07;
        if found != expected {
            return Err(JpegError::RestartOutOfSequence { expected, found });
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_mcu_blocks<R: DecoderReader>(
    er: &mut EntropyReader<R>,
    coeffs: &mut [CoeffGrid],
    huff: &[[Option<HuffmanTable>; 4]; 2],
    frame: &FrameInfo,
    scan: &ScanInfo,
    mcu: usize,
    dc_pred: &mut [i32],
    eob_run: &mut u32,
) -> Result<()> {
    let p = scan.params;
    visit_mcu_blocks(frame, scan, mcu, |sci, comp_idx, block_idx| {
        let sc = &scan.components[sci];
        let block = coeffs[comp_idx].block_mut(block_idx);
        if !frame.progressive {
            let dc_tab = huff[0][sc.dc_table].as_ref().expect("validated");
            let ac_tab = huff[1][sc.ac_table].as_ref().expect("validated");
            decode_block_baseline(er, dc_tab, ac_tab, &mut dc_pred[sci], block)
        } else if p.ss == 0 {
            if p.ah == 0 {
                let dc_tab = huff[0][sc.dc_table].as_ref().expect("validated");
                decode_dc_first(er, dc_tab, &mut dc_pred[sci], p.al, block)
            } else {
                decode_dc_refine(er, p.al, block)
            }
        } else {
            let ac_tab = huff[1][sc.ac_table].as_ref().expect("validated");
            if p.ah == 0 {
                decode_ac_first(er, ac_tab, p.ss, p.se, p.al, eob_run, block)
            } else {
                decode_ac_refine(er, ac_tab, p.ss, p.se, p.al, eob_run, block)
            }
        }
    })
}

/// Baseline block: DC difference then up to 63 run-length coded ACs
/// (T.81 F.2.2).
fn decode_block_baseline<R: DecoderReader>(
    er: &mut EntropyReader<R>,
    dc_tab: &HuffmanTable,
    ac_tab: &HuffmanTable,
    dc_pred: &mut i32,
    block: &mut [i32],
) -> Result<()> {
    let t = dc_tab.decode(er)?;
    if t > 16 {
        return Err(JpegError::InvalidMarkerData("bad DC category"));
    }
    if t > 0 {
        *dc_pred = dc_pred.wrapping_add(er.receive_extend(t)?);
    }
    block[0] = *dc_pred;

    let mut k = 1usize;
    while k < 64 {
        let rs = ac_tab.decode(er)?;
        let run = usize::from(rs >> 4);
        let size = rs & 0x0F;
        if size == 0 {
            if run == 15 {
                k += 16; // ZRL
                continue;
            }
            break; // EOB
        }
        k += run;
        if k > 63 {
            return Err(JpegError::InvalidMarkerData("AC run past end of block"));
        }
        block[k] = er.receive_extend(size)?;
        k += 1;
    }
    Ok(())
}

/// Progressive DC first scan: accumulate the DC difference, store shifted
/// left by the point transform.
fn decode_dc_first<R: DecoderReader>(
    er: &mut EntropyReader<R>,
    dc_tab: &HuffmanTable,
    dc_pred: &mut i32,
    al: u8,
    block: &mut [i32],
) -> Result<()> {
    let t = dc_tab.decode(er)?;
    if t > 16 {
        return Err(JpegError::InvalidMarkerData("bad DC category"));
    }
    if t > 0 {
        *dc_pred = dc_pred.wrapping_add(er.receive_extend(t)?);
    }
    block[0] = *dc_pred << al;
    Ok(())
}

/// Progressive DC refining scan: one correction bit per block.
fn decode_dc_refine<R: DecoderReader>(
    er: &mut EntropyReader<R>,
    al: u8,
    block: &mut [i32],
) -> Result<()> {
    if er.decode_bit()? {
        block[0] |= 1i32 << al;
    }
    Ok(())
}

/// Progressive AC first scan over the band [ss..se], with EOBn end-of-band
/// runs spanning blocks (T.81 G.1.2.2).
#[allow(clippy::too_many_arguments)]
fn decode_ac_first<R: DecoderReader>(
    er: &mut EntropyReader<R>,
    ac_tab: &HuffmanTable,
    ss: u8,
    se: u8,
    al: u8,
    eob_run: &mut u32,
    block: &mut [i32],
) -> Result<()> {
    if *eob_run > 0 {
        *eob_run -= 1;
        return Ok(());
    }

    let se = usize::from(se);
    let mut k = usize::from(ss);
    while k <= se {
        let rs = ac_tab.decode(er)?;
        let run = rs >> 4;
        let size = rs & 0x0F;
        if size == 0 {
            if run == 15 {
                k += 16; // ZRL
                continue;
            }
            // EOBn: this block plus 2^run - 1 + extra following blocks.
            *eob_run = (1u32 << run) - 1;
            if run > 0 {
                *eob_run += er.decode_bits(run)?;
            }
            return Ok(());
        }
        k += usize::from(run);
        if k > se {
            return Err(JpegError::InvalidMarkerData("AC run past band end"));
        }
        block[k] = er.receive_extend(size)? << al;
        k += 1;
    }
    Ok(())
}

/// Progressive AC refining scan: correction bits for known-nonzero
/// coefficients interleaved with newly-nonzero insertions (T.81 G.7).
#[allow(clippy::too_many_arguments)]
fn decode_ac_refine<R: DecoderReader>(
    er: &mut EntropyReader<R>,
    ac_tab: &HuffmanTable,
    ss: u8,
    se: u8,
    al: u8,
    eob_run: &mut u32,
    block: &mut [i32],
) -> Result<()> {
    let p1 = 1i32 << al;
    let m1 = -1i32 << al;
    let se = usize::from(se);
    let mut k = usize::from(ss);

    if *eob_run > 0 {
        // Inside an EOB run: only correction bits for nonzero coefficients.
        while k <= se {
            if block[k] != 0 {
                refine_coeff(er, &mut block[k], p1, m1)?;
            }
            k += 1;
        }
        *eob_run -= 1;
        return Ok(());
    }

    while k <= se {
        let rs = ac_tab.decode(er)?;
        let run = rs >> 4;
        let size = rs & 0x0F;
        match size {
            0 => {
                if run == 15 {
                    // ZRL: pass 16 zero-history positions, refining any
                    // nonzero coefficients along the way.
                    let mut zeros = 16u32;
                    while k <= se && zeros > 0 {
                        if block[k] != 0 {
                            refine_coeff(er, &mut block[k], p1, m1)?;
                        } else {
                            zeros -= 1;
                        }
                        k += 1;
                    }
                } else {
                    // EOBn: finish this block with correction bits only.
                    *eob_run = 1u32 << run;
                    if run > 0 {
                        *eob_run += er.decode_bits(run)?;
                    }
                    while k <= se {
                        if block[k] != 0 {
                            refine_coeff(er, &mut block[k], p1, m1)?;
                        }
                        k += 1;
                    }
                    *eob_run -= 1;
                    return Ok(());
                }
            }
            1 => {
                let new_val = if er.decode_bit()? { p1 } else { m1 };
                let mut zeros = usize::from(run);
                let mut placed = false;
                while k <= se {
                    if block[k] != 0 {
                        refine_coeff(er, &mut block[k], p1, m1)?;
                    } else {
                        if zeros == 0 {
                            block[k] = new_val;
                            k += 1;
                            placed = true;
                            break;
                        }
                        zeros -= 1;
                    }
                    k += 1;
                }
                if !placed {
                    return Err(JpegError::InvalidMarkerData("refinement run past band end"));
                }
            }
            _ => return Err(JpegError::InvalidMarkerData("bad refinement magnitude")),
        }
    }
    Ok(())
}

fn refine_coeff<R: DecoderReader>(
    er: &mut EntropyReader<R>,
    coeff: &mut i32,
    p1: i32,
    m1: i32,
) -> Result<()> {
    if er.decode_bit()? {
        if *coeff > 0 {
            *coeff += p1;
        } else {
            *coeff += m1;
        }
    }
    Ok(())
}
