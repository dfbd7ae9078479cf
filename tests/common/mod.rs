// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Shared helpers: deterministic synthetic JPEG files built through the
//! crate's own scan encoder, so every test vector is self-contained.

#![allow(dead_code)]

use arhc::arhc::{compress_jpeg_to_arhc, decode_is_arhc, decompress_arhc_to_jpeg, CompressOptions};
use arhc::bitio::BitStream;
use arhc::coeffs::CoeffGrid;
use arhc::encoder;
use arhc::frame::{parse_sof, FrameInfo};
use arhc::huffman::HuffmanTable;
use arhc::io::MemReadWriter;
use arhc::marker::SosParams;
use arhc::parser::{ScanComponent, ScanInfo};
use arhc::tables::{write_dht, write_dqt, HuffmanSpec, QuantTable};

/// One scan of a test image: (component index, dc table id, ac table id)
/// per scan component, plus the SOS parameters.
pub struct ScanScript {
    pub components: Vec<(usize, usize, usize)>,
    pub params: SosParams,
}

impl ScanScript {
    pub fn baseline(components: Vec<(usize, usize, usize)>) -> Self {
        Self {
            components,
            params: SosParams { ss: 0, se: 63, ah: 0, al: 0 },
        }
    }
}

pub struct TestJpeg {
    pub frame: FrameInfo,
    pub coeffs: Vec<CoeffGrid>,
    pub dc_specs: Vec<HuffmanSpec>,
    pub ac_specs: Vec<HuffmanSpec>,
    pub restart_interval: u16,
    pub scans: Vec<ScanScript>,
    pub trailer: Vec<u8>,
}

/// A canonical table whose codes are all 8 bits long.
pub fn flat_spec(class: u8, id: u8, symbols: &[u8]) -> HuffmanSpec {
    assert!(symbols.len() < 256);
    let mut bits = [0u8; 16];
    bits[7] = symbols.len() as u8;
    HuffmanSpec {
        class,
        id,
        bits,
        huffval: symbols.to_vec(),
    }
}

/// DC categories 0..=11.
pub fn dc_flat(id: u8) -> HuffmanSpec {
    let syms: Vec<u8> = (0..=11).collect();
    flat_spec(0, id, &syms)
}

/// Every AC symbol the re-encoder can emit for |value| < 64: EOB0, ZRL,
/// EOBn runs, and (run, size) pairs with size 1..=6.
pub fn ac_flat(id: u8) -> HuffmanSpec {
    let mut syms: Vec<u8> = vec![0x00, 0xF0];
    for n in 1..=14u8 {
        syms.push(n << 4);
    }
    for r in 0..16u8 {
        for s in 1..=6u8 {
            syms.push((r << 4) | s);
        }
    }
    flat_spec(1, id, &syms)
}

pub fn gray_frame(w: u16, h: u16, progressive: bool) -> FrameInfo {
    let body = [
        8,
        (h >> 8) as u8,
        h as u8,
        (w >> 8) as u8,
        w as u8,
        1,
        1,
        0x11,
        0,
    ];
    parse_sof(&body, progressive).unwrap()
}

/// YCbCr frame with the given luma sampling (chroma is 1x1).
pub fn color_frame(w: u16, h: u16, luma_h: u8, luma_v: u8, progressive: bool) -> FrameInfo {
    let body = [
        8,
        (h >> 8) as u8,
        h as u8,
        (w >> 8) as u8,
        w as u8,
        3,
        1,
        (luma_h << 4) | luma_v,
        0,
        2,
        0x11,
        1,
        3,
        0x11,
        1,
    ];
    parse_sof(&body, progressive).unwrap()
}

/// Deterministic pseudo-noise coefficients: DC in roughly -max_dc..max_dc,
/// sparse ACs in -max_ac..max_ac.
pub fn fill_coeffs(grid: &mut CoeffGrid, seed: u32, max_dc: i32, max_ac: i32, sparsity: u32) {
    let mut x = seed.wrapping_mul(2654435761).wrapping_add(12345);
    for b in 0..grid.total_blocks() {
        let block = grid.block_mut(b);
        for (k, v) in block.iter_mut().enumerate() {
            x = x.wrapping_mul(1664525).wrapping_add(1013904223);
            let r = ((x >> 16) & 0xFFFF) as i32 - 32768;
            if k == 0 {
                *v = r % (max_dc + 1);
            } else if x % sparsity == 0 {
                *v = r % (max_ac + 1);
            } else {
                *v = 0;
            }
        }
    }
}

pub fn alloc_coeffs(frame: &FrameInfo) -> Vec<CoeffGrid> {
    (0..frame.components.len())
        .map(|ci| CoeffGrid::new(frame.blocks_wide(ci), frame.blocks_tall(ci)))
        .collect()
}

fn simple_quant(offset: i32) -> QuantTable {
    QuantTable::new(std::array::from_fn(|i| 16 + offset + (i as i32 % 8)))
}

fn build_huff_slots(
    dc_specs: &[HuffmanSpec],
    ac_specs: &[HuffmanSpec],
) -> [[Option<HuffmanTable>; 4]; 2] {
    let mut huff: [[Option<HuffmanTable>; 4]; 2] = Default::default();
    for spec in dc_specs.iter().chain(ac_specs.iter()) {
        huff[usize::from(spec.class)][usize::from(spec.id)] =
            Some(HuffmanTable::build(&spec.bits, &spec.huffval).unwrap());
    }
    huff
}

fn push_segment(out: &mut Vec<u8>, marker: u8, body: &[u8]) {
    out.push(0xFF);
    out.push(marker);
    let len = (body.len() + 2) as u16;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
}

/// Assemble a complete JPEG file from the test image description, encoding
/// every scan through the crate's scan encoder.
pub fn build_jpeg(img: &TestJpeg) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];

    // JFIF APP0, as any real encoder writes.
    push_segment(
        &mut out,
        0xE0,
        &[b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0],
    );

    out.extend_from_slice(&write_dqt(0, &simple_quant(0)));
    if img.frame.components.len() > 1 {
        out.extend_from_slice(&write_dqt(1, &simple_quant(8)));
    }

    let mut sof_body = vec![
        8,
        (img.frame.height >> 8) as u8,
        img.frame.height as u8,
        (img.frame.width >> 8) as u8,
        img.frame.width as u8,
        img.frame.components.len() as u8,
    ];
    for c in &img.frame.components {
        sof_body.push(c.id);
        sof_body.push((c.h_sampling << 4) | c.v_sampling);
        sof_body.push(c.quant_table_id);
    }
    let sof_marker = if img.frame.progressive { 0xC2 } else { 0xC0 };
    push_segment(&mut out, sof_marker, &sof_body);

    for spec in img.dc_specs.iter().chain(img.ac_specs.iter()) {
        out.extend_from_slice(&write_dht(spec));
    }

    if img.restart_interval > 0 {
        push_segment(&mut out, 0xDD, &img.restart_interval.to_be_bytes());
    }

    let huff = build_huff_slots(&img.dc_specs, &img.ac_specs);

    for scan in &img.scans {
        let mut sos_body = vec![scan.components.len() as u8];
        for &(ci, dc, ac) in &scan.components {
            sos_body.push(img.frame.components[ci].id);
            sos_body.push(((dc as u8) << 4) | ac as u8);
        }
        sos_body.push(scan.params.ss);
        sos_body.push(scan.params.se);
        sos_body.push((scan.params.ah << 4) | scan.params.al);
        push_segment(&mut out, 0xDA, &sos_body);

        let info = ScanInfo {
            components: scan
                .components
                .iter()
                .map(|&(ci, dc, ac)| ScanComponent {
                    comp_idx: ci,
                    dc_table: dc,
                    ac_table: ac,
                })
                .collect(),
            params: scan.params,
            restart_interval: img.restart_interval,
        };
        let mut bs = BitStream::new();
        encoder::encode_scan(&mut bs, &img.frame, &info, &img.coeffs, &huff).unwrap();
        out.extend_from_slice(&bs.into_bytes());
    }

    out.extend_from_slice(&[0xFF, 0xD9]);
    out.extend_from_slice(&img.trailer);
    out
}

/// A single-scan baseline grayscale image with flat tables.
pub fn baseline_gray(w: u16, h: u16, seed: u32, restart_interval: u16) -> TestJpeg {
    let frame = gray_frame(w, h, false);
    let mut coeffs = alloc_coeffs(&frame);
    fill_coeffs(&mut coeffs[0], seed, 180, 25, 3);
    TestJpeg {
        frame,
        coeffs,
        dc_specs: vec![dc_flat(0)],
        ac_specs: vec![ac_flat(0)],
        restart_interval,
        scans: vec![ScanScript::baseline(vec![(0, 0, 0)])],
        trailer: Vec::new(),
    }
}

/// A single interleaved-scan baseline YCbCr image with flat tables.
pub fn baseline_color(
    w: u16,
    h: u16,
    luma_h: u8,
    luma_v: u8,
    seed: u32,
    restart_interval: u16,
) -> TestJpeg {
    let frame = color_frame(w, h, luma_h, luma_v, false);
    let mut coeffs = alloc_coeffs(&frame);
    for (ci, grid) in coeffs.iter_mut().enumerate() {
        fill_coeffs(grid, seed + ci as u32 * 7919, 150, 20, 4);
    }
    TestJpeg {
        frame,
        coeffs,
        dc_specs: vec![dc_flat(0), dc_flat(1)],
        ac_specs: vec![ac_flat(0), ac_flat(1)],
        restart_interval,
        scans: vec![ScanScript::baseline(vec![
            (0, 0, 0),
            (1, 1, 1),
            (2, 1, 1),
        ])],
        trailer: Vec::new(),
    }
}

/// Compress then decompress, asserting byte identity; returns the container.
pub fn compress_roundtrip(jpeg: &[u8], options: &CompressOptions) -> Vec<u8> {
    let mut packed = MemReadWriter::new();
    compress_jpeg_to_arhc(
        MemReadWriter::from_vec(jpeg.to_vec()),
        &mut packed,
        options,
    )
    .unwrap();
    let container = packed.into_inner();
    assert!(decode_is_arhc(&container));

    let mut restored = MemReadWriter::new();
    decompress_arhc_to_jpeg(
        MemReadWriter::from_vec(container.clone()),
        &mut restored,
    )
    .unwrap();
    assert_eq!(restored.data(), jpeg, "round-trip is not byte-identical");
    container
}

/// Byte offset just past the first occurrence of `pattern`.
pub fn find(haystack: &[u8], pattern: &[u8]) -> Option<usize> {
    haystack
        .windows(pattern.len())
        .position(|w| w == pattern)
}
