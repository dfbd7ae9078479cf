// Copyright (c) 2026 the arhc project authors
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/arhc-rs/arhc

//! Malformed-input behavior: typed errors, never panics or wrong output.

mod common;

use arhc::arhc::{compress_jpeg_to_arhc, decompress_arhc_to_jpeg, CompressOptions};
use arhc::error::{ErrorCode, JpegError};
use arhc::io::MemReadWriter;

use common::*;

fn compress_err(data: Vec<u8>) -> JpegError {
    let mut out = MemReadWriter::new();
    compress_jpeg_to_arhc(
        MemReadWriter::from_vec(data),
        &mut out,
        &CompressOptions::default(),
    )
    .unwrap_err()
}

#[test]
fn missing_soi() {
    assert_eq!(compress_err(b"not a jpeg at all".to_vec()), JpegError::InvalidSoi);
    assert_eq!(compress_err(Vec::new()), JpegError::InvalidSoi);
}

#[test]
fn truncated_mid_scan_is_eof() {
    let jpeg = build_jpeg(&baseline_gray(32, 32, 41, 0));
    let sos = find(&jpeg, &[0xFF, 0xDA]).expect("no SOS in test file");
    let cut = sos + 30;
    assert!(cut < jpeg.len());
    let err = compress_err(jpeg[..cut].to_vec());
    assert_eq!(err.code(), ErrorCode::Eof, "got {err:?}");
}

#[test]
fn truncated_header_is_eof() {
    let jpeg = build_jpeg(&baseline_gray(16, 16, 42, 0));
    let err = compress_err(jpeg[..6].to_vec());
    assert_eq!(err.code(), ErrorCode::Eof, "got {err:?}");
}

#[test]
fn corrupt_dht_counts() {
    let mut jpeg = build_jpeg(&baseline_gray(16, 16, 43, 0));
    let dht = find(&jpeg, &[0xFF, 0xC4]).expect("no DHT in test file");
    // First code-length count of the first table.
    jpeg[dht + 5] = 0xFF;
    let err = compress_err(jpeg);
    assert!(
        matches!(err.code(), ErrorCode::Misc | ErrorCode::ShortHuffman),
        "got {err:?}"
    );
}

#[test]
fn oversubscribed_dht_rejected_at_build() {
    let mut jpeg = build_jpeg(&baseline_gray(16, 16, 44, 0));
    let dht = find(&jpeg, &[0xFF, 0xC4]).expect("no DHT in test file");
    // Claim three 1-bit codes while keeping the total count intact: the
    // canonical build must reject this before any decode runs.
    jpeg[dht + 5] = 3;
    jpeg[dht + 12] = jpeg[dht + 12].saturating_sub(3);
    let err = compress_err(jpeg);
    assert_eq!(err.code(), ErrorCode::Misc, "got {err:?}");
}

#[test]
fn restart_marker_out_of_sequence() {
    let jpeg = build_jpeg(&baseline_gray(64, 64, 45, 4));
    let rst = find(&jpeg, &[0xFF, 0xD0]).expect("no RST0 in test file");
    let mut tampered = jpeg.clone();
    tampered[rst + 1] = 0xD3;
    assert_eq!(
        compress_err(tampered),
        JpegError::RestartOutOfSequence { expected: 0, found: 3 }
    );
}

#[test]
fn cmyk_frame_rejected() {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x14, 8, 0, 8, 0, 8, 4];
    for id in 1..=4u8 {
        data.extend_from_slice(&[id, 0x11, 0]);
    }
    assert_eq!(compress_err(data), JpegError::UnsupportedComponentCount(4));
}

#[test]
fn arithmetic_coding_rejected() {
    let data = vec![0xFF, 0xD8, 0xFF, 0xC9, 0x00, 0x0B, 8, 0, 8, 0, 8, 1, 1, 0x11, 0];
    assert_eq!(compress_err(data), JpegError::UnsupportedMarker(0xC9));
}

#[test]
fn twelve_bit_rejected() {
    let data = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x0B, 12, 0, 8, 0, 8, 1, 1, 0x11, 0];
    assert_eq!(compress_err(data), JpegError::UnsupportedPrecision(12));
}

#[test]
fn truncated_container_is_eof() {
    let jpeg = build_jpeg(&baseline_gray(16, 16, 46, 0));
    let container = compress_roundtrip(&jpeg, &CompressOptions::default());
    for cut in [4usize, 10, container.len() / 2] {
        let mut out = MemReadWriter::new();
        let err = decompress_arhc_to_jpeg(
            MemReadWriter::from_vec(container[..cut].to_vec()),
            &mut out,
        )
        .unwrap_err();
        assert!(
            matches!(err.code(), ErrorCode::Eof | ErrorCode::Misc),
            "cut {cut}: got {err:?}"
        );
    }
}

#[test]
fn decompressing_plain_jpeg_is_not_arhc() {
    let jpeg = build_jpeg(&baseline_gray(16, 16, 47, 0));
    let mut out = MemReadWriter::new();
    assert_eq!(
        decompress_arhc_to_jpeg(MemReadWriter::from_vec(jpeg), &mut out),
        Err(JpegError::NotArhc)
    );
}

#[test]
fn stray_restart_marker_outside_scan() {
    // SOI directly followed by a restart marker is malformed.
    let data = vec![0xFF, 0xD8, 0xFF, 0xD0, 0xFF, 0xD9];
    let err = compress_err(data);
    assert_eq!(err.code(), ErrorCode::Misc, "got {err:?}");
}

#[test]
fn memory_limit_is_enforced() {
    let jpeg = build_jpeg(&baseline_gray(128, 128, 48, 0));
    let mut out = MemReadWriter::new();
    let err = compress_jpeg_to_arhc(
        MemReadWriter::from_vec(jpeg),
        &mut out,
        &CompressOptions {
            memory_limit: 1024,
            ..CompressOptions::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, JpegError::MemoryLimit(_)), "got {err:?}");
}
