//! This crate provides incremental streaming compression and decompression for Zstandard,
//! built on bindings from the [zstd_safe] crate.
//!
//! Data flows through caller-supplied buffers one bounded chunk at a time; no payload is ever
//! held in memory as a whole. A producer that cannot know how many output bytes a chunk of
//! input will yield and a consumer that must cooperate when destination space runs out meet in
//! a tri-state [`Status`] contract, with progress counters reported on every step.
//!
//! # Getting started
//!
//! - The [`RawEncoder`] and [`RawDecoder`] expose the buffer-at-a-time state machines.
//! - The [`Encoder`] and [`Decoder`] bind them to any [`std::io::Write`] or [`std::io::Read`].
//! - The [`frame`] module walks and decodes the members of a concatenated stream.
//! - [`compress_all`] and [`decompress_all`] are the one-shot conveniences.
//!
//! Everything written by this crate is a plain Zstandard stream, readable by any conforming
//! decoder.
//!
//! [zstd_safe]: https://docs.rs/zstd-safe/latest/zstd_safe/

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod decode;
mod encode;
mod error;
pub mod frame;
#[cfg(feature = "std")]
mod pool;
#[cfg(feature = "std")]
mod stream;

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub use decode::decompress_all;
pub use decode::{
    DecodeOptions, DecompressionProgress, MAX_WINDOW_LOG, MIN_WINDOW_LOG, RawDecoder,
};
pub use encode::{
    CompressionProgress, EncodeOptions, FlushProgress, Quality, RawEncoder, compress_all,
};
pub use error::{Error, Result};
pub use frame::{FrameInfo, FrameKind, Frames};
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub use frame::{DecodedFrame, FrameDecoder, FrameScanner};
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub use pool::{DecoderPool, MAX_POOLED_DECODERS, PooledDecoder};
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub use stream::{CancelToken, Decoder, Encoder};
// Re-export as it's part of the API.
pub use zstd_safe::CompressionLevel;

/// The compression level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: CompressionLevel = 3;

/// The default capacity of the scratch buffers used by the stream adapters.
pub const DEFAULT_SCRATCH_SIZE: usize = 0x1_0000;

/// The outcome of an incremental compression or decompression step.
///
/// Statuses are return values, not errors; together with the progress counters they tell the
/// caller how to continue a streaming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The requested work completed.
    Done,
    /// The source was entirely consumed and more input can be accepted.
    NeedMoreData,
    /// The destination is full while data is still pending.
    DestinationTooSmall,
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use proptest::prelude::*;

    use super::*;

    pub const INPUT: &str = include_str!("./lib.rs");

    fn cycle_raw(chunk_size: usize, buf_size: usize, level: CompressionLevel) {
        let input = INPUT.as_bytes();
        let mut encoder = EncodeOptions::new()
            .compression_level(level)
            .into_raw_encoder()
            .unwrap();
        let mut compressed = vec![];
        let mut buf = vec![0; buf_size];

        for chunk in input.chunks(chunk_size) {
            let mut in_progress = 0;
            while in_progress < chunk.len() {
                let prog = encoder
                    .compress(&chunk[in_progress..], &mut buf, false)
                    .unwrap();
                compressed.extend(&buf[..prog.out_progress()]);
                in_progress += prog.in_progress();
            }
        }

        loop {
            let prog = encoder.compress(&[], &mut buf, true).unwrap();
            compressed.extend(&buf[..prog.out_progress()]);
            if prog.status() == Status::Done {
                break;
            }
        }

        let mut decoder = RawDecoder::new();
        let mut output = Vec::with_capacity(input.len());
        let mut in_progress = 0;
        while in_progress < compressed.len() {
            let prog = decoder
                .decompress(&compressed[in_progress..], &mut buf)
                .unwrap();
            output.extend(&buf[..prog.out_progress()]);
            in_progress += prog.in_progress();
        }

        assert_eq!(input, output);
    }

    #[test]
    fn cycle() {
        cycle_raw(INPUT.len(), DEFAULT_SCRATCH_SIZE, 3);
    }

    #[test]
    fn cycle_tiny_buffers() {
        cycle_raw(133, 57, 3);
    }

    #[cfg(feature = "std")]
    #[test]
    fn one_shot_cycle() {
        let compressed = compress_all(INPUT.as_bytes(), 3).unwrap();
        assert!(compressed.len() < INPUT.len());

        let output = decompress_all(&compressed).unwrap();
        assert_eq!(INPUT.as_bytes(), output);
    }

    #[test]
    fn produced_bytes_are_plain_zstd() {
        let compressed = compress_all(INPUT.as_bytes(), 3).unwrap();
        let output = zstd::decode_all(&compressed[..]).unwrap();
        assert_eq!(INPUT.as_bytes(), output);
    }

    #[cfg(feature = "std")]
    #[test]
    fn reference_bytes_decode_here() {
        let compressed = zstd::encode_all(INPUT.as_bytes(), 3).unwrap();
        let output = decompress_all(&compressed).unwrap();
        assert_eq!(INPUT.as_bytes(), output);
    }

    #[cfg(feature = "std")]
    #[test]
    fn cycle_std() {
        use std::io::{Cursor, copy};

        let mut input = Cursor::new(INPUT);
        let mut encoder = Encoder::new(Vec::new()).unwrap();
        copy(&mut input, &mut encoder).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = Decoder::new(&compressed[..]).unwrap();
        let mut output = Cursor::new(vec![]);
        copy(&mut decoder, &mut output).unwrap();

        assert_eq!(INPUT.as_bytes(), output.get_ref());
    }

    proptest! {
        #[test]
        fn cycle_any_chunk_shape(chunk_size in 1..4096usize, buf_size in 16..4096usize) {
            cycle_raw(chunk_size, buf_size, 1);
        }

        // Any partition into separately ended frames restores the concatenated payload.
        #[test]
        #[cfg(feature = "std")]
        fn cycle_any_frame_partition(cuts in proptest::collection::vec(0..INPUT.len(), 0..6)) {
            let input = INPUT.as_bytes();
            let mut bounds = cuts;
            bounds.push(0);
            bounds.push(input.len());
            bounds.sort_unstable();

            let mut encoder = Encoder::new(Vec::new()).unwrap();
            for pair in bounds.windows(2) {
                encoder.compress(&input[pair[0]..pair[1]]).unwrap();
                encoder.end_frame().unwrap();
            }
            let compressed = encoder.finish().unwrap();

            let output = decompress_all(&compressed).unwrap();
            prop_assert_eq!(input, output);
        }

        #[test]
        fn truncation_never_panics(cut in 1..512usize) {
            let compressed = compress_all(INPUT.as_bytes(), 1).unwrap();
            let cut = cut.min(compressed.len());
            let blob = &compressed[..compressed.len() - cut];

            let mut decoder = RawDecoder::new();
            let mut buf = vec![0; DEFAULT_SCRATCH_SIZE];
            let mut in_progress = 0;
            let mut output = Vec::new();

            loop {
                let prog = decoder.decompress(&blob[in_progress..], &mut buf).unwrap();
                output.extend(&buf[..prog.out_progress()]);
                in_progress += prog.in_progress();
                if prog.in_progress() == 0 && prog.out_progress() == 0 {
                    break;
                }
            }

            prop_assert_eq!(&INPUT.as_bytes()[..output.len()], &output[..]);
        }
    }
}
