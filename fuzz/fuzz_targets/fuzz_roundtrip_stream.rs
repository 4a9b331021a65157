#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::{Read, Write};
use flowzstd::{Decoder, EncodeOptions};

fuzz_target!(|data: &[u8]| {
    let mut compressed: Vec<u8> = Vec::new();
    {
        let mut encoder = EncodeOptions::new()
            .scratch_capacity(64)
            .into_encoder(&mut compressed)
            .unwrap();
        for chunk in data.chunks(97) {
            encoder.write_all(chunk).unwrap();
            encoder.end_frame().unwrap();
        }
        encoder.finish().unwrap();
    }

    let mut decoder = Decoder::new(&compressed[..]).unwrap();
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();

    assert_eq!(data, &decompressed);
});
