#![no_main]

use libfuzzer_sys::fuzz_target;
use flowzstd::{FrameDecoder, Frames};

fuzz_target!(|data: &[u8]| {
    // Both walkers must terminate on arbitrary bytes without panicking.
    for info in Frames::new(data) {
        if info.is_err() {
            break;
        }
    }

    if let Ok(frames) = FrameDecoder::new(data) {
        for frame in frames.take(64) {
            if frame.is_err() {
                break;
            }
        }
    }
});
