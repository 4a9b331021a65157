use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use std::sync::Mutex;

use crate::decode::RawDecoder;

/// The maximum number of decoders retained by the pool.
///
/// Bounds steady-state memory; decoders returned beyond the cap are dropped.
pub const MAX_POOLED_DECODERS: usize = 32;

static POOL: Mutex<Vec<RawDecoder<'static>>> = Mutex::new(Vec::new());

/// A process-wide pool of reusable decompression contexts.
///
/// Creating a decompression context is not free; callers that decompress many small payloads
/// benefit from reusing one. The pool is safe to use from multiple threads and needs no
/// initialization.
///
/// Encoders are not pooled, their configuration is caller specific.
///
/// # Examples
///
/// ```
/// use flowzstd::DecoderPool;
///
/// let compressed = flowzstd::compress_all(b"pooled", 3)?;
/// let mut decoder = DecoderPool::rent();
/// let mut out = [0u8; 64];
///
/// let prog = decoder.decompress(&compressed, &mut out)?;
/// assert_eq!(&out[..prog.out_progress()], b"pooled");
/// // Dropping the guard resets the decoder and returns it to the pool.
/// # Ok::<(), flowzstd::Error>(())
/// ```
pub struct DecoderPool;

impl DecoderPool {
    /// Takes a decoder from the pool, creating a new one if the pool is empty.
    ///
    /// The decoder is handed back automatically when the returned [`PooledDecoder`] is
    /// dropped.
    ///
    /// # Panics
    ///
    /// If a new decompression context has to be created and its allocation fails.
    pub fn rent() -> PooledDecoder {
        let decoder = POOL
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_default();

        PooledDecoder(Some(decoder))
    }
}

/// A pooled decoder, returned to the [`DecoderPool`] on drop.
///
/// Dereferences to [`RawDecoder`].
pub struct PooledDecoder(Option<RawDecoder<'static>>);

impl Deref for PooledDecoder {
    type Target = RawDecoder<'static>;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().expect("decoder is present until drop")
    }
}

impl DerefMut for PooledDecoder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut().expect("decoder is present until drop")
    }
}

impl Drop for PooledDecoder {
    fn drop(&mut self) {
        if let Some(mut decoder) = self.0.take() {
            decoder.reset();
            if let Ok(mut pool) = POOL.lock() {
                if pool.len() < MAX_POOLED_DECODERS {
                    pool.push(decoder);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use crate::compress_all;

    use super::*;

    #[test]
    fn rented_decoder_is_reset_between_uses() {
        let blob = compress_all(b"pooled payload", 3).unwrap();

        for _ in 0..3 {
            let mut decoder = DecoderPool::rent();
            let mut out = vec![0; 64];
            // Leave the decoder mid-frame; the return path must reset it.
            let prog = decoder.decompress(&blob[..blob.len() - 2], &mut out).unwrap();
            assert!(prog.out_progress() > 0);
            assert!(!prog.frame_finished());
        }

        let mut decoder = DecoderPool::rent();
        let mut out = vec![0; 64];
        let prog = decoder.decompress(&blob, &mut out).unwrap();
        assert!(prog.frame_finished());
        assert_eq!(&out[..prog.out_progress()], b"pooled payload");
    }

    #[test]
    fn pool_retention_is_capped() {
        let guards: Vec<PooledDecoder> = (0..MAX_POOLED_DECODERS + 8)
            .map(|_| DecoderPool::rent())
            .collect();
        drop(guards);

        let pooled = POOL.lock().unwrap().len();
        assert!(pooled <= MAX_POOLED_DECODERS);
    }
}
