use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::{
    Status,
    decode::{DecodeOptions, RawDecoder},
    encode::{EncodeOptions, RawEncoder},
    error::{Error, Result},
};

/// A cloneable cancellation token polled by stream adapters.
///
/// Cancellation is cooperative: it is observed on operation entry and before every round trip
/// to the underlying reader or writer, never in the middle of a codec step. A cancelled
/// operation fails without consuming input; the adapter can be recovered with a reset.
///
/// # Examples
///
/// ```
/// use flowzstd::CancelToken;
///
/// let token = CancelToken::new();
/// let watcher = token.clone();
///
/// token.cancel();
/// assert!(watcher.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a new token in the not-cancelled state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation of all operations polling this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

fn check_cancel(cancel: Option<&CancelToken>) -> Result<()> {
    if cancel.is_some_and(CancelToken::is_cancelled) {
        return Err(Error::cancelled());
    }

    Ok(())
}

// Clears the active flag when the operation leaves, on success, error and unwind alike.
struct OpGuard<'g>(&'g AtomicBool);

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn acquire(active: &AtomicBool) -> Result<OpGuard<'_>> {
    active
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .map_err(|_| Error::illegal_state("another operation is in progress"))?;

    Ok(OpGuard(active))
}

/// Compresses data written to it into an underlying writer.
///
/// The `Encoder` buffers nothing but a scratch block of compressed output; every write feeds
/// the codec and forwards whatever it produces. Frames are ended explicitly with
/// [`end_frame`](Self::end_frame), or implicitly by [`finish`](Self::finish).
///
/// Operations on one `Encoder` are strictly serialized. A second operation entered while one is
/// in progress fails with an illegal-state error instead of queueing.
///
/// # Examples
///
/// ```no_run
/// use std::{fs::File, io};
/// use flowzstd::Encoder;
///
/// let mut input = File::open("foo")?;
/// let output = File::create("foo.zst")?;
/// let mut encoder = Encoder::new(output)?;
/// io::copy(&mut input, &mut encoder)?;
/// // End the last frame and get the file back
/// encoder.finish()?;
/// # Ok::<(), flowzstd::Error>(())
/// ```
pub struct Encoder<'a, W> {
    active: AtomicBool,
    state: EncoderState<'a, W>,
}

struct EncoderState<'a, W> {
    raw: RawEncoder<'a>,
    writer: W,
    out_buf: Vec<u8>,
    pending_frame_reset: bool,
    cancel: Option<CancelToken>,
    written_compressed: u64,
}

impl<'a, W> Encoder<'a, W> {
    /// Creates a new `Encoder` with default parameters.
    ///
    /// This is equivalent to calling `EncodeOptions::new().into_encoder(writer)`.
    ///
    /// # Errors
    ///
    /// Fails if the encoder could not be created.
    pub fn new(writer: W) -> Result<Self> {
        Self::with_opts(writer, EncodeOptions::new())
    }

    /// Creates a new `Encoder` with the given [`EncodeOptions`].
    ///
    /// # Errors
    ///
    /// Fails if the encoder could not be created.
    pub fn with_opts(writer: W, mut opts: EncodeOptions<'a>) -> Result<Self> {
        let scratch_capacity = opts.scratch_capacity;
        let cancel = opts.cancel.take();

        Ok(Self {
            active: AtomicBool::new(false),
            state: EncoderState {
                raw: opts.into_raw_encoder()?,
                writer,
                out_buf: alloc::vec![0; scratch_capacity],
                pending_frame_reset: false,
                cancel,
                written_compressed: 0,
            },
        })
    }

    /// The total number of compressed bytes that have been written to the internal writer.
    pub fn written_compressed(&self) -> u64 {
        self.state.written_compressed
    }

    /// Returns the internal writer, discarding any unwritten state.
    ///
    /// The current frame is not terminated; use [`finish`](Self::finish) for a well-formed
    /// stream.
    pub fn into_inner(self) -> W {
        self.state.writer
    }
}

impl<W: Write> Encoder<'_, W> {
    /// Consumes and compresses input data from `buf`.
    ///
    /// Call this repetitively to consume input data. Compressed data gets written to the
    /// internal writer. Returns the number of bytes consumed from `buf`.
    ///
    /// # Errors
    ///
    /// If compression or writing fails, another operation is in progress, or cancellation is
    /// observed.
    pub fn compress(&mut self, buf: &[u8]) -> Result<usize> {
        let _guard = acquire(&self.active)?;
        self.state.compress(buf)
    }

    /// Drains all pending compressed bytes into the internal writer and flushes it.
    ///
    /// The current frame stays open; subsequent writes append to it.
    ///
    /// # Errors
    ///
    /// If flushing fails, another operation is in progress, or cancellation is observed.
    pub fn flush(&mut self) -> Result<()> {
        let _guard = acquire(&self.active)?;
        self.state.flush()
    }

    /// Ends the current frame and writes the frame epilogue to the internal writer.
    ///
    /// The next write starts a fresh frame. Calling this again without an intervening write is
    /// a no-op, so disposing an encoder right after `end_frame` does not create an empty
    /// trailing frame. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// If writing fails, another operation is in progress, or cancellation is observed.
    pub fn end_frame(&mut self) -> Result<u64> {
        let _guard = acquire(&self.active)?;
        self.state.end_frame()
    }

    /// Terminates the stream and returns the internal writer.
    ///
    /// Ends the current frame unless the previous operation already did, then flushes the
    /// writer.
    ///
    /// # Errors
    ///
    /// If writing fails, another operation is in progress, or cancellation is observed.
    pub fn finish(self) -> Result<W> {
        let Self { active, mut state } = self;
        let _guard = acquire(&active)?;
        state.end_frame()?;
        state.writer.flush()?;

        Ok(state.writer)
    }
}

impl<W: Write> EncoderState<'_, W> {
    fn compress(&mut self, buf: &[u8]) -> Result<usize> {
        check_cancel(self.cancel.as_ref())?;

        if self.pending_frame_reset {
            self.raw.reset();
            self.pending_frame_reset = false;
        }

        let mut in_progress = 0;
        while in_progress < buf.len() {
            let prog = self
                .raw
                .compress(&buf[in_progress..], &mut self.out_buf, false)?;
            self.write_out(prog.out_progress())?;
            in_progress += prog.in_progress();

            if prog.in_progress() == 0 && prog.out_progress() == 0 {
                // Stalled. Nudge the codec once with an empty-input flush, then give up.
                let flushed = self.raw.flush(&mut self.out_buf)?;
                self.write_out(flushed.out_progress())?;
                if flushed.out_progress() == 0 {
                    break;
                }
            }
        }

        Ok(in_progress)
    }

    fn flush(&mut self) -> Result<()> {
        check_cancel(self.cancel.as_ref())?;

        loop {
            let prog = self.raw.flush(&mut self.out_buf)?;
            self.write_out(prog.out_progress())?;
            if prog.status() == Status::Done {
                break;
            }
        }
        self.writer.flush()?;

        Ok(())
    }

    fn end_frame(&mut self) -> Result<u64> {
        check_cancel(self.cancel.as_ref())?;

        if self.pending_frame_reset {
            return Ok(0);
        }

        let mut written = 0u64;
        loop {
            let prog = self.raw.compress(&[], &mut self.out_buf, true)?;
            self.write_out(prog.out_progress())?;
            written += prog.out_progress() as u64;
            if prog.status() == Status::Done {
                break;
            }
        }
        // Starting the next frame is deferred to the next write, so that disposing right
        // after an ended frame emits nothing.
        self.pending_frame_reset = true;

        Ok(written)
    }

    fn write_out(&mut self, n: usize) -> Result<()> {
        if n > 0 {
            check_cancel(self.cancel.as_ref())?;
            self.writer.write_all(&self.out_buf[..n])?;
            self.written_compressed += n as u64;
        }

        Ok(())
    }
}

impl<W: Write> Write for Encoder<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.compress(buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Encoder::flush(self).map_err(io::Error::other)
    }
}

/// Decompresses data read from an underlying reader.
///
/// Concatenated frames, skippable members included, are read back to back; the frame
/// boundaries are invisible to the caller. A source that ends in the middle of a frame
/// surfaces as a short read, integrity checks are the caller's responsibility.
///
/// # Examples
///
/// ```no_run
/// use std::{fs::File, io};
/// use flowzstd::Decoder;
///
/// let compressed = File::open("foo.zst")?;
/// let mut output = File::create("foo")?;
/// let mut decoder = Decoder::new(compressed)?;
/// io::copy(&mut decoder, &mut output)?;
/// # Ok::<(), flowzstd::Error>(())
/// ```
pub struct Decoder<'a, R> {
    active: AtomicBool,
    state: DecoderState<'a, R>,
}

struct DecoderState<'a, R> {
    raw: RawDecoder<'a>,
    reader: R,
    in_buf: Vec<u8>,
    in_buf_pos: usize,
    in_buf_limit: usize,
    source_depleted: bool,
    cancel: Option<CancelToken>,
    read_compressed: u64,
}

impl<'a, R> Decoder<'a, R> {
    /// Creates a new `Decoder` with default parameters.
    ///
    /// This is equivalent to calling `DecodeOptions::new().into_decoder(reader)`.
    ///
    /// # Errors
    ///
    /// Fails if the decoder could not be created.
    pub fn new(reader: R) -> Result<Self> {
        Self::with_opts(reader, DecodeOptions::new())
    }

    /// Creates a new `Decoder` with the given [`DecodeOptions`].
    ///
    /// # Errors
    ///
    /// Fails if the decoder could not be created.
    pub fn with_opts(reader: R, mut opts: DecodeOptions<'a>) -> Result<Self> {
        let scratch_capacity = opts.scratch_capacity;
        let cancel = opts.cancel.take();

        Ok(Self {
            active: AtomicBool::new(false),
            state: DecoderState {
                raw: opts.into_raw_decoder()?,
                reader,
                in_buf: alloc::vec![0; scratch_capacity],
                in_buf_pos: 0,
                in_buf_limit: 0,
                source_depleted: false,
                cancel,
                read_compressed: 0,
            },
        })
    }

    /// Gets the total number of compressed bytes read since creation or the last reset.
    pub fn read_compressed(&self) -> u64 {
        self.state.read_compressed
    }

    /// Returns the internal reader.
    ///
    /// Input that was buffered but not yet decompressed is lost.
    pub fn into_inner(self) -> R {
        self.state.reader
    }

    /// Resets the decompression state.
    ///
    /// Buffered input is discarded; the next read starts a fresh frame from whatever follows
    /// in the underlying reader.
    ///
    /// # Errors
    ///
    /// If another operation is in progress.
    pub fn reset(&mut self) -> Result<()>
    where
        R: Read,
    {
        let _guard = acquire(&self.active)?;
        self.state.reset();

        Ok(())
    }
}

impl<R: Read> Decoder<'_, R> {
    /// Decompresses data from the internal reader into `buf`.
    ///
    /// Call this repetitively to fill `buf` with decompressed data. Returns the number of
    /// bytes written; zero means the source is exhausted.
    ///
    /// # Errors
    ///
    /// If decompression or reading fails, another operation is in progress, or cancellation is
    /// observed.
    pub fn decompress(&mut self, buf: &mut [u8]) -> Result<usize> {
        let _guard = acquire(&self.active)?;
        self.state.decompress(buf)
    }
}

impl<R: Read> DecoderState<'_, R> {
    fn decompress(&mut self, buf: &mut [u8]) -> Result<usize> {
        check_cancel(self.cancel.as_ref())?;

        if buf.is_empty() {
            return Ok(0);
        }

        let mut out_progress = 0;
        loop {
            if self.in_buf_pos == self.in_buf_limit && !self.source_depleted {
                check_cancel(self.cancel.as_ref())?;
                let n = self.reader.read(&mut self.in_buf)?;
                self.in_buf_pos = 0;
                self.in_buf_limit = n;
                self.source_depleted = n == 0;
            }

            let prog = self.raw.decompress(
                &self.in_buf[self.in_buf_pos..self.in_buf_limit],
                &mut buf[out_progress..],
            )?;
            self.in_buf_pos += prog.in_progress();
            self.read_compressed += prog.in_progress() as u64;
            out_progress += prog.out_progress();

            match prog.status() {
                Status::DestinationTooSmall => return Ok(out_progress),
                Status::NeedMoreData => {
                    if self.source_depleted {
                        // Truncated stream; the missing bytes will never come.
                        return Ok(out_progress);
                    }
                }
                Status::Done => {
                    if out_progress == buf.len()
                        || (self.source_depleted && self.in_buf_pos == self.in_buf_limit)
                    {
                        return Ok(out_progress);
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.raw.reset();
        self.in_buf_pos = 0;
        self.in_buf_limit = 0;
        self.source_depleted = false;
        self.read_compressed = 0;
    }
}

impl<R: Read> Read for Decoder<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decompress(buf).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::{decompress_all, frame::Frames};

    use super::*;

    fn pseudo_random(len: usize) -> Vec<u8> {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect()
    }

    #[test]
    fn write_then_finish_round_trips() {
        let input = b"hello zstd".repeat(100);
        let mut encoder = EncodeOptions::new()
            .compression_level(3)
            .into_encoder(Vec::new())
            .unwrap();
        encoder.compress(&input).unwrap();
        let compressed = encoder.finish().unwrap();

        assert!(compressed.len() < input.len());
        assert_eq!(decompress_all(&compressed).unwrap(), input);
    }

    #[test]
    fn flush_does_not_terminate_frame() {
        let mut encoder = Encoder::new(Vec::new()).unwrap();
        encoder.compress(b"written before").unwrap();
        encoder.flush().unwrap();
        let flushed_so_far = encoder.written_compressed();
        assert!(flushed_so_far > 0);

        encoder.compress(b" and after a flush").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(Frames::new(&compressed).count(), 1);
        assert_eq!(
            decompress_all(&compressed).unwrap(),
            b"written before and after a flush"
        );
    }

    #[test]
    fn end_frame_is_idempotent() {
        let mut encoder = Encoder::new(Vec::new()).unwrap();
        encoder.compress(b"one frame").unwrap();

        let written = encoder.end_frame().unwrap();
        assert!(written > 0);
        assert_eq!(encoder.end_frame().unwrap(), 0);
        assert_eq!(encoder.end_frame().unwrap(), 0);

        let compressed = encoder.finish().unwrap();
        assert_eq!(Frames::new(&compressed).count(), 1);
        assert_eq!(decompress_all(&compressed).unwrap(), b"one frame");
    }

    #[test]
    fn ended_frame_is_a_standalone_prefix() {
        let mut encoder = Encoder::new(Vec::new()).unwrap();
        encoder.compress(b"first frame bytes").unwrap();
        encoder.end_frame().unwrap();
        encoder.compress(b"bytes of the second frame").unwrap();
        let compressed = encoder.finish().unwrap();

        // The prefix up to the first frame boundary is a complete frame of its own.
        let first = Frames::new(&compressed).next().unwrap().unwrap();
        let boundary = first.compressed_size() as usize;
        assert_eq!(
            decompress_all(&compressed[..boundary]).unwrap(),
            b"first frame bytes"
        );
        assert_eq!(
            decompress_all(&compressed[boundary..]).unwrap(),
            b"bytes of the second frame"
        );
    }

    #[test]
    fn one_frame_per_end_frame() {
        let mut encoder = Encoder::new(Vec::new()).unwrap();
        for byte in [b'A', b'B', b'C'] {
            encoder.compress(&[byte].repeat(4096)).unwrap();
            encoder.end_frame().unwrap();
        }
        let compressed = encoder.finish().unwrap();

        // The final frame was already ended, finish must not add a fourth one.
        assert_eq!(Frames::new(&compressed).count(), 3);

        let mut expected = Vec::new();
        for byte in [b'A', b'B', b'C'] {
            expected.extend([byte].repeat(4096));
        }
        assert_eq!(decompress_all(&compressed).unwrap(), expected);
    }

    #[test]
    fn chunked_big_payload_round_trips() {
        let mut input = pseudo_random(2 * 1024 * 1024 + 123);
        // Give the codec something to work with.
        input[..1024 * 1024].fill(0x42);

        let mut encoder = EncodeOptions::new()
            .compression_level(5)
            .into_encoder(Vec::new())
            .unwrap();
        for chunk in input.chunks(13_117) {
            assert_eq!(encoder.compress(chunk).unwrap(), chunk.len());
        }
        let compressed = encoder.finish().unwrap();

        let mut decoder = Decoder::new(&compressed[..]).unwrap();
        let mut output = Vec::new();
        io::copy(&mut decoder, &mut output).unwrap();

        assert_eq!(output, input);
    }

    #[test]
    fn decoder_crosses_frame_boundaries() {
        let mut encoder = Encoder::new(Vec::new()).unwrap();
        encoder.compress(b"first|").unwrap();
        encoder.end_frame().unwrap();
        encoder.compress(b"second").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = DecodeOptions::new()
            .scratch_capacity(7)
            .into_decoder(&compressed[..])
            .unwrap();
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();

        assert_eq!(output, b"first|second");
        assert_eq!(decoder.read_compressed(), compressed.len() as u64);
    }

    #[test]
    fn decoder_reset_discards_buffered_input() {
        let compressed = crate::compress_all(b"resettable", 3).unwrap();
        let mut decoder = Decoder::new(&compressed[..]).unwrap();
        // Buffers the whole source internally.
        decoder.decompress(&mut [0u8; 4]).unwrap();

        decoder.reset().unwrap();
        assert_eq!(decoder.read_compressed(), 0);

        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn decoder_reset_starts_next_frame_from_source() {
        let a = crate::compress_all(b"frame a", 3).unwrap();
        let b = crate::compress_all(b"frame b", 3).unwrap();
        let joined: Vec<u8> = [a.clone(), b].concat();

        // Scratch sized to the first frame, so the second stays in the reader.
        let mut decoder = DecodeOptions::new()
            .scratch_capacity(a.len())
            .into_decoder(&joined[..])
            .unwrap();
        let mut out = [0u8; 7];
        let n = decoder.decompress(&mut out).unwrap();
        assert_eq!(&out[..n], b"frame a");

        decoder.reset().unwrap();
        let mut rest = Vec::new();
        decoder.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"frame b");
    }

    #[test]
    fn truncated_source_is_a_short_read() {
        let mut encoder = Encoder::new(Vec::new()).unwrap();
        encoder.compress(&[b'z'; 8192]).unwrap();
        let compressed = encoder.finish().unwrap();

        let cut = &compressed[..compressed.len() - 5];
        let mut decoder = Decoder::new(cut).unwrap();
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();

        assert!(output.len() <= 8192);
        assert!(output.iter().all(|b| *b == b'z'));
    }

    #[test]
    fn exclusivity_rejects_concurrent_entry() {
        let mut encoder = Encoder::new(Vec::new()).unwrap();

        encoder.active.store(true, Ordering::SeqCst);
        let err = encoder.compress(b"blocked").unwrap_err();
        assert!(err.is_illegal_state());
        assert_eq!(encoder.written_compressed(), 0);

        encoder.active.store(false, Ordering::SeqCst);
        assert_eq!(encoder.compress(b"unblocked").unwrap(), 9);
    }

    #[test]
    fn guard_releases_on_exit() {
        let mut encoder = Encoder::new(Vec::new()).unwrap();
        encoder.compress(b"first").unwrap();
        assert!(!encoder.active.load(Ordering::SeqCst));
        encoder.compress(b"second").unwrap();
    }

    #[test]
    fn cancelled_write_makes_no_progress() {
        let token = CancelToken::new();
        let mut encoder = EncodeOptions::new()
            .cancel_token(token.clone())
            .into_encoder(Vec::new())
            .unwrap();

        token.cancel();
        let err = encoder.compress(b"never happens").unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(encoder.written_compressed(), 0);
        assert!(encoder.into_inner().is_empty());
    }

    #[test]
    fn cancelled_read_makes_no_progress() {
        let compressed = crate::compress_all(b"unreachable", 3).unwrap();
        let token = CancelToken::new();
        let mut decoder = DecodeOptions::new()
            .cancel_token(token.clone())
            .into_decoder(&compressed[..])
            .unwrap();

        token.cancel();
        let err = decoder.decompress(&mut [0; 32]).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(decoder.read_compressed(), 0);
    }

    #[test]
    fn small_scratch_buffers_round_trip() {
        let input = pseudo_random(16 * 1024);
        let mut encoder = EncodeOptions::new()
            .scratch_capacity(13)
            .into_encoder(Vec::new())
            .unwrap();
        encoder.compress(&input).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decompress_all(&compressed).unwrap(), input);
    }
}
