#[cfg(feature = "std")]
use alloc::vec::Vec;
use zstd_safe::{DCtx, DParameter, InBuffer, OutBuffer, ResetDirective};

use crate::{
    DEFAULT_SCRATCH_SIZE, Status,
    error::{Error, Result},
};
#[cfg(feature = "std")]
use crate::{
    frame::FrameDecoder,
    pool::DecoderPool,
    stream::{CancelToken, Decoder},
};

/// The smallest accepted window log.
pub const MIN_WINDOW_LOG: u32 = 10;
/// The largest accepted window log.
pub const MAX_WINDOW_LOG: u32 = 31;

/// The progress of a decompression step.
#[derive(Debug)]
pub struct DecompressionProgress {
    status: Status,
    in_progress: usize,
    out_progress: usize,
    frame_finished: bool,
}

impl DecompressionProgress {
    fn new(status: Status, in_progress: usize, out_progress: usize, frame_finished: bool) -> Self {
        Self {
            status,
            in_progress,
            out_progress,
            frame_finished,
        }
    }

    /// The status of the step.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The input progress, i.e. the number of bytes that were consumed from the input buffer.
    pub fn in_progress(&self) -> usize {
        self.in_progress
    }

    /// The output progress, i.e. the number of bytes that were written to the output buffer.
    pub fn out_progress(&self) -> usize {
        self.out_progress
    }

    /// Whether this step observed the end marker of the current frame.
    pub fn frame_finished(&self) -> bool {
        self.frame_finished
    }
}

/// Options that configure how data is decompressed.
pub struct DecodeOptions<'a> {
    dctx: DCtx<'a>,
    window_log_max: Option<u32>,
    pub(crate) max_frame_size: Option<usize>,
    pub(crate) scratch_capacity: usize,
    #[cfg(feature = "std")]
    pub(crate) cancel: Option<CancelToken>,
}

impl Default for DecodeOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> DecodeOptions<'a> {
    /// Creates a set of options with default values.
    ///
    /// # Panics
    ///
    /// If allocation of [`DCtx`] fails.
    pub fn new() -> Self {
        Self::with_dctx(DCtx::create())
    }

    /// Tries to create new options with default values.
    ///
    /// Returns `None` if allocation of [`DCtx`] fails.
    pub fn try_new() -> Option<Self> {
        let dctx = DCtx::try_create()?;
        Some(Self::with_dctx(dctx))
    }

    /// Creates options with the given decompression context.
    pub fn with_dctx(dctx: DCtx<'a>) -> Self {
        Self {
            dctx,
            window_log_max: None,
            max_frame_size: None,
            scratch_capacity: DEFAULT_SCRATCH_SIZE,
            #[cfg(feature = "std")]
            cancel: None,
        }
    }

    /// Sets a [`DCtx`].
    pub fn dctx(mut self, dctx: DCtx<'a>) -> Self {
        self.dctx = dctx;
        self
    }

    /// Sets the maximum window log the decoder accepts.
    ///
    /// Bounds the memory required for decompression of untrusted input. The value is validated
    /// when the raw decoder is created.
    pub fn window_log_max(mut self, window_log: u32) -> Self {
        self.window_log_max = Some(window_log);
        self
    }

    /// Sets an upper bound for the decompressed size of a single frame in [`FrameDecoder`].
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn max_frame_size(mut self, limit: usize) -> Self {
        self.max_frame_size = Some(limit);
        self
    }

    /// Sets the capacity of the scratch buffer used by [`Decoder`].
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn scratch_capacity(mut self, capacity: usize) -> Self {
        self.scratch_capacity = capacity.max(1);
        self
    }

    /// Sets a [`CancelToken`] that is polled by [`Decoder`] operations.
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Creates a [`RawDecoder`] with the configuration.
    ///
    /// # Errors
    ///
    /// Fails if the window log is out of range.
    pub fn into_raw_decoder(self) -> Result<RawDecoder<'a>> {
        RawDecoder::with_opts(self)
    }

    /// Creates a [`Decoder`] that reads compressed data from `reader`.
    ///
    /// # Errors
    ///
    /// Fails if the decoder cannot be created.
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn into_decoder<R>(self, reader: R) -> Result<Decoder<'a, R>> {
        Decoder::with_opts(reader, self)
    }

    /// Creates a [`FrameDecoder`] that yields the decoded frames of `reader`.
    ///
    /// # Errors
    ///
    /// Fails if the frame decoder cannot be created.
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn into_frame_decoder<R>(self, reader: R) -> Result<FrameDecoder<'a, R>> {
        FrameDecoder::with_opts(reader, self)
    }
}

/// A reusable, incremental decoder.
///
/// The counterpart of [`RawEncoder`](crate::RawEncoder): maps one bounded chunk of compressed
/// input to decompressed output, reporting progress counters, a [`Status`] and whether the end
/// marker of the current frame was reached. After a finished frame the decoder is immediately
/// ready for the next frame header, so concatenated frames decompress without intermediate
/// resets.
pub struct RawDecoder<'a> {
    dctx: DCtx<'a>,
    window_log_max: Option<u32>,
    initialized: bool,
}

impl core::fmt::Debug for RawDecoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawDecoder")
            .field("window_log_max", &self.window_log_max)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl<'a> RawDecoder<'a> {
    /// Creates a new `RawDecoder` with the given [`DecodeOptions`].
    ///
    /// # Errors
    ///
    /// Fails if the configured window log is out of range.
    pub fn with_opts(opts: DecodeOptions<'a>) -> Result<Self> {
        if let Some(window_log) = opts.window_log_max {
            check_window_log(window_log)?;
        }

        Ok(Self {
            dctx: opts.dctx,
            window_log_max: opts.window_log_max,
            initialized: false,
        })
    }
}

impl RawDecoder<'_> {
    /// Creates a new `RawDecoder` with default parameters.
    ///
    /// This is equivalent to calling `DecodeOptions::new().into_raw_decoder()`.
    ///
    /// # Panics
    ///
    /// If allocation of [`DCtx`] fails.
    pub fn new() -> Self {
        Self {
            dctx: DCtx::create(),
            window_log_max: None,
            initialized: false,
        }
    }

    /// Performs a streaming decompression step from `src` to `dst`.
    ///
    /// The returned [`DecompressionProgress`] carries the consumed and written byte counts, a
    /// [`Status`] and the frame boundary signal:
    ///
    /// - [`Status::DestinationTooSmall`]: `dst` filled up mid-frame. Drain it and call again.
    /// - [`Status::NeedMoreData`]: `src` was entirely consumed mid-frame. If no further input
    ///   exists the stream is truncated; the missing bytes will never come.
    /// - [`Status::Done`]: the step ran out of work, usually because a frame finished.
    ///
    /// [`frame_finished`](DecompressionProgress::frame_finished) is true exactly when this step
    /// observed the end marker of the current frame.
    ///
    /// # Errors
    ///
    /// If the codec rejects the compressed data.
    pub fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<DecompressionProgress> {
        self.initialize()?;

        let mut in_buf = InBuffer::around(src);
        let mut out_buf = OutBuffer::around(dst);

        let hint = self
            .dctx
            .decompress_stream(&mut out_buf, &mut in_buf)
            .map_err(Error::invalid_data)?;
        let consumed = in_buf.pos();
        let written = out_buf.pos();
        let frame_finished = hint == 0;

        let status = if written == dst.len() && !frame_finished {
            Status::DestinationTooSmall
        } else if consumed == src.len() && !frame_finished && hint > 0 {
            Status::NeedMoreData
        } else {
            Status::Done
        };

        Ok(DecompressionProgress::new(
            status,
            consumed,
            written,
            frame_finished,
        ))
    }

    /// Sets the maximum window log the decoder accepts.
    ///
    /// # Errors
    ///
    /// Fails if `window_log` is out of range, or if the decoder is already initialized, i.e. a
    /// decompression step has happened since creation or the last [`reset`](Self::reset).
    pub fn set_window_log_max(&mut self, window_log: u32) -> Result<()> {
        if self.initialized {
            return Err(Error::illegal_state(
                "window log cannot change after decompression started",
            ));
        }
        check_window_log(window_log)?;
        self.window_log_max = Some(window_log);

        Ok(())
    }

    /// Resets the decompression session.
    ///
    /// Any progress of the current frame is discarded; the next decompression step expects a
    /// fresh frame header. Allocations are kept for reuse.
    #[allow(clippy::missing_panics_doc)]
    pub fn reset(&mut self) {
        self.dctx
            .reset(ResetDirective::SessionOnly)
            .expect("Resetting session never fails");
        self.initialized = false;
    }

    fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        if let Some(window_log) = self.window_log_max {
            self.dctx
                .set_parameter(DParameter::WindowLogMax(window_log))?;
        }
        self.initialized = true;

        Ok(())
    }
}

impl Default for RawDecoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_window_log(window_log: u32) -> Result<()> {
    if !(MIN_WINDOW_LOG..=MAX_WINDOW_LOG).contains(&window_log) {
        return Err(Error::invalid_argument("window log out of range"));
    }

    Ok(())
}

/// Decompresses all frames of `data`.
///
/// Accepts any number of concatenated frames, including skippable members, and returns the
/// concatenation of their decompressed content. The decompression context is taken from the
/// process-wide pool.
///
/// # Errors
///
/// Fails if the data is corrupted or ends in the middle of a frame.
///
/// # Examples
///
/// ```
/// let a = flowzstd::compress_all(b"first ", 1)?;
/// let b = flowzstd::compress_all(b"second", 19)?;
/// let joined: Vec<u8> = [a, b].concat();
///
/// assert_eq!(flowzstd::decompress_all(&joined)?, b"first second");
/// # Ok::<(), flowzstd::Error>(())
/// ```
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub fn decompress_all(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DecoderPool::rent();
    let mut out = alloc::vec![0; data.len().max(64)];
    let mut in_progress = 0;
    let mut out_progress = 0;

    while in_progress < data.len() {
        if out_progress == out.len() {
            let len = out.len();
            out.resize(len * 2, 0);
        }

        let prog = decoder.decompress(&data[in_progress..], &mut out[out_progress..])?;
        in_progress += prog.in_progress();
        out_progress += prog.out_progress();

        if prog.status() == Status::NeedMoreData && in_progress == data.len() {
            return Err(Error::truncated_frame());
        }
    }

    out.truncate(out_progress);
    Ok(out)
}
