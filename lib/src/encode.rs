use alloc::vec::Vec;
use zstd_safe::{
    CCtx, CParameter, CompressionLevel, InBuffer, OutBuffer, ResetDirective,
    zstd_sys::ZSTD_EndDirective,
};

use crate::{
    DEFAULT_COMPRESSION_LEVEL, DEFAULT_SCRATCH_SIZE, Status,
    error::{Error, Result},
};
#[cfg(feature = "std")]
use crate::stream::{CancelToken, Encoder};

/// A four-value compression quality that maps to a concrete level of the codec.
///
/// Use this where a coarse quality knob is preferable over the full level range, e.g. in
/// configuration surfaces. Conversion from raw integers preserves the closed-set contract:
///
/// ```
/// use flowzstd::Quality;
///
/// assert!(Quality::try_from(2).is_ok());
/// assert!(Quality::try_from(17).unwrap_err().is_invalid_argument());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// No effort spent on compression.
    None,
    /// The fastest level the codec supports.
    Fastest,
    /// The codec's default level.
    Default,
    /// The strongest level the codec supports.
    Maximum,
}

impl Quality {
    /// The compression level this quality maps to.
    pub fn level(self) -> CompressionLevel {
        match self {
            Self::None | Self::Fastest => zstd_safe::min_c_level(),
            Self::Default => DEFAULT_COMPRESSION_LEVEL,
            Self::Maximum => zstd_safe::max_c_level(),
        }
    }
}

impl TryFrom<i32> for Quality {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Fastest),
            2 => Ok(Self::Default),
            3 => Ok(Self::Maximum),
            _ => Err(Error::invalid_argument("unknown quality value")),
        }
    }
}

/// The progress of a compression step.
#[derive(Debug)]
pub struct CompressionProgress {
    status: Status,
    in_progress: usize,
    out_progress: usize,
}

impl CompressionProgress {
    fn new(status: Status, in_progress: usize, out_progress: usize) -> Self {
        Self {
            status,
            in_progress,
            out_progress,
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
}

/// The progress of a flush step.
#[derive(Debug)]
pub struct FlushProgress {
    status: Status,
    out_progress: usize,
}

impl FlushProgress {
    fn new(status: Status, out_progress: usize) -> Self {
        Self {
            status,
            out_progress,
        }
    }

    /// The status of the step.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The output progress, i.e. the number of bytes that were written to the output buffer.
    pub fn out_progress(&self) -> usize {
        self.out_progress
    }
}

/// Options that configure how data is compressed.
///
/// # Examples
///
/// Supports builder like chaining.
///
/// ```
/// use flowzstd::EncodeOptions;
///
/// let encoder = EncodeOptions::new()
///     .compression_level(5)
///     .into_raw_encoder()?;
/// # Ok::<(), flowzstd::Error>(())
/// ```
pub struct EncodeOptions<'a> {
    cctx: CCtx<'a>,
    compression_level: CompressionLevel,
    prefix: Option<&'a [u8]>,
    checksum_flag: bool,
    pub(crate) scratch_capacity: usize,
    #[cfg(feature = "std")]
    pub(crate) cancel: Option<CancelToken>,
}

impl Default for EncodeOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> EncodeOptions<'a> {
    /// Creates a set of options with default values.
    ///
    /// # Panics
    ///
    /// If allocation of [`CCtx`] fails.
    pub fn new() -> Self {
        Self::with_cctx(CCtx::create())
    }

    /// Tries to create new options with default values.
    ///
    /// Returns `None` if allocation of [`CCtx`] fails.
    pub fn try_new() -> Option<Self> {
        let cctx = CCtx::try_create()?;
        Some(Self::with_cctx(cctx))
    }

    /// Create options with the given compression context.
    pub fn with_cctx(cctx: CCtx<'a>) -> Self {
        Self {
            cctx,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            prefix: None,
            checksum_flag: false,
            scratch_capacity: DEFAULT_SCRATCH_SIZE,
            #[cfg(feature = "std")]
            cancel: None,
        }
    }

    /// Sets a [`CCtx`].
    pub fn cctx(mut self, cctx: CCtx<'a>) -> Self {
        self.cctx = cctx;
        self
    }

    /// Sets the compression level used by zstd.
    pub fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets the compression level via a [`Quality`].
    pub fn quality(mut self, quality: Quality) -> Self {
        self.compression_level = quality.level();
        self
    }

    /// Whether to write 32 bit checksums at the end of frames.
    pub fn checksum_flag(mut self, flag: bool) -> Self {
        self.checksum_flag = flag;
        self
    }

    /// Sets a raw content prefix that is presented to the codec as expected leading context.
    ///
    /// The prefix improves the ratio for payloads that share leading bytes with it, without
    /// being emitted itself. It is borrowed for the lifetime of the encoder and referenced by
    /// the codec until the session ends.
    pub fn prefix(mut self, prefix: &'a [u8]) -> Self {
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Sets the capacity of the scratch buffer used by [`Encoder`].
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn scratch_capacity(mut self, capacity: usize) -> Self {
        self.scratch_capacity = capacity.max(1);
        self
    }

    /// Sets a [`CancelToken`] that is polled by [`Encoder`] operations.
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Creates a [`RawEncoder`] with the configuration.
    ///
    /// # Errors
    ///
    /// Fails if the compression level is out of range.
    pub fn into_raw_encoder(self) -> Result<RawEncoder<'a>> {
        RawEncoder::with_opts(self)
    }

    /// Creates an [`Encoder`] that writes compressed data to `writer`.
    ///
    /// # Errors
    ///
    /// Fails if the encoder cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::fs::File;
    /// use flowzstd::EncodeOptions;
    ///
    /// let output = File::create("data.zst").unwrap();
    /// let encoder = EncodeOptions::new()
    ///     .compression_level(7)
    ///     .into_encoder(output)
    ///     .unwrap();
    /// ```
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn into_encoder<W>(self, writer: W) -> Result<Encoder<'a, W>> {
        Encoder::with_opts(writer, self)
    }
}

pub(crate) fn check_level(level: CompressionLevel) -> Result<()> {
    if level < zstd_safe::min_c_level() || level > zstd_safe::max_c_level() {
        return Err(Error::invalid_argument("compression level out of range"));
    }

    Ok(())
}

/// A reusable, incremental encoder.
///
/// Performs low level in-memory streaming compression, one bounded chunk at a time. Every
/// [`compress`](Self::compress) step reports how many bytes were consumed and written together
/// with a [`Status`] that tells the caller whether to provide more input or more output room.
///
/// The compression level and an optional prefix are pushed into the native state lazily, on the
/// first compression step of a session. A session ends with [`reset`](Self::reset), after which
/// the encoder behaves as if it had just been created.
///
/// # Examples
///
/// ```
/// use flowzstd::{RawEncoder, Status};
///
/// let mut encoder = RawEncoder::new()?;
/// let input = b"Hello, World!";
/// let mut buf = [0u8; 128];
/// let mut in_progress = 0;
/// let mut out_progress = 0;
///
/// loop {
///     let prog = encoder.compress(&input[in_progress..], &mut buf[out_progress..], true)?;
///     in_progress += prog.in_progress();
///     out_progress += prog.out_progress();
///     if prog.status() == Status::Done {
///         break;
///     }
/// }
///
/// assert_eq!(in_progress, input.len());
/// # let restored = flowzstd::decompress_all(&buf[..out_progress])?;
/// # assert_eq!(input, &restored[..]);
/// # Ok::<(), flowzstd::Error>(())
/// ```
pub struct RawEncoder<'a> {
    cctx: CCtx<'a>,
    level: CompressionLevel,
    prefix: Option<&'a [u8]>,
    checksum: bool,
    configured: bool,
}

impl core::fmt::Debug for RawEncoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawEncoder")
            .field("level", &self.level)
            .field("prefix", &self.prefix)
            .field("checksum", &self.checksum)
            .field("configured", &self.configured)
            .finish()
    }
}

impl<'a> RawEncoder<'a> {
    /// Creates a new `RawEncoder` with the given [`EncodeOptions`].
    ///
    /// # Errors
    ///
    /// Fails if the configured compression level is out of range.
    pub fn with_opts(opts: EncodeOptions<'a>) -> Result<Self> {
        check_level(opts.compression_level)?;

        Ok(Self {
            cctx: opts.cctx,
            level: opts.compression_level,
            prefix: opts.prefix,
            checksum: opts.checksum_flag,
            configured: false,
        })
    }

    /// Performs a streaming compression step from `src` to `dst`.
    ///
    /// Set `finish` when `src` holds the final bytes of the current frame; the codec then works
    /// towards the end-of-frame marker. The returned [`CompressionProgress`] carries the number
    /// of bytes consumed and written plus the resulting [`Status`]:
    ///
    /// - [`Status::Done`]: all requested work completed. With `finish` set this means the frame
    ///   epilogue has been entirely written.
    /// - [`Status::DestinationTooSmall`]: `dst` is full while the codec still holds pending
    ///   bytes. Drain `dst` and call again.
    /// - [`Status::NeedMoreData`]: `src` was entirely consumed and the codec can accept more
    ///   input.
    ///
    /// # Errors
    ///
    /// If compression fails or any parameter is invalid.
    pub fn compress(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        finish: bool,
    ) -> Result<CompressionProgress> {
        self.configure()?;

        let mut in_buf = InBuffer::around(src);
        let mut out_buf = OutBuffer::around(dst);
        let directive = if finish {
            ZSTD_EndDirective::ZSTD_e_end
        } else {
            ZSTD_EndDirective::ZSTD_e_continue
        };

        let remaining = self
            .cctx
            .compress_stream2(&mut out_buf, &mut in_buf, directive)?;
        let consumed = in_buf.pos();
        let written = out_buf.pos();

        // The order of these checks is part of the contract: a full destination always wins
        // over a drained source.
        let status = if finish && consumed == src.len() && remaining == 0 {
            Status::Done
        } else if finish && remaining > 0 && written == dst.len() {
            Status::DestinationTooSmall
        } else if !finish && written == dst.len() {
            Status::DestinationTooSmall
        } else if !finish && consumed == src.len() && written < dst.len() {
            Status::NeedMoreData
        } else {
            Status::Done
        };

        Ok(CompressionProgress::new(status, consumed, written))
    }

    /// Drains buffered data into `dst` without ending the current frame.
    ///
    /// Loops internally while the codec reports pending bytes and `dst` has room. Returns
    /// [`Status::Done`] once nothing is left to flush, or [`Status::DestinationTooSmall`] when
    /// `dst` filled up first. Never writes an end-of-frame marker.
    ///
    /// # Errors
    ///
    /// If the codec fails to flush.
    pub fn flush(&mut self, dst: &mut [u8]) -> Result<FlushProgress> {
        self.configure()?;

        let mut in_buf = InBuffer::around(&[]);
        let mut out_buf = OutBuffer::around(dst);

        loop {
            let remaining = self.cctx.compress_stream2(
                &mut out_buf,
                &mut in_buf,
                ZSTD_EndDirective::ZSTD_e_flush,
            )?;

            if remaining == 0 {
                return Ok(FlushProgress::new(Status::Done, out_buf.pos()));
            }

            if out_buf.pos() == out_buf.capacity() {
                return Ok(FlushProgress::new(Status::DestinationTooSmall, out_buf.pos()));
            }
        }
    }

    /// Sets the compression level used by zstd.
    ///
    /// # Errors
    ///
    /// Fails if `level` is out of range, or if the encoder is already configured, i.e. a
    /// compression step has happened since creation or the last [`reset`](Self::reset).
    pub fn set_compression_level(&mut self, level: CompressionLevel) -> Result<()> {
        if self.configured {
            return Err(Error::illegal_state(
                "compression level cannot change during a session",
            ));
        }
        check_level(level)?;
        self.level = level;

        Ok(())
    }

    /// Sets a raw content prefix for the next session.
    ///
    /// Passing an empty slice clears any prior prefix.
    ///
    /// # Errors
    ///
    /// Fails if the encoder is already configured, i.e. a compression step has happened since
    /// creation or the last [`reset`](Self::reset).
    pub fn set_prefix(&mut self, prefix: &'a [u8]) -> Result<()> {
        if self.configured {
            return Err(Error::illegal_state("prefix cannot change during a session"));
        }
        self.prefix = (!prefix.is_empty()).then_some(prefix);

        Ok(())
    }

    /// Resets the compression session.
    ///
    /// Discards any progress of the current frame, releases the prefix and returns the encoder
    /// to the unconfigured state. Allocations are kept for reuse.
    #[allow(clippy::missing_panics_doc)]
    pub fn reset(&mut self) {
        self.cctx
            .reset(ResetDirective::SessionOnly)
            .expect("Resetting session never fails");
        self.prefix = None;
        self.configured = false;
    }

    /// The compression level that applies to the current session.
    pub fn compression_level(&self) -> CompressionLevel {
        self.level
    }

    fn configure(&mut self) -> Result<()> {
        if self.configured {
            return Ok(());
        }

        self.cctx
            .set_parameter(CParameter::CompressionLevel(self.level))?;
        self.cctx
            .set_parameter(CParameter::ChecksumFlag(self.checksum))?;
        if let Some(prefix) = self.prefix {
            self.cctx.ref_prefix(prefix)?;
        }
        self.configured = true;

        Ok(())
    }
}

impl RawEncoder<'_> {
    /// Creates a new `RawEncoder` with default parameters.
    ///
    /// This is equivalent to calling `EncodeOptions::new().into_raw_encoder()`.
    ///
    /// # Errors
    ///
    /// Fails if the raw encoder cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_opts(EncodeOptions::new())
    }
}

/// Compresses `data` into a single frame at the given compression level.
///
/// # Errors
///
/// Fails if `level` is out of range or compression fails.
///
/// # Examples
///
/// ```
/// let compressed = flowzstd::compress_all(b"Hello, World!", 3)?;
/// let restored = flowzstd::decompress_all(&compressed)?;
///
/// assert_eq!(&restored, b"Hello, World!");
/// # Ok::<(), flowzstd::Error>(())
/// ```
pub fn compress_all(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = EncodeOptions::new()
        .compression_level(level)
        .into_raw_encoder()?;
    let mut out = alloc::vec![0; zstd_safe::compress_bound(data.len())];
    let mut in_progress = 0;
    let mut out_progress = 0;

    loop {
        let prog = encoder.compress(&data[in_progress..], &mut out[out_progress..], true)?;
        in_progress += prog.in_progress();
        out_progress += prog.out_progress();

        match prog.status() {
            Status::Done => break,
            // Not reachable with a compress_bound sized buffer.
            Status::DestinationTooSmall | Status::NeedMoreData => {
                let len = out.len();
                out.resize(len * 2, 0);
            }
        }
    }

    out.truncate(out_progress);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn compress_single_step() {
        let mut encoder = RawEncoder::new().unwrap();
        let mut buf = vec![0; 1024];
        let prog = encoder.compress(b"Hello, World!", &mut buf, true).unwrap();

        assert_eq!(prog.status(), Status::Done);
        assert_eq!(prog.in_progress(), 13);
        assert!(prog.out_progress() > 0);
    }

    #[test]
    fn destination_too_small_wins_over_drained_source() {
        let mut encoder = RawEncoder::new().unwrap();
        let input = vec![0xABu8; 1 << 17];
        // A destination this small cannot hold the frame epilogue of the input.
        let mut buf = [0u8; 8];
        let mut consumed = 0;

        loop {
            let prog = encoder.compress(&input[consumed..], &mut buf, true).unwrap();
            consumed += prog.in_progress();
            if consumed == input.len() {
                // Source is drained but the status must keep reporting the full destination
                // until the epilogue fits.
                assert_eq!(prog.status(), Status::DestinationTooSmall);
                break;
            }
        }
    }

    #[test]
    fn need_more_data_when_source_drained() {
        let mut encoder = RawEncoder::new().unwrap();
        let mut buf = vec![0; 1024];
        let prog = encoder.compress(b"tiny", &mut buf, false).unwrap();

        assert_eq!(prog.status(), Status::NeedMoreData);
        assert_eq!(prog.in_progress(), 4);
    }

    #[test]
    fn flush_drains_pending_bytes() {
        let mut encoder = RawEncoder::new().unwrap();
        let mut sink = vec![0; 1024];
        let prog = encoder.compress(b"some data", &mut sink, false).unwrap();
        assert_eq!(prog.status(), Status::NeedMoreData);

        let flushed = encoder.flush(&mut sink).unwrap();
        assert_eq!(flushed.status(), Status::Done);
        assert!(flushed.out_progress() > 0);
    }

    #[test]
    fn flush_reports_full_destination() {
        let mut encoder = RawEncoder::new().unwrap();
        // Poorly compressible input so the pending data cannot fit the sink.
        let input: Vec<u8> = (0..1u64 << 16)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let mut sink = vec![0; 16];
        encoder.compress(&input, &mut [0; 32], false).unwrap();

        let flushed = encoder.flush(&mut sink).unwrap();
        assert_eq!(flushed.status(), Status::DestinationTooSmall);
        assert_eq!(flushed.out_progress(), sink.len());
    }

    #[test]
    fn configuration_locks_on_first_compress() {
        let mut encoder = RawEncoder::new().unwrap();
        assert!(encoder.set_compression_level(7).is_ok());

        encoder.compress(b"data", &mut [0; 128], false).unwrap();
        assert!(encoder.set_compression_level(3).unwrap_err().is_illegal_state());
        assert!(encoder.set_prefix(b"pre").unwrap_err().is_illegal_state());

        encoder.reset();
        assert!(encoder.set_compression_level(3).is_ok());
        assert!(encoder.set_prefix(b"pre").is_ok());
    }

    #[test]
    fn level_out_of_range() {
        let mut encoder = RawEncoder::new().unwrap();
        let max = zstd_safe::max_c_level();

        assert!(
            encoder
                .set_compression_level(max + 1)
                .unwrap_err()
                .is_invalid_argument()
        );
        assert!(
            EncodeOptions::new()
                .compression_level(max + 1)
                .into_raw_encoder()
                .unwrap_err()
                .is_invalid_argument()
        );
    }

    #[test]
    fn empty_prefix_clears() {
        let mut encoder = RawEncoder::new().unwrap();
        encoder.set_prefix(b"shared context").unwrap();
        encoder.set_prefix(b"").unwrap();
        assert!(encoder.prefix.is_none());
    }

    #[test]
    fn quality_levels() {
        assert_eq!(Quality::None.level(), zstd_safe::min_c_level());
        assert_eq!(Quality::Fastest.level(), zstd_safe::min_c_level());
        assert_eq!(Quality::Default.level(), DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(Quality::Maximum.level(), zstd_safe::max_c_level());

        assert_eq!(Quality::try_from(3).unwrap(), Quality::Maximum);
        assert!(Quality::try_from(4).unwrap_err().is_invalid_argument());
        assert!(Quality::try_from(-1).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn level_monotonicity_on_compressible_input() {
        let input: Vec<u8> = (0..(1 << 16) as u32)
            .flat_map(|i| (i % 251).to_le_bytes())
            .collect();

        let smallest = compress_all(&input, zstd_safe::max_c_level()).unwrap();
        let fastest = compress_all(&input, zstd_safe::min_c_level()).unwrap();

        assert!(smallest.len() <= fastest.len());
    }

    #[test]
    fn prefix_improves_ratio() {
        let prefix = b"HEADER-1234567890-ABCDEFG";
        let mut payload = prefix.to_vec();
        for i in 0..200 {
            payload.extend_from_slice(alloc::format!("HEADER-1234-{i}-XYZ-").as_bytes());
        }

        let compress_with = |prefix: Option<&[u8]>| {
            let mut opts = EncodeOptions::new();
            if let Some(p) = prefix {
                opts = opts.prefix(p);
            }
            let mut encoder = opts.into_raw_encoder().unwrap();
            let mut out = vec![0; zstd_safe::compress_bound(payload.len())];
            let mut in_progress = 0;
            let mut out_progress = 0;
            loop {
                let prog = encoder
                    .compress(&payload[in_progress..], &mut out[out_progress..], true)
                    .unwrap();
                in_progress += prog.in_progress();
                out_progress += prog.out_progress();
                if prog.status() == Status::Done {
                    break;
                }
            }
            out_progress
        };

        assert!(compress_with(Some(prefix)) <= compress_with(None));
    }
}
