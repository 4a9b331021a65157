//! Inspection and per-frame decoding of concatenated Zstandard streams.
//!
//! A Zstandard byte sequence is a series of independent members: regular frames carrying
//! compressed content and skippable members wrapping opaque user payloads. [`Frames`] walks the
//! members of an in-memory blob, [`FrameScanner`] does the same over an arbitrary reader, and
//! [`FrameDecoder`] additionally decompresses every frame it passes.

use core::mem::MaybeUninit;

use zstd_safe::{ErrorCode, zstd_sys};

use crate::error::{Error, Result};

#[cfg(feature = "std")]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::io::Read;

#[cfg(feature = "std")]
use crate::DEFAULT_SCRATCH_SIZE;
#[cfg(feature = "std")]
use crate::decode::{DecodeOptions, RawDecoder};

// ZSTD_CONTENTSIZE_UNKNOWN
const CONTENT_SIZE_UNKNOWN: u64 = u64::MAX;

/// The kind of a Zstandard stream member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A regular frame carrying compressed content.
    Standard,
    /// A skippable member (magic `0x184D2A5?`) wrapping an opaque user payload.
    Skippable,
}

impl core::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Standard => f.write_str("frame"),
            Self::Skippable => f.write_str("skippable"),
        }
    }
}

/// Metadata of a single member of a Zstandard stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    offset: u64,
    compressed_size: u64,
    content_size: Option<u64>,
    window_size: Option<u64>,
    dict_id: Option<u32>,
    checksum: bool,
    kind: FrameKind,
}

impl FrameInfo {
    fn from_parts(offset: u64, compressed_size: u64, header: ParsedHeader) -> Self {
        Self {
            offset,
            compressed_size,
            content_size: header.content_size,
            window_size: header.window_size,
            dict_id: header.dict_id,
            checksum: header.checksum,
            kind: header.kind,
        }
    }

    /// The offset of this member within the stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The total compressed size of this member, headers included.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// The decompressed content size, if the frame header declares it. For skippable members
    /// this is the size of the wrapped payload.
    pub fn content_size(&self) -> Option<u64> {
        self.content_size
    }

    /// The window size required to decompress this frame. `None` for skippable members.
    pub fn window_size(&self) -> Option<u64> {
        self.window_size
    }

    /// The dictionary id the frame was compressed with, if any.
    pub fn dict_id(&self) -> Option<u32> {
        self.dict_id
    }

    /// Whether the frame carries a trailing content checksum.
    pub fn has_checksum(&self) -> bool {
        self.checksum
    }

    /// The kind of this member.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }
}

struct ParsedHeader {
    content_size: Option<u64>,
    window_size: Option<u64>,
    dict_id: Option<u32>,
    checksum: bool,
    kind: FrameKind,
}

// ZSTD_findFrameCompressedSize reports a window that is too short to hold the whole frame
// with this code.
#[cfg(feature = "std")]
fn input_too_small(code: ErrorCode) -> bool {
    code == 0usize.wrapping_sub(zstd_sys::ZSTD_ErrorCode::ZSTD_error_srcSize_wrong as usize)
}

/// The total size of the member starting at `src`, headers and epilogue included.
///
/// The whole member must be present in `src`.
fn find_frame_compressed_size(src: &[u8]) -> core::result::Result<usize, ErrorCode> {
    // SAFETY: the codec only reads, at most `src.len()` bytes.
    let code = unsafe { zstd_sys::ZSTD_findFrameCompressedSize(src.as_ptr().cast(), src.len()) };
    if unsafe { zstd_sys::ZSTD_isError(code) } != 0 {
        return Err(code);
    }

    Ok(code)
}

/// Parses the header of the member starting at `src`.
///
/// Returns `Ok(None)` when `src` holds too few bytes to decide.
fn parse_frame_header(src: &[u8]) -> Result<Option<ParsedHeader>> {
    let mut header = MaybeUninit::<zstd_sys::ZSTD_FrameHeader>::zeroed();
    // SAFETY: the codec reads at most `src.len()` bytes and writes the header struct, which
    // is plain data and fully initialized on a zero return.
    let code = unsafe {
        zstd_sys::ZSTD_getFrameHeader(header.as_mut_ptr(), src.as_ptr().cast(), src.len())
    };
    if unsafe { zstd_sys::ZSTD_isError(code) } != 0 {
        return Err(Error::invalid_data(code));
    }
    if code > 0 {
        return Ok(None);
    }

    // SAFETY: see above.
    let header = unsafe { header.assume_init() };
    let parsed = if header.frameType == zstd_sys::ZSTD_FrameType_e::ZSTD_skippableFrame {
        ParsedHeader {
            content_size: Some(header.frameContentSize),
            window_size: None,
            dict_id: None,
            checksum: false,
            kind: FrameKind::Skippable,
        }
    } else {
        ParsedHeader {
            content_size: (header.frameContentSize != CONTENT_SIZE_UNKNOWN)
                .then_some(header.frameContentSize),
            window_size: Some(header.windowSize),
            dict_id: (header.dictID != 0).then_some(header.dictID),
            checksum: header.checksumFlag != 0,
            kind: FrameKind::Standard,
        }
    };

    Ok(Some(parsed))
}

fn next_frame_info(window: &[u8], offset: u64) -> Result<(FrameInfo, usize)> {
    let size = find_frame_compressed_size(window).map_err(Error::invalid_data)?;
    let header = parse_frame_header(window)?.ok_or_else(Error::truncated_frame)?;

    Ok((FrameInfo::from_parts(offset, size as u64, header), size))
}

/// An iterator over the members of an in-memory Zstandard stream.
///
/// Yields one [`FrameInfo`] per member, in stream order. The sum of the compressed sizes of
/// all yielded members equals the length of a well-formed input.
///
/// # Examples
///
/// ```
/// use flowzstd::frame::Frames;
///
/// let a = flowzstd::compress_all(b"one", 3)?;
/// let b = flowzstd::compress_all(b"two", 3)?;
/// let blob: Vec<u8> = [a, b].concat();
///
/// let frames: Vec<_> = Frames::new(&blob).collect::<flowzstd::Result<_>>()?;
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[1].offset(), frames[0].compressed_size());
/// # Ok::<(), flowzstd::Error>(())
/// ```
pub struct Frames<'b> {
    src: &'b [u8],
    pos: usize,
    failed: bool,
}

impl<'b> Frames<'b> {
    /// Creates an iterator over the members of `src`.
    pub fn new(src: &'b [u8]) -> Self {
        Self {
            src,
            pos: 0,
            failed: false,
        }
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<FrameInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.src.len() {
            return None;
        }

        match next_frame_info(&self.src[self.pos..], self.pos as u64) {
            Ok((info, advance)) => {
                self.pos += advance;
                Some(Ok(info))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// An iterator over the members of a Zstandard stream read from a reader.
///
/// Unlike [`Frames`] this does not require the stream in memory; a growing window buffers just
/// enough input to size each member.
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub struct FrameScanner<R> {
    reader: R,
    window: Vec<u8>,
    start: usize,
    len: usize,
    offset: u64,
    depleted: bool,
    failed: bool,
}

#[cfg(feature = "std")]
impl<R> FrameScanner<R> {
    /// Creates a scanner over the members of `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            window: alloc::vec![0; DEFAULT_SCRATCH_SIZE],
            start: 0,
            len: 0,
            offset: 0,
            depleted: false,
            failed: false,
        }
    }
}

#[cfg(feature = "std")]
impl<R: Read> FrameScanner<R> {
    fn refill(&mut self) -> Result<()> {
        if self.start > 0 {
            self.window.copy_within(self.start..self.len, 0);
            self.len -= self.start;
            self.start = 0;
        }
        if self.len == self.window.len() {
            let len = self.window.len();
            self.window.resize(len * 2, 0);
        }

        let n = self.reader.read(&mut self.window[self.len..])?;
        self.len += n;
        self.depleted = n == 0;

        Ok(())
    }

    fn next_info(&mut self) -> Result<Option<FrameInfo>> {
        loop {
            if self.start < self.len {
                let window = &self.window[self.start..self.len];
                match find_frame_compressed_size(window) {
                    Ok(size) => {
                        let header =
                            parse_frame_header(window)?.ok_or_else(Error::truncated_frame)?;
                        let info = FrameInfo::from_parts(self.offset, size as u64, header);
                        self.start += size;
                        self.offset += size as u64;
                        return Ok(Some(info));
                    }
                    // The window is too short to hold the whole member; refill and retry.
                    Err(code) if input_too_small(code) => {}
                    Err(code) => return Err(Error::invalid_data(code)),
                }
            }

            if self.depleted {
                if self.start == self.len {
                    return Ok(None);
                }
                return Err(Error::truncated_frame());
            }

            self.refill()?;
        }
    }
}

#[cfg(feature = "std")]
impl<R: Read> Iterator for FrameScanner<R> {
    type Item = Result<FrameInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.next_info() {
            Ok(Some(info)) => Some(Ok(info)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// A fully decoded member of a Zstandard stream.
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
#[derive(Debug)]
pub struct DecodedFrame {
    info: FrameInfo,
    data: Vec<u8>,
}

#[cfg(feature = "std")]
impl DecodedFrame {
    /// The metadata of this frame.
    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// The decompressed content of this frame.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the frame and returns its decompressed content.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// An iterator that decodes a Zstandard stream one frame at a time.
///
/// Every yielded [`DecodedFrame`] pairs the decompressed content of one member with the
/// metadata from its header. The output buffer for a frame grows by doubling; configure
/// [`max_frame_size`](DecodeOptions::max_frame_size) to bound it when the input is untrusted.
///
/// Empty members whose entire body is the 8 byte header are skipped.
///
/// # Examples
///
/// ```
/// use flowzstd::FrameDecoder;
///
/// let a = flowzstd::compress_all(b"one", 3)?;
/// let b = flowzstd::compress_all(b"two", 3)?;
/// let blob: Vec<u8> = [a, b].concat();
///
/// let frames: Vec<_> = FrameDecoder::new(&blob[..])?.collect::<flowzstd::Result<_>>()?;
/// assert_eq!(frames[0].data(), b"one");
/// assert_eq!(frames[1].data(), b"two");
/// # Ok::<(), flowzstd::Error>(())
/// ```
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub struct FrameDecoder<'a, R> {
    raw: RawDecoder<'a>,
    reader: R,
    in_buf: Vec<u8>,
    in_pos: usize,
    in_limit: usize,
    depleted: bool,
    max_frame_size: Option<usize>,
    offset: u64,
    finished: bool,
}

#[cfg(feature = "std")]
impl<'a, R> FrameDecoder<'a, R> {
    /// Creates a new `FrameDecoder` with the given [`DecodeOptions`].
    ///
    /// # Errors
    ///
    /// Fails if the frame decoder cannot be created.
    pub fn with_opts(reader: R, opts: DecodeOptions<'a>) -> Result<Self> {
        let scratch_capacity = opts.scratch_capacity;
        let max_frame_size = opts.max_frame_size;

        Ok(Self {
            raw: opts.into_raw_decoder()?,
            reader,
            in_buf: alloc::vec![0; scratch_capacity],
            in_pos: 0,
            in_limit: 0,
            depleted: false,
            max_frame_size,
            offset: 0,
            finished: false,
        })
    }
}

#[cfg(feature = "std")]
impl<R> FrameDecoder<'_, R> {
    /// Creates a new `FrameDecoder` with default parameters.
    ///
    /// This is equivalent to calling `DecodeOptions::new().into_frame_decoder(reader)`.
    ///
    /// # Errors
    ///
    /// Fails if the frame decoder cannot be created.
    pub fn new(reader: R) -> Result<Self> {
        Self::with_opts(reader, DecodeOptions::new())
    }
}

#[cfg(feature = "std")]
fn grow_output(len: usize, limit: Option<usize>) -> Result<usize> {
    const INITIAL_FRAME_CAPACITY: usize = 4096;

    let target = if len == 0 {
        INITIAL_FRAME_CAPACITY
    } else {
        len * 2
    };

    match limit {
        Some(limit) if len >= limit => Err(Error::frame_too_large()),
        Some(limit) => Ok(target.min(limit)),
        None => Ok(target),
    }
}

#[cfg(feature = "std")]
impl<R: Read> FrameDecoder<'_, R> {
    // Appends more input to the window without consuming anything.
    fn fill(&mut self) -> Result<()> {
        if self.in_pos > 0 {
            self.in_buf.copy_within(self.in_pos..self.in_limit, 0);
            self.in_limit -= self.in_pos;
            self.in_pos = 0;
        }
        if self.in_limit == self.in_buf.len() {
            let len = self.in_buf.len();
            self.in_buf.resize(len * 2, 0);
        }

        let n = self.reader.read(&mut self.in_buf[self.in_limit..])?;
        self.in_limit += n;
        self.depleted = n == 0;

        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        'frame: loop {
            let frame_offset = self.offset;
            let mut header = None;
            let mut out: Vec<u8> = Vec::new();
            let mut out_pos = 0;
            let mut consumed = 0u64;

            loop {
                if self.in_pos == self.in_limit {
                    if self.depleted {
                        if consumed == 0 {
                            return Ok(None);
                        }
                        return Err(Error::truncated_frame());
                    }
                    self.fill()?;
                    continue;
                }

                if header.is_none() {
                    match parse_frame_header(&self.in_buf[self.in_pos..self.in_limit])? {
                        Some(parsed) => header = Some(parsed),
                        None => {
                            if self.depleted {
                                return Err(Error::truncated_frame());
                            }
                            self.fill()?;
                            continue;
                        }
                    }
                }

                if out_pos == out.len() {
                    let grown = grow_output(out.len(), self.max_frame_size)?;
                    out.resize(grown, 0);
                }

                let prog = self
                    .raw
                    .decompress(&self.in_buf[self.in_pos..self.in_limit], &mut out[out_pos..])?;
                self.in_pos += prog.in_progress();
                self.offset += prog.in_progress() as u64;
                consumed += prog.in_progress() as u64;
                out_pos += prog.out_progress();

                if prog.frame_finished() {
                    self.raw.reset();

                    if out_pos == 0 && consumed <= 8 {
                        // An empty member, nothing worth yielding.
                        continue 'frame;
                    }

                    let header = header.expect("frame header parsed before decompression");
                    out.truncate(out_pos);
                    return Ok(Some(DecodedFrame {
                        info: FrameInfo::from_parts(frame_offset, consumed, header),
                        data: out,
                    }));
                }
            }
        }
    }
}

#[cfg(feature = "std")]
impl<R: Read> Iterator for FrameDecoder<'_, R> {
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
