use alloc::boxed::Box;
use zstd_safe::{ErrorCode, get_error_name};

/// A `Result` alias where the `Err` case is `flowzstd::Error`.
pub type Result<T> = core::result::Result<T, Error>;

/// The errors that may occur when working with this crate.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
}

impl Error {
    /// A custom error.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn core::error::Error + Send + Sync>>,
    {
        Self {
            kind: Kind::Other(err.into()),
        }
    }

    /// Returns true if the error cannot be categorized into any other kind.
    pub fn is_other(&self) -> bool {
        matches!(self.kind, Kind::Other(_))
    }

    pub(crate) fn invalid_argument(msg: &'static str) -> Self {
        Self {
            kind: Kind::InvalidArgument(msg),
        }
    }

    /// Returns true if the error origins from an invalid argument.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.kind, Kind::InvalidArgument(_))
    }

    pub(crate) fn illegal_state(msg: &'static str) -> Self {
        Self {
            kind: Kind::IllegalState(msg),
        }
    }

    /// Returns true if the error origins from an operation that is not valid in the current
    /// state, e.g. reconfiguring a context mid-session or entering a busy stream adapter.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self.kind, Kind::IllegalState(_))
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            kind: Kind::Cancelled,
        }
    }

    /// Returns true if the error origins from an observed cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, Kind::Cancelled)
    }

    pub(crate) fn frame_too_large() -> Self {
        Self {
            kind: Kind::FrameTooLarge,
        }
    }

    /// Returns true if a decoded frame exceeded the configured size limit.
    pub fn is_frame_too_large(&self) -> bool {
        matches!(self.kind, Kind::FrameTooLarge)
    }

    pub(crate) fn truncated_frame() -> Self {
        Self {
            kind: Kind::TruncatedFrame,
        }
    }

    /// Returns true if the compressed data ended in the middle of a frame.
    pub fn is_truncated_frame(&self) -> bool {
        matches!(self.kind, Kind::TruncatedFrame)
    }

    pub(crate) fn invalid_data(code: ErrorCode) -> Self {
        Self {
            kind: Kind::InvalidData(code),
        }
    }

    /// Returns true if the decoder rejected the compressed data.
    pub fn is_invalid_data(&self) -> bool {
        matches!(self.kind, Kind::InvalidData(_))
    }

    /// Returns true if the error origins from an IO error.
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn is_io(&self) -> bool {
        matches!(self.kind, Kind::IO(_))
    }

    /// Returns true if the error origins from the zstd library.
    pub fn is_zstd(&self) -> bool {
        matches!(self.kind, Kind::Zstd(_))
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            Kind::Other(err) => write!(f, "{err}"),
            Kind::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Kind::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            Kind::Cancelled => f.write_str("operation cancelled"),
            Kind::FrameTooLarge => f.write_str("decoded frame exceeds the configured size limit"),
            Kind::TruncatedFrame => f.write_str("compressed data ends in the middle of a frame"),
            Kind::InvalidData(code) => write!(f, "corrupted data: {}", get_error_name(*code)),
            #[cfg(feature = "std")]
            Kind::IO(err) => write!(f, "io error: {err}"),
            Kind::Zstd(code) => f.write_str(get_error_name(*code)),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self {
            kind: Kind::IO(value),
        }
    }
}

impl From<ErrorCode> for Error {
    fn from(value: ErrorCode) -> Self {
        Self {
            kind: Kind::Zstd(value),
        }
    }
}

enum Kind {
    Other(Box<dyn core::error::Error + Send + Sync>),
    /// An argument is outside its accepted range.
    InvalidArgument(&'static str),
    /// The operation is not valid in the current state.
    IllegalState(&'static str),
    /// Cooperative cancellation was observed.
    Cancelled,
    /// A decoded frame exceeded the configured size limit.
    FrameTooLarge,
    /// The compressed data ended in the middle of a frame.
    TruncatedFrame,
    /// The decoder rejected the compressed data.
    InvalidData(ErrorCode),
    /// IO error.
    #[cfg(feature = "std")]
    IO(std::io::Error),
    /// An error from the zstd library.
    Zstd(ErrorCode),
}

impl core::fmt::Debug for Kind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Other(arg0) => f.debug_tuple("Other").field(arg0).finish(),
            Self::InvalidArgument(msg) => f.debug_tuple("InvalidArgument").field(msg).finish(),
            Self::IllegalState(msg) => f.debug_tuple("IllegalState").field(msg).finish(),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::FrameTooLarge => write!(f, "FrameTooLarge"),
            Self::TruncatedFrame => write!(f, "TruncatedFrame"),
            Self::InvalidData(c) => write!(f, "{}; code {}", get_error_name(*c), c),
            #[cfg(feature = "std")]
            Self::IO(arg0) => f.debug_tuple("IO").field(arg0).finish(),
            Self::Zstd(c) => write!(f, "{}; code {}", get_error_name(*c), c),
        }
    }
}
