//! Error types shared by every codec.

use std::fmt;
use std::io;

/// The reason a document was rejected or an encode failed.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Input ended before the value was complete.
    #[error("input truncated")]
    Truncated,

    /// A byte that no grammar rule allows at this position.
    #[error("unexpected byte 0x{0:02x}")]
    UnexpectedByte(u8),

    /// An XML element that does not belong where it appeared.
    #[error("unexpected element <{0}>")]
    UnexpectedElement(String),

    /// A container terminator that does not match the open container.
    #[error("unexpected container terminator")]
    UnexpectedTerminator,

    /// String data that is not valid UTF-8.
    #[error("invalid UTF-8 in string data")]
    InvalidUtf8,

    /// Malformed base64 payload.
    #[error("invalid base64 data")]
    InvalidBase64,

    /// A UUID literal that is not 8-4-4-4-12 hyphenated hex.
    #[error("invalid UUID literal")]
    InvalidUuid,

    /// A date literal outside `YYYY-MM-DDTHH:MM:SS[.ffffff]Z`.
    #[error("invalid date literal")]
    InvalidDate,

    /// A boolean spelling the format does not define.
    #[error("invalid boolean literal")]
    InvalidBoolean,

    /// An integer or real literal that does not parse in range.
    #[error("invalid number literal")]
    InvalidNumber,

    /// A declared size that cannot be represented.
    #[error("declared length too large")]
    LengthTooLarge,

    /// A sized literal whose closing delimiter is not at the declared length.
    #[error("sized literal does not end at its declared length")]
    SizedLengthMismatch,

    /// A construct the decoder refuses outright, e.g. a DOCTYPE.
    #[error("forbidden construct: {0}")]
    ForbiddenConstruct(&'static str),

    /// A caller-supplied depth or byte budget was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(&'static str),

    /// The dispatcher could not identify any wire form.
    #[error("unrecognized document format")]
    UnknownFormat,

    /// The output sink reported an I/O error.
    #[error("sink error: {0}")]
    SinkError(#[from] io::Error),
}

/// A decode or encode failure, with the byte offset where it was detected
/// and, for XML input, the path of open elements.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    offset: usize,
    path: Option<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            path: None,
        }
    }

    pub(crate) fn with_path(mut self, path: String) -> Self {
        self.path = Some(path);
        self
    }

    /// The failure cause.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Byte offset into the input (or output written so far) at which the
    /// failure was detected.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Slash-separated path of open XML elements, when the XML decoder
    /// produced the error.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.kind, self.offset)?;
        if let Some(path) = &self.path {
            write!(f, " (in {path})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::SinkError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::new(ErrorKind::SinkError(e), 0)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
