use core::fmt;
use std::io;

use crate::marker::Marker;

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// An error that occurred while decoding a JPEG stream.
///
/// All errors are terminal: once one is returned, the decode it belongs to cannot be resumed.
pub struct Error {
    repr: Repr,
}

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input ended before the stream was complete.
    StreamExhausted,
    /// The underlying reader failed.
    Io,
    /// An ordinary byte was found where a marker was required.
    UnexpectedByte,
    /// A marker was found where an ordinary byte was required.
    UnexpectedMarker,
    /// A marker segment is internally inconsistent.
    MalformedSegment,
    /// The stream uses a coding process this decoder does not implement.
    UnsupportedFeature,
    /// The entropy-coded data is corrupt: no Huffman code of any length 1-16 matched the input
    /// bits, or a decoded symbol is out of range.
    HuffmanDecodeFailure,
    /// An `RSTn` marker appeared out of sequence.
    RestartSequence,
    /// Frame or scan headers reference components or tables that don't exist.
    InvalidHeader,
    /// The image exceeds a limit configured in [`DecoderOptions`](crate::DecoderOptions).
    LimitExceeded,
}

pub(crate) enum Repr {
    StreamExhausted {
        offset: u64,
    },
    Io(io::Error),
    UnexpectedByte {
        byte: u8,
        offset: u64,
    },
    UnexpectedMarker {
        marker: Marker,
        offset: u64,
    },
    MalformedSegment {
        marker: Marker,
        offset: u64,
        reason: String,
    },
    UnsupportedFeature(String),
    HuffmanDecodeFailure {
        offset: u64,
    },
    InvalidSymbol {
        offset: u64,
        reason: &'static str,
    },
    RestartSequence {
        expected: u8,
        found: Marker,
        offset: u64,
    },
    InvalidHeader(String),
    LimitExceeded(String),
}

impl Error {
    pub(crate) fn from(repr: Repr) -> Self {
        Self { repr }
    }

    pub(crate) fn exhausted(offset: u64) -> Self {
        Self::from(Repr::StreamExhausted { offset })
    }

    pub(crate) fn malformed(marker: Marker, offset: u64, reason: impl Into<String>) -> Self {
        Self::from(Repr::MalformedSegment {
            marker,
            offset,
            reason: reason.into(),
        })
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::from(Repr::UnsupportedFeature(what.into()))
    }

    pub(crate) fn header(what: impl Into<String>) -> Self {
        Self::from(Repr::InvalidHeader(what.into()))
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            Repr::StreamExhausted { .. } => ErrorKind::StreamExhausted,
            Repr::Io(_) => ErrorKind::Io,
            Repr::UnexpectedByte { .. } => ErrorKind::UnexpectedByte,
            Repr::UnexpectedMarker { .. } => ErrorKind::UnexpectedMarker,
            Repr::MalformedSegment { .. } => ErrorKind::MalformedSegment,
            Repr::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            Repr::HuffmanDecodeFailure { .. } | Repr::InvalidSymbol { .. } => {
                ErrorKind::HuffmanDecodeFailure
            }
            Repr::RestartSequence { .. } => ErrorKind::RestartSequence,
            Repr::InvalidHeader(_) => ErrorKind::InvalidHeader,
            Repr::LimitExceeded(_) => ErrorKind::LimitExceeded,
        }
    }

    /// Returns the byte offset in the input at which the error was detected, if known.
    pub fn offset(&self) -> Option<u64> {
        match self.repr {
            Repr::StreamExhausted { offset }
            | Repr::UnexpectedByte { offset, .. }
            | Repr::UnexpectedMarker { offset, .. }
            | Repr::MalformedSegment { offset, .. }
            | Repr::HuffmanDecodeFailure { offset }
            | Repr::InvalidSymbol { offset, .. }
            | Repr::RestartSequence { offset, .. } => Some(offset),
            Repr::Io(_)
            | Repr::UnsupportedFeature(_)
            | Repr::InvalidHeader(_)
            | Repr::LimitExceeded(_) => None,
        }
    }

    /// Returns the marker involved in the error, if there is one.
    pub fn marker(&self) -> Option<Marker> {
        match self.repr {
            Repr::UnexpectedMarker { marker, .. } | Repr::MalformedSegment { marker, .. } => {
                Some(marker)
            }
            Repr::RestartSequence { found, .. } => Some(found),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::from(Repr::Io(value))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Io(e) => fmt::Debug::fmt(e, f),
            _ => fmt::Display::fmt(self, f),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::StreamExhausted { offset } => write!(
                f,
                "reached end of data while decoding JPEG stream (at offset {offset})"
            ),
            Repr::Io(e) => write!(f, "I/O error: {e}"),
            Repr::UnexpectedByte { byte, offset } => write!(
                f,
                "expected a marker at offset {offset}, found byte {byte:02x}"
            ),
            Repr::UnexpectedMarker { marker, offset } => {
                write!(f, "unexpected marker {marker:?} at offset {offset}")
            }
            Repr::MalformedSegment {
                marker,
                offset,
                reason,
            } => write!(f, "malformed {marker:?} segment at offset {offset}: {reason}"),
            Repr::UnsupportedFeature(what) => write!(f, "unsupported JPEG feature: {what}"),
            Repr::HuffmanDecodeFailure { offset } => {
                write!(f, "no valid huffman code found near offset {offset}")
            }
            Repr::InvalidSymbol { offset, reason } => {
                write!(f, "invalid entropy-coded data near offset {offset}: {reason}")
            }
            Repr::RestartSequence {
                expected,
                found,
                offset,
            } => write!(
                f,
                "expected RST{expected} at offset {offset}, found {found:?}"
            ),
            Repr::InvalidHeader(s) => s.fmt(f),
            Repr::LimitExceeded(s) => write!(f, "limit exceeded: {s}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.repr {
            Repr::Io(e) => Some(e),
            _ => None,
        }
    }
}
