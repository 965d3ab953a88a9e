use nom::error::{ErrorKind, ParseError};
use nom::InputLength;
use thiserror::Error;

pub type Result<T, E = DnsError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("message too short: {0} bytes, header needs 12")]
    TooShort(usize),

    #[error("malformed message: {0}")]
    Format(String),

    #[error("compression pointer at offset {at} targets {offset}, which is not an earlier offset")]
    BadPointer { offset: usize, at: usize },

    #[error("label of {0} bytes exceeds 63")]
    LabelTooLong(usize),

    #[error("invalid query type {0}")]
    InvalidType(u16),

    #[error("zone file line {line}: {message}")]
    ZoneFile { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("request timed out")]
    Timeout,
}

impl DnsError {
    /// Per-query errors are logged and dropped; everything else ends the loop.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            DnsError::TooShort(_)
                | DnsError::Format(_)
                | DnsError::BadPointer { .. }
                | DnsError::LabelTooLong(_)
                | DnsError::InvalidType(_)
        )
    }
}

/// Error type threaded through the nom parsers so that name decoding can
/// report pointer and label problems instead of a bare `ErrorKind`.
#[derive(Debug)]
pub struct WireError(pub DnsError);

impl<I: InputLength> ParseError<I> for WireError {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        WireError(DnsError::Format(format!(
            "{kind:?} with {} bytes left",
            input.input_len()
        )))
    }

    fn append(_input: I, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl From<nom::Err<WireError>> for DnsError {
    fn from(err: nom::Err<WireError>) -> Self {
        match err {
            nom::Err::Incomplete(_) => DnsError::Format("unexpected end of message".into()),
            nom::Err::Error(WireError(e)) | nom::Err::Failure(WireError(e)) => e,
        }
    }
}
