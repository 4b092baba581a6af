use serde::Serialize;
use std::fmt;

/// Machine-readable failure category of a decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidSignatureFormat,
    TransactionNotFound,
    /// No instructions present, or the matched protocol's instruction is missing.
    InvalidInstruction,
    UnknownAmm,
    InvalidTokenAccount,
    ParseError,
    RateLimited,
    /// Non-throttling transport failure, surfaced verbatim after retries.
    Transport,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSignatureFormat => "INVALID_SIGNATURE",
            Self::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            Self::InvalidInstruction => "INVALID_INSTRUCTION",
            Self::UnknownAmm => "UNKNOWN_AMM",
            Self::InvalidTokenAccount => "INVALID_TOKEN_ACCOUNT",
            Self::ParseError => "PARSE_ERROR",
            Self::RateLimited => "RATE_LIMIT",
            Self::Transport => "TRANSPORT_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct DecodeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DecodeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Failure of a Layout Codec read.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("buffer too short: need {needed} bytes at offset {offset}, have {len}")]
    BufferTooShort {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("value {value} at offset {offset} does not fit the field")]
    OutOfRange { offset: usize, value: u64 },
}

impl From<LayoutError> for DecodeError {
    fn from(e: LayoutError) -> Self {
        Self::new(ErrorKind::ParseError, e.to_string())
    }
}

/// Failure reported by a transport or metadata source.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<TransportError> for DecodeError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::RateLimited(msg) => Self::new(ErrorKind::RateLimited, msg),
            TransportError::Other(msg) => Self::new(ErrorKind::Transport, msg),
        }
    }
}
