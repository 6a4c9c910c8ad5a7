use http::StatusCode;
use std::error::Error;
use std::io;
use thiserror::Error;

/// The top level error of one request/response exchange.
///
/// Everything below the session layer only produces these typed values, the session is the single
/// place where they are turned into HTTP error responses (see [`HttpError::kind`]).
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("range not satisfiable: {reason}")]
    RangeNotSatisfiable { reason: String },

    #[error("no virtual host matches {host:?}")]
    UnknownHost { host: String },

    #[error("no content has been served")]
    NotServed,

    #[error("content error: {source}")]
    Content { source: Box<dyn Error + Send + Sync> },
}

impl HttpError {
    pub fn range_not_satisfiable<S: ToString>(str: S) -> Self {
        Self::RangeNotSatisfiable { reason: str.to_string() }
    }

    pub fn content<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Content { source: e.into() }
    }

    /// Classifies this error for the session's failure escalation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RequestError { source } => source.kind(),
            Self::ResponseError { source } => source.kind(),
            Self::RangeNotSatisfiable { .. } => ErrorKind::RangeNotSatisfiable,
            Self::UnknownHost { .. } => ErrorKind::BadRequest,
            Self::NotServed | Self::Content { .. } => ErrorKind::Internal,
        }
    }
}

/// The closed set of failure classes a session distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client framing error, answered with 400.
    BadRequest,
    /// Header or range caps exceeded, answered with 413.
    PayloadTooLarge,
    /// The peer went away mid-message, nobody is left to answer.
    PrematureFinish,
    /// Answered with 416.
    RangeNotSatisfiable,
    /// Socket level failure, including a watchdog disposing the connection.
    Transport,
    /// Anything else, answered with 500 and re-raised.
    Internal,
}

impl ErrorKind {
    /// The status used for the corrective response, `None` when no response can be written.
    pub fn status(self) -> Option<StatusCode> {
        match self {
            Self::BadRequest => Some(StatusCode::BAD_REQUEST),
            Self::PayloadTooLarge => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Self::RangeNotSatisfiable => Some(StatusCode::RANGE_NOT_SATISFIABLE),
            Self::Internal => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::PrematureFinish | Self::Transport => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header line number exceed the limit {max_num}")]
    TooManyHeaderLines { max_num: usize },

    #[error("body size exceed the limit {max_size}")]
    TooLargeBody { max_size: usize },

    #[error("range header too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeRange { current_size: usize, max_size: usize },

    #[error("line exceeds the limit of {max_size} bytes")]
    TooLongLine { max_size: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid start line: {reason}")]
    InvalidStartLine { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(String),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid transfer-encoding header: {reason}")]
    InvalidTransferEncoding { reason: String },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("invalid range: {reason}")]
    InvalidRange { reason: String },

    #[error("stream finished before the message was complete")]
    PrematureFinish,

    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_header_lines(max_num: usize) -> Self {
        Self::TooManyHeaderLines { max_num }
    }

    pub fn too_large_body(max_size: usize) -> Self {
        Self::TooLargeBody { max_size }
    }

    pub fn too_large_range(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeRange { current_size, max_size }
    }

    pub fn too_long_line(max_size: usize) -> Self {
        Self::TooLongLine { max_size }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_start_line<S: ToString>(str: S) -> Self {
        Self::InvalidStartLine { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_transfer_encoding<S: ToString>(str: S) -> Self {
        Self::InvalidTransferEncoding { reason: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn invalid_range<S: ToString>(str: S) -> Self {
        Self::InvalidRange { reason: str.to_string() }
    }

    pub fn illegal_state<S: ToString>(str: S) -> Self {
        Self::IllegalState { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooLargeHeader { .. }
            | Self::TooManyHeaderLines { .. }
            | Self::TooLargeBody { .. }
            | Self::TooLargeRange { .. } => ErrorKind::PayloadTooLarge,
            Self::PrematureFinish => ErrorKind::PrematureFinish,
            Self::IllegalState { .. } => ErrorKind::Internal,
            Self::Io { .. } => ErrorKind::Transport,
            _ => ErrorKind::BadRequest,
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("response header has already been sent")]
    HeaderAlreadySent,

    #[error("response body exceeds the declared content-length {declared}, attempted {attempted}")]
    ExceedContentLength { declared: u64, attempted: u64 },

    #[error("response body is shorter than the declared content-length {declared}, written {written}")]
    InsufficientContent { declared: u64, written: u64 },

    #[error("unsupported transfer-encoding: {value}")]
    UnsupportedTransferEncoding { value: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn illegal_state<S: ToString>(str: S) -> Self {
        Self::IllegalState { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Transport,
            _ => ErrorKind::Internal,
        }
    }
}
