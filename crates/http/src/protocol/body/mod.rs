//! Request body framing.
//!
//! [`BodyReader::from_header`] decides, once per request, how the body is delimited:
//!
//! 1. `Transfer-Encoding` present: the last coding must be `chunked`, any `Content-Length` is
//!    discarded and the body is read with [`ChunkedBody`].
//! 2. `Content-Length` present: every value must be the same non-negative integer, the body is
//!    read with [`FixedLengthBody`].
//! 3. Otherwise the body is empty.
//!
//! The readers never own the stream, every read borrows the connection's [`RollbackStream`] so
//! bytes read past the body stay available for the next request.

mod chunked;
mod fixed;
mod trailer;

pub use chunked::ChunkedBody;
pub use fixed::FixedLengthBody;
pub use trailer::TrailerReader;

use crate::config::HttpSettings;
use crate::io::RollbackStream;
use crate::protocol::{HeaderEntries, ParseError, RequestHeader};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use tokio::io::AsyncRead;
use tracing::trace;

#[derive(Debug)]
pub enum BodyReader {
    Empty,
    Fixed(FixedLengthBody),
    Chunked(ChunkedBody),
}

impl BodyReader {
    pub fn from_header(header: &mut RequestHeader, settings: &HttpSettings) -> Result<Self, ParseError> {
        let entries = header.entries_mut();

        if entries.contains_key(TRANSFER_ENCODING.as_str()) {
            let last_coding = entries
                .get_all(TRANSFER_ENCODING.as_str())
                .iter()
                .flat_map(|value| value.split(','))
                .map(str::trim)
                .filter(|coding| !coding.is_empty())
                .last();

            match last_coding {
                Some(coding) if coding.eq_ignore_ascii_case("chunked") => {}
                other => {
                    return Err(ParseError::invalid_transfer_encoding(format!(
                        "last transfer coding must be chunked, found {other:?}"
                    )));
                }
            }

            if entries.remove(CONTENT_LENGTH.as_str()).is_some() {
                trace!("discard content-length of chunked request");
            }
            return Ok(BodyReader::Chunked(ChunkedBody::new(settings.max_header_lines, settings.max_header_bytes)));
        }

        match parse_content_length(entries)? {
            Some(0) | None => Ok(BodyReader::Empty),
            Some(length) => Ok(BodyReader::Fixed(FixedLengthBody::new(length))),
        }
    }

    /// Reads body bytes into `buf`, `Ok(0)` once the body is finished.
    pub async fn read<R>(&mut self, stream: &mut RollbackStream<R>, buf: &mut [u8]) -> Result<usize, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        match self {
            BodyReader::Empty => Ok(0),
            BodyReader::Fixed(body) => body.read(stream, buf).await,
            BodyReader::Chunked(body) => body.read(stream, buf).await,
        }
    }

    /// Whether the request declared no body at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, BodyReader::Empty)
    }

    pub fn is_finished(&self) -> bool {
        match self {
            BodyReader::Empty => true,
            BodyReader::Fixed(body) => body.is_finished(),
            BodyReader::Chunked(body) => body.is_finished(),
        }
    }

    /// Trailer entries of a finished chunked body, handed out once.
    pub fn take_trailers(&mut self) -> Option<HeaderEntries> {
        match self {
            BodyReader::Chunked(body) => body.take_trailers(),
            _ => None,
        }
    }
}

fn parse_content_length(entries: &HeaderEntries) -> Result<Option<u64>, ParseError> {
    let mut length = None;
    for value in entries.get_all(CONTENT_LENGTH.as_str()).iter().flat_map(|value| value.split(',')) {
        let value = value.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::invalid_content_length(format!("{value:?} is not a length")));
        }

        let parsed = value.parse::<u64>().map_err(ParseError::invalid_content_length)?;
        match length {
            Some(previous) if previous != parsed => {
                return Err(ParseError::invalid_content_length(format!("conflicting lengths {previous} and {parsed}")));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}
