use crate::codec::FromHeaderParts;
use crate::io::{RollbackStream, TransportReader};
use crate::protocol::body::BodyReader;
use crate::protocol::{HeaderEntries, HttpError, ParseError};
use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, EXPECT};
use http::{Method, Uri, Version};
use std::fmt;

/// The parsed header of a request.
///
/// Method, target and version are derived from the start line when the header is built and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    start_line: String,
    method: Method,
    uri: Uri,
    version: Version,
    entries: HeaderEntries,
}

impl RequestHeader {
    pub fn start_line(&self) -> &str {
        &self.start_line
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn entries(&self) -> &HeaderEntries {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut HeaderEntries {
        &mut self.entries
    }

    /// Whether the client allows the connection to stay open after this exchange.
    pub fn wants_keep_alive(&self) -> bool {
        if self.entries.contains_token(CONNECTION.as_str(), "close") {
            return false;
        }
        match self.version {
            Version::HTTP_11 => true,
            Version::HTTP_10 => self.entries.contains_token(CONNECTION.as_str(), "keep-alive"),
            _ => false,
        }
    }

    /// Whether the client waits for `100 Continue` before sending its body.
    pub fn expects_continue(&self) -> bool {
        self.version == Version::HTTP_11
            && self.entries.get(EXPECT.as_str()).is_some_and(|value| value.eq_ignore_ascii_case("100-continue"))
    }
}

impl FromHeaderParts for RequestHeader {
    fn from_parts(start_line: String, entries: HeaderEntries) -> Result<Self, ParseError> {
        let mut parts = start_line.split_whitespace();
        let (Some(method), Some(target), Some(version), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::invalid_start_line(format!("expect `METHOD TARGET VERSION`, got {start_line:?}")));
        };

        let method = Method::from_bytes(method.as_bytes()).map_err(ParseError::invalid_start_line)?;
        let uri = target.parse::<Uri>().map_err(ParseError::invalid_start_line)?;
        let version = parse_version(version)?;

        Ok(Self { start_line, method, uri, version, entries })
    }
}

pub(crate) fn parse_version(version: &str) -> Result<Version, ParseError> {
    match version {
        "HTTP/1.1" => Ok(Version::HTTP_11),
        "HTTP/1.0" => Ok(Version::HTTP_10),
        _ => Err(ParseError::InvalidVersion(version.to_string())),
    }
}

/// A request whose body is read from the connection on demand.
pub struct HttpRequest<'conn> {
    header: RequestHeader,
    body: BodyReader,
    stream: &'conn mut RollbackStream<TransportReader>,
}

impl<'conn> HttpRequest<'conn> {
    pub fn new(header: RequestHeader, body: BodyReader, stream: &'conn mut RollbackStream<TransportReader>) -> Self {
        Self { header, body, stream }
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    pub fn is_body_finished(&self) -> bool {
        self.body.is_finished()
    }

    /// Reads body bytes into `buf`, `Ok(0)` once the body is finished.
    ///
    /// Trailers of a chunked body are appended to the header when the body finishes.
    pub async fn read_body(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let n = self.body.read(self.stream, buf).await?;
        if n == 0
            && let Some(trailers) = self.body.take_trailers()
        {
            self.header.entries_mut().extend(trailers);
        }
        Ok(n)
    }

    /// Reads the whole body, failing once it grows beyond `limit` bytes.
    pub async fn read_to_end(&mut self, limit: usize) -> Result<Bytes, HttpError> {
        let mut body = BytesMut::new();
        let mut buf = vec![0u8; self.stream.capacity()];
        loop {
            let n = self.read_body(&mut buf).await?;
            if n == 0 {
                return Ok(body.freeze());
            }
            if body.len() + n > limit {
                return Err(ParseError::too_large_body(limit).into());
            }
            body.extend_from_slice(&buf[..n]);
        }
    }

    /// Skips whatever is left of the body, returns how many bytes were skipped.
    pub async fn drain(&mut self) -> Result<u64, HttpError> {
        if self.body.is_finished() {
            return Ok(0);
        }

        let mut skipped = 0;
        let mut buf = vec![0u8; self.stream.capacity()];
        loop {
            let n = self.read_body(&mut buf).await?;
            if n == 0 {
                return Ok(skipped);
            }
            skipped += n as u64;
        }
    }
}

impl fmt::Debug for HttpRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest").field("header", &self.header).field("body", &self.body).finish_non_exhaustive()
    }
}
