use crate::codec::{ChunkedEncoder, FromHeaderParts, PassthroughEncoder, PayloadEncoder};
use crate::config::HttpSettings;
use crate::ensure;
use crate::protocol::request::parse_version;
use crate::protocol::{HeaderEntries, ParseError, PayloadItem, SendError};
use crate::utils::FastWrite;
use bytes::BytesMut;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{StatusCode, Version};
use std::fmt;
use std::io::Write;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::trace;

/// Status line and entries of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    version: Version,
    status: StatusCode,
    reason: String,
    entries: HeaderEntries,
}

impl ResponseHeader {
    /// An `HTTP/1.1` header with the canonical reason phrase of `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::HTTP_11,
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            entries: HeaderEntries::new(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn entries(&self) -> &HeaderEntries {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut HeaderEntries {
        &mut self.entries
    }

    /// Sets the status and its canonical reason phrase.
    pub fn set_status(&mut self, status: StatusCode) {
        self.set_status_line(status, status.canonical_reason().unwrap_or_default());
    }

    pub fn set_status_line(&mut self, status: StatusCode, reason: impl Into<String>) {
        self.status = status;
        self.reason = reason.into();
    }

    pub fn start_line(&self) -> String {
        format!("{:?} {} {}", self.version, self.status.as_str(), self.reason)
    }

    /// Whether the status allows a message body at all.
    pub fn allows_body(&self) -> bool {
        !(self.status.is_informational() || self.status == StatusCode::NO_CONTENT || self.status == StatusCode::NOT_MODIFIED)
    }

    pub(crate) fn write_to(&self, dst: &mut BytesMut) -> Result<(), SendError> {
        write!(FastWrite(dst), "{:?} {} {}\r\n", self.version, self.status.as_str(), self.reason)?;
        self.entries.write_to(dst);
        Ok(())
    }
}

impl FromHeaderParts for ResponseHeader {
    fn from_parts(start_line: String, entries: HeaderEntries) -> Result<Self, ParseError> {
        let mut parts = start_line.splitn(3, ' ');
        let (Some(version), Some(status)) = (parts.next(), parts.next()) else {
            return Err(ParseError::invalid_start_line(format!("expect `VERSION CODE REASON`, got {start_line:?}")));
        };

        let version = parse_version(version)?;
        let status = StatusCode::from_bytes(status.as_bytes()).map_err(ParseError::invalid_start_line)?;
        let reason = parts.next().unwrap_or_default().trim().to_string();

        Ok(Self { version, status, reason, entries })
    }
}

/// The response of one exchange, with a body that defers its framing decision.
///
/// Written bytes are buffered in memory until the framing is known: the header declares
/// `Content-Length` or `Transfer-Encoding`, the buffer would reach `max_body_size_in_memory`, or
/// the response is completed. Then the encoder is selected, the header goes out followed by the
/// buffered bytes, and every later write is forwarded to the encoder.
///
/// A complete body with no declared framing is sent with an injected `Content-Length`, a body that
/// outgrows the buffer before completion is sent chunked.
pub struct HttpResponse<'conn> {
    header: ResponseHeader,
    header_sent: bool,
    completed: bool,
    buffer: BytesMut,
    encoder: Option<PayloadEncoder>,
    out: BytesMut,
    writer: &'conn mut (dyn AsyncWrite + Send + Unpin),
    max_body_size_in_memory: usize,
    max_body_chunk_size: usize,
}

impl<'conn> HttpResponse<'conn> {
    pub fn new(writer: &'conn mut (dyn AsyncWrite + Send + Unpin), settings: &HttpSettings) -> Self {
        Self {
            header: ResponseHeader::new(StatusCode::OK),
            header_sent: false,
            completed: false,
            buffer: BytesMut::new(),
            encoder: None,
            out: BytesMut::new(),
            writer,
            max_body_size_in_memory: settings.max_body_size_in_memory,
            max_body_chunk_size: settings.max_body_chunk_size,
        }
    }

    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    /// Mutable access to the header, refused once it has been sent.
    pub fn header_mut(&mut self) -> Result<&mut ResponseHeader, SendError> {
        ensure!(!self.header_sent, SendError::HeaderAlreadySent);
        Ok(&mut self.header)
    }

    pub fn status(&self) -> StatusCode {
        self.header.status()
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), SendError> {
        self.header_mut()?.set_status(status);
        Ok(())
    }

    /// Replaces the values of `key`.
    pub fn insert_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), SendError> {
        self.header_mut()?.entries_mut().insert(key, value);
        Ok(())
    }

    pub fn remove_header(&mut self, key: &str) -> Result<(), SendError> {
        self.header_mut()?.entries_mut().remove(key);
        Ok(())
    }

    pub fn is_header_sent(&self) -> bool {
        self.header_sent
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Bytes written but not yet handed to an encoder.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops the buffered body and resets the header to a bare `200 OK`.
    pub fn reset(&mut self) -> Result<(), SendError> {
        ensure!(!self.header_sent, SendError::HeaderAlreadySent);
        self.header = ResponseHeader::new(StatusCode::OK);
        self.buffer.clear();
        Ok(())
    }

    /// Drops the buffered body, the header stays as it is.
    pub fn clear(&mut self) -> Result<(), SendError> {
        ensure!(!self.header_sent, SendError::HeaderAlreadySent);
        self.buffer.clear();
        Ok(())
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), SendError> {
        ensure!(!self.completed, SendError::illegal_state("response already completed"));
        if data.is_empty() {
            return Ok(());
        }

        if !self.header_sent {
            if self.buffer.len() + data.len() < self.max_body_size_in_memory && !self.declares_framing() {
                self.buffer.extend_from_slice(data);
                return Ok(());
            }
            self.start_body(false)?;
        }

        let encoder = self.encoder.as_mut().ok_or_else(|| SendError::illegal_state("response has no body"))?;
        encoder.encode(PayloadItem::Chunk(data), &mut self.out)?;
        self.flush_out().await
    }

    /// Sends the header alone, for responses without a body such as `HEAD` or `416`.
    ///
    /// The response is complete afterwards, any later write fails.
    pub async fn send_header(&mut self) -> Result<(), SendError> {
        ensure!(!self.header_sent, SendError::HeaderAlreadySent);
        ensure!(self.buffer.is_empty(), SendError::illegal_state("response body has been written"));

        self.header.write_to(&mut self.out)?;
        self.header_sent = true;
        self.completed = true;
        trace!(status = self.header.status().as_u16(), "sent header without body");

        self.flush_out().await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Sends the interim `100 Continue` response.
    pub(crate) async fn send_continue(&mut self) -> Result<(), SendError> {
        ensure!(!self.header_sent, SendError::HeaderAlreadySent);
        self.writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Finishes the body, sending the header first if it has not gone out yet. Calling it again is a
    /// no-op.
    pub async fn complete(&mut self) -> Result<(), SendError> {
        if self.completed {
            return Ok(());
        }
        self.completed = true;

        if !self.header_sent {
            self.start_body(true)?;
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.encode(PayloadItem::<&[u8]>::Eof, &mut self.out)?;
        }

        self.flush_out().await?;
        self.writer.flush().await?;
        Ok(())
    }

    fn declares_framing(&self) -> bool {
        let entries = self.header.entries();
        entries.contains_key(CONTENT_LENGTH.as_str()) || entries.contains_key(TRANSFER_ENCODING.as_str())
    }

    fn start_body(&mut self, completed: bool) -> Result<(), SendError> {
        let mut encoder = self.select_encoder(completed)?;
        self.header.write_to(&mut self.out)?;
        self.header_sent = true;

        if !self.buffer.is_empty() {
            encoder.encode(PayloadItem::Chunk(self.buffer.split().freeze()), &mut self.out)?;
        }
        self.encoder = Some(encoder);
        Ok(())
    }

    fn select_encoder(&mut self, completed: bool) -> Result<PayloadEncoder, SendError> {
        let buffered = self.buffer.len() as u64;
        let allows_body = self.header.allows_body();
        let entries = self.header.entries_mut();

        if !allows_body {
            entries.remove(CONTENT_LENGTH.as_str());
            entries.remove(TRANSFER_ENCODING.as_str());
            ensure!(buffered == 0, SendError::ExceedContentLength { declared: 0, attempted: buffered });
            return Ok(PayloadEncoder::Passthrough(PassthroughEncoder::new(0)));
        }

        if let Some(coding) = entries.get(TRANSFER_ENCODING.as_str()) {
            ensure!(
                entries.get_all(TRANSFER_ENCODING.as_str()).len() == 1 && coding.trim().eq_ignore_ascii_case("chunked"),
                SendError::UnsupportedTransferEncoding { value: coding.to_string() }
            );
            entries.remove(CONTENT_LENGTH.as_str());
            trace!("selected chunked encoder");
            return Ok(PayloadEncoder::Chunked(ChunkedEncoder::new(self.max_body_chunk_size)));
        }

        let length = match entries.get(CONTENT_LENGTH.as_str()) {
            Some(value) => {
                let declared = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| SendError::invalid_header(format!("content-length {value:?}: {e}")))?;
                ensure!(declared >= buffered, SendError::ExceedContentLength { declared, attempted: buffered });
                declared
            }
            None if completed => {
                entries.insert("Content-Length", buffered.to_string());
                buffered
            }
            None => {
                entries.insert("Transfer-Encoding", "chunked");
                trace!("selected chunked encoder for body of unknown length");
                return Ok(PayloadEncoder::Chunked(ChunkedEncoder::new(self.max_body_chunk_size)));
            }
        };

        trace!(length, "selected passthrough encoder");
        Ok(PayloadEncoder::Passthrough(PassthroughEncoder::new(length)))
    }

    async fn flush_out(&mut self) -> Result<(), SendError> {
        if !self.out.is_empty() {
            self.writer.write_all(&self.out).await?;
            self.out.clear();
        }
        Ok(())
    }
}

impl fmt::Debug for HttpResponse<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("header", &self.header)
            .field("header_sent", &self.header_sent)
            .field("completed", &self.completed)
            .field("buffered", &self.buffer.len())
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HeaderBuilder;

    fn settings() -> HttpSettings {
        HttpSettings { max_body_size_in_memory: 16, max_body_chunk_size: 8, ..HttpSettings::default() }
    }

    fn text(out: &[u8]) -> &str {
        std::str::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_small_body_gets_content_length() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.insert_header("Content-Type", "text/plain").unwrap();
        response.write(b"hello").await.unwrap();
        assert!(!response.is_header_sent());
        assert_eq!(response.buffered_len(), 5);
        response.complete().await.unwrap();
        response.complete().await.unwrap();
        drop(response);

        assert_eq!(text(&out), "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello");
    }

    #[tokio::test]
    async fn test_empty_body_gets_zero_length() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.complete().await.unwrap();
        drop(response);

        assert_eq!(text(&out), "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn test_large_body_is_chunked() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.write(b"0123456789").await.unwrap();
        response.write(b"abcdefghij").await.unwrap();
        assert!(response.is_header_sent());
        response.complete().await.unwrap();
        drop(response);

        assert_eq!(
            text(&out),
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
             8\r\n01234567\r\n2\r\n89\r\n8\r\nabcdefgh\r\n2\r\nij\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_declared_length_streams_immediately() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.insert_header("Content-Length", "6").unwrap();
        response.write(b"abc").await.unwrap();
        assert!(response.is_header_sent());
        assert!(matches!(response.header_mut(), Err(SendError::HeaderAlreadySent)));

        let result = response.write(b"defg").await;
        assert!(matches!(result, Err(SendError::ExceedContentLength { declared: 6, attempted: 7 })));
    }

    #[tokio::test]
    async fn test_declared_length_not_reached() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.insert_header("Content-Length", "6").unwrap();
        response.write(b"abc").await.unwrap();

        let result = response.complete().await;
        assert!(matches!(result, Err(SendError::InsufficientContent { declared: 6, written: 3 })));
    }

    #[tokio::test]
    async fn test_declared_length_below_buffered() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.write(b"abcdef").await.unwrap();
        response.insert_header("Content-Length", "2").unwrap();

        let result = response.complete().await;
        assert!(matches!(result, Err(SendError::ExceedContentLength { declared: 2, attempted: 6 })));
    }

    #[tokio::test]
    async fn test_explicit_chunked() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.insert_header("Transfer-Encoding", "chunked").unwrap();
        response.insert_header("Content-Length", "100").unwrap();
        response.write(b"abc").await.unwrap();
        response.complete().await.unwrap();
        drop(response);

        assert_eq!(text(&out), "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn test_unsupported_transfer_encoding() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.insert_header("Transfer-Encoding", "gzip").unwrap();

        let result = response.write(b"abc").await;
        assert!(matches!(result, Err(SendError::UnsupportedTransferEncoding { .. })));
    }

    #[tokio::test]
    async fn test_send_header_only() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.insert_header("Content-Length", "1234").unwrap();
        response.send_header().await.unwrap();
        assert!(response.is_completed());
        assert!(matches!(response.write(b"x").await, Err(SendError::IllegalState { .. })));
        response.complete().await.unwrap();
        drop(response);

        assert_eq!(text(&out), "HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n");
    }

    #[tokio::test]
    async fn test_no_content_has_no_framing() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.set_status(StatusCode::NO_CONTENT).unwrap();
        response.complete().await.unwrap();
        drop(response);

        assert_eq!(text(&out), "HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[tokio::test]
    async fn test_reset_before_sent() {
        let mut out = Vec::new();
        let mut response = HttpResponse::new(&mut out, &settings());
        response.set_status(StatusCode::CREATED).unwrap();
        response.insert_header("X-Custom", "1").unwrap();
        response.write(b"partial").await.unwrap();

        response.reset().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.buffered_len(), 0);
        assert!(response.header().entries().is_empty());
    }

    #[test]
    fn test_parse_response_header() {
        let mut builder = HeaderBuilder::<ResponseHeader>::new(16, 1024);
        builder.append(b"HTTP/1.1 404 Not Found Here\r\nContent-Length: 0\r\n\r\n").unwrap();
        let header = builder.take().unwrap();

        assert_eq!(header.status(), StatusCode::NOT_FOUND);
        assert_eq!(header.reason(), "Not Found Here");
        assert_eq!(header.start_line(), "HTTP/1.1 404 Not Found Here");
        assert_eq!(header.entries().get("content-length"), Some("0"));
    }

    #[test]
    fn test_custom_status_line() {
        let mut header = ResponseHeader::new(StatusCode::OK);
        header.set_status_line(StatusCode::from_u16(599).unwrap(), "Network Timeout");
        assert_eq!(header.start_line(), "HTTP/1.1 599 Network Timeout");

        header.set_status(StatusCode::PARTIAL_CONTENT);
        assert_eq!(header.start_line(), "HTTP/1.1 206 Partial Content");
    }
}
