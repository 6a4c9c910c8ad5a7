use crate::codec::HeaderBuilder;
use crate::config::HttpSettings;
use crate::connection::{ConnectionHandle, KeepAliveRegistry};
use crate::content::Content;
use crate::ensure;
use crate::io::{RollbackStream, TransportReader};
use crate::protocol::body::BodyReader;
use crate::protocol::{ErrorKind, HttpError, HttpRequest, HttpResponse, ParseError, RequestHeader, SendError};
use http::StatusCode;
use http::header::CONNECTION;
use tokio::io::{AsyncReadExt, AsyncWrite};
use tracing::{debug, error, trace, warn};

/// How a session left its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The response is complete and the connection is registered for the next request.
    KeepAlive,
    /// The response is complete, the connection must be closed.
    Close,
    /// The peer closed the connection before sending another request.
    PeerClosed,
}

/// One request/response exchange on a connection.
///
/// Failures are escalated by their [`ErrorKind`]: client errors are answered with 400, 413 or 416
/// and end the session normally, internal errors are answered with 500 and returned, transport
/// errors are returned without an answer. Corrective responses always close the connection and
/// are only possible while the response header has not been sent.
pub struct HttpSession<'conn> {
    handle: &'conn ConnectionHandle,
    reader: &'conn mut RollbackStream<TransportReader>,
    response: HttpResponse<'conn>,
    settings: &'conn HttpSettings,
    keep_alive: &'conn KeepAliveRegistry,
}

impl<'conn> HttpSession<'conn> {
    pub fn new(
        handle: &'conn ConnectionHandle,
        reader: &'conn mut RollbackStream<TransportReader>,
        writer: &'conn mut (dyn AsyncWrite + Send + Unpin),
        settings: &'conn HttpSettings,
        keep_alive: &'conn KeepAliveRegistry,
    ) -> Self {
        Self { handle, reader, response: HttpResponse::new(writer, settings), settings, keep_alive }
    }

    pub async fn execute(mut self, content: &dyn Content) -> Result<SessionOutcome, HttpError> {
        match self.exchange(content).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.escalate(e).await,
        }
    }

    async fn exchange(&mut self, content: &dyn Content) -> Result<SessionOutcome, HttpError> {
        let Some(mut header) = self.receive_header().await? else {
            return Ok(SessionOutcome::PeerClosed);
        };
        self.keep_alive.deregister(self.handle.id()).await;

        let keep_alive = header.wants_keep_alive() && self.keep_alive.can_register();
        debug!(
            connection = self.handle.id(),
            method = %header.method(),
            uri = %header.uri(),
            keep_alive,
            "receive request"
        );

        self.response.insert_header("Content-Type", mime::TEXT_HTML_UTF_8.as_ref())?;
        self.response.insert_header("Connection", if keep_alive { "keep-alive" } else { "close" })?;

        let body = BodyReader::from_header(&mut header, self.settings)?;
        if header.expects_continue() && !body.is_empty() {
            self.response.send_continue().await?;
            trace!(connection = self.handle.id(), "sent 100 continue");
        }

        let mut request = HttpRequest::new(header, body, &mut *self.reader);
        let served = content.serve(&mut request, &mut self.response).await?;
        ensure!(served, HttpError::NotServed);

        let skipped = request.drain().await?;
        if skipped > 0 {
            trace!(connection = self.handle.id(), skipped, "skipped unread request body");
        }
        self.response.complete().await?;

        if self.response.header().entries().contains_token(CONNECTION.as_str(), "close") {
            return Ok(SessionOutcome::Close);
        }

        match self.keep_alive.register(self.handle).await {
            Ok(()) => Ok(SessionOutcome::KeepAlive),
            Err(e) => {
                warn!(connection = self.handle.id(), cause = %e, "can't keep connection alive");
                Ok(SessionOutcome::Close)
            }
        }
    }

    /// Reads the next request header, `None` when the peer closed before sending a byte.
    async fn receive_header(&mut self) -> Result<Option<RequestHeader>, ParseError> {
        let mut builder = HeaderBuilder::<RequestHeader>::with_settings(self.settings);
        let mut buf = vec![0u8; self.reader.capacity()];

        loop {
            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                ensure!(builder.is_empty(), ParseError::PrematureFinish);
                return Ok(None);
            }

            if let Some(body_start) = builder.append(&buf[..n])? {
                self.reader.rollback_from(&buf[..n], body_start)?;
                return builder.take().map(Some);
            }
        }
    }

    async fn escalate(mut self, e: HttpError) -> Result<SessionOutcome, HttpError> {
        let kind = e.kind();
        let Some(status) = kind.status() else {
            debug!(connection = self.handle.id(), cause = %e, "connection fault");
            return Err(e);
        };

        if self.response.is_header_sent() {
            error!(connection = self.handle.id(), cause = %e, "failed after response header was sent");
            return Err(e);
        }

        match kind {
            ErrorKind::Internal => error!(connection = self.handle.id(), cause = %e, "internal error"),
            _ => warn!(connection = self.handle.id(), status = status.as_u16(), cause = %e, "bad request"),
        }

        if let Err(send_error) = self.respond_error(status, &e).await {
            debug!(connection = self.handle.id(), cause = %send_error, "can't send error response");
            return Err(e);
        }

        match kind {
            ErrorKind::Internal => Err(e),
            _ => Ok(SessionOutcome::Close),
        }
    }

    async fn respond_error(&mut self, status: StatusCode, e: &HttpError) -> Result<(), SendError> {
        self.response.reset()?;
        self.response.set_status(status)?;
        self.response.insert_header("Connection", "close")?;
        self.response.insert_header("Content-Type", mime::TEXT_PLAIN_UTF_8.as_ref())?;

        let message = format!("{} {}\r\n{e}\r\n", status.as_str(), status.canonical_reason().unwrap_or_default());
        self.response.write(message.as_bytes()).await?;
        self.response.complete().await
    }
}

impl std::fmt::Debug for HttpSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession").field("connection", &self.handle.id()).field("response", &self.response).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::NoContent;
    use crate::test_util::{Echo, Failing, TestConnection};
    use indoc::indoc;

    #[tokio::test]
    async fn test_serve_and_keep_alive() {
        let mut connection = TestConnection::new(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");
        let outcome = connection.session(&Echo).await.unwrap();

        assert_eq!(outcome, SessionOutcome::KeepAlive);
        assert!(connection.keep_alive.is_registered(connection.handle.id()).await);
        assert_eq!(
            connection.output(),
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: keep-alive\r\n\
             Content-Length: 10\r\n\r\nGET /hello"
        );
    }

    #[tokio::test]
    async fn test_peer_closed_before_request() {
        let mut connection = TestConnection::new(b"");
        assert_eq!(connection.session(&Echo).await.unwrap(), SessionOutcome::PeerClosed);
        assert_eq!(connection.output(), "");
    }

    #[tokio::test]
    async fn test_peer_closed_inside_header() {
        let mut connection = TestConnection::new(b"GET / HTTP/1.1\r\nHo");
        let result = connection.session(&Echo).await;
        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::PrematureFinish })));
        assert_eq!(connection.output(), "");
    }

    #[tokio::test]
    async fn test_connection_close_request() {
        let mut connection = TestConnection::new(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert_eq!(connection.session(&Echo).await.unwrap(), SessionOutcome::Close);
        assert!(connection.output().contains("Connection: close\r\n"));
        assert!(connection.keep_alive.is_empty());
    }

    #[tokio::test]
    async fn test_full_registry_closes() {
        let mut connection = TestConnection::with_keep_alive_capacity(b"GET / HTTP/1.1\r\n\r\n", 0);
        assert_eq!(connection.session(&Echo).await.unwrap(), SessionOutcome::Close);
        assert!(connection.output().contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn test_bad_request() {
        let mut connection = TestConnection::new(b"GET / HTTP/1.1\r\nno colon here\r\n\r\n");
        assert_eq!(connection.session(&Echo).await.unwrap(), SessionOutcome::Close);

        let output = connection.output();
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Type: text/plain; charset=utf-8\r\n"));
        assert!(output.contains("\r\n\r\n400 Bad Request\r\nrequest error: invalid header"));
    }

    #[tokio::test]
    async fn test_too_many_header_lines() {
        let mut request = String::from("GET / HTTP/1.1\r\n");
        for i in 0..2000 {
            request.push_str(&format!("X-{i}: {i}\r\n"));
        }
        request.push_str("\r\n");

        let mut connection = TestConnection::new(request.into_bytes().leak());
        assert_eq!(connection.session(&Echo).await.unwrap(), SessionOutcome::Close);
        assert!(connection.output().starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn test_oversized_trailer_is_bad_request() {
        let mut request = String::from("POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\nX-Sum: ");
        request.push_str(&"a".repeat(128 * 1024));
        request.push_str("\r\n\r\n");

        let mut connection = TestConnection::new(request.into_bytes().leak());
        assert_eq!(connection.session(&Echo).await.unwrap(), SessionOutcome::Close);
        assert!(connection.output().starts_with("HTTP/1.1 400 Bad Request\r\nConnection: close\r\n"));
    }

    #[tokio::test]
    async fn test_content_failure_is_internal_error() {
        let mut connection = TestConnection::new(b"GET / HTTP/1.1\r\n\r\n");
        let result = connection.session(&Failing).await;
        assert!(matches!(result, Err(HttpError::Content { .. })));

        let output = connection.output();
        assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\nConnection: close\r\n"));
        assert!(output.contains("content error: disk on fire"));
        assert!(connection.keep_alive.is_empty());
    }

    #[tokio::test]
    async fn test_unclaimed_request() {
        #[derive(Debug)]
        struct Nobody;

        #[async_trait::async_trait]
        impl Content for Nobody {
            async fn serve(&self, _: &mut HttpRequest<'_>, _: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
                Ok(false)
            }
        }

        let mut connection = TestConnection::new(b"GET / HTTP/1.1\r\n\r\n");
        assert!(matches!(connection.session(&Nobody).await, Err(HttpError::NotServed)));
        assert!(connection.output().starts_with("HTTP/1.1 500 "));
    }

    #[tokio::test]
    async fn test_not_found() {
        let mut connection = TestConnection::new(b"GET /missing HTTP/1.1\r\n\r\n");
        assert_eq!(connection.session(&NoContent).await.unwrap(), SessionOutcome::KeepAlive);
        assert!(connection.output().starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn test_expect_continue() {
        let request = indoc! {"
            PUT /upload HTTP/1.1\r
            Expect: 100-continue\r
            Content-Length: 5\r
            \r
            hello"};
        let mut connection = TestConnection::new(request.as_bytes());
        connection.session(&Echo).await.unwrap();

        let output = connection.output();
        assert!(output.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
        assert!(output.ends_with("PUT /upload hello"));
    }

    #[tokio::test]
    async fn test_unread_body_is_drained() {
        let request = indoc! {"
            POST /ignored HTTP/1.1\r
            Transfer-Encoding: chunked\r
            \r
            5\r
            hello\r
            0\r
            \r
            GET /next HTTP/1.1\r
            \r
            "};
        let mut connection = TestConnection::new(request.as_bytes());
        assert_eq!(connection.session(&NoContent).await.unwrap(), SessionOutcome::KeepAlive);
        assert_eq!(connection.session(&Echo).await.unwrap(), SessionOutcome::KeepAlive);
        assert!(connection.output().ends_with("GET /next"));
    }
}
