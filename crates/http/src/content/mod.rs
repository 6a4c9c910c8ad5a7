//! Content collaborators: what a session asks to answer a request.
//!
//! A [`Content`] either claims the request by writing the response and returning `true`, or leaves
//! it untouched and returns `false`. [`Aggregated`] asks a list of them in order.

mod range;
mod source;
mod static_file;
mod virtual_host;

pub use range::ByteRange;
pub use range::ResolvedRange;
pub use source::FileSystemSource;
pub use source::MemorySource;
pub use source::StaticFile;
pub use source::StaticSource;
pub use static_file::Static;
pub use static_file::StaticRange;
pub use virtual_host::HostMatcher;
pub use virtual_host::VirtualHosts;

use crate::protocol::{HttpError, HttpRequest, HttpResponse};
use async_trait::async_trait;
use http::StatusCode;
use std::sync::Arc;

#[async_trait]
pub trait Content: Send + Sync {
    /// Serves the request, `Ok(false)` when this content does not handle it.
    async fn serve(&self, request: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError>;
}

#[async_trait]
impl<C: Content + ?Sized> Content for Arc<C> {
    async fn serve(&self, request: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
        self.as_ref().serve(request, response).await
    }
}

/// Tries each content in order, the first one to claim the request wins.
#[derive(Default)]
pub struct Aggregated {
    contents: Vec<Box<dyn Content>>,
}

impl Aggregated {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, content: impl Content + 'static) -> Self {
        self.push(content);
        self
    }

    pub fn push(&mut self, content: impl Content + 'static) {
        self.contents.push(Box::new(content));
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

#[async_trait]
impl Content for Aggregated {
    async fn serve(&self, request: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
        for content in &self.contents {
            if content.serve(request, response).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl std::fmt::Debug for Aggregated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregated").field("contents", &self.contents.len()).finish()
    }
}

/// Claims every request with `404 Not Found`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContent;

#[async_trait]
impl Content for NoContent {
    async fn serve(&self, _request: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
        response.clear()?;
        response.set_status(StatusCode::NOT_FOUND)?;
        response.write(b"<h1>404 Not Found</h1>").await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionOutcome;
    use crate::test_util::{Echo, TestConnection};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl Content for Counting {
        async fn serve(&self, _: &mut HttpRequest<'_>, _: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_first_claim_wins() {
        let before = Arc::new(Counting::default());
        let after = Arc::new(Counting::default());
        let content = Aggregated::new().with(Arc::clone(&before)).with(Echo).with(Arc::clone(&after));
        assert_eq!(content.len(), 3);

        let mut connection = TestConnection::new(b"GET /x HTTP/1.1\r\n\r\n");
        assert_eq!(connection.session(&content).await.unwrap(), SessionOutcome::KeepAlive);
        assert!(connection.output().ends_with("GET /x"));
        assert_eq!(before.0.load(Ordering::SeqCst), 1);
        assert_eq!(after.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nobody_claims() {
        let content = Aggregated::new().with(Counting::default());
        let mut connection = TestConnection::new(b"GET /x HTTP/1.1\r\n\r\n");
        assert!(matches!(connection.session(&content).await, Err(HttpError::NotServed)));
    }

    #[tokio::test]
    async fn test_no_content() {
        let mut connection = TestConnection::new(b"GET /x HTTP/1.1\r\n\r\n");
        connection.session(&NoContent).await.unwrap();

        let (header, body) = connection.response();
        assert!(header.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(header.contains("Content-Length: 22\r\n"));
        assert_eq!(body, b"<h1>404 Not Found</h1>");
    }
}
