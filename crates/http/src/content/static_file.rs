use crate::config::Settings;
use crate::content::{ByteRange, Content, ResolvedRange, StaticFile, StaticSource};
use crate::ensure;
use crate::protocol::{HttpError, HttpRequest, HttpResponse, ParseError};
use async_trait::async_trait;
use http::header::{CONTENT_TYPE, RANGE};
use http::{Method, StatusCode};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tracing::debug;

const MULTIPART_BOUNDARY: &str = "3d6b6a416f9b5";

fn is_get_or_head(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Copies exactly `count` bytes from `reader` into the response body.
async fn copy_to_response<R>(
    reader: &mut R,
    response: &mut HttpResponse<'_>,
    mut count: u64,
    buf: &mut [u8],
) -> Result<(), HttpError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    while count > 0 {
        let want = usize::try_from(count).unwrap_or(usize::MAX).min(buf.len());
        let n = reader.read(&mut buf[..want]).await.map_err(HttpError::content)?;
        ensure!(n > 0, HttpError::content(format!("resource ended {count} bytes early")));

        response.write(&buf[..n]).await?;
        count -= n as u64;
    }
    Ok(())
}

/// Serves whole resources for `GET` and `HEAD`.
#[derive(Debug)]
pub struct Static<S> {
    source: Arc<S>,
    buffer_size: usize,
}

impl<S: StaticSource> Static<S> {
    pub fn new(source: Arc<S>, settings: &Settings) -> Self {
        Self { source, buffer_size: settings.tcp.read_write_buffer_size }
    }
}

#[async_trait]
impl<S: StaticSource> Content for Static<S> {
    async fn serve(&self, request: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
        if !is_get_or_head(request.method()) {
            return Ok(false);
        }
        let Some(StaticFile { mut reader, length, content_type }) = self.source.open(request.uri().path()).await? else {
            return Ok(false);
        };

        response.insert_header("Content-Type", content_type.as_ref())?;
        response.insert_header("Content-Length", length.to_string())?;

        if request.method() == Method::HEAD {
            response.send_header().await?;
        } else {
            let mut buf = vec![0u8; self.buffer_size];
            copy_to_response(&mut reader, response, length, &mut buf).await?;
        }
        Ok(true)
    }
}

/// Serves `Range` requests for `GET` and `HEAD` with `206 Partial Content`.
///
/// Requests without a `Range` header are left to the next content, but every response passing
/// through gets `Accept-Ranges: bytes`. A single range is sent with `Content-Range`, several ranges
/// as `multipart/byteranges`. Ranges the resource can't satisfy are answered with a bodiless 416.
#[derive(Debug)]
pub struct StaticRange<S> {
    source: Arc<S>,
    buffer_size: usize,
    max_header_length: usize,
    max_count: usize,
}

impl<S: StaticSource> StaticRange<S> {
    pub fn new(source: Arc<S>, settings: &Settings) -> Self {
        Self {
            source,
            buffer_size: settings.tcp.read_write_buffer_size,
            max_header_length: settings.http.max_range_header_length,
            max_count: settings.http.max_range_count,
        }
    }

    async fn serve_ranges(
        &self,
        head_only: bool,
        range_header: &str,
        file: StaticFile<S::Reader>,
        response: &mut HttpResponse<'_>,
    ) -> Result<(), HttpError> {
        ensure!(
            range_header.len() < self.max_header_length,
            ParseError::too_large_range(range_header.len(), self.max_header_length).into()
        );

        let ranges = ByteRange::parse_header(range_header)?;
        ensure!(
            !ranges.is_empty() && ranges.len() <= self.max_count,
            HttpError::range_not_satisfiable(format!("{} ranges requested, at most {}", ranges.len(), self.max_count))
        );
        let resolved = ranges.into_iter().map(|range| range.resolve(file.length)).collect::<Result<Vec<_>, _>>()?;

        response.set_status(StatusCode::PARTIAL_CONTENT)?;
        match resolved.as_slice() {
            [range] => self.write_single(head_only, *range, file, response).await,
            _ => self.write_multipart(head_only, &resolved, file, response).await,
        }
    }

    async fn write_single(
        &self,
        head_only: bool,
        range: ResolvedRange,
        mut file: StaticFile<S::Reader>,
        response: &mut HttpResponse<'_>,
    ) -> Result<(), HttpError> {
        response.insert_header("Content-Type", file.content_type.as_ref())?;
        response.insert_header("Content-Length", range.len().to_string())?;
        response.insert_header("Content-Range", range.content_range(file.length))?;

        if head_only {
            response.send_header().await?;
            return Ok(());
        }

        let mut buf = vec![0u8; self.buffer_size];
        file.reader.seek(SeekFrom::Start(range.start)).await.map_err(HttpError::content)?;
        copy_to_response(&mut file.reader, response, range.len(), &mut buf).await
    }

    async fn write_multipart(
        &self,
        head_only: bool,
        ranges: &[ResolvedRange],
        mut file: StaticFile<S::Reader>,
        response: &mut HttpResponse<'_>,
    ) -> Result<(), HttpError> {
        let parts: Vec<(ResolvedRange, String)> = ranges
            .iter()
            .map(|range| {
                let header = format!(
                    "--{MULTIPART_BOUNDARY}\r\nContent-Type: {}\r\nContent-Range: {}\r\n\r\n",
                    file.content_type,
                    range.content_range(file.length)
                );
                (*range, header)
            })
            .collect();
        let footer = format!("--{MULTIPART_BOUNDARY}--");
        let content_length =
            parts.iter().map(|(range, header)| header.len() as u64 + range.len() + 2).sum::<u64>() + footer.len() as u64;

        response.insert_header("Content-Type", format!("multipart/byteranges; boundary={MULTIPART_BOUNDARY}"))?;
        response.insert_header("Content-Length", content_length.to_string())?;

        if head_only {
            response.send_header().await?;
            return Ok(());
        }

        let mut buf = vec![0u8; self.buffer_size];
        for (range, header) in &parts {
            response.write(header.as_bytes()).await?;
            file.reader.seek(SeekFrom::Start(range.start)).await.map_err(HttpError::content)?;
            copy_to_response(&mut file.reader, response, range.len(), &mut buf).await?;
            response.write(b"\r\n").await?;
        }
        response.write(footer.as_bytes()).await?;
        Ok(())
    }
}

async fn respond_not_satisfiable(response: &mut HttpResponse<'_>) -> Result<(), HttpError> {
    response.clear()?;
    response.remove_header(CONTENT_TYPE.as_str())?;
    response.set_status(StatusCode::RANGE_NOT_SATISFIABLE)?;
    response.insert_header("Content-Length", "0")?;
    response.send_header().await?;
    Ok(())
}

#[async_trait]
impl<S: StaticSource> Content for StaticRange<S> {
    async fn serve(&self, request: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
        response.insert_header("Accept-Ranges", "bytes")?;

        if !is_get_or_head(request.method()) {
            return Ok(false);
        }
        let Some(range_header) = request.header().entries().get(RANGE.as_str()).map(str::to_string) else {
            return Ok(false);
        };
        let Some(file) = self.source.open(request.uri().path()).await? else {
            return Ok(false);
        };

        let head_only = request.method() == Method::HEAD;
        match self.serve_ranges(head_only, &range_header, file, response).await {
            Err(HttpError::RangeNotSatisfiable { reason }) if !response.is_header_sent() => {
                debug!(range = %range_header, %reason, "range not satisfiable");
                respond_not_satisfiable(response).await?;
                Ok(true)
            }
            result => result.map(|()| true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionOutcome;
    use crate::content::{Aggregated, MemorySource, NoContent};
    use crate::test_util::TestConnection;
    use indoc::indoc;

    fn pipeline() -> Aggregated {
        let source = Arc::new(MemorySource::new().with("/digits.txt", "0123456789", mime::TEXT_PLAIN_UTF_8).with(
            "/empty.txt",
            "",
            mime::TEXT_PLAIN_UTF_8,
        ));
        let settings = Settings::default();
        Aggregated::new()
            .with(StaticRange::new(Arc::clone(&source), &settings))
            .with(Static::new(source, &settings))
            .with(NoContent)
    }

    async fn serve(request: &'static str) -> TestConnection {
        let mut connection = TestConnection::new(request.as_bytes());
        assert_eq!(connection.session(&pipeline()).await.unwrap(), SessionOutcome::KeepAlive);
        connection
    }

    #[tokio::test]
    async fn test_whole_resource() {
        let connection = serve("GET /digits.txt HTTP/1.1\r\n\r\n").await;
        let (header, body) = connection.response();

        assert_eq!(
            header,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nConnection: keep-alive\r\n\
             Accept-Ranges: bytes\r\nContent-Length: 10\r\n\r\n"
        );
        assert_eq!(body, b"0123456789");
    }

    #[tokio::test]
    async fn test_head_sends_header_only() {
        let connection = serve("HEAD /digits.txt HTTP/1.1\r\n\r\n").await;
        let (header, body) = connection.response();
        assert!(header.contains("Content-Length: 10\r\n"));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_single_range() {
        let connection = serve("GET /digits.txt HTTP/1.1\r\nRange: bytes=3-7\r\n\r\n").await;
        let (header, body) = connection.response();

        assert!(header.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(header.contains("Content-Range: bytes 3-7/10\r\n"));
        assert!(header.contains("Content-Length: 5\r\n"));
        assert_eq!(body, b"34567");
    }

    #[tokio::test]
    async fn test_suffix_and_open_ranges() {
        let connection = serve("GET /digits.txt HTTP/1.1\r\nRange: bytes=-3\r\n\r\n").await;
        let (header, body) = connection.response();
        assert!(header.contains("Content-Range: bytes 7-9/10\r\n"));
        assert_eq!(body, b"789");

        let connection = serve("GET /digits.txt HTTP/1.1\r\nRange: bytes=6-100\r\n\r\n").await;
        let (header, body) = connection.response();
        assert!(header.contains("Content-Range: bytes 6-9/10\r\n"));
        assert_eq!(body, b"6789");
    }

    #[tokio::test]
    async fn test_multiple_ranges() {
        let connection = serve("GET /digits.txt HTTP/1.1\r\nRange: bytes=3-7,8-9\r\n\r\n").await;
        let (header, body) = connection.response();

        let expected = indoc! {"
            --3d6b6a416f9b5\r
            Content-Type: text/plain; charset=utf-8\r
            Content-Range: bytes 3-7/10\r
            \r
            34567\r
            --3d6b6a416f9b5\r
            Content-Type: text/plain; charset=utf-8\r
            Content-Range: bytes 8-9/10\r
            \r
            89\r
            --3d6b6a416f9b5--"};

        assert!(header.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(header.contains("Content-Type: multipart/byteranges; boundary=3d6b6a416f9b5\r\n"));
        assert!(header.contains(&format!("Content-Length: {}\r\n", expected.len())));
        assert_eq!(std::str::from_utf8(body).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        for range in ["bytes=10-12", "bytes=-0", "bytes="] {
            let request = format!("GET /digits.txt HTTP/1.1\r\nRange: {range}\r\n\r\n");
            let connection = serve(request.leak()).await;
            let (header, body) = connection.response();

            assert!(header.starts_with("HTTP/1.1 416 Range Not Satisfiable\r\n"), "{range}");
            assert!(header.contains("\r\nContent-Length: 0\r\n"), "{header:?}");
            assert!(!header.to_ascii_lowercase().contains("content-type"));
            assert!(body.is_empty());
        }

        let connection = serve("GET /empty.txt HTTP/1.1\r\nRange: bytes=0-\r\n\r\n").await;
        assert!(connection.output().starts_with("HTTP/1.1 416 "));
    }

    #[tokio::test]
    async fn test_too_many_ranges() {
        let ranges = (0..40).map(|i| format!("{}-{}", i % 10, i % 10)).collect::<Vec<_>>().join(",");
        let request = format!("GET /digits.txt HTTP/1.1\r\nRange: bytes={ranges}\r\n\r\n");
        let connection = serve(request.leak()).await;
        assert!(connection.output().starts_with("HTTP/1.1 416 "));
    }

    #[tokio::test]
    async fn test_malformed_range() {
        let mut connection = TestConnection::new(b"GET /digits.txt HTTP/1.1\r\nRange: bytes=7-3\r\n\r\n");
        assert_eq!(connection.session(&pipeline()).await.unwrap(), SessionOutcome::Close);
        assert!(connection.output().starts_with("HTTP/1.1 400 Bad Request\r\nConnection: close\r\n"));
    }

    #[tokio::test]
    async fn test_too_long_range_header() {
        let request = format!("GET /digits.txt HTTP/1.1\r\nRange: bytes={}0-1\r\n\r\n", "0".repeat(1100));
        let mut connection = TestConnection::new(request.leak().as_bytes());
        assert_eq!(connection.session(&pipeline()).await.unwrap(), SessionOutcome::Close);
        assert!(connection.output().starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn test_other_methods_pass_through() {
        let connection = serve("DELETE /digits.txt HTTP/1.1\r\nRange: bytes=0-1\r\n\r\n").await;
        let (header, _) = connection.response();
        assert!(header.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(header.contains("Accept-Ranges: bytes\r\n"));
    }
}
