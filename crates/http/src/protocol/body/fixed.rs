use crate::ensure;
use crate::protocol::ParseError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A body delimited by `Content-Length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedLengthBody {
    remaining: u64,
}

impl FixedLengthBody {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Reads at most the remaining length, the stream is not touched once the body is finished.
    pub async fn read<R>(&mut self, stream: &mut R, buf: &mut [u8]) -> Result<usize, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = usize::try_from(self.remaining).map_or(buf.len(), |remaining| remaining.min(buf.len()));
        let n = stream.read(&mut buf[..max]).await?;
        ensure!(n > 0, ParseError::PrematureFinish);

        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_never_reads_past_length() {
        let mut stream = Cursor::new(b"hello world".to_vec());
        let mut body = FixedLengthBody::new(5);
        let mut buf = [0u8; 64];

        assert_eq!(body.read(&mut stream, &mut buf).await.unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert!(body.is_finished());
        assert_eq!(body.read(&mut stream, &mut buf).await.unwrap(), 0);
        assert_eq!(stream.position(), 5);
    }

    #[tokio::test]
    async fn test_small_buffer() {
        let mut stream = Cursor::new(b"abcdef".to_vec());
        let mut body = FixedLengthBody::new(6);
        let mut buf = [0u8; 4];

        assert_eq!(body.read(&mut stream, &mut buf).await.unwrap(), 4);
        assert_eq!(body.remaining(), 2);
        assert_eq!(body.read(&mut stream, &mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[tokio::test]
    async fn test_premature_finish() {
        let mut stream = Cursor::new(b"abc".to_vec());
        let mut body = FixedLengthBody::new(10);
        let mut buf = [0u8; 64];

        assert_eq!(body.read(&mut stream, &mut buf).await.unwrap(), 3);
        let result = body.read(&mut stream, &mut buf).await;
        assert!(matches!(result, Err(ParseError::PrematureFinish)));
    }
}
