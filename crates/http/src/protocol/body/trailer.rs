use crate::codec::{LineBuilder, parse_header_line};
use crate::ensure;
use crate::io::{RollbackStream, read_line};
use crate::protocol::{HeaderEntries, ParseError};
use std::mem;
use tokio::io::AsyncRead;

/// Reads the trailer section after the last chunk, up to and including its blank line.
///
/// The section is bounded like a request header: by line count and by total bytes.
#[derive(Debug)]
pub struct TrailerReader {
    line_builder: LineBuilder,
    trailers: HeaderEntries,
    line_count: usize,
    bytes: usize,
    max_lines: usize,
    max_bytes: usize,
}

impl TrailerReader {
    pub fn new(max_lines: usize, max_bytes: usize) -> Self {
        Self {
            line_builder: LineBuilder::new(),
            trailers: HeaderEntries::new(),
            line_count: 0,
            bytes: 0,
            max_lines,
            max_bytes,
        }
    }

    pub async fn read<R>(&mut self, stream: &mut RollbackStream<R>, buf: &mut [u8]) -> Result<(), ParseError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let budget = self.max_bytes.saturating_sub(self.bytes);
            let line = read_line(stream, &mut self.line_builder, buf, budget).await?;
            if line.is_empty() {
                return Ok(());
            }
            self.bytes += line.len();

            self.line_count += 1;
            ensure!(self.line_count <= self.max_lines, ParseError::too_many_header_lines(self.max_lines));

            let (key, value) = parse_header_line(&line)?;
            self.trailers.append(key, value);
        }
    }

    pub fn take_trailers(&mut self) -> HeaderEntries {
        mem::take(&mut self.trailers)
    }
}
