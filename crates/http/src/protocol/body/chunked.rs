//! Reader of request bodies sent with the chunked transfer coding.
//!
//! See [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1). The size line of
//! each chunk is parsed with a [`ChunkHeaderBuilder`]; bytes read past a size line, a chunk's
//! closing CRLF or the trailer section are rolled back onto the stream.

use super::TrailerReader;
use crate::codec::{ChunkHeader, ChunkHeaderBuilder, LineBuilder};
use crate::ensure;
use crate::io::{RollbackStream, read_line};
use crate::protocol::{HeaderEntries, ParseError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;
use ChunkedState::*;

/// Longest line accepted where the CRLF closing a chunk's data is expected.
const MAX_CHUNK_END_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Waiting for the next size line
    AwaitChunkHeader,
    /// Inside the data of a chunk
    ReadingChunkBody,
    /// The last chunk was seen, the trailer section follows
    AwaitTrailer,
    /// Body and trailers are consumed
    Done,
}

#[derive(Debug)]
pub struct ChunkedBody {
    state: ChunkedState,
    remaining: u64,
    header_builder: ChunkHeaderBuilder,
    line_builder: LineBuilder,
    trailer_reader: TrailerReader,
    trailers: Option<HeaderEntries>,
    // sized to the stream's read-ahead capacity on first use
    scratch: Vec<u8>,
}

impl ChunkedBody {
    /// The trailer section is bounded like a request header, by `max_trailer_lines` and
    /// `max_trailer_bytes`.
    pub fn new(max_trailer_lines: usize, max_trailer_bytes: usize) -> Self {
        Self {
            state: AwaitChunkHeader,
            remaining: 0,
            header_builder: ChunkHeaderBuilder::new(),
            line_builder: LineBuilder::new(),
            trailer_reader: TrailerReader::new(max_trailer_lines, max_trailer_bytes),
            trailers: None,
            scratch: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == Done
    }

    /// Trailers of the finished body, handed out once.
    pub fn take_trailers(&mut self) -> Option<HeaderEntries> {
        self.trailers.take()
    }

    pub async fn read<R>(&mut self, stream: &mut RollbackStream<R>, buf: &mut [u8]) -> Result<usize, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.scratch.len() != stream.capacity() {
            self.scratch = vec![0; stream.capacity()];
        }

        loop {
            match self.state {
                AwaitChunkHeader => {
                    let header = self.read_chunk_header(stream).await?;
                    trace!(length = header.length(), "read chunk header");
                    if header.is_last() {
                        self.state = AwaitTrailer;
                    } else {
                        self.remaining = header.length();
                        self.state = ReadingChunkBody;
                    }
                }

                ReadingChunkBody => {
                    let max = usize::try_from(self.remaining).map_or(buf.len(), |remaining| remaining.min(buf.len()));
                    let n = stream.read(&mut buf[..max]).await?;
                    ensure!(n > 0, ParseError::PrematureFinish);

                    self.remaining -= n as u64;
                    if self.remaining == 0 {
                        self.read_chunk_end(stream).await?;
                        self.state = AwaitChunkHeader;
                    }
                    return Ok(n);
                }

                AwaitTrailer => {
                    self.trailer_reader.read(stream, &mut self.scratch).await?;
                    self.trailers = Some(self.trailer_reader.take_trailers());
                    self.state = Done;
                    trace!("finished reading chunked body");
                }

                Done => return Ok(0),
            }
        }
    }

    async fn read_chunk_header<R>(&mut self, stream: &mut RollbackStream<R>) -> Result<ChunkHeader, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let n = stream.read(&mut self.scratch).await?;
            ensure!(n > 0, ParseError::PrematureFinish);

            if let Some(next) = self.header_builder.append(&self.scratch[..n])? {
                stream.rollback_from(&self.scratch[..n], next)?;
                return self.header_builder.take();
            }
        }
    }

    async fn read_chunk_end<R>(&mut self, stream: &mut RollbackStream<R>) -> Result<(), ParseError>
    where
        R: AsyncRead + Unpin,
    {
        let line = read_line(stream, &mut self.line_builder, &mut self.scratch, MAX_CHUNK_END_LENGTH).await?;
        ensure!(line.is_empty(), ParseError::invalid_chunk("chunk data must be followed by CRLF"));
        Ok(())
    }
}
