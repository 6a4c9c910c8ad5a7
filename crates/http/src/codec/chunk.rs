//! Chunk size lines of the chunked transfer coding.

use crate::codec::LineBuilder;
use crate::ensure;
use crate::protocol::ParseError;

/// Longest chunk size line accepted, extensions included.
const MAX_CHUNK_HEADER_LENGTH: usize = 4 * 1024;

/// The size line preceding one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    length: u64,
}

impl ChunkHeader {
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    /// Parses `size[;extensions]`, the extensions are ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let size = line.split(';').next().unwrap_or_default().trim();
        ensure!(
            !size.is_empty() && size.bytes().all(|b| b.is_ascii_hexdigit()),
            ParseError::invalid_chunk(format!("invalid chunk size line {line:?}"))
        );

        let length = u64::from_str_radix(size, 16)
            .map_err(|e| ParseError::invalid_chunk(format!("chunk size {size:?} out of range: {e}")))?;
        Ok(Self { length })
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// The zero sized chunk ending the body.
    pub fn is_last(&self) -> bool {
        self.length == 0
    }
}

/// Builds a [`ChunkHeader`] from buffers of arbitrary size.
#[derive(Debug, Default)]
pub struct ChunkHeaderBuilder {
    line_builder: LineBuilder,
    header: Option<ChunkHeader>,
}

impl ChunkHeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `buf`, returns the index in `buf` after the size line once it is complete.
    pub fn append(&mut self, buf: &[u8]) -> Result<Option<usize>, ParseError> {
        ensure!(self.header.is_none(), ParseError::illegal_state("chunk header already built"));

        let Some(next) = self.line_builder.append(buf)? else {
            ensure!(
                self.line_builder.pending_len() <= MAX_CHUNK_HEADER_LENGTH,
                ParseError::invalid_chunk("chunk size line too long")
            );
            return Ok(None);
        };

        let line = self.line_builder.take_line()?;
        self.header = Some(ChunkHeader::parse(&line)?);
        Ok(Some(next))
    }

    /// Consumes the built header, leaving the builder ready for the next chunk.
    pub fn take(&mut self) -> Result<ChunkHeader, ParseError> {
        self.header.take().ok_or_else(|| ParseError::illegal_state("chunk header is not complete"))
    }

    pub fn reset(&mut self) {
        self.line_builder.reset();
        self.header = None;
    }
}
