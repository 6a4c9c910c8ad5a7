//! Incremental line splitting.

use crate::ensure;
use crate::protocol::ParseError;
use bytes::BytesMut;

/// Accumulates bytes until a `\n` terminated line is complete.
///
/// An optional `\r` before the `\n` is stripped. The bytes after the terminator are never consumed,
/// [`LineBuilder::append`] reports where they start so the caller can hand them to the next reader.
#[derive(Debug, Default)]
pub struct LineBuilder {
    buffer: BytesMut,
    line: Option<String>,
}

impl LineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `buf`, returns the index in `buf` where the next line starts once a line is complete.
    ///
    /// The built line has to be taken with [`LineBuilder::take_line`] before appending again.
    pub fn append(&mut self, buf: &[u8]) -> Result<Option<usize>, ParseError> {
        ensure!(self.line.is_none(), ParseError::illegal_state("line already built, take it before appending"));

        let Some(index) = buf.iter().position(|&b| b == b'\n') else {
            self.buffer.extend_from_slice(buf);
            return Ok(None);
        };

        self.buffer.extend_from_slice(&buf[..index]);
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.truncate(self.buffer.len() - 1);
        }

        let bytes = self.buffer.split();
        let line = String::from_utf8(bytes.to_vec()).map_err(ParseError::invalid_header)?;
        self.line = Some(line);
        Ok(Some(index + 1))
    }

    pub fn has_line(&self) -> bool {
        self.line.is_some()
    }

    /// Bytes accumulated for the line in progress.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Consumes the built line, leaving the builder ready for the next one.
    pub fn take_line(&mut self) -> Result<String, ParseError> {
        self.line.take().ok_or_else(|| ParseError::illegal_state("no line has been built"))
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.line = None;
    }
}
