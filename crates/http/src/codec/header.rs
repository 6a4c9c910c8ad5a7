//! Incremental header parsing on top of [`LineBuilder`].

use crate::codec::LineBuilder;
use crate::config::HttpSettings;
use crate::ensure;
use crate::protocol::{HeaderEntries, ParseError};
use std::marker::PhantomData;
use std::mem;
use tracing::trace;

/// A header type that can be built from a start line and its entries.
pub trait FromHeaderParts: Sized {
    fn from_parts(start_line: String, entries: HeaderEntries) -> Result<Self, ParseError>;
}

/// Builds a header of type `H` from buffers of arbitrary size.
///
/// The first line is the start line, a blank line ends the header and every line in between is a
/// `key: value` entry. Feeding stops at the blank line: [`HeaderBuilder::append`] returns the offset
/// in the last buffer where the body starts.
#[derive(Debug)]
pub struct HeaderBuilder<H> {
    line_builder: LineBuilder,
    start_line: Option<String>,
    entries: HeaderEntries,
    line_count: usize,
    header_bytes: usize,
    max_lines: usize,
    max_bytes: usize,
    finished: bool,
    _header: PhantomData<fn() -> H>,
}

impl<H: FromHeaderParts> HeaderBuilder<H> {
    pub fn new(max_lines: usize, max_bytes: usize) -> Self {
        Self {
            line_builder: LineBuilder::new(),
            start_line: None,
            entries: HeaderEntries::new(),
            line_count: 0,
            header_bytes: 0,
            max_lines,
            max_bytes,
            finished: false,
            _header: PhantomData,
        }
    }

    pub fn with_settings(settings: &HttpSettings) -> Self {
        Self::new(settings.max_header_lines, settings.max_header_bytes)
    }

    /// Feeds `buf`, returns `Some(body_start)` once the blank line ending the header was seen.
    pub fn append(&mut self, buf: &[u8]) -> Result<Option<usize>, ParseError> {
        ensure!(!self.finished, ParseError::illegal_state("header already built"));

        let mut offset = 0;
        while offset < buf.len() {
            let remaining = &buf[offset..];
            let Some(next) = self.line_builder.append(remaining)? else {
                self.count_bytes(remaining.len())?;
                return Ok(None);
            };

            self.count_bytes(next)?;
            offset += next;

            let line = self.line_builder.take_line()?;
            if self.on_line(line)? {
                self.finished = true;
                trace!(lines = self.line_count, bytes = self.header_bytes, "header complete");
                return Ok(Some(offset));
            }
        }

        Ok(None)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether nothing has been fed yet.
    pub fn is_empty(&self) -> bool {
        self.header_bytes == 0
    }

    /// Builds the header, only valid once [`HeaderBuilder::append`] reported completion.
    pub fn take(&mut self) -> Result<H, ParseError> {
        ensure!(self.finished, ParseError::illegal_state("header is not complete"));
        let start_line = self.start_line.take().ok_or_else(|| ParseError::invalid_start_line("no start line"))?;
        H::from_parts(start_line, mem::take(&mut self.entries))
    }

    fn count_bytes(&mut self, len: usize) -> Result<(), ParseError> {
        self.header_bytes += len;
        ensure!(self.header_bytes <= self.max_bytes, ParseError::too_large_header(self.header_bytes, self.max_bytes));
        Ok(())
    }

    fn on_line(&mut self, line: String) -> Result<bool, ParseError> {
        if line.is_empty() {
            return Ok(true);
        }
        ensure!(!line.trim().is_empty(), ParseError::invalid_header("whitespace-only header line"));

        self.line_count += 1;
        ensure!(self.line_count <= self.max_lines, ParseError::too_many_header_lines(self.max_lines));

        if self.start_line.is_none() {
            self.start_line = Some(line);
            return Ok(false);
        }

        let (key, value) = parse_header_line(&line)?;
        self.entries.append(key, value);
        Ok(false)
    }
}

/// Splits a `key: value` line at its first colon.
pub(crate) fn parse_header_line(line: &str) -> Result<(&str, &str), ParseError> {
    let Some(index) = line.find(':') else {
        return Err(ParseError::invalid_header(format!("missing ':' in {line:?}")));
    };
    ensure!(index + 1 < line.len(), ParseError::invalid_header(format!("missing value in {line:?}")));

    let key = &line[..index];
    ensure!(
        !key.is_empty() && !key.contains(char::is_whitespace),
        ParseError::invalid_header(format!("invalid name in {line:?}"))
    );

    Ok((key, line[index + 1..].trim()))
}
