//! Response body encoders.
//!
//! Both encoders implement [`Encoder`] over [`PayloadItem`]: every `Chunk` is a write of the
//! response body, `Eof` completes it. Encoded bytes are appended to the destination buffer, the
//! response flushes that buffer to the transport.

use crate::ensure;
use crate::protocol::{PayloadItem, SendError};
use crate::utils::FastWrite;
use bytes::{Buf, BufMut, BytesMut};
use std::io::Write;
use tokio_util::codec::Encoder;
use tracing::trace;

/// Frames the body with the chunked transfer coding.
///
/// Writes are split into pieces of at most `max_chunk_size` bytes and collected in a buffer. The
/// buffer goes out as one chunk whenever the next piece would overflow it and on completion.
#[derive(Debug)]
pub struct ChunkedEncoder {
    buffer: BytesMut,
    max_chunk_size: usize,
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new(max_chunk_size: usize) -> Self {
        Self { buffer: BytesMut::with_capacity(max_chunk_size), max_chunk_size: max_chunk_size.max(1), eof: false }
    }

    fn flush_chunk(&mut self, dst: &mut BytesMut) -> Result<(), SendError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        trace!(len = self.buffer.len(), "write chunk");
        write!(FastWrite(dst), "{:X}\r\n", self.buffer.len())?;
        dst.reserve(self.buffer.len() + 2);
        dst.put_slice(&self.buffer);
        dst.put_slice(b"\r\n");
        self.buffer.clear();
        Ok(())
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        ensure!(!self.eof, SendError::illegal_state("chunked body already completed"));

        match item {
            PayloadItem::Chunk(mut data) => {
                while data.has_remaining() {
                    let piece = data.chunk().len().min(self.max_chunk_size);
                    if self.buffer.len() + piece > self.max_chunk_size {
                        self.flush_chunk(dst)?;
                    }
                    self.buffer.put_slice(&data.chunk()[..piece]);
                    data.advance(piece);
                }
                Ok(())
            }
            PayloadItem::Eof => {
                self.flush_chunk(dst)?;
                dst.put_slice(b"0\r\n\r\n");
                self.eof = true;
                Ok(())
            }
        }
    }
}

/// Writes the body unchanged, enforcing the declared content length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughEncoder {
    length: u64,
    written: u64,
    eof: bool,
}

impl PassthroughEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, written: 0, eof: false }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PassthroughEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        ensure!(!self.eof, SendError::illegal_state("body already completed"));

        match item {
            PayloadItem::Chunk(data) => {
                let attempted = self.written + data.remaining() as u64;
                ensure!(
                    attempted <= self.length,
                    SendError::ExceedContentLength { declared: self.length, attempted }
                );
                self.written = attempted;
                dst.put(data);
                Ok(())
            }
            PayloadItem::Eof => {
                ensure!(
                    self.written == self.length,
                    SendError::InsufficientContent { declared: self.length, written: self.written }
                );
                self.eof = true;
                Ok(())
            }
        }
    }
}

/// The encoder a response selected for its body.
#[derive(Debug)]
pub enum PayloadEncoder {
    Passthrough(PassthroughEncoder),
    Chunked(ChunkedEncoder),
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self {
            PayloadEncoder::Passthrough(encoder) => encoder.encode(item, dst),
            PayloadEncoder::Chunked(encoder) => encoder.encode(item, dst),
        }
    }
}
