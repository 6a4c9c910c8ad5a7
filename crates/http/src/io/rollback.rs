//! Read-ahead buffering that lets parsers over-read and give bytes back.
//!
//! Header and chunk parsers read a full socket buffer at a time, the bytes after the parsed part
//! belong to whoever reads next. [`RollbackStream::rollback`] pushes them onto a
//! [`ReadAheadStack`] so the next read sees them before anything new from the socket.

use crate::ensure;
use crate::protocol::ParseError;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Fixed capacity LIFO of rolled back bytes.
///
/// Pushed ranges are stacked in front of each other, so the most recently pushed bytes are the
/// first ones popped: they are the front of the logical stream.
#[derive(Debug)]
pub struct ReadAheadStack {
    buf: Box<[u8]>,
    // bytes live in buf[top..]
    top: usize,
}

impl ReadAheadStack {
    pub fn new(capacity: usize) -> Self {
        Self { buf: vec![0; capacity].into_boxed_slice(), top: capacity }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.buf.len() - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == self.buf.len()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        ensure!(
            bytes.len() <= self.top,
            ParseError::illegal_state(format!(
                "read-ahead overflow, pushing {} bytes with {} of {} in use",
                bytes.len(),
                self.len(),
                self.capacity()
            ))
        );

        self.top -= bytes.len();
        self.buf[self.top..self.top + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Moves as many bytes as fit into `dst`, returns how many.
    pub fn pop(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len());
        dst[..n].copy_from_slice(&self.buf[self.top..self.top + n]);
        self.top += n;
        n
    }

    fn pop_into(&mut self, dst: &mut ReadBuf<'_>) {
        let n = dst.remaining().min(self.len());
        dst.put_slice(&self.buf[self.top..self.top + n]);
        self.top += n;
    }
}

pin_project! {
    /// A reader that serves rolled back bytes before reading from `inner`.
    #[derive(Debug)]
    pub struct RollbackStream<R> {
        #[pin]
        inner: R,
        stack: ReadAheadStack,
    }
}

impl<R> RollbackStream<R> {
    /// Wraps `inner` with a read-ahead stack of `capacity` bytes, the size of one read buffer.
    pub fn new(inner: R, capacity: usize) -> Self {
        Self { inner, stack: ReadAheadStack::new(capacity) }
    }

    pub fn capacity(&self) -> usize {
        self.stack.capacity()
    }

    /// Bytes waiting on the read-ahead stack.
    pub fn buffered(&self) -> usize {
        self.stack.len()
    }

    /// Pushes `bytes` back, the next read returns them first.
    pub fn rollback(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        self.stack.push(bytes)
    }

    /// Rolls back `buf[start..]`, returns whether anything was pushed.
    pub fn rollback_from(&mut self, buf: &[u8], start: usize) -> Result<bool, ParseError> {
        if start >= buf.len() {
            return Ok(false);
        }
        self.stack.push(&buf[start..])?;
        Ok(true)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead> AsyncRead for RollbackStream<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        if !this.stack.is_empty() {
            this.stack.pop_into(buf);
            return Poll::Ready(Ok(()));
        }
        this.inner.poll_read(cx, buf)
    }
}
