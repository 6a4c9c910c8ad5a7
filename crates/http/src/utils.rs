//! Utility macros and helpers used across the crate.

use bytes::{BufMut, BytesMut};
use std::io;

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
///
/// # Example
///
/// ```ignore
/// ensure!(self.line_count <= self.max_lines, ParseError::too_many_header_lines(self.max_lines));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// [`io::Write`] over a [`BytesMut`], for `write!` formatting straight into an output buffer.
pub(crate) struct FastWrite<'a>(pub &'a mut BytesMut);

impl io::Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
