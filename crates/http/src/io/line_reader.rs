use crate::codec::LineBuilder;
use crate::ensure;
use crate::io::RollbackStream;
use crate::protocol::ParseError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads one line of at most `max_len` bytes from `stream`, bytes past the line terminator are
/// rolled back.
///
/// `buf` must not be larger than the stream's read-ahead capacity.
pub(crate) async fn read_line<R>(
    stream: &mut RollbackStream<R>,
    line_builder: &mut LineBuilder,
    buf: &mut [u8],
    max_len: usize,
) -> Result<String, ParseError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let n = stream.read(buf).await?;
        ensure!(n > 0, ParseError::PrematureFinish);

        if let Some(next) = line_builder.append(&buf[..n])? {
            stream.rollback_from(&buf[..n], next)?;
            let line = line_builder.take_line()?;
            ensure!(line.len() <= max_len, ParseError::too_long_line(max_len));
            return Ok(line);
        }
        if line_builder.pending_len() > max_len {
            line_builder.reset();
            return Err(ParseError::too_long_line(max_len));
        }
    }
}
