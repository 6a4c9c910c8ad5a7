//! Byte stream plumbing below the protocol layer.

mod line_reader;
mod rollback;
mod watched;

pub(crate) use line_reader::read_line;
pub use rollback::ReadAheadStack;
pub use rollback::RollbackStream;
pub use watched::WatchedStream;

use tokio::io::{AsyncRead, AsyncWrite};

/// The read half of a connection, type erased so content handlers stay object safe.
pub type TransportReader = Box<dyn AsyncRead + Send + Unpin>;

/// The write half of a connection.
pub type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;
