use crate::config::HttpSettings;
use crate::connection::{ConnectionHandle, HttpSession, KeepAliveRegistry, SessionOutcome};
use crate::content::Content;
use crate::io::{RollbackStream, TransportReader, TransportWriter};
use crate::protocol::{ErrorKind, HttpError};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

/// An accepted connection, serving one session after another until it closes.
///
/// The read half is wrapped in a [`RollbackStream`] whose capacity is the read buffer size, so
/// bytes read ahead of one request stay available to the next.
pub struct HttpConnection {
    handle: ConnectionHandle,
    reader: RollbackStream<TransportReader>,
    writer: TransportWriter,
    settings: Arc<HttpSettings>,
    keep_alive: Arc<KeepAliveRegistry>,
}

impl HttpConnection {
    pub fn new(
        handle: ConnectionHandle,
        reader: TransportReader,
        writer: TransportWriter,
        read_buffer_size: usize,
        settings: Arc<HttpSettings>,
        keep_alive: Arc<KeepAliveRegistry>,
    ) -> Self {
        Self { handle, reader: RollbackStream::new(reader, read_buffer_size), writer, settings, keep_alive }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Serves sessions while the connection stays registered for keep-alive.
    ///
    /// A peer closing between requests ends the loop with `Ok`. The connection is deregistered from
    /// keep-alive whatever the result.
    pub async fn process(mut self, content: &dyn Content) -> Result<(), HttpError> {
        let result = self.run(content).await;
        self.keep_alive.deregister(self.handle.id()).await;

        match &result {
            Ok(()) => {
                if let Err(e) = self.writer.shutdown().await {
                    debug!(connection = self.handle.id(), cause = %e, "shutdown failed");
                }
                debug!(connection = self.handle.id(), "connection closed");
            }
            Err(e) => match e.kind() {
                ErrorKind::Transport if self.handle.is_closed() => {
                    debug!(connection = self.handle.id(), "connection disposed while idle");
                }
                ErrorKind::Transport | ErrorKind::PrematureFinish => {
                    warn!(connection = self.handle.id(), cause = %e, "connection aborted");
                }
                _ => error!(connection = self.handle.id(), cause = %e, "connection failed"),
            },
        }
        result
    }

    async fn run(&mut self, content: &dyn Content) -> Result<(), HttpError> {
        let mut served = 0usize;
        loop {
            let session =
                HttpSession::new(&self.handle, &mut self.reader, &mut *self.writer, &self.settings, &self.keep_alive);

            match session.execute(content).await? {
                SessionOutcome::KeepAlive => served += 1,
                SessionOutcome::Close => {
                    debug!(connection = self.handle.id(), sessions = served + 1, "close after response");
                    return Ok(());
                }
                SessionOutcome::PeerClosed => {
                    debug!(connection = self.handle.id(), sessions = served, "peer closed");
                    return Ok(());
                }
            }
        }
    }
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("handle", &self.handle).finish_non_exhaustive()
    }
}
