//! The TCP accept loop.

use crate::config::{ConfigError, HttpSettings, Settings};
use crate::connection::{ConnectionHandle, HttpConnection, KeepAliveRegistry};
use crate::content::Content;
use crate::io::WatchedStream;
use crate::watchdog::Watchdog;
use std::io;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Accepts connections and serves each on its own task.
///
/// At most `max_tcp_clients` connections are served at once, further clients wait in the listen
/// backlog. Every connection is watched by the idle watchdog, and by the keep-alive registry's
/// watchdog while it waits between requests.
pub struct Server {
    settings: Settings,
    content: Arc<dyn Content>,
    keep_alive: Arc<KeepAliveRegistry>,
    idle: Watchdog,
}

impl Server {
    pub fn new(settings: Settings, content: Arc<dyn Content>) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            keep_alive: Arc::new(KeepAliveRegistry::new(&settings.http)),
            idle: Watchdog::new("tcp-idle", settings.tcp.idle_timeout),
            settings,
            content,
        })
    }

    pub fn keep_alive(&self) -> &KeepAliveRegistry {
        &self.keep_alive
    }

    /// Serves connections from `listener` until `shutdown` is cancelled.
    ///
    /// Connections already being served keep running after this returns.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "start listening");

        let interval = self.settings.tcp.watchdog_interval;
        let idle_task = self.idle.spawn_interval(interval);
        let keep_alive_task = self.keep_alive.watchdog().spawn_interval(interval);

        let http_settings = Arc::new(self.settings.http.clone());
        let clients = Arc::new(Semaphore::new(self.settings.tcp.max_tcp_clients));

        loop {
            let permit = tokio::select! {
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&clients).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_closed) => break,
                },
            };

            let (stream, remote_addr) = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            let connection = self.connection(stream, Arc::clone(&http_settings));
            let id = connection.handle().id();
            debug!(connection = id, %remote_addr, "accept connection");

            let content = Arc::clone(&self.content);
            tokio::spawn(async move {
                if let Err(e) = connection.process(content.as_ref()).await {
                    trace!(connection = id, kind = ?e.kind(), "connection task ended with error");
                }
                drop(permit);
            });
        }

        idle_task.abort();
        keep_alive_task.abort();
        info!("stop listening");
        Ok(())
    }

    fn connection(&self, stream: TcpStream, http_settings: Arc<HttpSettings>) -> HttpConnection {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(cause = %e, "can't set TCP_NODELAY");
        }

        let handle = ConnectionHandle::new();
        let session = Arc::new(self.idle.watch(Arc::new(handle.clone())));
        let (reader, writer) = stream.into_split();
        let reader = WatchedStream::new(reader, Arc::clone(&session), handle.token().clone());
        let writer = WatchedStream::new(writer, session, handle.token().clone());

        HttpConnection::new(
            handle,
            Box::new(reader),
            Box::new(writer),
            self.settings.tcp.read_write_buffer_size,
            http_settings,
            Arc::clone(&self.keep_alive),
        )
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("settings", &self.settings).field("keep_alive", &self.keep_alive).finish_non_exhaustive()
    }
}
