//! In-memory connections and small content handlers shared by the crate's tests.

use crate::config::HttpSettings;
use crate::connection::{ConnectionHandle, HttpSession, KeepAliveRegistry, SessionOutcome};
use crate::content::Content;
use crate::io::{RollbackStream, TransportReader};
use crate::protocol::{HttpError, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::io::Cursor;

/// Answers with `METHOD PATH`, followed by a space and the request body when there is one.
#[derive(Debug)]
pub(crate) struct Echo;

#[async_trait]
impl Content for Echo {
    async fn serve(&self, request: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
        let line = format!("{} {}", request.method(), request.uri().path());
        let body = request.read_to_end(1024).await?;

        response.write(line.as_bytes()).await?;
        if !body.is_empty() {
            response.write(b" ").await?;
            response.write(&body).await?;
        }
        Ok(true)
    }
}

/// Fails every request.
#[derive(Debug)]
pub(crate) struct Failing;

#[async_trait]
impl Content for Failing {
    async fn serve(&self, _: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
        response.write(b"partial output").await?;
        Err(HttpError::content("disk on fire"))
    }
}

/// A connection over a fixed request stream, collecting everything written back.
pub(crate) struct TestConnection {
    pub(crate) handle: ConnectionHandle,
    pub(crate) keep_alive: KeepAliveRegistry,
    pub(crate) settings: HttpSettings,
    reader: RollbackStream<TransportReader>,
    output: Vec<u8>,
}

impl TestConnection {
    pub(crate) fn new(input: &'static [u8]) -> Self {
        Self::with_settings(input, HttpSettings::default())
    }

    pub(crate) fn with_keep_alive_capacity(input: &'static [u8], capacity: usize) -> Self {
        Self::with_settings(input, HttpSettings { max_keep_alive_connections: capacity, ..HttpSettings::default() })
    }

    pub(crate) fn with_settings(input: &'static [u8], settings: HttpSettings) -> Self {
        Self {
            handle: ConnectionHandle::new(),
            keep_alive: KeepAliveRegistry::new(&settings),
            settings,
            reader: RollbackStream::new(Box::new(Cursor::new(input)), 64),
            output: Vec::new(),
        }
    }

    pub(crate) async fn session(&mut self, content: &dyn Content) -> Result<SessionOutcome, HttpError> {
        HttpSession::new(&self.handle, &mut self.reader, &mut self.output, &self.settings, &self.keep_alive)
            .execute(content)
            .await
    }

    pub(crate) fn output(&self) -> &str {
        std::str::from_utf8(&self.output).unwrap()
    }

    /// Output split into header text and body bytes at the first blank line.
    pub(crate) fn response(&self) -> (&str, &[u8]) {
        let at = self.output.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        (std::str::from_utf8(&self.output[..at]).unwrap(), &self.output[at..])
    }
}
