//! An asynchronous HTTP/1.1 server engine.
//!
//! The crate owns the whole path from socket bytes to response bytes: request framing, header
//! parsing, chunked transfer coding, the buffering response body, keep-alive and reclamation of
//! idle connections. It is built on tokio and keeps memory bounded by configuration.
//!
//! # Architecture
//!
//! - [`codec`]: sans-io builders for lines, headers and chunk headers, and the response body
//!   encoders
//! - [`io`]: the [`io::RollbackStream`] that lets parsers over-read and give bytes back, and the
//!   watchdog-bound [`io::WatchedStream`]
//! - [`protocol`]: requests, responses, request body readers and the error types
//! - [`connection`]: the per-connection session loop and the keep-alive registry
//! - [`watchdog`]: idle session reclamation with injectable clock and timer
//! - [`content`]: the [`content::Content`] seam and static file content with range support
//! - [`server`]: the TCP accept loop
//!
//! # Example
//!
//! ```no_run
//! use micro_httpd::config::Settings;
//! use micro_httpd::content::{Aggregated, FileSystemSource, NoContent, Static, StaticRange};
//! use micro_httpd::server::Server;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default();
//!     let source = Arc::new(FileSystemSource::new("./www"));
//!     let content = Aggregated::new()
//!         .with(StaticRange::new(Arc::clone(&source), &settings))
//!         .with(Static::new(source, &settings))
//!         .with(NoContent);
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let server = Server::new(settings, Arc::new(content))?;
//!     server.serve(listener, CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error handling
//!
//! Every layer returns typed errors, [`protocol::HttpError`] at the top. The session classifies
//! them with [`protocol::ErrorKind`] and answers client errors with 400, 413 or 416 and internal
//! errors with 500. Transport failures close the connection without an answer.

pub mod codec;
pub mod config;
pub mod connection;
pub mod content;
pub mod io;
pub mod protocol;
pub mod server;
pub mod watchdog;

#[cfg(test)]
mod test_util;
mod utils;
pub(crate) use utils::ensure;
