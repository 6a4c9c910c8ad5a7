//! Serves a directory over HTTP/1.1.
//!
//! Usage: `micro-httpd [CONFIG.json]`

mod config;

use config::ServerConfig;
use micro_httpd::config::Settings;
use micro_httpd::content::{Aggregated, FileSystemSource, NoContent, Static, StaticRange, VirtualHosts};
use micro_httpd::server::Server;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(Path::new(&path))?,
        None => ServerConfig::default(),
    };

    let subscriber = FmtSubscriber::builder().with_env_filter(EnvFilter::new(&config.log_level)).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut content = VirtualHosts::new();
    for (matcher, root) in config.virtual_hosts()? {
        info!(host = ?matcher, root = %root.display(), "serving directory");
        content.push(matcher, site(&root, &config.settings));
    }
    let server = Server::new(config.settings, Arc::new(content))?;

    let listener = match TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, addr = %config.listen, "bind server error");
            return Err(e.into());
        }
    };

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
        }
        signal.cancel();
    });

    server.serve(listener, shutdown).await?;
    Ok(())
}

fn site(root: &Path, settings: &Settings) -> Aggregated {
    let source = Arc::new(FileSystemSource::new(root));
    Aggregated::new()
        .with(StaticRange::new(Arc::clone(&source), settings))
        .with(Static::new(source, settings))
        .with(NoContent)
}
