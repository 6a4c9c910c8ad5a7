//! Runtime settings of the server.
//!
//! All settings deserialize with `serde`, missing fields fall back to their defaults and durations
//! are expressed in whole seconds.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tcp: TcpSettings,
    pub http: HttpSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tcp.validate()?;
        self.http.validate()
    }
}

/// Settings of the transport layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpSettings {
    /// A connection without any read or write for this long is torn down.
    #[serde(with = "seconds")]
    pub idle_timeout: Duration,
    pub max_tcp_clients: usize,
    /// Size of one socket read, also the capacity of the read-ahead stack.
    pub read_write_buffer_size: usize,
    /// How often the watchdogs look for expired sessions.
    #[serde(with = "seconds")]
    pub watchdog_interval: Duration,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            max_tcp_clients: 1024,
            read_write_buffer_size: 8 * 1024,
            watchdog_interval: Duration::from_secs(3),
        }
    }
}

impl TcpSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        non_zero("tcp.read_write_buffer_size", self.read_write_buffer_size)?;
        non_zero("tcp.max_tcp_clients", self.max_tcp_clients)?;
        non_zero_duration("tcp.idle_timeout", self.idle_timeout)?;
        non_zero_duration("tcp.watchdog_interval", self.watchdog_interval)
    }
}

/// Settings of the HTTP layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// How long a parked keep-alive connection may wait for its next request.
    #[serde(with = "seconds")]
    pub keep_alive_timeout: Duration,
    pub max_keep_alive_connections: usize,
    /// Response bytes buffered before the encoder has to be chosen.
    pub max_body_size_in_memory: usize,
    pub max_body_chunk_size: usize,
    pub max_header_lines: usize,
    pub max_header_bytes: usize,
    pub max_range_header_length: usize,
    pub max_range_count: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            keep_alive_timeout: Duration::from_secs(15),
            max_keep_alive_connections: 128,
            max_body_size_in_memory: 4 * 1024,
            max_body_chunk_size: 8 * 1024,
            max_header_lines: 1024,
            max_header_bytes: 64 * 1024,
            max_range_header_length: 1024,
            max_range_count: 32,
        }
    }
}

impl HttpSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        non_zero_duration("http.keep_alive_timeout", self.keep_alive_timeout)?;
        non_zero("http.max_body_size_in_memory", self.max_body_size_in_memory)?;
        non_zero("http.max_body_chunk_size", self.max_body_chunk_size)?;
        non_zero("http.max_header_lines", self.max_header_lines)?;
        non_zero("http.max_header_bytes", self.max_header_bytes)?;
        non_zero("http.max_range_header_length", self.max_range_header_length)?;
        non_zero("http.max_range_count", self.max_range_count)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("setting {name} must be greater than zero")]
    Zero { name: &'static str },
}

fn non_zero(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { name });
    }
    Ok(())
}

fn non_zero_duration(name: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::Zero { name });
    }
    Ok(())
}

mod seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
