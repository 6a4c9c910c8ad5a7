use micro_httpd::config::{ConfigError, Settings};
use micro_httpd::content::HostMatcher;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("can't read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("can't parse {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error(transparent)]
    Invalid(#[from] ConfigError),

    #[error("invalid host name pattern {pattern:?}: {source}")]
    HostPattern { pattern: String, source: regex::Error },

    #[error("document root {path} is not a directory")]
    DocumentRoot { path: PathBuf },
}

/// The host names a virtual host answers for, `"any"`, `{ "exact": "example.com" }` or
/// `{ "regex": "^(www\\.)?example\\.com$" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostName {
    #[default]
    Any,
    Exact(String),
    Regex(String),
}

impl HostName {
    pub fn matcher(&self) -> Result<HostMatcher, LoadError> {
        match self {
            Self::Any => Ok(HostMatcher::Any),
            Self::Exact(name) => Ok(HostMatcher::exact(name)),
            Self::Regex(pattern) => {
                HostMatcher::pattern(pattern).map_err(|source| LoadError::HostPattern { pattern: pattern.clone(), source })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VirtualHostConfig {
    #[serde(default)]
    pub host_name: HostName,
    pub document_root: PathBuf,
}

/// Configuration of the server binary, every field is optional in the JSON file.
///
/// ```json
/// { "listen": "0.0.0.0:8080", "document_root": "/srv/www", "tcp": { "idle_timeout": 30 } }
/// ```
///
/// With `hosts`, requests are served from the document root of the first host matching their
/// `Host` header and `document_root` is ignored:
///
/// ```json
/// { "hosts": [
///     { "host_name": { "exact": "example.com" }, "document_root": "/srv/example" },
///     { "host_name": "any", "document_root": "/srv/default" }
/// ] }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub document_root: PathBuf,
    pub hosts: Vec<VirtualHostConfig>,
    /// An `EnvFilter` directive such as `info` or `micro_httpd=debug`.
    pub log_level: String,
    #[serde(flatten)]
    pub settings: Settings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            document_root: PathBuf::from("www"),
            hosts: Vec::new(),
            log_level: "info".to_string(),
            settings: Settings::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&text).map_err(|e| match e {
            LoadError::Parse { source, .. } => LoadError::Parse { path: path.to_path_buf(), source },
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self, LoadError> {
        let config: Self =
            serde_json::from_str(text).map_err(|source| LoadError::Parse { path: PathBuf::new(), source })?;
        config.settings.validate()?;
        config.virtual_hosts()?;
        Ok(config)
    }

    /// Matchers and document roots in lookup order, a single catch-all host on `document_root`
    /// when no hosts are configured.
    pub fn virtual_hosts(&self) -> Result<Vec<(HostMatcher, PathBuf)>, LoadError> {
        if self.hosts.is_empty() {
            return Ok(vec![(HostMatcher::Any, self.document_root.clone())]);
        }

        self.hosts
            .iter()
            .map(|host| {
                if !host.document_root.is_dir() {
                    return Err(LoadError::DocumentRoot { path: host.document_root.clone() });
                }
                Ok((host.host_name.matcher()?, host.document_root.clone()))
            })
            .collect()
    }
}
