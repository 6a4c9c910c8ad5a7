//! Per-host content selected by the request's `Host` header.

use crate::content::Content;
use crate::protocol::{HttpError, HttpRequest, HttpResponse};
use async_trait::async_trait;
use http::header::HOST;
use regex::Regex;
use std::fmt;
use tracing::trace;

/// Which host names a virtual host answers for.
///
/// Names are compared without the port of the `Host` header.
#[derive(Debug, Clone)]
pub enum HostMatcher {
    Any,
    /// ASCII case-insensitive equality.
    Exact(String),
    Pattern(Regex),
}

impl HostMatcher {
    pub fn exact(name: impl Into<String>) -> Self {
        Self::Exact(name.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Pattern)
    }

    pub fn is_match(&self, host: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(name) => name.eq_ignore_ascii_case(host),
            Self::Pattern(regex) => regex.is_match(host),
        }
    }
}

/// The host name of a `Host` header value, `[v6]` literals keep their brackets.
pub(crate) fn host_name(value: &str) -> &str {
    let value = value.trim();
    if value.starts_with('[') {
        return value.find(']').map_or(value, |end| &value[..=end]);
    }
    match value.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => value,
    }
}

/// Dispatches to the content of the first virtual host matching the request.
///
/// A request no host matches is a bad request. A missing `Host` header is matched as the empty
/// name, so only [`HostMatcher::Any`] and patterns accepting `""` take it.
#[derive(Default)]
pub struct VirtualHosts {
    hosts: Vec<(HostMatcher, Box<dyn Content>)>,
}

impl VirtualHosts {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, matcher: HostMatcher, content: impl Content + 'static) -> Self {
        self.push(matcher, content);
        self
    }

    pub fn push(&mut self, matcher: HostMatcher, content: impl Content + 'static) {
        self.hosts.push((matcher, Box::new(content)));
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    fn select(&self, host: &str) -> Option<&dyn Content> {
        self.hosts.iter().find(|(matcher, _)| matcher.is_match(host)).map(|(_, content)| content.as_ref())
    }
}

#[async_trait]
impl Content for VirtualHosts {
    async fn serve(&self, request: &mut HttpRequest<'_>, response: &mut HttpResponse<'_>) -> Result<bool, HttpError> {
        let host = request.header().entries().get(HOST.as_str()).map(host_name).unwrap_or_default().to_string();

        let Some(content) = self.select(&host) else {
            return Err(HttpError::UnknownHost { host });
        };
        trace!(%host, "virtual host selected");
        content.serve(request, response).await
    }
}

impl fmt::Debug for VirtualHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.hosts.iter().map(|(matcher, _)| matcher)).finish()
    }
}
