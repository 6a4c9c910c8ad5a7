//! Where static content comes from.

use crate::protocol::HttpError;
use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use std::collections::HashMap;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::trace;

/// An opened resource.
#[derive(Debug)]
pub struct StaticFile<R> {
    pub reader: R,
    pub length: u64,
    pub content_type: Mime,
}

/// Resolves request paths to readable, seekable resources.
#[async_trait]
pub trait StaticSource: Send + Sync {
    type Reader: AsyncRead + AsyncSeek + Send + Unpin;

    /// Opens the resource at `path`, `None` when there is none.
    async fn open(&self, path: &str) -> Result<Option<StaticFile<Self::Reader>>, HttpError>;
}

/// Default documents of a directory, in lookup order.
const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

/// Serves files below a root directory.
///
/// A path ending with `/` maps to the first existing [`INDEX_FILES`] entry of that directory, paths
/// with `..` segments resolve to nothing.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The files `path` may name, in lookup order.
    fn resolve(&self, path: &str) -> Option<Vec<PathBuf>> {
        let mut relative = PathBuf::new();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(segment) => relative.push(segment),
                Component::CurDir => {}
                _ => return None,
            }
        }

        let resolved = self.root.join(relative);
        if path.ends_with('/') || path.trim_start_matches('/').is_empty() {
            return Some(INDEX_FILES.iter().map(|index| resolved.join(index)).collect());
        }
        Some(vec![resolved])
    }

    async fn open_file(path: &Path) -> Result<Option<StaticFile<File>>, HttpError> {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => return Ok(None),
            Err(e) => return Err(HttpError::content(e)),
        };

        let metadata = file.metadata().await.map_err(HttpError::content)?;
        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(StaticFile { reader: file, length: metadata.len(), content_type: mime_from_path(path) }))
    }
}

#[async_trait]
impl StaticSource for FileSystemSource {
    type Reader = File;

    async fn open(&self, path: &str) -> Result<Option<StaticFile<File>>, HttpError> {
        let Some(candidates) = self.resolve(path) else {
            trace!(path, "reject path outside root");
            return Ok(None);
        };

        for candidate in &candidates {
            if let Some(file) = Self::open_file(candidate).await? {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }
}

/// Serves resources registered in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    resources: HashMap<String, (Bytes, Mime)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, path: impl Into<String>, content: impl Into<Bytes>, content_type: Mime) -> Self {
        self.insert(path, content, content_type);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Bytes>, content_type: Mime) {
        self.resources.insert(path.into(), (content.into(), content_type));
    }
}

#[async_trait]
impl StaticSource for MemorySource {
    type Reader = Cursor<Bytes>;

    async fn open(&self, path: &str) -> Result<Option<StaticFile<Cursor<Bytes>>>, HttpError> {
        Ok(self.resources.get(path).map(|(content, content_type)| StaticFile {
            length: content.len() as u64,
            reader: Cursor::new(content.clone()),
            content_type: content_type.clone(),
        }))
    }
}

/// The content type for a file name's extension.
pub(crate) fn mime_from_path(path: &Path) -> Mime {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html" | "htm") => mime::TEXT_HTML_UTF_8,
        Some("css") => mime::TEXT_CSS_UTF_8,
        Some("js" | "mjs") => mime::APPLICATION_JAVASCRIPT_UTF_8,
        Some("json") => mime::APPLICATION_JSON,
        Some("txt") => mime::TEXT_PLAIN_UTF_8,
        Some("xml") => mime::TEXT_XML,
        Some("csv") => mime::TEXT_CSV_UTF_8,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg" | "jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("bmp") => mime::IMAGE_BMP,
        Some("svg") => mime::IMAGE_SVG,
        Some("pdf") => mime::APPLICATION_PDF,
        Some("woff") => mime::FONT_WOFF,
        Some("woff2") => mime::FONT_WOFF2,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
