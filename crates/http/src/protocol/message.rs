use bytes::Bytes;

/// One item fed to a response body encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<D = Bytes> {
    Chunk(D),
    Eof,
}

impl<D> PayloadItem<D> {
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }
}
