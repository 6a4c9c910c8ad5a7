//! Framing codecs: line and header builders for the request side, body encoders for the response
//! side.
//!
//! The builders are push based: they are fed whatever the socket returned and report the offset in
//! the last buffer where their element ended, so the caller can roll the rest back.

mod chunk;
mod encoder;
mod header;
mod line;

pub use chunk::ChunkHeader;
pub use chunk::ChunkHeaderBuilder;
pub use encoder::ChunkedEncoder;
pub use encoder::PassthroughEncoder;
pub use encoder::PayloadEncoder;
pub use header::FromHeaderParts;
pub use header::HeaderBuilder;
pub(crate) use header::parse_header_line;
pub use line::LineBuilder;
