//! Protocol types of one HTTP/1.1 exchange.
//!
//! - [`RequestHeader`] and [`HttpRequest`]: the parsed request and its lazily read body
//! - [`ResponseHeader`] and [`HttpResponse`]: the response and its buffering body writer
//! - [`HeaderEntries`]: ordered, case-insensitive header entries shared by both
//! - [`HttpError`], [`ParseError`] and [`SendError`]: the failures of an exchange, classified by
//!   [`ErrorKind`]

mod message;
pub use message::PayloadItem;

mod header;
pub use header::HeaderEntries;

mod request;
pub use request::HttpRequest;
pub use request::RequestHeader;

mod response;
pub use response::HttpResponse;
pub use response::ResponseHeader;

mod error;
pub use error::ErrorKind;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
