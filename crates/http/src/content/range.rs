//! `Range: bytes=...` parsing.
//!
//! Parsing only checks syntax, a syntax error is a malformed request. Whether a range can be
//! satisfied is decided against the resource length in [`ByteRange::resolve`].

use crate::ensure;
use crate::protocol::{HttpError, ParseError};
use std::fmt;

/// One requested range, as written by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `from-to`, both inclusive.
    Bounded { from: u64, to: u64 },
    /// `from-`, up to the end of the resource.
    From { from: u64 },
    /// `-length`, the last `length` bytes.
    Suffix { length: u64 },
}

/// An absolute inclusive range within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Parses a `Range` header value, returning the ranges in request order.
    pub fn parse_header(value: &str) -> Result<Vec<ByteRange>, ParseError> {
        let value = value.trim();
        let Some(specs) = value.strip_prefix("bytes=") else {
            return Err(ParseError::invalid_range(format!("unsupported range unit in {value:?}")));
        };

        specs.split(',').map(str::trim).filter(|spec| !spec.is_empty()).map(Self::parse).collect()
    }

    fn parse(spec: &str) -> Result<Self, ParseError> {
        let Some((from, to)) = spec.split_once('-') else {
            return Err(ParseError::invalid_range(format!("missing '-' in {spec:?}")));
        };

        match (parse_position(from)?, parse_position(to)?) {
            (Some(from), Some(to)) => {
                ensure!(from <= to, ParseError::invalid_range(format!("{spec:?} ends before it starts")));
                Ok(Self::Bounded { from, to })
            }
            (Some(from), None) => Ok(Self::From { from }),
            (None, Some(length)) => Ok(Self::Suffix { length }),
            (None, None) => Err(ParseError::invalid_range(format!("{spec:?} has no bounds"))),
        }
    }

    /// The absolute range within a resource of `length` bytes.
    ///
    /// An end past the resource is clamped to its last byte, a suffix longer than the resource
    /// selects all of it.
    pub fn resolve(self, length: u64) -> Result<ResolvedRange, HttpError> {
        ensure!(length > 0, HttpError::range_not_satisfiable("empty resource"));

        match self {
            Self::Bounded { from, to } => {
                ensure!(from < length, HttpError::range_not_satisfiable(format!("{self} starts beyond {length}")));
                Ok(ResolvedRange { start: from, end: to.min(length - 1) })
            }
            Self::From { from } => {
                ensure!(from < length, HttpError::range_not_satisfiable(format!("{self} starts beyond {length}")));
                Ok(ResolvedRange { start: from, end: length - 1 })
            }
            Self::Suffix { length: 0 } => Err(HttpError::range_not_satisfiable("empty suffix range")),
            Self::Suffix { length: suffix } => {
                Ok(ResolvedRange { start: length - suffix.min(length), end: length - 1 })
            }
        }
    }
}

fn parse_position(text: &str) -> Result<Option<u64>, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    ensure!(text.bytes().all(|b| b.is_ascii_digit()), ParseError::invalid_range(format!("{text:?} is not a position")));
    text.parse().map(Some).map_err(ParseError::invalid_range)
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded { from, to } => write!(f, "{from}-{to}"),
            Self::From { from } => write!(f, "{from}-"),
            Self::Suffix { length } => write!(f, "-{length}"),
        }
    }
}

impl ResolvedRange {
    pub fn len(&self) -> u64 {
        if self.is_empty() { 0 } else { self.end - self.start + 1 }
    }

    /// Ranges from [`ByteRange::resolve`] are never empty, only hand-built ones can end before they start.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// The `Content-Range` value for a resource of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    #[test]
    fn test_parse_forms() {
        let ranges = ByteRange::parse_header("bytes=0-9, 100-, -20").unwrap();
        assert_eq!(
            ranges,
            vec![ByteRange::Bounded { from: 0, to: 9 }, ByteRange::From { from: 100 }, ByteRange::Suffix { length: 20 }]
        );
        assert!(ByteRange::parse_header("bytes=").unwrap().is_empty());
    }

    #[test]
    fn test_resolved_len() {
        assert_eq!(ResolvedRange { start: 3, end: 7 }.len(), 5);
        assert_eq!(ResolvedRange { start: 9, end: 9 }.len(), 1);

        let backwards = ResolvedRange { start: 5, end: 4 };
        assert!(backwards.is_empty());
        assert_eq!(backwards.len(), 0);
    }

    #[test]
    fn test_parse_errors() {
        for value in ["items=0-1", "bytes=-", "bytes=5-1", "bytes=a-b", "bytes=1-2-3", "bytes=+1-2", "bytes=12"] {
            let result = ByteRange::parse_header(value);
            assert!(matches!(result, Err(ParseError::InvalidRange { .. })), "{value:?}");
        }
    }

    #[test]
    fn test_resolve() {
        let resolve = |range: ByteRange| range.resolve(10).unwrap();
        assert_eq!(resolve(ByteRange::Bounded { from: 3, to: 7 }), ResolvedRange { start: 3, end: 7 });
        assert_eq!(resolve(ByteRange::Bounded { from: 3, to: 70 }), ResolvedRange { start: 3, end: 9 });
        assert_eq!(resolve(ByteRange::From { from: 9 }), ResolvedRange { start: 9, end: 9 });
        assert_eq!(resolve(ByteRange::Suffix { length: 4 }), ResolvedRange { start: 6, end: 9 });
        assert_eq!(resolve(ByteRange::Suffix { length: 40 }), ResolvedRange { start: 0, end: 9 });
        assert!(!resolve(ByteRange::From { from: 9 }).is_empty());
    }

    #[test]
    fn test_unsatisfiable() {
        for range in [
            ByteRange::Bounded { from: 10, to: 12 },
            ByteRange::From { from: 10 },
            ByteRange::Suffix { length: 0 },
        ] {
            let e = range.resolve(10).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::RangeNotSatisfiable, "{range}");
        }
        assert!(matches!(ByteRange::From { from: 0 }.resolve(0), Err(HttpError::RangeNotSatisfiable { .. })));
    }

    #[test]
    fn test_content_range() {
        let range = ResolvedRange { start: 3, end: 7 };
        assert_eq!(range.len(), 5);
        assert_eq!(range.content_range(10), "bytes 3-7/10");
    }
}
