//! Single byte-range requests (`Range: bytes=start-end`).

use crate::error::{ProtocolError, ProtocolResult};

/// What to send for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// The whole file.
    Full,
    /// An inclusive byte range within the file.
    Partial {
        /// First byte.
        start: u64,
        /// Last byte, inclusive.
        end: u64,
    },
}

impl RangeRequest {
    /// Interprets a `Range` header for a file of `size` bytes.
    ///
    /// Only `bytes=<start>-` and `bytes=<start>-<end>` are honoured; an end
    /// past the last byte is clamped. Any other form (suffix ranges,
    /// multiple ranges, other units) is ignored and the full file is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::RangeNotSatisfiable`] if `start` is past the
    /// end of the file or after `end`.
    pub fn parse(header: Option<&str>, size: u64) -> ProtocolResult<Self> {
        let Some((start, end)) = header.and_then(split_range) else {
            return Ok(RangeRequest::Full);
        };
        let unsatisfiable = ProtocolError::RangeNotSatisfiable { size };

        if size == 0 || start >= size {
            return Err(unsatisfiable);
        }
        let end = end.map_or(size - 1, |e| e.min(size - 1));
        if start > end {
            return Err(unsatisfiable);
        }
        Ok(RangeRequest::Partial { start, end })
    }

    /// Returns `(offset, length)` of the bytes to send.
    #[must_use]
    pub fn span(self, size: u64) -> (u64, u64) {
        match self {
            RangeRequest::Full => (0, size),
            RangeRequest::Partial { start, end } => (start, end - start + 1),
        }
    }

    /// Returns the `Content-Range` value for a partial response.
    #[must_use]
    pub fn content_range(self, size: u64) -> Option<String> {
        match self {
            RangeRequest::Full => None,
            RangeRequest::Partial { start, end } => Some(format!("bytes {start}-{end}/{size}")),
        }
    }
}

/// Returns the `Content-Range` value for a 416 response.
#[must_use]
pub fn unsatisfied_content_range(size: u64) -> String {
    format!("bytes */{size}")
}

fn split_range(header: &str) -> Option<(u64, Option<u64>)> {
    let ranges = header.trim().strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }
    let (start, end) = ranges.split_once('-')?;
    let start = parse_digits(start.trim())?;
    let end = match end.trim() {
        "" => None,
        e => Some(parse_digits(e)?),
    };
    Some((start, end))
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn no_header_or_unsupported_form_is_full() {
        assert_eq!(RangeRequest::parse(None, 10), Ok(RangeRequest::Full));
        assert_eq!(RangeRequest::parse(Some("bytes=-5"), 10), Ok(RangeRequest::Full));
        assert_eq!(RangeRequest::parse(Some("bytes=0-1,3-4"), 10), Ok(RangeRequest::Full));
        assert_eq!(RangeRequest::parse(Some("items=0-1"), 10), Ok(RangeRequest::Full));
    }

    #[test]
    fn bounded_and_open_ranges() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=2-5"), 10),
            Ok(RangeRequest::Partial { start: 2, end: 5 })
        );
        assert_eq!(
            RangeRequest::parse(Some("bytes=7-"), 10),
            Ok(RangeRequest::Partial { start: 7, end: 9 })
        );
        assert_eq!(
            RangeRequest::parse(Some("bytes=7-100"), 10),
            Ok(RangeRequest::Partial { start: 7, end: 9 })
        );
    }

    #[test]
    fn unsatisfiable_ranges() {
        let err = Err(ProtocolError::RangeNotSatisfiable { size: 10 });
        assert_eq!(RangeRequest::parse(Some("bytes=10-"), 10), err);
        assert_eq!(RangeRequest::parse(Some("bytes=5-2"), 10), err);
        assert!(RangeRequest::parse(Some("bytes=0-"), 0).is_err());
    }

    #[test]
    fn headers_for_responses() {
        let range = RangeRequest::Partial { start: 2, end: 5 };
        assert_eq!(range.span(10), (2, 4));
        assert_eq!(range.content_range(10).as_deref(), Some("bytes 2-5/10"));
        assert_eq!(RangeRequest::Full.span(10), (0, 10));
        assert_eq!(RangeRequest::Full.content_range(10), None);
        assert_eq!(unsatisfied_content_range(10), "bytes */10");
    }

    proptest! {
        #[test]
        fn partial_spans_stay_inside_file(size in 1u64..10_000, start in 0u64..12_000, len in 0u64..12_000) {
            let header = format!("bytes={start}-{}", start + len);
            match RangeRequest::parse(Some(&header), size) {
                Ok(range) => {
                    let (offset, n) = range.span(size);
                    prop_assert!(n >= 1);
                    prop_assert!(offset + n <= size);
                }
                Err(_) => prop_assert!(start >= size),
            }
        }
    }
}
