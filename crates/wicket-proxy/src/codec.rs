//! HTTP request preamble parsing.
//!
//! Parses the raw bytes of a client's first read into a request line and a
//! header section. The parser is deliberately lenient: header lines without a
//! colon (or with a colon in position zero) are skipped rather than rejected,
//! and only the request line itself can make a preamble malformed.

/// Ordered, case-insensitive header mapping.
///
/// Insertion order is preserved. Inserting a name that is already present
/// overwrites the value in place (last write wins) instead of accumulating
/// multiple values. This is a deliberate simplification, not RFC-exact
/// multi-value header semantics.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, overwriting any existing value for the same
    /// (case-insensitively compared) name. The original position and
    /// spelling of an overwritten header are kept.
    pub fn insert(&mut self, name: &str, value: &str) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            entry.1 = value.to_string();
        } else {
            self.entries.push((name.to_string(), value.to_string()));
        }
    }

    /// Case-insensitive header lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Keep only the headers for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(n, _)| keep(n));
    }

    /// Number of headers in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parsed request line and header section of a client request.
///
/// The body is not part of the preamble; body bytes that arrived in the same
/// read live past [`find_body_offset`] in the raw buffer.
#[derive(Debug, Clone)]
pub struct Preamble {
    /// HTTP method token, verbatim from the request line.
    pub method: String,

    /// Request target: absolute-form URI, origin-form path, or
    /// authority-form `host:port` for CONNECT.
    pub target: String,

    /// Protocol version token (e.g. `HTTP/1.1`).
    pub version: String,

    /// Header section, in arrival order.
    pub headers: HeaderMap,
}

impl Preamble {
    /// Parse a raw preamble into its components.
    ///
    /// Returns `None` when the request line has fewer than three
    /// space-delimited tokens; the connection should then be dropped without
    /// a response. Header parsing stops at the first blank line.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut lines = raw.split("\r\n");

        let request_line = lines.next()?;
        let mut tokens = request_line.split_whitespace();
        let method = tokens.next()?.to_string();
        let target = tokens.next()?.to_string();
        let version = tokens.next()?.to_string();

        let mut headers = HeaderMap::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            match line.split_once(':') {
                Some((name, value)) if !name.is_empty() => {
                    headers.insert(name.trim(), value.trim());
                }
                // No colon, or colon in position zero: not a header, skip.
                _ => {}
            }
        }

        Some(Self {
            method,
            target,
            version,
            headers,
        })
    }

    /// Declared request body length.
    ///
    /// A missing or non-numeric `Content-Length` yields 0.
    pub fn content_length(&self) -> usize {
        self.headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// The `Host` header, if present.
    pub fn host(&self) -> Option<&str> {
        self.headers.get("host")
    }
}

/// Byte offset of the first body byte in a raw request buffer.
///
/// Returns the position just past the `\r\n\r\n` header terminator, or
/// `None` when the buffer does not contain a complete header section.
pub fn find_body_offset(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|idx| idx + 4)
}
