//! Hop-by-hop header filtering.
//!
//! Hop-by-hop headers are meaningful only for the single network hop they
//! travel on. Forwarding them verbatim would leak the proxy's own connection
//! semantics or break the next hop's framing, so they are stripped from both
//! the outbound request and the relayed response.
//!
//! | Header | Why it must not cross the proxy |
//! |--------|---------------------------------|
//! | `Connection`, `Keep-Alive` | describe this hop's connection lifetime |
//! | `Proxy-Authenticate`, `Proxy-Authorization` | addressed to the proxy itself |
//! | `TE`, `Trailers`, `Transfer-Encoding` | per-hop transfer framing |
//! | `Upgrade` | per-hop protocol switch |

use crate::codec::HeaderMap;

/// Headers excluded from forwarding in either direction, compared
/// case-insensitively.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Returns true if `name` is a hop-by-hop header, in any case.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Remove all hop-by-hop headers from a parsed header map.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    headers.retain(|name| !is_hop_by_hop(name));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_hop_by_hop_names_match() {
        for name in [
            "Connection",
            "Keep-Alive",
            "Proxy-Authenticate",
            "Proxy-Authorization",
            "TE",
            "Trailers",
            "Transfer-Encoding",
            "Upgrade",
        ] {
            assert!(is_hop_by_hop(name), "{name} should be hop-by-hop");
        }
    }

    #[test]
    fn test_matching_ignores_case() {
        assert!(is_hop_by_hop("CONNECTION"));
        assert!(is_hop_by_hop("keep-alive"));
        assert!(is_hop_by_hop("tRaNsFeR-eNcOdInG"));
    }

    #[test]
    fn test_end_to_end_headers_pass() {
        assert!(!is_hop_by_hop("Host"));
        assert!(!is_hop_by_hop("Content-Type"));
        assert!(!is_hop_by_hop("Authorization"));
        assert!(!is_hop_by_hop("X-Forwarded-For"));
    }

    #[test]
    fn test_strip_removes_only_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("Connection", "keep-alive");
        headers.insert("Content-Type", "text/plain");
        headers.insert("KEEP-ALIVE", "timeout=5");
        headers.insert("Authorization", "Bearer token");
        headers.insert("Transfer-Encoding", "chunked");
        strip_hop_by_hop(&mut headers);

        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Content-Type", "Authorization"]);
    }
}
