//! Plain-HTTP forwarding.
//!
//! Rebuilds a parsed client request as an outbound request on the shared
//! HTTP client, dispatches it to the origin, and relays the origin's status
//! line, filtered headers, and body back onto the client socket.

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::codec::{find_body_offset, Preamble};
use crate::filter::is_hop_by_hop;
use crate::{ProxyError, Result};

/// Methods that conventionally carry a request body.
fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Resolve the request target into an absolute URL.
///
/// Targets carrying a scheme are used as-is, whatever the scheme (a
/// non-HTTP one fails upstream later). Origin-form targets are combined
/// with a non-empty `Host` header under the `http` scheme; an absent or
/// empty `Host` yields `None`, never a URL whose host leaks in from the
/// path. Returns `None` when no usable absolute URL results.
fn resolve_url(preamble: &Preamble) -> Option<reqwest::Url> {
    // Origin-form targets always start with '/'; everything else is taken
    // as absolute-form.
    let candidate = if preamble.target.starts_with('/') {
        let host = preamble.host().filter(|h| !h.is_empty())?;
        format!("http://{}{}", host, preamble.target)
    } else {
        preamble.target.clone()
    };
    reqwest::Url::parse(&candidate).ok()
}

/// Write a proxy-originated error response, e.g. `400 Bad Request`.
async fn write_error_response(client: &mut TcpStream, status: &str) -> std::io::Result<()> {
    let response = format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\n\r\n");
    client.write_all(response.as_bytes()).await?;
    client.flush().await
}

/// Collect the request body, reassembling bytes split across reads.
///
/// The initial read buffer may already hold part (or all) of the body after
/// the preamble; the rest is read from the client until `declared` bytes are
/// collected or the peer closes. A short body is accepted as-is.
async fn read_body(
    client: &mut (impl AsyncRead + Unpin),
    initial: &[u8],
    declared: usize,
) -> std::io::Result<Vec<u8>> {
    let mut body = vec![0u8; declared];
    let mut filled = 0;

    if let Some(offset) = find_body_offset(initial) {
        let preread = &initial[offset..];
        let n = preread.len().min(declared);
        body[..n].copy_from_slice(&preread[..n]);
        filled = n;
    }

    while filled < declared {
        let n = client.read(&mut body[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    body.truncate(filled);
    Ok(body)
}

/// Handle a non-CONNECT request on an accepted client connection.
///
/// An unresolvable target gets `400 Bad Request`; any upstream failure gets
/// a best-effort `502 Bad Gateway`. `initial` is the buffer from the
/// dispatcher's first read and may contain the start of the body.
pub(crate) async fn handle_forward(
    client: &mut TcpStream,
    http: &reqwest::Client,
    preamble: &Preamble,
    initial: &[u8],
) -> Result<()> {
    let Some(url) = resolve_url(preamble) else {
        write_error_response(client, "400 Bad Request").await.ok();
        return Err(ProxyError::BadTarget {
            target: preamble.target.clone(),
        });
    };

    match forward(client, http, preamble, initial, &url).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // Best-effort: the client may already be gone.
            write_error_response(client, "502 Bad Gateway").await.ok();
            Err(e)
        }
    }
}

async fn forward(
    client: &mut TcpStream,
    http: &reqwest::Client,
    preamble: &Preamble,
    initial: &[u8],
    url: &reqwest::Url,
) -> Result<()> {
    let method = Method::from_bytes(preamble.method.as_bytes())
        .map_err(|_| ProxyError::Internal(format!("Invalid HTTP method: {}", preamble.method)))?;

    let mut builder = http.request(method.clone(), url.clone());
    for (name, value) in preamble.headers.iter() {
        // Content-Type and Content-Length are re-added with the body below,
        // so the outbound framing cannot disagree with the actual payload.
        if is_hop_by_hop(name)
            || name.eq_ignore_ascii_case("content-type")
            || name.eq_ignore_ascii_case("content-length")
        {
            continue;
        }
        // A header that fails wire validation is dropped; it must not take
        // the whole request down with it.
        let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            debug!(url = %url, header = name, "dropping invalid header");
            continue;
        };
        builder = builder.header(header_name, header_value);
    }

    if carries_body(&method) {
        let declared = preamble.content_length();
        if declared > 0 {
            let body = read_body(client, initial, declared).await?;
            debug!(url = %url, declared, collected = body.len(), "request body collected");
            if let Some(content_type) = preamble.headers.get("content-type") {
                builder = builder.header("Content-Type", content_type);
            }
            builder = builder.body(body);
        }
    }

    // send() resolves once response headers are in; the body streams after,
    // so large responses never delay the status line.
    let response = builder.send().await.map_err(|source| ProxyError::Upstream {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in response.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(&String::from_utf8_lossy(value.as_bytes()));
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    client.write_all(head.as_bytes()).await?;

    let body = response.bytes().await.map_err(|source| ProxyError::Upstream {
        url: url.to_string(),
        source,
    })?;
    client.write_all(&body).await?;
    client.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preamble(raw: &str) -> Preamble {
        Preamble::parse(raw).unwrap()
    }

    // ========================================================================
    // URL Resolution Tests
    // ========================================================================

    #[test]
    fn test_resolve_url_absolute_form() {
        let p = preamble("GET http://example.com/path?q=1 HTTP/1.1\r\n\r\n");
        assert_eq!(
            resolve_url(&p).unwrap().as_str(),
            "http://example.com/path?q=1"
        );
    }

    #[test]
    fn test_resolve_url_origin_form_uses_host_header() {
        let p = preamble("GET /index.html HTTP/1.1\r\nHost: example.com:8080\r\n\r\n");
        assert_eq!(
            resolve_url(&p).unwrap().as_str(),
            "http://example.com:8080/index.html"
        );
    }

    #[test]
    fn test_resolve_url_no_host_fails() {
        let p = preamble("GET /index.html HTTP/1.1\r\nAccept: */*\r\n\r\n");
        assert!(resolve_url(&p).is_none());
    }

    #[test]
    fn test_resolve_url_unparseable_fails() {
        let p = preamble("GET /x HTTP/1.1\r\nHost: \r\n\r\n");
        assert!(resolve_url(&p).is_none());
    }

    #[test]
    fn test_resolve_url_empty_host_never_reads_host_from_path() {
        // With an empty Host, "http://" + "" + "/evil.com/" would normalize
        // to a URL whose host is the first path segment. Must resolve to
        // nothing instead.
        let p = preamble("GET /evil.com/ HTTP/1.1\r\nHost: \r\n\r\n");
        assert!(resolve_url(&p).is_none());
    }

    #[test]
    fn test_resolve_url_foreign_scheme_kept_absolute() {
        // Any target with a scheme counts as absolute; the Host header must
        // not be prepended to it. The non-HTTP scheme fails upstream later.
        let p = preamble("GET ftp://files.example.com/pub HTTP/1.1\r\nHost: other.example.com\r\n\r\n");
        assert_eq!(
            resolve_url(&p).unwrap().as_str(),
            "ftp://files.example.com/pub"
        );
    }

    #[test]
    fn test_resolve_url_scheme_inside_query_is_origin_form() {
        let p = preamble("GET /search?q=http://foo HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(
            resolve_url(&p).unwrap().as_str(),
            "http://example.com/search?q=http://foo"
        );
    }

    // ========================================================================
    // Body Reassembly Tests
    // ========================================================================

    #[tokio::test]
    async fn test_read_body_fully_in_initial_buffer() {
        let initial = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let mut rest: &[u8] = b"";
        let body = read_body(&mut rest, initial, 5).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_read_body_split_across_reads() {
        let initial = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nhel";
        let mut rest: &[u8] = b"lo world";
        let body = read_body(&mut rest, initial, 10).await.unwrap();
        assert_eq!(body, b"hello worl");
    }

    #[tokio::test]
    async fn test_read_body_none_in_initial_buffer() {
        let initial = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\n";
        let mut rest: &[u8] = b"data";
        let body = read_body(&mut rest, initial, 4).await.unwrap();
        assert_eq!(body, b"data");
    }

    #[tokio::test]
    async fn test_read_body_short_body_accepted() {
        let initial = b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\npartial";
        let mut rest: &[u8] = b""; // peer closes early
        let body = read_body(&mut rest, initial, 100).await.unwrap();
        assert_eq!(body, b"partial");
    }

    #[tokio::test]
    async fn test_read_body_ignores_excess_initial_bytes() {
        // More bytes in the buffer than Content-Length declares.
        let initial = b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcdef";
        let mut rest: &[u8] = b"";
        let body = read_body(&mut rest, initial, 3).await.unwrap();
        assert_eq!(body, b"abc");
    }

    // ========================================================================
    // Method Classification Tests
    // ========================================================================

    #[test]
    fn test_body_methods() {
        assert!(carries_body(&Method::POST));
        assert!(carries_body(&Method::PUT));
        assert!(carries_body(&Method::PATCH));
        assert!(!carries_body(&Method::GET));
        assert!(!carries_body(&Method::HEAD));
        assert!(!carries_body(&Method::DELETE));
    }
}
