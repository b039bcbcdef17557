//! HTTP/HTTPS forward proxy engine.
//!
//! `wicket-proxy` accepts client TCP connections speaking HTTP/1.1 and either
//! relays plain HTTP requests to an origin server, or opens a raw byte tunnel
//! for HTTPS traffic via the CONNECT method.
//!
//! # Connection Flow
//!
//! ```text
//! Client connects to proxy
//!         |
//!         v
//! Read request preamble (single 8 KiB read)
//!         |
//!         +-- CONNECT host:port --> dial target, reply 200, tunnel bytes
//!         |
//!         +-- other methods -----> rebuild request, forward to origin,
//!         |                        relay status/headers/body back
//!         |
//!         +-- malformed ---------> drop connection, no response
//! ```
//!
//! # Components
//!
//! - [`Preamble`]: parsed request line + header section
//! - [`codec::HeaderMap`]: ordered, case-insensitive header mapping
//! - [`ProxyServer`]: listener loop dispatching CONNECT vs. forward
//! - `tunnel`: CONNECT handler and bidirectional byte relay
//! - `forward`: plain-HTTP forwarding over a shared outbound client
//!
//! # Usage
//!
//! ```ignore
//! use wicket_proxy::{ProxyConfig, ProxyServer};
//!
//! let config = ProxyConfig {
//!     bind_addr: "0.0.0.0:8888".parse()?,
//!     ..Default::default()
//! };
//!
//! let server = ProxyServer::new(config)?;
//! server.run().await?;
//! ```
//!
//! # What this proxy does not do
//!
//! No client authentication, no caching, no HTTP/2, no client-side
//! keep-alive (one request per client connection), and no TLS interception:
//! CONNECT payloads are relayed verbatim, never inspected.

pub mod codec;
pub mod filter;

mod forward;
mod server;
mod tunnel;

pub use codec::{HeaderMap, Preamble};
pub use filter::is_hop_by_hop;
pub use server::{ProxyConfig, ProxyHandle, ProxyServer};

use std::net::SocketAddr;

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors that can occur in proxy operations.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Failed to bind the listening socket.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Outbound TCP connection to a CONNECT target failed.
    #[error("Connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The forwarded request could not be resolved to an absolute URI.
    #[error("Unresolvable request target: {target}")]
    BadTarget { target: String },

    /// The origin rejected or failed the forwarded request.
    #[error("Upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// I/O error on the client connection.
    #[error("Client I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
