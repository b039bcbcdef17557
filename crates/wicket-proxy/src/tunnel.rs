//! CONNECT tunnelling.
//!
//! Handles `CONNECT host:port` requests: dials the target, acknowledges with
//! `200 Connection Established`, then relays bytes in both directions without
//! interpreting them. The tunnel carries whatever the client speaks next,
//! typically TLS.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::{ProxyError, Result};

/// Parse an authority-form CONNECT target into host and port.
///
/// A missing port defaults to 443. Returns `None` for an empty host or an
/// unparseable port.
pub(crate) fn parse_target(target: &str) -> Option<(&str, u16)> {
    match target.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Some((host, port.parse().ok()?)),
        Some(_) => None,
        None if !target.is_empty() => Some((target, 443)),
        None => None,
    }
}

/// Dial the CONNECT target with a timeout.
async fn dial(target: &str, connect_timeout: Duration) -> Result<TcpStream> {
    let (host, port) = parse_target(target).ok_or_else(|| ProxyError::BadTarget {
        target: target.to_string(),
    })?;

    match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProxyError::Connect {
            target: target.to_string(),
            source: e,
        }),
        Err(_) => Err(ProxyError::Connect {
            target: target.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timed out"),
        }),
    }
}

/// Handle a CONNECT request on an accepted client connection.
///
/// On dial failure a `502 Bad Gateway` status line is written best-effort
/// and the error is returned. On success the client gets
/// `200 Connection Established` and the connection becomes a raw tunnel
/// until either direction closes.
pub(crate) async fn handle_connect(
    mut client: TcpStream,
    target: &str,
    connect_timeout: Duration,
) -> Result<()> {
    let upstream = match dial(target, connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            // Best-effort: the client may already be gone.
            client
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                .await
                .ok();
            return Err(e);
        }
    };

    client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    client.flush().await?;

    relay(client, upstream, target).await;
    Ok(())
}

/// Relay bytes between the client and the tunnel target.
///
/// The tunnel ends as soon as the *first* copy direction finishes; data
/// still in flight on the other direction may be truncated. A copy error
/// counts as a finished direction and is treated like a peer-initiated
/// close.
async fn relay(client: TcpStream, upstream: TcpStream, target: &str) {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut upstream_read, mut upstream_write) = upstream.into_split();

    tokio::select! {
        result = tokio::io::copy(&mut client_read, &mut upstream_write) => {
            match result {
                Ok(n) => debug!(target = %target, bytes = n, "client->target direction ended"),
                Err(e) => debug!(target = %target, error = %e, "client->target direction ended"),
            }
        }
        result = tokio::io::copy(&mut upstream_read, &mut client_write) => {
            match result {
                Ok(n) => debug!(target = %target, bytes = n, "target->client direction ended"),
                Err(e) => debug!(target = %target, error = %e, "target->client direction ended"),
            }
        }
    }

    debug!(target = %target, "tunnel closed");
}
