//! Proxy server lifecycle and connection dispatch.
//!
//! Owns the listening socket, accepts client connections, and routes each
//! one to the CONNECT tunnel or the plain-HTTP forwarder based on the
//! request method.
//!
//! # Lifecycle
//!
//! ```text
//! ProxyServer::new(config)
//!       |
//!       v
//! ProxyServer::start() --> ProxyHandle
//!       |                       |
//!       v                       |
//! Accept loop, one task         |
//! per connection                v
//!       |               ProxyHandle::shutdown()
//!       |                       |
//!       v                       v
//! Graceful shutdown <-----------+
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::codec::Preamble;
use crate::{forward, tunnel, ProxyError, Result};

/// Size of the single read used to capture a request's preamble.
///
/// The preamble is expected to fit in one read; anything past the blank
/// line in the same buffer is treated as the start of the body.
const READ_BUFFER_SIZE: usize = 8192;

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Listener bind address.
    /// Default: `0.0.0.0:8888`
    pub bind_addr: SocketAddr,

    /// Upstream TCP connection timeout, applied when dialing CONNECT targets.
    /// Default: 30 seconds
    pub connect_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ProxyConfig {
    /// Create a config listening on all interfaces at the given port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Default::default()
        }
    }
}

/// Handle for controlling a running proxy server.
pub struct ProxyHandle {
    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,

    /// Join handle for the server task.
    join_handle: Option<tokio::task::JoinHandle<Result<()>>>,

    /// Actual listener address, with the OS-assigned port when the
    /// configured port was 0.
    local_addr: SocketAddr,
}

impl ProxyHandle {
    /// Check if the server is still running.
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Get the listener address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shut down the proxy server gracefully.
    ///
    /// Signals the accept loop to stop via the shutdown channel. In-flight
    /// connection tasks are detached and finish on their own. If the signal
    /// cannot be delivered (receiver dropped), the task is aborted.
    ///
    /// # Errors
    /// Currently infallible; always returns `Ok`.
    pub async fn shutdown(mut self) -> Result<()> {
        let signal_sent = if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).is_ok()
        } else {
            false
        };

        if let Some(handle) = self.join_handle.take() {
            if signal_sent {
                // Give the task time to respond to the shutdown signal.
                match tokio::time::timeout(Duration::from_secs(2), handle).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) if e.is_cancelled() => {}
                    Ok(Err(_)) => {} // Task panicked, already logged
                    Err(_) => {
                        // Timeout; the task will stop once the accept
                        // loop observes the dropped listener.
                    }
                }
            } else {
                handle.abort();
            }
        }

        Ok(())
    }
}

/// Forward proxy server.
///
/// Holds the configuration and the shared upstream HTTP client used by the
/// plain-HTTP forwarding path.
pub struct ProxyServer {
    /// Server configuration.
    config: ProxyConfig,

    /// Shared upstream client, reused across all forwarded requests.
    http: reqwest::Client,
}

impl ProxyServer {
    /// Create a new proxy server.
    ///
    /// The upstream client is configured as a transparent hop: redirects
    /// are passed back to the caller rather than followed, and response
    /// bodies are relayed as received.
    ///
    /// # Errors
    /// * `ProxyError::Internal` - If the upstream HTTP client cannot be
    ///   constructed (e.g. no TLS backend available).
    ///
    /// # Example
    /// ```ignore
    /// let server = ProxyServer::new(ProxyConfig::default())?;
    /// let handle = server.start().await?;
    /// // ... later ...
    /// handle.shutdown().await?;
    /// ```
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            // Ignore proxy environment variables; this process is the proxy.
            .no_proxy()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Start the proxy server as a background task.
    ///
    /// The listener is bound before the task is spawned, so the actual
    /// OS-assigned port is known immediately via [`ProxyHandle::local_addr`].
    ///
    /// # Errors
    /// * `ProxyError::Bind` - If binding the listener fails (e.g. address
    ///   already in use).
    pub async fn start(self) -> Result<ProxyHandle> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| ProxyError::Bind {
                addr: self.config.bind_addr,
                source: e,
            })?;
        let local_addr = listener.local_addr().map_err(|e| ProxyError::Bind {
            addr: self.config.bind_addr,
            source: e,
        })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(async move {
            tokio::select! {
                result = self.run_on(listener) => result,
                _ = shutdown_rx => Ok(()),
            }
        });

        Ok(ProxyHandle {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
            local_addr,
        })
    }

    /// Run the proxy server until a fatal error occurs.
    ///
    /// Alternative to `start()` for blocking operation.
    ///
    /// # Errors
    /// * `ProxyError::Bind` - If binding to the configured address fails.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| ProxyError::Bind {
                addr: self.config.bind_addr,
                source: e,
            })?;
        self.run_on(listener).await
    }

    /// Run the accept loop on a pre-bound listener.
    pub async fn run_on(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Proxy server listening");

        loop {
            let (client, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let http = self.http.clone();
            let connect_timeout = self.config.connect_timeout;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(client, http, connect_timeout).await {
                    warn!(peer = %peer, error = %e, "Connection handler finished with error");
                }
            });
        }
    }
}

/// Handle one accepted client connection.
///
/// Reads the request preamble in a single read, parses it, and dispatches:
/// CONNECT requests go to the tunnel, everything else to the forwarder.
/// A connection whose first read yields no parseable request is dropped
/// without a response.
async fn handle_connection(
    mut client: TcpStream,
    http: reqwest::Client,
    connect_timeout: Duration,
) -> Result<()> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let n = client.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }
    buf.truncate(n);

    let raw = String::from_utf8_lossy(&buf);
    let Some(preamble) = Preamble::parse(&raw) else {
        debug!("Dropping connection with unparseable request");
        return Ok(());
    };

    info!(method = %preamble.method, target = %preamble.target, "Handling request");

    if preamble.method.eq_ignore_ascii_case("CONNECT") {
        tunnel::handle_connect(client, &preamble.target, connect_timeout).await
    } else {
        forward::handle_forward(&mut client, &http, &preamble, &buf).await
    }
}
