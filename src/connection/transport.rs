//! Transport socket layer
//!
//! The connector reaches its peer through a [`Transport`]: resolve, connect
//! with a deadline, hand back a stream for the TLS engine to own. The
//! production implementation is [`TcpTransport`] over `std::net::TcpStream`.
//!
//! Resolution can yield several candidate addresses (IPv4 and IPv6); they
//! are tried in resolver order and the first successful connect wins. When
//! none connect, the last attempt's error is surfaced.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Connects transport streams for the TLS engine to run on.
pub trait Transport {
    /// Stream type handed to the engine.
    type Stream;

    /// Connects to `host:port`, bounded by `timeout`.
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<Self::Stream>;
}

/// Blocking TCP transport.
///
/// The connect deadline is also installed as the socket's send-side timeout,
/// so a peer that stops draining eventually surfaces as a zero-progress
/// write instead of a hung thread. `TCP_NODELAY` is set best-effort; small
/// request/response exchanges should not wait on Nagle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;

    fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
        let candidates = (host, port).to_socket_addrs()?;

        let mut last_err: Option<io::Error> = None;
        for addr in candidates {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(timeout))?;
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(%addr, "transport connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "candidate address failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no addresses resolved for {}:{}", host, port),
            )
        }))
    }
}
