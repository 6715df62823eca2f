//! rustls-backed TLS engine
//!
//! Drives a sans-IO `rustls::ClientConnection` over the blocking
//! `std::net::TcpStream` it owns. Handshake progress, plaintext reads, and
//! plaintext writes all follow the same pattern: move records between the
//! socket and the connection, then let `rustls` advance its state.
//!
//! Timeouts are socket deadlines (`set_read_timeout`/`set_write_timeout`);
//! an expired deadline surfaces as `WouldBlock`/`TimedOut` from the socket
//! call. During reads and writes that is classified into the signal enums
//! (`Timeout`, `Stalled`); during the handshake it fails the session, since
//! retrying would turn the configured bound into a pacing interval.
//!
//! Client identity rides the one client-controlled opaque-bytes ClientHello
//! surface rustls exposes: the protocol-negotiation extension list. The
//! identity becomes a single length-prefixed entry there, which fleet
//! gateways read during admission. Entries are capped at 255 bytes by the
//! extension's framing; an empty identity omits the extension.

use crate::connection::TlsOptions;
use crate::engine::{
    EngineError, HandshakeStep, ReadSignal, SessionOptions, TlsEngine, TlsSession, WriteSignal,
};
use crate::identity::ClientIdentity;
use rustls::{ClientConfig, ClientConnection};
use rustls_pki_types::ServerName;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

/// Longest identity the protocol-negotiation extension can frame.
const MAX_IDENTITY_LEN: usize = 255;

/// Production TLS engine backed by rustls.
///
/// Built once from [`TlsOptions`] (trust roots, pinned protocol version,
/// optional client certificate) and reused for every session; per-connection
/// state lives in [`SessionOptions`].
#[derive(Clone)]
pub struct RustlsEngine {
    config: Arc<ClientConfig>,
}

impl RustlsEngine {
    /// Creates an engine from compiled TLS options.
    pub fn new(options: &TlsOptions) -> Self {
        RustlsEngine {
            config: options.client_config(),
        }
    }

    /// Per-session config: the shared base, plus the identity entry when one
    /// is present.
    fn session_config(&self, identity: &ClientIdentity) -> Result<Arc<ClientConfig>, EngineError> {
        if identity.is_empty() {
            return Ok(self.config.clone());
        }
        if identity.len() > MAX_IDENTITY_LEN {
            return Err(EngineError::Config(format!(
                "client identity is {} bytes; the handshake extension carries at most {}",
                identity.len(),
                MAX_IDENTITY_LEN
            )));
        }
        let mut config = (*self.config).clone();
        config.alpn_protocols = vec![identity.as_bytes().to_vec()];
        Ok(Arc::new(config))
    }
}

impl std::fmt::Debug for RustlsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsEngine")
            .field("config", &"<ClientConfig>")
            .finish()
    }
}

impl TlsEngine<TcpStream> for RustlsEngine {
    type Session = RustlsSession;

    fn open(&self, stream: TcpStream, options: &SessionOptions) -> Result<RustlsSession, EngineError> {
        let config = self.session_config(&options.identity)?;

        let server_name = ServerName::try_from(options.server_name.clone()).map_err(|e| {
            EngineError::Config(format!(
                "invalid server name '{}': {}",
                options.server_name, e
            ))
        })?;

        let conn = ClientConnection::new(config, server_name)
            .map_err(|e| EngineError::Config(format!("session setup failed: {}", e)))?;

        stream
            .set_read_timeout(normalize(options.handshake_recv_timeout))
            .map_err(EngineError::Io)?;

        Ok(RustlsSession { conn, stream })
    }
}

/// A live rustls session bound to its TCP stream.
pub struct RustlsSession {
    conn: ClientConnection,
    stream: TcpStream,
}

impl RustlsSession {
    /// Negotiated protocol version, once the handshake has completed.
    pub fn protocol_version(&self) -> Option<rustls::ProtocolVersion> {
        self.conn.protocol_version()
    }

    /// Negotiated cipher suite, once the handshake has completed.
    pub fn cipher_suite(&self) -> Option<rustls::SupportedCipherSuite> {
        self.conn.negotiated_cipher_suite()
    }

    /// Remote socket address.
    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Pushes queued TLS records to the socket. Returns `Ok(false)` when the
    /// send deadline expired with records still pending.
    fn flush_tls(&mut self) -> Result<bool, EngineError> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.stream) {
                Ok(0) => {
                    return Err(EngineError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes while records were pending",
                    )))
                }
                Ok(_) => {}
                Err(e) if is_would_block(&e) => return Ok(false),
                Err(e) => return Err(EngineError::Io(e)),
            }
        }
        Ok(true)
    }

    /// Lets rustls consume freshly read records; on failure the queued alert
    /// is pushed to the peer before the error is surfaced.
    fn process_packets(&mut self) -> Result<rustls::IoState, EngineError> {
        match self.conn.process_new_packets() {
            Ok(state) => Ok(state),
            Err(e) => {
                let _ = self.conn.write_tls(&mut self.stream);
                Err(EngineError::Fatal(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for RustlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsSession")
            .field("peer_addr", &self.stream.peer_addr().ok())
            .field("handshaking", &self.conn.is_handshaking())
            .finish()
    }
}

impl TlsSession for RustlsSession {
    fn step(&mut self) -> Result<HandshakeStep, EngineError> {
        // Flush first so the final client flight leaves the socket before
        // the handshake is declared complete.
        if self.conn.wants_write() {
            self.flush_tls()?;
            return if self.conn.is_handshaking() || self.conn.wants_write() {
                Ok(HandshakeStep::WantWrite)
            } else {
                Ok(HandshakeStep::Done)
            };
        }

        if !self.conn.is_handshaking() {
            return Ok(HandshakeStep::Done);
        }

        match self.conn.read_tls(&mut self.stream) {
            Ok(0) => Err(EngineError::Fatal(
                "peer closed the transport during the handshake".into(),
            )),
            Ok(_) => {
                self.process_packets()?;
                Ok(HandshakeStep::WantRead)
            }
            // The socket blocks unless a handshake receive deadline was
            // configured, so would-block here means that deadline expired.
            Err(e) if is_would_block(&e) => Err(EngineError::Io(io::Error::new(
                e.kind(),
                "handshake receive deadline expired",
            ))),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadSignal, EngineError> {
        if buf.is_empty() {
            return Ok(ReadSignal::Data(0));
        }
        loop {
            // Drain plaintext rustls already holds before touching the socket.
            match self.conn.reader().read(buf) {
                Ok(0) => return Ok(ReadSignal::CloseNotify),
                Ok(n) => return Ok(ReadSignal::Data(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(ReadSignal::EndOfStream)
                }
                Err(e) => return Err(EngineError::Io(e)),
            }

            match self.conn.read_tls(&mut self.stream) {
                Ok(0) => return Ok(ReadSignal::EndOfStream),
                Ok(_) => {
                    let state = self.process_packets()?;
                    if state.peer_has_closed() && state.plaintext_bytes_to_read() == 0 {
                        return Ok(ReadSignal::CloseNotify);
                    }
                }
                Err(e) if is_would_block(&e) => return Ok(ReadSignal::Timeout),
                Err(e) => return Err(EngineError::Io(e)),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<WriteSignal, EngineError> {
        // Drain any backlog first: a stalled socket must surface as zero
        // progress, not as unbounded internal buffering.
        if !self.flush_tls()? {
            return Ok(WriteSignal::Stalled);
        }

        let taken = match self.conn.writer().write(buf) {
            Ok(0) => return Ok(WriteSignal::Stalled),
            Ok(n) => n,
            Err(e) if is_would_block(&e) => return Ok(WriteSignal::Stalled),
            Err(e) => return Err(EngineError::Io(e)),
        };

        // Push what we can now; anything still queued is flushed by the next
        // attempt or by close-notify. The bytes are accepted either way.
        self.flush_tls()?;
        Ok(WriteSignal::Accepted(taken))
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<(), EngineError> {
        self.stream
            .set_read_timeout(normalize(timeout))
            .map_err(EngineError::Io)
    }

    fn set_send_timeout(&mut self, timeout: Option<Duration>) -> Result<(), EngineError> {
        self.stream
            .set_write_timeout(normalize(timeout))
            .map_err(EngineError::Io)
    }

    fn send_close_notify(&mut self) {
        self.conn.send_close_notify();
        let _ = self.flush_tls();
    }
}

/// A zero deadline means "no deadline": `TcpStream` rejects
/// `Some(Duration::ZERO)`, and callers use zero for "block until progress".
fn normalize(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

/// Both kinds appear for an expired socket deadline, depending on platform.
fn is_would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
