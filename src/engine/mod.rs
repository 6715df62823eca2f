//! TLS engine abstraction
//!
//! The connector never talks TLS itself; it drives an engine through two
//! small traits. [`TlsEngine`] turns a connected transport stream into a
//! [`TlsSession`]; the session exposes handshake stepping, encrypted
//! read/write with classified outcome signals, per-call timeouts, and
//! close-notify. Everything the connector needs to know about an engine is
//! here, which is also what makes the core loops testable against scripted
//! sessions.
//!
//! The production engine is [`RustlsEngine`](rustls::RustlsEngine).

pub mod rustls;

use crate::identity::ClientIdentity;
use std::time::Duration;

/// One advancement of the handshake state machine.
///
/// `WantRead` and `WantWrite` are not errors: the step needs more underlying
/// I/O before it can proceed and the caller should step again. Fatal
/// handshake failures come back as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// The handshake is complete; the session is ready for application data.
    Done,
    /// The engine needs more bytes from the peer.
    WantRead,
    /// The engine has bytes queued for the peer.
    WantWrite,
}

/// Outcome of a single engine read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSignal {
    /// Plaintext bytes were copied into the caller's buffer (possibly zero
    /// when the engine had nothing to deliver).
    Data(usize),
    /// The peer sent close-notify: graceful shutdown, no more data will
    /// arrive.
    CloseNotify,
    /// The per-call receive deadline expired before any more data arrived.
    Timeout,
    /// The transport hit end-of-stream without a close-notify (truncation).
    EndOfStream,
    /// The session expired (ticket/session lifetime). The read loop stops
    /// and returns whatever it has buffered, like a timeout.
    SessionExpired,
}

/// Outcome of a single engine write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSignal {
    /// The engine accepted this many plaintext bytes.
    Accepted(usize),
    /// The engine made no forward progress (send-side timeout or full
    /// buffers). The write loop reports this as a write timeout.
    Stalled,
}

/// Per-session options handed to [`TlsEngine::open`].
///
/// Engine-wide concerns (trust roots, version pin, client certificates) are
/// fixed when the engine is built; this struct carries what varies per
/// connection.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Name presented for SNI and certificate verification.
    pub server_name: String,
    /// Opaque identity bytes attached to the handshake.
    pub identity: ClientIdentity,
    /// Receive deadline applied to each socket read during the handshake.
    /// `None` blocks until the peer answers.
    pub handshake_recv_timeout: Option<Duration>,
}

impl SessionOptions {
    pub fn new(server_name: impl Into<String>, identity: ClientIdentity) -> Self {
        SessionOptions {
            server_name: server_name.into(),
            identity,
            handshake_recv_timeout: None,
        }
    }

    /// Bound each handshake receive on the given deadline.
    pub fn handshake_recv_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_recv_timeout = Some(timeout);
        self
    }
}

/// Errors produced by a TLS engine.
///
/// Kept engine-agnostic: configuration rejections and fatal TLS failures are
/// carried as messages, transport failures keep their `io::Error`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine rejected the session configuration (bad roots, oversized
    /// identity, unsupported version, malformed server name).
    #[error("configuration rejected: {0}")]
    Config(String),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Fatal TLS-level failure (alert received, protocol violation).
    #[error("{0}")]
    Fatal(String),
}

/// Builds TLS sessions bound to a connected transport stream.
///
/// `S` is the stream type produced by the transport collaborator; the
/// production pairing is [`TcpTransport`](crate::connection::TcpTransport)
/// with [`RustlsEngine`](rustls::RustlsEngine) over `std::net::TcpStream`.
pub trait TlsEngine<S> {
    type Session: TlsSession;

    /// Configures a client session and binds it to `stream`.
    ///
    /// On error the stream is dropped with any partial session state; the
    /// caller holds nothing to clean up.
    fn open(&self, stream: S, options: &SessionOptions) -> Result<Self::Session, EngineError>;
}

/// An established (or establishing) TLS session bound to its transport.
///
/// All methods block; deadlines come from the configured timeouts.
pub trait TlsSession {
    /// Advances the handshake by one unit of progress.
    fn step(&mut self) -> Result<HandshakeStep, EngineError>;

    /// Attempts to fill `buf` with decrypted plaintext.
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadSignal, EngineError>;

    /// Offers `buf` for encryption and transmission.
    fn write(&mut self, buf: &[u8]) -> Result<WriteSignal, EngineError>;

    /// Installs the receive deadline for subsequent reads. `None` blocks.
    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<(), EngineError>;

    /// Installs the send deadline for subsequent writes. `None` blocks.
    fn set_send_timeout(&mut self, timeout: Option<Duration>) -> Result<(), EngineError>;

    /// Emits close-notify, best-effort. Transmission errors are swallowed;
    /// teardown proceeds regardless.
    fn send_close_notify(&mut self);
}
