//! Core connection type
//!
//! [`Connection`] owns an established TLS session and drives the blocking
//! read/write loops over it. Establishment walks the lifecycle state machine
//! (connect, open, handshake) through the [`Transport`] and
//! [`TlsEngine`](crate::engine::TlsEngine) collaborators so the sequencing
//! can be exercised without sockets.

use super::state::ConnectionState;
use super::tls::parse_server_name;
use super::transport::Transport;
use crate::engine::{HandshakeStep, ReadSignal, SessionOptions, TlsEngine, TlsSession, WriteSignal};
use crate::identity::ClientIdentity;
use crate::{Error, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Default TCP connect deadline. The transport also installs it as the
/// socket's initial send deadline, so a peer that stops draining during the
/// handshake cannot wedge the caller.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Establishment configuration
///
/// Per-call I/O deadlines are passed to [`Connection::read`] and
/// [`Connection::write`] directly; this only covers the establishment phase.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// TCP connect deadline (default: 10 seconds)
    pub connect_timeout: Duration,
    /// Receive deadline applied to each socket read during the handshake.
    /// `None` (the default) blocks until the server answers.
    pub handshake_recv_timeout: Option<Duration>,
}

impl ConnectorConfig {
    /// Create a configuration with defaults
    ///
    /// # Defaults
    ///
    /// - `connect_timeout`: 10 seconds
    /// - `handshake_recv_timeout`: None (block until the server answers)
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_recv_timeout: None,
        }
    }

    /// Set the TCP connect deadline
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound each handshake receive on the given deadline
    pub fn handshake_recv_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_recv_timeout = Some(timeout);
        self
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a [`Connection::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were placed at the front of the buffer. Zero means
    /// the deadline expired (or the buffer was empty) before the first byte
    /// arrived; the caller may simply read again.
    Data(usize),
    /// The peer completed a graceful shutdown earlier; no further data will
    /// ever arrive on this connection.
    Closed,
}

impl ReadOutcome {
    /// True when the peer has shut down and reads can never succeed again.
    pub fn is_closed(&self) -> bool {
        matches!(self, ReadOutcome::Closed)
    }
}

/// Established TLS connection to a device endpoint
///
/// Produced by [`Connection::establish`] (usually via
/// [`Connector`](crate::connector::Connector)). Reads and writes are
/// blocking with per-call deadlines. Dropping the value releases the session
/// and its socket; [`Connection::close`] additionally tells the peer first.
pub struct Connection<S: TlsSession> {
    session: S,
    state: ConnectionState,
    half_closed: bool,
    errored: bool,
    conn_id: u32,
}

impl<S: TlsSession> Connection<S> {
    /// Connect, attach the identity, and complete the TLS handshake.
    ///
    /// Walks the full lifecycle: resolve and connect through `transport`,
    /// open a session on the engine with `identity` attached to the
    /// handshake, then step the handshake until the engine reports
    /// completion. Pending handshake steps are retried without a cap; each
    /// step blocks on socket I/O bounded by the configured deadlines, so the
    /// loop cannot spin hot.
    ///
    /// # Arguments
    ///
    /// * `host` - Server hostname or IP literal (also used for SNI and
    ///   certificate verification)
    /// * `port` - Server port
    /// * `identity` - Opaque device identity presented during the handshake
    ///
    /// On any failure the partially established resources (socket, session)
    /// are released before the error is returned.
    pub fn establish<T, E>(
        transport: &T,
        engine: &E,
        config: &ConnectorConfig,
        host: &str,
        port: u16,
        identity: ClientIdentity,
    ) -> Result<Self>
    where
        T: Transport,
        E: TlsEngine<T::Stream, Session = S>,
    {
        let conn_id = rand::random::<u32>();
        let span = tracing::info_span!(
            "establish",
            host,
            port,
            conn_id,
            identity = %identity.fingerprint()
        );
        let _guard = span.entered();

        crate::metrics::counters::establish_attempted();
        let start = Instant::now();

        let server_name = parse_server_name(host).map_err(|e| {
            crate::metrics::counters::establish_failed(crate::metrics::labels::STAGE_CONFIG);
            e
        })?;

        let mut state = ConnectionState::Initial;
        state.transition(ConnectionState::Connecting)?;
        let stream = transport
            .connect(host, port, config.connect_timeout)
            .map_err(|e| {
                crate::metrics::counters::establish_failed(crate::metrics::labels::STAGE_CONNECT);
                Error::Connect(e)
            })?;

        state.transition(ConnectionState::Handshaking)?;
        let mut options = SessionOptions::new(server_name, identity);
        if let Some(timeout) = config.handshake_recv_timeout {
            options = options.handshake_recv_timeout(timeout);
        }
        tracing::debug!(identity_len = options.identity.len(), "opening TLS session");
        let mut session = engine.open(stream, &options).map_err(|e| {
            crate::metrics::counters::establish_failed(crate::metrics::labels::STAGE_CONFIG);
            Error::from(e)
        })?;

        loop {
            match session.step() {
                Ok(HandshakeStep::Done) => break,
                Ok(HandshakeStep::WantRead) | Ok(HandshakeStep::WantWrite) => continue,
                Err(e) => {
                    crate::metrics::counters::establish_failed(
                        crate::metrics::labels::STAGE_HANDSHAKE,
                    );
                    return Err(Error::Handshake(e));
                }
            }
        }
        state.transition(ConnectionState::Established)?;

        let elapsed = start.elapsed();
        crate::metrics::counters::establish_succeeded();
        crate::metrics::histograms::handshake_duration(elapsed);
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "session established");

        Ok(Connection {
            session,
            state,
            half_closed: false,
            errored: false,
            conn_id,
        })
    }

    /// Read decrypted bytes, filling `buf` completely where possible.
    ///
    /// Loops until the buffer is full, accumulating partial deliveries. The
    /// loop stops early when the peer shuts down, the deadline expires, or
    /// the stream ends; whatever arrived by then is reported as
    /// [`ReadOutcome::Data`], so a timeout with three bytes buffered returns
    /// `Data(3)`, not an error. Once the peer's shutdown has been observed,
    /// every subsequent call returns [`ReadOutcome::Closed`].
    ///
    /// A `timeout` of [`Duration::ZERO`] blocks until data arrives.
    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadOutcome> {
        self.session.set_recv_timeout(Some(timeout)).map_err(|e| {
            crate::metrics::counters::session_error("read");
            Error::Read(e)
        })?;

        if self.half_closed {
            return Ok(ReadOutcome::Closed);
        }

        let start = Instant::now();
        let mut filled = 0;
        while filled < buf.len() {
            match self.session.read(&mut buf[filled..]) {
                Ok(ReadSignal::Data(0)) => break,
                Ok(ReadSignal::Data(n)) => {
                    filled += n;
                    // Forward progress clears any earlier sticky failure.
                    self.errored = false;
                }
                Ok(ReadSignal::CloseNotify) => {
                    self.half_closed = true;
                    crate::metrics::counters::peer_closure();
                    tracing::debug!(conn_id = self.conn_id, filled, "peer closed the session");
                    break;
                }
                Ok(ReadSignal::Timeout) => {
                    crate::metrics::counters::read_timeout();
                    break;
                }
                Ok(ReadSignal::EndOfStream) => break,
                // Expiry is benign like a timeout; only fatal engine errors
                // mark the connection.
                Ok(ReadSignal::SessionExpired) => {
                    tracing::debug!(conn_id = self.conn_id, "session expired");
                    break;
                }
                Err(e) => {
                    self.errored = true;
                    crate::metrics::counters::session_error("read");
                    return Err(Error::Read(e));
                }
            }
        }

        crate::metrics::histograms::read_bytes(filled);
        crate::metrics::histograms::read_duration(start.elapsed());
        Ok(ReadOutcome::Data(filled))
    }

    /// Write `buf` in full, retrying partial acceptance.
    ///
    /// Loops until every byte has been handed to the engine. If an attempt
    /// makes no forward progress before `timeout` the call stops and returns
    /// `Ok(0)` regardless of how much of the buffer was already accepted;
    /// bytes accepted by earlier iterations are on the wire and are not
    /// replayed. Callers that need exact accounting should track their own
    /// offsets across calls.
    pub fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize> {
        self.session.set_send_timeout(Some(timeout)).map_err(|e| {
            crate::metrics::counters::session_error("write");
            Error::Write(e)
        })?;

        let start = Instant::now();
        let mut written = 0;
        while written < buf.len() {
            match self.session.write(&buf[written..]) {
                Ok(WriteSignal::Accepted(n)) if n > 0 => written += n,
                Ok(WriteSignal::Accepted(_)) | Ok(WriteSignal::Stalled) => {
                    crate::metrics::counters::write_timeout();
                    tracing::debug!(
                        conn_id = self.conn_id,
                        written,
                        total = buf.len(),
                        "write stalled before completion"
                    );
                    return Ok(0);
                }
                Err(e) => {
                    self.errored = true;
                    crate::metrics::counters::session_error("write");
                    return Err(Error::Write(e));
                }
            }
        }

        crate::metrics::histograms::write_bytes(written);
        crate::metrics::histograms::write_duration(start.elapsed());
        Ok(written)
    }

    /// Close the connection gracefully
    ///
    /// Queues a close-notify alert for the peer, then releases the session
    /// and its socket. Dropping a `Connection` releases the same resources
    /// without the alert, so skipping `close` leaks nothing.
    pub fn close(mut self) -> Result<()> {
        self.state.transition(ConnectionState::Closed)?;
        self.session.send_close_notify();
        crate::metrics::counters::connection_closed();
        tracing::debug!(conn_id = self.conn_id, "connection closed");
        Ok(())
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once the peer's graceful shutdown has been observed.
    pub fn is_half_closed(&self) -> bool {
        self.half_closed
    }

    /// True while the most recent session failure has not been followed by
    /// successful forward progress. Informational only; calls are never
    /// rejected because of it.
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Correlation id carried in this connection's log events.
    pub fn connection_id(&self) -> u32 {
        self.conn_id
    }

    /// Access the underlying session, e.g. for negotiated-parameter
    /// accessors on [`RustlsSession`](crate::engine::rustls::RustlsSession).
    pub fn session(&self) -> &S {
        &self.session
    }
}

impl<S: TlsSession> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("half_closed", &self.half_closed)
            .field("errored", &self.errored)
            .field("conn_id", &self.conn_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Shared observation point for the scripted collaborators below.
    #[derive(Default)]
    struct Probe {
        live_streams: AtomicUsize,
        live_sessions: AtomicUsize,
        close_notifies: AtomicUsize,
        seen_options: Mutex<Option<SessionOptions>>,
        sent: Mutex<Vec<u8>>,
        recv_timeouts: Mutex<Vec<Option<Duration>>>,
        send_timeouts: Mutex<Vec<Option<Duration>>>,
    }

    struct ScriptedStream {
        probe: Arc<Probe>,
    }

    impl Drop for ScriptedStream {
        fn drop(&mut self) {
            self.probe.live_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct ScriptedTransport {
        probe: Arc<Probe>,
        refuse: bool,
    }

    impl Transport for ScriptedTransport {
        type Stream = ScriptedStream;

        fn connect(
            &self,
            _host: &str,
            _port: u16,
            _timeout: Duration,
        ) -> io::Result<ScriptedStream> {
            if self.refuse {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            self.probe.live_streams.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedStream {
                probe: self.probe.clone(),
            })
        }
    }

    enum ReadEvent {
        Chunk(Vec<u8>),
        Signal(ReadSignal),
        Fail(EngineError),
    }

    enum WriteEvent {
        Accept(usize),
        Stall,
        Fail(EngineError),
    }

    struct Script {
        handshake: Vec<std::result::Result<HandshakeStep, EngineError>>,
        reads: Vec<ReadEvent>,
        writes: Vec<WriteEvent>,
    }

    impl Script {
        fn clean() -> Self {
            Script {
                handshake: vec![Ok(HandshakeStep::Done)],
                reads: Vec::new(),
                writes: Vec::new(),
            }
        }

        fn with_handshake(
            mut self,
            steps: Vec<std::result::Result<HandshakeStep, EngineError>>,
        ) -> Self {
            self.handshake = steps;
            self
        }

        fn with_reads(mut self, reads: Vec<ReadEvent>) -> Self {
            self.reads = reads;
            self
        }

        fn with_writes(mut self, writes: Vec<WriteEvent>) -> Self {
            self.writes = writes;
            self
        }
    }

    struct ScriptedSession {
        _stream: ScriptedStream,
        probe: Arc<Probe>,
        handshake: VecDeque<std::result::Result<HandshakeStep, EngineError>>,
        reads: VecDeque<ReadEvent>,
        writes: VecDeque<WriteEvent>,
    }

    impl Drop for ScriptedSession {
        fn drop(&mut self) {
            self.probe.live_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl TlsSession for ScriptedSession {
        fn step(&mut self) -> std::result::Result<HandshakeStep, EngineError> {
            self.handshake
                .pop_front()
                .unwrap_or(Ok(HandshakeStep::Done))
        }

        fn read(&mut self, buf: &mut [u8]) -> std::result::Result<ReadSignal, EngineError> {
            match self.reads.pop_front() {
                Some(ReadEvent::Chunk(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        // Undelivered remainder stays queued for the next call.
                        self.reads.push_front(ReadEvent::Chunk(bytes.split_off(n)));
                    }
                    Ok(ReadSignal::Data(n))
                }
                Some(ReadEvent::Signal(signal)) => Ok(signal),
                Some(ReadEvent::Fail(err)) => Err(err),
                None => Ok(ReadSignal::Data(0)),
            }
        }

        fn write(&mut self, buf: &[u8]) -> std::result::Result<WriteSignal, EngineError> {
            match self.writes.pop_front() {
                Some(WriteEvent::Accept(n)) => {
                    let n = n.min(buf.len());
                    self.probe.sent.lock().unwrap().extend_from_slice(&buf[..n]);
                    Ok(WriteSignal::Accepted(n))
                }
                Some(WriteEvent::Stall) => Ok(WriteSignal::Stalled),
                Some(WriteEvent::Fail(err)) => Err(err),
                None => Ok(WriteSignal::Stalled),
            }
        }

        fn set_recv_timeout(
            &mut self,
            timeout: Option<Duration>,
        ) -> std::result::Result<(), EngineError> {
            self.probe.recv_timeouts.lock().unwrap().push(timeout);
            Ok(())
        }

        fn set_send_timeout(
            &mut self,
            timeout: Option<Duration>,
        ) -> std::result::Result<(), EngineError> {
            self.probe.send_timeouts.lock().unwrap().push(timeout);
            Ok(())
        }

        fn send_close_notify(&mut self) {
            self.probe.close_notifies.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedEngine {
        probe: Arc<Probe>,
        script: Mutex<Option<Script>>,
        reject: Option<&'static str>,
    }

    impl TlsEngine<ScriptedStream> for ScriptedEngine {
        type Session = ScriptedSession;

        fn open(
            &self,
            stream: ScriptedStream,
            options: &SessionOptions,
        ) -> std::result::Result<ScriptedSession, EngineError> {
            *self.probe.seen_options.lock().unwrap() = Some(options.clone());
            if let Some(msg) = self.reject {
                return Err(EngineError::Config(msg.to_string()));
            }
            let script = self
                .script
                .lock()
                .unwrap()
                .take()
                .expect("session script consumed twice");
            self.probe.live_sessions.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedSession {
                _stream: stream,
                probe: self.probe.clone(),
                handshake: script.handshake.into(),
                reads: script.reads.into(),
                writes: script.writes.into(),
            })
        }
    }

    fn rig(script: Script) -> (Arc<Probe>, ScriptedTransport, ScriptedEngine) {
        let probe = Arc::new(Probe::default());
        let transport = ScriptedTransport {
            probe: probe.clone(),
            refuse: false,
        };
        let engine = ScriptedEngine {
            probe: probe.clone(),
            script: Mutex::new(Some(script)),
            reject: None,
        };
        (probe, transport, engine)
    }

    fn establish(transport: &ScriptedTransport, engine: &ScriptedEngine) -> Connection<ScriptedSession> {
        Connection::establish(
            transport,
            engine,
            &ConnectorConfig::new(),
            "device.example.com",
            8883,
            ClientIdentity::from_slice(b"product-key.device-name"),
        )
        .expect("establish failed")
    }

    #[test]
    fn establish_walks_to_established() {
        let script = Script::clean().with_handshake(vec![
            Ok(HandshakeStep::WantWrite),
            Ok(HandshakeStep::WantRead),
            Ok(HandshakeStep::Done),
        ]);
        let (probe, transport, engine) = rig(script);

        let conn = establish(&transport, &engine);

        assert_eq!(conn.state(), ConnectionState::Established);
        assert!(!conn.is_half_closed());
        assert!(!conn.is_errored());
        assert_eq!(probe.live_sessions.load(Ordering::SeqCst), 1);

        let options = probe.seen_options.lock().unwrap().clone().unwrap();
        assert_eq!(options.server_name, "device.example.com");
        assert_eq!(options.identity.as_bytes(), b"product-key.device-name");
    }

    #[test]
    fn establish_retries_pending_handshake_steps_without_cap() {
        let mut steps = Vec::new();
        for _ in 0..40 {
            steps.push(Ok(HandshakeStep::WantRead));
            steps.push(Ok(HandshakeStep::WantWrite));
        }
        steps.push(Ok(HandshakeStep::Done));
        let (_, transport, engine) = rig(Script::clean().with_handshake(steps));

        let conn = establish(&transport, &engine);
        assert_eq!(conn.state(), ConnectionState::Established);
    }

    #[test]
    fn refused_connect_maps_to_connect_error() {
        let (probe, mut transport, engine) = rig(Script::clean());
        transport.refuse = true;

        let err = Connection::establish(
            &transport,
            &engine,
            &ConnectorConfig::new(),
            "device.example.com",
            8883,
            ClientIdentity::empty(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Connect(_)));
        assert_eq!(probe.live_streams.load(Ordering::SeqCst), 0);
        assert_eq!(probe.live_sessions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn engine_rejection_maps_to_config_error_and_releases_stream() {
        let (probe, transport, mut engine) = rig(Script::clean());
        engine.reject = Some("identity exceeds 255 bytes");

        let err = Connection::establish(
            &transport,
            &engine,
            &ConnectorConfig::new(),
            "device.example.com",
            8883,
            ClientIdentity::empty(),
        )
        .unwrap_err();

        match err {
            Error::Config(msg) => assert!(msg.contains("255")),
            other => panic!("expected Config error, got {:?}", other),
        }
        assert_eq!(probe.live_streams.load(Ordering::SeqCst), 0);
        assert_eq!(probe.live_sessions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handshake_failure_releases_stream_and_session() {
        let script = Script::clean().with_handshake(vec![
            Ok(HandshakeStep::WantRead),
            Err(EngineError::Fatal("received fatal alert".into())),
        ]);
        let (probe, transport, engine) = rig(script);

        let err = Connection::establish(
            &transport,
            &engine,
            &ConnectorConfig::new(),
            "device.example.com",
            8883,
            ClientIdentity::empty(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Handshake(_)));
        assert_eq!(probe.live_streams.load(Ordering::SeqCst), 0);
        assert_eq!(probe.live_sessions.load(Ordering::SeqCst), 0);
        assert_eq!(probe.close_notifies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn read_fills_buffer_across_chunks_in_order() {
        let script = Script::clean().with_reads(vec![
            ReadEvent::Chunk(vec![1, 2, 3]),
            ReadEvent::Chunk(vec![4, 5]),
            ReadEvent::Chunk(vec![6]),
        ]);
        let (probe, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut buf = [0u8; 6];
        let outcome = conn.read(&mut buf, Duration::from_millis(500)).unwrap();

        assert_eq!(outcome, ReadOutcome::Data(6));
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
        assert_eq!(
            probe.recv_timeouts.lock().unwrap().last().copied(),
            Some(Some(Duration::from_millis(500)))
        );
    }

    #[test]
    fn read_returns_partial_bytes_on_timeout() {
        let script = Script::clean().with_reads(vec![
            ReadEvent::Chunk(vec![7, 7, 7]),
            ReadEvent::Signal(ReadSignal::Timeout),
            ReadEvent::Chunk(vec![8, 8]),
        ]);
        let (_, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut buf = [0u8; 6];
        assert_eq!(
            conn.read(&mut buf, Duration::from_millis(50)).unwrap(),
            ReadOutcome::Data(3)
        );
        assert_eq!(&buf[..3], &[7, 7, 7]);

        // The caller retries and picks up where the stream left off.
        assert_eq!(
            conn.read(&mut buf, Duration::from_millis(50)).unwrap(),
            ReadOutcome::Data(2)
        );
        assert_eq!(&buf[..2], &[8, 8]);
    }

    #[test]
    fn read_returns_partial_bytes_at_end_of_stream() {
        let script = Script::clean().with_reads(vec![
            ReadEvent::Chunk(vec![3, 3]),
            ReadEvent::Signal(ReadSignal::EndOfStream),
        ]);
        let (_, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut buf = [0u8; 6];
        assert_eq!(
            conn.read(&mut buf, Duration::from_millis(50)).unwrap(),
            ReadOutcome::Data(2)
        );
        assert_eq!(&buf[..2], &[3, 3]);
        // Truncation is not a graceful shutdown and does not mark the handle.
        assert!(!conn.is_half_closed());
        assert!(!conn.is_errored());
    }

    #[test]
    fn read_returns_partial_bytes_on_session_expiry() {
        let script = Script::clean().with_reads(vec![
            ReadEvent::Chunk(vec![5, 5]),
            ReadEvent::Signal(ReadSignal::SessionExpired),
            ReadEvent::Chunk(vec![6]),
        ]);
        let (_, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut buf = [0u8; 6];
        assert_eq!(
            conn.read(&mut buf, Duration::from_millis(50)).unwrap(),
            ReadOutcome::Data(2)
        );
        assert_eq!(&buf[..2], &[5, 5]);
        // Expiry is reported like a timeout and leaves the handle clean.
        assert!(!conn.is_errored());

        assert_eq!(
            conn.read(&mut buf, Duration::from_millis(50)).unwrap(),
            ReadOutcome::Data(1)
        );
        assert_eq!(&buf[..1], &[6]);
    }

    #[test]
    fn oversized_chunk_spills_into_next_read() {
        let script = Script::clean()
            .with_reads(vec![ReadEvent::Chunk((0..10).collect::<Vec<u8>>())]);
        let (_, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut small = [0u8; 4];
        assert_eq!(
            conn.read(&mut small, Duration::ZERO).unwrap(),
            ReadOutcome::Data(4)
        );
        assert_eq!(small, [0, 1, 2, 3]);

        let mut rest = [0u8; 8];
        assert_eq!(
            conn.read(&mut rest, Duration::ZERO).unwrap(),
            ReadOutcome::Data(6)
        );
        assert_eq!(&rest[..6], &[4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn peer_shutdown_surfaces_after_buffered_data() {
        let script = Script::clean().with_reads(vec![
            ReadEvent::Chunk(vec![9, 9]),
            ReadEvent::Signal(ReadSignal::CloseNotify),
        ]);
        let (probe, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut buf = [0u8; 4];
        assert_eq!(
            conn.read(&mut buf, Duration::ZERO).unwrap(),
            ReadOutcome::Data(2)
        );
        assert!(conn.is_half_closed());
        assert_eq!(probe.close_notifies.load(Ordering::SeqCst), 0);

        assert_eq!(conn.read(&mut buf, Duration::ZERO).unwrap(), ReadOutcome::Closed);
        assert_eq!(conn.read(&mut buf, Duration::ZERO).unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn peer_shutdown_with_no_data_reports_empty_then_closed() {
        let script =
            Script::clean().with_reads(vec![ReadEvent::Signal(ReadSignal::CloseNotify)]);
        let (_, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut buf = [0u8; 4];
        assert_eq!(
            conn.read(&mut buf, Duration::ZERO).unwrap(),
            ReadOutcome::Data(0)
        );
        assert_eq!(conn.read(&mut buf, Duration::ZERO).unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn read_failure_is_sticky_until_forward_progress() {
        let script = Script::clean().with_reads(vec![
            ReadEvent::Fail(EngineError::Fatal("bad record mac".into())),
            ReadEvent::Chunk(vec![1]),
        ]);
        let (_, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut buf = [0u8; 4];
        let err = conn.read(&mut buf, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Read(_)));
        assert!(conn.is_errored());

        assert_eq!(
            conn.read(&mut buf, Duration::ZERO).unwrap(),
            ReadOutcome::Data(1)
        );
        assert!(!conn.is_errored());
    }

    #[test]
    fn empty_read_buffer_returns_immediately() {
        let script = Script::clean().with_reads(vec![ReadEvent::Chunk(vec![1])]);
        let (_, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let mut empty = [0u8; 0];
        assert_eq!(
            conn.read(&mut empty, Duration::ZERO).unwrap(),
            ReadOutcome::Data(0)
        );

        // The queued byte is still there for a real buffer.
        let mut buf = [0u8; 1];
        assert_eq!(
            conn.read(&mut buf, Duration::ZERO).unwrap(),
            ReadOutcome::Data(1)
        );
    }

    #[test]
    fn write_drains_across_partial_accepts() {
        let script = Script::clean().with_writes(vec![
            WriteEvent::Accept(4),
            WriteEvent::Accept(4),
            WriteEvent::Accept(4),
        ]);
        let (probe, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let payload = [0x20u8; 10];
        assert_eq!(conn.write(&payload, Duration::from_secs(1)).unwrap(), 10);
        assert_eq!(probe.sent.lock().unwrap().as_slice(), &payload[..]);
        assert_eq!(
            probe.send_timeouts.lock().unwrap().last().copied(),
            Some(Some(Duration::from_secs(1)))
        );
    }

    #[test]
    fn write_reports_zero_when_progress_stalls() {
        let script = Script::clean()
            .with_writes(vec![WriteEvent::Accept(4), WriteEvent::Stall]);
        let (probe, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let payload = [0x41u8; 12];
        assert_eq!(conn.write(&payload, Duration::from_secs(1)).unwrap(), 0);
        // The first four bytes were already accepted and are not replayed.
        assert_eq!(probe.sent.lock().unwrap().as_slice(), &payload[..4]);
        assert!(!conn.is_errored());
    }

    #[test]
    fn empty_write_returns_zero_and_sends_nothing() {
        let script = Script::clean().with_writes(vec![WriteEvent::Accept(4)]);
        let (probe, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        assert_eq!(conn.write(&[], Duration::from_secs(1)).unwrap(), 0);
        assert!(probe.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn write_failure_marks_connection() {
        let script = Script::clean()
            .with_writes(vec![WriteEvent::Fail(EngineError::Fatal("broken pipe".into()))]);
        let (_, transport, engine) = rig(script);
        let mut conn = establish(&transport, &engine);

        let err = conn.write(&[1, 2, 3], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Write(_)));
        assert!(conn.is_errored());
    }

    #[test]
    fn close_notifies_peer_and_releases_resources() {
        let (probe, transport, engine) = rig(Script::clean());
        let conn = establish(&transport, &engine);

        conn.close().unwrap();

        assert_eq!(probe.close_notifies.load(Ordering::SeqCst), 1);
        assert_eq!(probe.live_sessions.load(Ordering::SeqCst), 0);
        assert_eq!(probe.live_streams.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn drop_releases_resources_without_notifying() {
        let (probe, transport, engine) = rig(Script::clean());
        let conn = establish(&transport, &engine);

        drop(conn);

        assert_eq!(probe.close_notifies.load(Ordering::SeqCst), 0);
        assert_eq!(probe.live_sessions.load(Ordering::SeqCst), 0);
        assert_eq!(probe.live_streams.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn debug_render_lists_lifecycle_fields() {
        let (_, transport, engine) = rig(Script::clean());
        let conn = establish(&transport, &engine);

        let rendered = format!("{:?}", conn);
        assert!(rendered.contains("state: Established"));
        assert!(rendered.contains("half_closed: false"));
        assert!(rendered.contains("errored: false"));
        assert!(rendered.contains(&format!("conn_id: {}", conn.connection_id())));
        // The session itself is elided from the render.
        assert!(rendered.ends_with(".. }"));
    }
}
