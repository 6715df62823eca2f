//! Connection management
//!
//! This module handles:
//! * Transport abstraction (blocking TCP with per-call deadlines)
//! * Connection lifecycle (connect, handshake, read/write, close)
//! * State machine enforcement
//! * TLS trust and client-certificate configuration

mod conn;
mod state;
mod tls;
mod transport;

pub use conn::{Connection, ConnectorConfig, ReadOutcome, DEFAULT_CONNECT_TIMEOUT};
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsOptions, TlsOptionsBuilder, TlsVersion};
pub use transport::{TcpTransport, Transport};
