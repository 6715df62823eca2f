//! Blocking TLS transport for device endpoints
//!
//! `devlink-tls` establishes authenticated TLS connections from constrained
//! clients to device gateways, attaching an opaque device identity to the
//! handshake. The I/O model is deliberately synchronous: one socket per
//! connection, per-call deadlines, no async runtime.
//!
//! # Quick start
//!
//! ```no_run
//! # fn example() -> devlink_tls::Result<()> {
//! use devlink_tls::{ClientIdentity, Connector, ReadOutcome, TlsOptions};
//! use std::time::Duration;
//!
//! let options = TlsOptions::builder().webpki_roots().build()?;
//! let connector = Connector::new(&options);
//!
//! let mut conn = connector.establish(
//!     "hub.example.com",
//!     8883,
//!     ClientIdentity::from_slice(b"product-key.device-name"),
//! )?;
//!
//! conn.write(b"hello", Duration::from_secs(5))?;
//! let mut buf = [0u8; 256];
//! match conn.read(&mut buf, Duration::from_secs(5))? {
//!     ReadOutcome::Data(n) => println!("read {} bytes", n),
//!     ReadOutcome::Closed => println!("peer closed"),
//! }
//! conn.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! * [`Connector`] pairs a [`Transport`](connection::Transport) with a
//!   [`TlsEngine`](engine::TlsEngine) and hands out [`Connection`]s
//! * [`connection`] owns the lifecycle state machine and the blocking
//!   read/write loops
//! * [`engine`] hides the TLS implementation behind small traits; the
//!   default is rustls pinned to TLS 1.3
//! * [`identity`] carries the device identity and keeps it out of logs

pub mod connection;
pub mod connector;
pub mod engine;
pub mod error;
pub mod identity;
pub(crate) mod metrics;

pub use connection::{
    Connection, ConnectionState, ConnectorConfig, ReadOutcome, TcpTransport, TlsOptions,
    TlsOptionsBuilder, TlsVersion,
};
pub use connector::Connector;
pub use error::{Error, Result};
pub use identity::ClientIdentity;
