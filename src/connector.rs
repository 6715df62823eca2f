//! Connector facade
//!
//! Pairs a [`Transport`] with a [`TlsEngine`] and hands out established
//! [`Connection`]s. The default pairing is blocking TCP with the rustls
//! engine; both collaborators are generic so callers and tests can
//! substitute their own.

use crate::connection::{Connection, ConnectorConfig, TcpTransport, TlsOptions, Transport};
use crate::engine::rustls::RustlsEngine;
use crate::engine::TlsEngine;
use crate::identity::ClientIdentity;
use crate::Result;

/// Device endpoint connector
///
/// One connector holds the trust configuration for a fleet of connections;
/// [`Connector::establish`] can be called repeatedly (and from multiple
/// threads behind a shared reference) without rebuilding the TLS engine.
pub struct Connector<T = TcpTransport, E = RustlsEngine> {
    transport: T,
    engine: E,
    config: ConnectorConfig,
}

impl Connector {
    /// Create a connector over TCP with the rustls engine
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # fn example() -> devlink_tls::Result<()> {
    /// use devlink_tls::{ClientIdentity, Connector, TlsOptions};
    /// use std::time::Duration;
    ///
    /// let options = TlsOptions::builder().webpki_roots().build()?;
    /// let connector = Connector::new(&options);
    ///
    /// let identity = ClientIdentity::from_slice(b"product-key.device-name");
    /// let mut conn = connector.establish("hub.example.com", 8883, identity)?;
    ///
    /// conn.write(b"ping", Duration::from_secs(5))?;
    /// let mut buf = [0u8; 128];
    /// let outcome = conn.read(&mut buf, Duration::from_secs(5))?;
    /// println!("got {:?}", outcome);
    /// conn.close()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(options: &TlsOptions) -> Self {
        Self::with_config(options, ConnectorConfig::new())
    }

    /// Create a connector with custom establishment configuration
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # fn example() -> devlink_tls::Result<()> {
    /// use devlink_tls::{Connector, ConnectorConfig, TlsOptions};
    /// use std::time::Duration;
    ///
    /// let options = TlsOptions::builder().webpki_roots().build()?;
    /// let config = ConnectorConfig::new()
    ///     .connect_timeout(Duration::from_secs(3))
    ///     .handshake_recv_timeout(Duration::from_secs(15));
    /// let connector = Connector::with_config(&options, config);
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_config(options: &TlsOptions, config: ConnectorConfig) -> Self {
        Connector {
            transport: TcpTransport,
            engine: RustlsEngine::new(options),
            config,
        }
    }
}

impl<T, E> Connector<T, E>
where
    T: Transport,
    E: TlsEngine<T::Stream>,
{
    /// Assemble a connector from explicit collaborators
    pub fn from_parts(transport: T, engine: E, config: ConnectorConfig) -> Self {
        Connector {
            transport,
            engine,
            config,
        }
    }

    /// Connect to `host:port`, presenting `identity` during the handshake
    ///
    /// Blocks until the connection is established or a stage fails. See
    /// [`Connection::establish`] for the full sequencing.
    pub fn establish(
        &self,
        host: &str,
        port: u16,
        identity: ClientIdentity,
    ) -> Result<Connection<E::Session>> {
        Connection::establish(
            &self.transport,
            &self.engine,
            &self.config,
            host,
            port,
            identity,
        )
    }

    /// Establishment configuration in use
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }
}
