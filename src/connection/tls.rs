//! TLS options for secure device connections.
//!
//! Compiles trust roots, the pinned protocol version, and optional client
//! certificates into the `rustls::ClientConfig` the engine runs on. Exactly
//! one protocol version is ever offered: fleet deployments pin the version
//! on both ends, so there is no negotiation range to configure.

use crate::{Error, Result};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::fs;
use std::sync::Arc;

/// The single TLS protocol version offered during the handshake.
///
/// Minimum and maximum are always the same value; pick the version your
/// gateway pins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3 (default)
    #[default]
    Tls13,
}

impl TlsVersion {
    pub(crate) fn supported(&self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tls12 => write!(f, "1.2"),
            Self::Tls13 => write!(f, "1.3"),
        }
    }
}

impl std::str::FromStr for TlsVersion {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1.2" | "tls1.2" => Ok(Self::Tls12),
            "1.3" | "tls1.3" => Ok(Self::Tls13),
            _ => Err(Error::Config(format!(
                "invalid TLS version '{}': expected 1.2 or 1.3",
                s
            ))),
        }
    }
}

/// TLS options for secure device connections.
///
/// By default server certificates are validated against the system root
/// store and TLS 1.3 is pinned. Devices without a system store can use the
/// bundled webpki roots; fleets with a private CA can point at a PEM file or
/// add DER certificates directly.
///
/// # Examples
///
/// ```ignore
/// use devlink_tls::TlsOptions;
///
/// // System roots (hosts with a certificate store)
/// let tls = TlsOptions::builder().build()?;
///
/// // Bundled Mozilla roots (bare-metal devices)
/// let tls = TlsOptions::builder()
///     .webpki_roots()
///     .build()?;
///
/// // Private fleet CA, TLS 1.2 gateway
/// let tls = TlsOptions::builder()
///     .ca_cert_path("/etc/fleet/ca.pem")
///     .protocol_version("1.2".parse()?)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsOptions {
    /// Path to CA certificate file (None = system or bundled roots)
    ca_cert_path: Option<String>,
    /// Whether the bundled webpki roots are the trust source
    webpki_roots: bool,
    /// Pinned protocol version
    protocol_version: TlsVersion,
    /// Path to client certificate chain for mutual TLS
    client_cert_path: Option<String>,
    /// Compiled rustls ClientConfig
    client_config: Arc<ClientConfig>,
}

impl TlsOptions {
    /// Create a new TLS options builder.
    pub fn builder() -> TlsOptionsBuilder {
        TlsOptionsBuilder::default()
    }

    /// Get the rustls ClientConfig compiled from these options.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// The pinned protocol version.
    pub fn protocol_version(&self) -> TlsVersion {
        self.protocol_version
    }

    /// Whether a client certificate is presented (mutual TLS).
    pub fn has_client_cert(&self) -> bool {
        self.client_cert_path.is_some()
    }
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("webpki_roots", &self.webpki_roots)
            .field("protocol_version", &self.protocol_version)
            .field("client_cert_path", &self.client_cert_path)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS options.
pub struct TlsOptionsBuilder {
    ca_cert_path: Option<String>,
    webpki_roots: bool,
    extra_roots: Vec<CertificateDer<'static>>,
    protocol_version: TlsVersion,
    client_cert_path: Option<String>,
    client_key_path: Option<String>,
}

impl Default for TlsOptionsBuilder {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            webpki_roots: false,
            extra_roots: Vec::new(),
            protocol_version: TlsVersion::default(),
            client_cert_path: None,
            client_key_path: None,
        }
    }
}

impl TlsOptionsBuilder {
    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// Replaces the system/bundled roots entirely: only certificates from
    /// this file anchor trust.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Trust the bundled Mozilla root set instead of the system store.
    ///
    /// For devices without an OS certificate store. Ignored when
    /// `ca_cert_path` is set.
    pub fn webpki_roots(mut self) -> Self {
        self.webpki_roots = true;
        self
    }

    /// Add a single trusted root certificate (DER).
    ///
    /// Appended to whichever root source is selected. Useful when the
    /// anchor is baked into the firmware image rather than on disk.
    pub fn add_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.extra_roots.push(cert);
        self
    }

    /// Pin the offered protocol version (default: TLS 1.3).
    pub fn protocol_version(mut self, version: TlsVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set the path to a client certificate chain (PEM) for mutual TLS.
    ///
    /// Must be paired with [`client_key_path`](Self::client_key_path).
    pub fn client_cert_path(mut self, path: impl Into<String>) -> Self {
        self.client_cert_path = Some(path.into());
        self
    }

    /// Set the path to the client private key (PEM, PKCS#8 or RSA).
    pub fn client_key_path(mut self, path: impl Into<String>) -> Self {
        self.client_key_path = Some(path.into());
        self
    }

    /// Build the TLS options.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if:
    /// - the CA file cannot be read or contains no certificates
    /// - no trust roots are available from the selected source
    /// - the client certificate/key pair is incomplete or invalid
    pub fn build(self) -> Result<TlsOptions> {
        if self.client_cert_path.is_some() != self.client_key_path.is_some() {
            return Err(Error::Config(
                "client_cert_path and client_key_path must be set together".to_string(),
            ));
        }

        let mut root_store = if let Some(ca_path) = &self.ca_cert_path {
            self.load_custom_ca(ca_path)?
        } else if self.webpki_roots {
            let mut store = RootCertStore::empty();
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            store
        } else {
            // System root certificates via rustls-native-certs
            let result = rustls_native_certs::load_native_certs();

            let mut store = RootCertStore::empty();
            for cert in result.certs {
                let _ = store.add_parsable_certificates(std::iter::once(cert));
            }

            if !result.errors.is_empty() && store.is_empty() {
                return Err(Error::Config(
                    "failed to load any system root certificates".to_string(),
                ));
            }

            store
        };

        for cert in self.extra_roots {
            root_store.add(cert).map_err(|e| {
                Error::Config(format!("invalid additional root certificate: {}", e))
            })?;
        }

        if root_store.is_empty() {
            return Err(Error::Config(
                "no trust roots available from the selected source".to_string(),
            ));
        }

        let builder =
            ClientConfig::builder_with_protocol_versions(&[self.protocol_version.supported()])
                .with_root_certificates(root_store);

        let client_config = match (&self.client_cert_path, &self.client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let (chain, key) = load_client_auth(cert_path, key_path)?;
                builder.with_client_auth_cert(chain, key).map_err(|e| {
                    Error::Config(format!("invalid client certificate/key pair: {}", e))
                })?
            }
            _ => builder.with_no_client_auth(),
        };

        Ok(TlsOptions {
            ca_cert_path: self.ca_cert_path,
            webpki_roots: self.webpki_roots,
            protocol_version: self.protocol_version,
            client_cert_path: self.client_cert_path,
            client_config: Arc::new(client_config),
        })
    }

    /// Load a custom CA certificate from a PEM file.
    fn load_custom_ca(&self, ca_path: &str) -> Result<RootCertStore> {
        let ca_cert_data = fs::read(ca_path).map_err(|e| {
            Error::Config(format!(
                "failed to read CA certificate file '{}': {}",
                ca_path, e
            ))
        })?;

        let mut reader = std::io::Cursor::new(&ca_cert_data);
        let mut root_store = RootCertStore::empty();
        let mut found_certs = 0;

        loop {
            match rustls_pemfile::read_one(&mut reader) {
                Ok(Some(Item::X509Certificate(cert))) => {
                    let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                    found_certs += 1;
                }
                Ok(Some(_)) => {
                    // Skip non-certificate items (keys, parameters)
                }
                Ok(None) => break,
                Err(_) => {
                    return Err(Error::Config(format!(
                        "failed to parse CA certificate from '{}'",
                        ca_path
                    )));
                }
            }
        }

        if found_certs == 0 {
            return Err(Error::Config(format!(
                "no valid certificates found in '{}'",
                ca_path
            )));
        }

        Ok(root_store)
    }
}

/// Load a client certificate chain and private key for mutual TLS.
fn load_client_auth(
    cert_path: &str,
    key_path: &str,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_data = fs::read(cert_path).map_err(|e| {
        Error::Config(format!(
            "failed to read client certificate '{}': {}",
            cert_path, e
        ))
    })?;
    let mut reader = std::io::Cursor::new(&cert_data);
    let chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| {
            Error::Config(format!(
                "failed to parse client certificate '{}': {}",
                cert_path, e
            ))
        })?;
    if chain.is_empty() {
        return Err(Error::Config(format!(
            "no certificates found in '{}'",
            cert_path
        )));
    }

    let key_data = fs::read(key_path).map_err(|e| {
        Error::Config(format!("failed to read client key '{}': {}", key_path, e))
    })?;
    let mut reader = std::io::Cursor::new(&key_data);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Config(format!("failed to parse client key '{}': {}", key_path, e)))?
        .ok_or_else(|| Error::Config(format!("no private key found in '{}'", key_path)))?;

    Ok((chain, key))
}

/// Validate a hostname for TLS SNI (Server Name Indication).
///
/// Accepts DNS names and IP literals (IPv6 colons included); the engine's
/// server-name parser remains the authoritative check.
///
/// # Arguments
///
/// * `hostname` - Hostname to validate (without port)
///
/// # Errors
///
/// Returns `Error::Config` if the hostname is empty, too long, or carries
/// characters neither a DNS name nor an IP literal can.
pub fn parse_server_name(hostname: &str) -> Result<String> {
    // Trailing dot is legal DNS but not legal SNI
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.' || c == ':')
    {
        return Err(Error::Config(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    Ok(hostname.to_string())
}
