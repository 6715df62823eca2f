//! Minimal connectivity probe
//!
//! Establishes a TLS connection to a device endpoint, sends one probe line,
//! and prints whatever comes back before the deadline.
//!
//! Usage:
//!
//! ```bash
//! cargo run --example device_probe -- <host> [port] [identity]
//! RUST_LOG=devlink_tls=debug cargo run --example device_probe -- hub.example.com 8883 pk1.dev-01
//! ```

use devlink_tls::{ClientIdentity, Connector, ConnectorConfig, ReadOutcome, TlsOptions};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u16 = args.next().as_deref().unwrap_or("8883").parse()?;
    let identity = args
        .next()
        .map(ClientIdentity::new)
        .unwrap_or_else(ClientIdentity::empty);

    let options = TlsOptions::builder().webpki_roots().build()?;
    let config = ConnectorConfig::new().connect_timeout(Duration::from_secs(5));
    let connector = Connector::with_config(&options, config);

    println!("connecting to {}:{} ...", host, port);
    let mut conn = connector.establish(&host, port, identity)?;

    if let Some(version) = conn.session().protocol_version() {
        println!("established {:?}", version);
    }

    conn.write(b"probe\n", Duration::from_secs(5))?;
    let mut buf = [0u8; 1024];
    match conn.read(&mut buf, Duration::from_secs(5))? {
        ReadOutcome::Data(0) => println!("no response within the deadline"),
        ReadOutcome::Data(n) => {
            println!("received {} bytes: {}", n, String::from_utf8_lossy(&buf[..n]))
        }
        ReadOutcome::Closed => println!("peer closed the connection"),
    }

    conn.close()?;
    Ok(())
}
