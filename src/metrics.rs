//! Metrics instrumentation for devlink-tls
//!
//! Thin wrappers over the `metrics` macros so call sites stay one-liners and
//! metric names live in a single place. The embedding application installs
//! whatever recorder it wants (Prometheus exporter, statsd, none); with no
//! recorder installed every call is a no-op.
//!
//! Naming: `devlink_` prefix, `_total` suffix for counters, `_ms` / `_bytes`
//! units spelled out in histogram names.

use std::time::Duration;

/// Establishment stage labels used by failure counters.
pub mod labels {
    pub const STAGE_CONNECT: &str = "connect";
    pub const STAGE_CONFIG: &str = "config";
    pub const STAGE_HANDSHAKE: &str = "handshake";
}

/// Counter metrics.
pub mod counters {
    /// A connection establishment was attempted.
    pub fn establish_attempted() {
        metrics::counter!("devlink_establish_attempts_total").increment(1);
    }

    /// A connection establishment completed successfully.
    pub fn establish_succeeded() {
        metrics::counter!("devlink_establish_success_total").increment(1);
    }

    /// A connection establishment failed at the given stage.
    pub fn establish_failed(stage: &'static str) {
        metrics::counter!("devlink_establish_failures_total", "stage" => stage).increment(1);
    }

    /// The peer signaled graceful closure (close-notify observed).
    pub fn peer_closure() {
        metrics::counter!("devlink_peer_closures_total").increment(1);
    }

    /// A read call ended on the per-call receive deadline.
    pub fn read_timeout() {
        metrics::counter!("devlink_read_timeouts_total").increment(1);
    }

    /// A write call made zero progress and reported a write timeout.
    pub fn write_timeout() {
        metrics::counter!("devlink_write_timeouts_total").increment(1);
    }

    /// A fatal engine error surfaced from read or write.
    pub fn session_error(op: &'static str) {
        metrics::counter!("devlink_session_errors_total", "op" => op).increment(1);
    }

    /// A connection was closed by the local side.
    pub fn connection_closed() {
        metrics::counter!("devlink_connections_closed_total").increment(1);
    }
}

/// Histogram metrics.
pub mod histograms {
    use super::duration_ms;
    use std::time::Duration;

    /// Wall time of the full handshake retry loop.
    pub fn handshake_duration(duration: Duration) {
        metrics::histogram!("devlink_handshake_duration_ms").record(duration_ms(duration));
    }

    /// Wall time of a single top-level read call.
    pub fn read_duration(duration: Duration) {
        metrics::histogram!("devlink_read_duration_ms").record(duration_ms(duration));
    }

    /// Wall time of a single top-level write call.
    pub fn write_duration(duration: Duration) {
        metrics::histogram!("devlink_write_duration_ms").record(duration_ms(duration));
    }

    /// Plaintext bytes delivered to the caller by one read call.
    pub fn read_bytes(count: usize) {
        metrics::histogram!("devlink_read_bytes").record(count as f64);
    }

    /// Plaintext bytes accepted from the caller by one write call.
    pub fn write_bytes(count: usize) {
        metrics::histogram!("devlink_write_bytes").record(count as f64);
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
