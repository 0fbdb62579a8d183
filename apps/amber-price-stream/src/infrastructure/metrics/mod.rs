//! Prometheus Metrics Module
//!
//! Exposes feed client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames by kind, decode failures
//! - **Dispatch**: payloads delivered, listener panics
//! - **Connection**: connection state, cycle failures, reconnect attempts
//!
//! # Integration
//!
//! The recording functions are no-ops until a recorder is installed, so the
//! library can be embedded without metrics. The binary calls
//! [`init_metrics`] to serve `/metrics` on a dedicated port.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// A port of 0 disables metrics. Subsequent calls after a successful install
/// return the address already in use.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<Option<SocketAddr>, BuildError> {
    if port == 0 {
        return Ok(None);
    }
    if let Some(addr) = INSTALLED.get() {
        return Ok(Some(*addr));
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();
    Ok(Some(*INSTALLED.get_or_init(|| addr)))
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "amber_feed_frames_received_total",
        "Total frames received from the price feed by kind"
    );
    describe_counter!(
        "amber_feed_decode_failures_total",
        "Total text frames dropped because they did not decode"
    );
    describe_counter!(
        "amber_feed_payloads_dispatched_total",
        "Total decoded payloads delivered to listeners"
    );
    describe_counter!(
        "amber_feed_listener_panics_total",
        "Total listener callbacks that panicked during dispatch"
    );
    describe_counter!(
        "amber_feed_cycle_failures_total",
        "Total connect-and-listen cycles that ended in an error"
    );
    describe_counter!(
        "amber_feed_reconnects_total",
        "Total reconnection attempts scheduled"
    );
    describe_gauge!(
        "amber_feed_connected",
        "1 while the feed connection is in the listening phase"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Kinds of inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Text frame.
    Text,
    /// Binary frame.
    Binary,
    /// Ping or pong.
    Control,
    /// Close frame.
    Close,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Control => "control",
            Self::Close => "close",
        }
    }
}

/// Record an inbound frame.
pub fn record_frame(kind: FrameKind) {
    counter!(
        "amber_feed_frames_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a text frame that failed to decode.
pub fn record_decode_failure() {
    counter!("amber_feed_decode_failures_total").increment(1);
}

/// Record a payload delivered to listeners.
pub fn record_payload_dispatched() {
    counter!("amber_feed_payloads_dispatched_total").increment(1);
}

/// Record a panicking listener.
pub fn record_listener_panic(registry: &'static str) {
    counter!(
        "amber_feed_listener_panics_total",
        "registry" => registry
    )
    .increment(1);
}

/// Record a failed cycle.
pub fn record_cycle_failure(error_type: &'static str) {
    counter!(
        "amber_feed_cycle_failures_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("amber_feed_reconnects_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connected(connected: bool) {
    gauge!("amber_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================
