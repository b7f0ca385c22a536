//! Metric helpers for `wirepump`.
//!
//! Names and helpers wrapping the [`metrics`](https://docs.rs/metrics) facade.
//! Without the `metrics` feature every helper compiles to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking live connections.
pub const CONNECTIONS_ACTIVE: &str = "wirepump_connections_active";
/// Name of the counter tracking frames read and written.
pub const FRAMES_PROCESSED: &str = "wirepump_frames_processed_total";
/// Name of the counter tracking errors by kind.
pub const ERRORS_TOTAL: &str = "wirepump_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames decoded from a peer.
    Inbound,
    /// Frames written to a peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only read by metric labels"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Error categories recorded in [`ERRORS_TOTAL`].
#[derive(Clone, Copy, Debug)]
pub enum ErrorKind {
    /// Framing or packet violation from a peer.
    Protocol,
    /// A handler panicked.
    HandlerPanic,
    /// Buffered send rejected because the queue stayed full.
    QueueFull,
    /// A peer failed its heartbeat.
    HeartbeatExpired,
}

impl ErrorKind {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only read by metric labels"))]
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::HandlerPanic => "handler_panic",
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::HeartbeatExpired => "heartbeat_expired",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record `count` processed frames for the given direction.
pub fn inc_frames(direction: Direction, count: u64) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(count);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, count);
}

/// Record an error occurrence.
pub fn inc_errors(kind: ErrorKind) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
