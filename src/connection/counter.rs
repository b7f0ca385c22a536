//! Process-wide count of connections that have not finalized.

use std::sync::atomic::{AtomicU64, Ordering};

use super::ConnectionId;

static LIVE: AtomicU64 = AtomicU64::new(0);

/// Held by a connection from construction until it finalizes.
///
/// Dropping the slot releases it from the live count and the
/// `wirepump_connections_active` gauge.
pub(super) struct LiveSlot {
    conn_id: ConnectionId,
}

impl LiveSlot {
    pub(super) fn acquire(conn_id: ConnectionId) -> Self {
        let live = LIVE.fetch_add(1, Ordering::Relaxed) + 1;
        crate::metrics::inc_connections();
        tracing::trace!(%conn_id, live, "connection slot acquired");
        Self { conn_id }
    }
}

impl Drop for LiveSlot {
    fn drop(&mut self) {
        let live = LIVE.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        crate::metrics::dec_connections();
        tracing::trace!(conn_id = %self.conn_id, live, "connection slot released");
    }
}

/// Connections in this process that have been created but not finalized,
/// across every server and client.
#[must_use]
pub fn live_connection_count() -> u64 { LIVE.load(Ordering::Relaxed) }
