//! Per-connection liveness probing.
//!
//! A server holds one [`HeartbeatChecker`] template. Every connection gets a
//! bound clone when it starts. On each tick the bound checker looks at the
//! connection's last inbound activity: a connection silent for longer than
//! `max_silence` is handed to the not-alive callback (by default it is
//! stopped) and the checker ends; otherwise a probe frame is sent so the peer
//! has something to answer.

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    connection::Connection,
    metrics::{self, ErrorKind},
};

/// Message id carried by probe frames unless configured otherwise.
pub const DEFAULT_HEARTBEAT_MSG_ID: u32 = 99_999;
/// Default silence after which a connection is considered dead.
pub const DEFAULT_HEARTBEAT_MAX: Duration = Duration::from_secs(10);

/// Builds the probe payload for a connection.
pub type MakeHeartbeatMsg = Arc<dyn Fn(&Connection) -> Bytes + Send + Sync>;
/// Remediation for a connection that missed its heartbeat.
pub type OnRemoteNotAlive = Arc<dyn Fn(Arc<Connection>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Heartbeat template shared by the connections of one server or client.
#[derive(Clone)]
pub struct HeartbeatChecker {
    interval: Duration,
    max_silence: Duration,
    msg_id: u32,
    make_msg: MakeHeartbeatMsg,
    on_not_alive: Option<OnRemoteNotAlive>,
    send_probe: bool,
}

impl HeartbeatChecker {
    /// Check every `interval`; connections silent for `max_silence` are
    /// not alive.
    #[must_use]
    pub fn new(interval: Duration, max_silence: Duration) -> Self {
        Self {
            interval,
            max_silence,
            msg_id: DEFAULT_HEARTBEAT_MSG_ID,
            make_msg: Arc::new(|_| Bytes::from_static(b"ping")),
            on_not_alive: None,
            send_probe: true,
        }
    }

    /// Message id used for probe frames.
    #[must_use]
    pub fn with_msg_id(mut self, msg_id: u32) -> Self {
        self.msg_id = msg_id;
        self
    }

    /// Payload builder for probe frames.
    #[must_use]
    pub fn with_message<F>(mut self, make_msg: F) -> Self
    where
        F: Fn(&Connection) -> Bytes + Send + Sync + 'static,
    {
        self.make_msg = Arc::new(make_msg);
        self
    }

    /// Replace the default remediation of stopping the connection.
    #[must_use]
    pub fn on_remote_not_alive<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_not_alive = Some(Arc::new(move |conn| callback(conn).boxed()));
        self
    }

    /// Only check liveness; never send probe frames.
    #[must_use]
    pub fn without_probe(mut self) -> Self {
        self.send_probe = false;
        self
    }

    /// Probe message id.
    #[must_use]
    pub fn msg_id(&self) -> u32 { self.msg_id }

    /// Tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration { self.interval }

    /// Allowed silence before a connection is not alive.
    #[must_use]
    pub fn max_silence(&self) -> Duration { self.max_silence }

    /// Clone this template for `conn`. The returned handle is idle until
    /// [`HeartbeatHandle::start`] is called.
    #[must_use]
    pub fn bind(&self, conn: Arc<Connection>) -> HeartbeatHandle {
        HeartbeatHandle {
            token: conn.context(),
            state: HandleState::Idle(Box::new(BoundChecker {
                checker: self.clone(),
                conn,
            })),
        }
    }
}

impl fmt::Debug for HeartbeatChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatChecker")
            .field("interval", &self.interval)
            .field("max_silence", &self.max_silence)
            .field("msg_id", &self.msg_id)
            .field("send_probe", &self.send_probe)
            .finish_non_exhaustive()
    }
}

struct BoundChecker {
    checker: HeartbeatChecker,
    conn: Arc<Connection>,
}

impl BoundChecker {
    async fn run(self, token: CancellationToken) {
        let Self { checker, conn } = self;
        let start = tokio::time::Instant::now() + checker.interval;
        let mut ticker = tokio::time::interval_at(start, checker.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !conn.is_alive(checker.max_silence) {
                if conn.is_closed() {
                    break;
                }
                tracing::warn!(
                    conn_id = %conn.id(),
                    silent_for = ?conn.last_activity().elapsed(),
                    "heartbeat expired"
                );
                metrics::inc_errors(ErrorKind::HeartbeatExpired);
                match &checker.on_not_alive {
                    Some(callback) => callback(Arc::clone(&conn)).await,
                    None => conn.stop(),
                }
                break;
            }
            if checker.send_probe {
                let payload = (checker.make_msg)(&conn);
                if let Err(err) = conn.send_msg(checker.msg_id, &payload).await {
                    tracing::debug!(conn_id = %conn.id(), error = %err, "heartbeat probe failed");
                }
            }
        }
        tracing::trace!(conn_id = %conn.id(), "heartbeat stopped");
    }
}

enum HandleState {
    Idle(Box<BoundChecker>),
    Running(JoinHandle<()>),
    Stopped,
}

/// A heartbeat bound to one connection.
///
/// Stops when [`HeartbeatHandle::stop`] is called, when the connection stops,
/// or after firing the not-alive callback.
pub struct HeartbeatHandle {
    token: CancellationToken,
    state: HandleState,
}

impl HeartbeatHandle {
    /// Spawn the checker task. Has no effect unless the handle is idle.
    /// Must be called within a Tokio runtime.
    pub fn start(&mut self) {
        let state = std::mem::replace(&mut self.state, HandleState::Stopped);
        self.state = match state {
            HandleState::Idle(bound) => {
                HandleState::Running(tokio::spawn((*bound).run(self.token.clone())))
            }
            other => other,
        };
    }

    /// Cancel the checker.
    pub fn stop(&self) { self.token.cancel(); }

    /// `true` after [`HeartbeatHandle::start`] while the task is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(&self.state, HandleState::Running(task) if !task.is_finished())
    }
}

impl fmt::Debug for HeartbeatHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            HandleState::Idle(_) => "idle",
            HandleState::Running(_) => "running",
            HandleState::Stopped => "stopped",
        };
        f.debug_struct("HeartbeatHandle").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    use super::{DEFAULT_HEARTBEAT_MSG_ID, HeartbeatChecker};
    use crate::{
        pack::{DataPack, LengthTypePack},
        test_helpers::{TestConnection, test_connection},
    };

    #[tokio::test(start_paused = true)]
    async fn expiry_fires_callback_exactly_once() {
        let TestConnection { conn, .. } = test_connection(1);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let checker = HeartbeatChecker::new(Duration::from_secs(1), Duration::from_secs(3))
            .without_probe()
            .on_remote_not_alive(move |_conn| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
        let mut handle = checker.bind(Arc::clone(&conn));
        handle.start();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!handle.is_running());
        assert!(!conn.is_closed(), "custom remediation replaces the default stop");
    }

    #[tokio::test(start_paused = true)]
    async fn probes_until_silence_then_stops_connection() {
        let TestConnection {
            conn, mut remote, ..
        } = test_connection(2);
        let mut handle = HeartbeatChecker::new(Duration::from_secs(1), Duration::from_secs(10))
            .bind(Arc::clone(&conn));
        handle.start();

        let mut frame = [0u8; 12];
        remote.read_exact(&mut frame).await.expect("probe frame");
        let probe = LengthTypePack::new(64)
            .unpack_frame(Bytes::copy_from_slice(&frame))
            .expect("valid probe");
        assert_eq!(probe.msg_id(), DEFAULT_HEARTBEAT_MSG_ID);
        assert_eq!(&probe.data()[..], b"ping");

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_activity_keeps_connection_alive() {
        let TestConnection { conn, .. } = test_connection(3);
        let mut handle = HeartbeatChecker::new(Duration::from_secs(1), Duration::from_secs(3))
            .without_probe()
            .bind(Arc::clone(&conn));
        handle.start();

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(2)).await;
            conn.touch();
        }
        assert!(!conn.is_closed());
        assert!(handle.is_running());

        handle.stop();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!handle.is_running());
    }
}
