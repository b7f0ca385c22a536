//! Connection lifecycle callbacks.
//!
//! [`ConnectionHooks`] stores the optional on-start and on-stop callbacks a
//! server or client installs. Both are async so a hook can greet a peer or
//! flush a farewell message with the ordinary send paths.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, future::BoxFuture};

use crate::{connection::Connection, panic::format_panic};

/// Callback run with the connection it concerns.
pub type ConnectionHook = Arc<dyn Fn(Arc<Connection>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`ConnectionHook`].
///
/// ```
/// use wirepump::hooks::connection_hook;
///
/// let hook = connection_hook(|conn| async move {
///     tracing::info!(conn_id = %conn.id(), "hello");
/// });
/// # let _ = hook;
/// ```
pub fn connection_hook<F, Fut>(f: F) -> ConnectionHook
where
    F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |conn| f(conn).boxed())
}

/// Lifecycle callbacks shared by every connection of a server or client.
#[derive(Clone, Default)]
pub struct ConnectionHooks {
    /// Runs once after the connection is registered and before its first read.
    pub on_start: Option<ConnectionHook>,
    /// Runs once when the connection finalizes, before its transport closes.
    /// Sends issued from this hook race the shutdown and may fail with
    /// [`crate::connection::ConnectionError::Closed`].
    pub on_stop: Option<ConnectionHook>,
}

impl ConnectionHooks {
    pub(crate) async fn run_on_start(&self, conn: &Arc<Connection>) {
        run_hook(self.on_start.as_ref(), conn, "on_start").await;
    }

    pub(crate) async fn run_on_stop(&self, conn: &Arc<Connection>) {
        run_hook(self.on_stop.as_ref(), conn, "on_stop").await;
    }
}

impl std::fmt::Debug for ConnectionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

async fn run_hook(hook: Option<&ConnectionHook>, conn: &Arc<Connection>, name: &'static str) {
    let Some(hook) = hook else { return };
    let fut = hook(Arc::clone(conn));
    if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
        let panic_msg = format_panic(&*panic);
        tracing::error!(conn_id = %conn.id(), hook = name, panic = %panic_msg, "connection hook panicked");
    }
}
