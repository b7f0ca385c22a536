//! Runtime control for [`Server`].

mod accept;
mod backoff;
#[cfg(test)]
mod tests;

use std::sync::{Arc, atomic::Ordering};

pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{net::TcpListener, select, signal};
use tokio_util::task::TaskTracker;

use self::accept::{AcceptContext, Transport, accept_loop};
use super::{Server, ServerError, tls};
use crate::{
    config::ServerMode,
    connection::ConnectionConfig,
    dispatch::Dispatcher,
};

impl Server {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Errors
    /// See [`Server::start`].
    pub async fn run(&self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until `shutdown` resolves or [`Server::stop`] is
    /// called.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use tokio::sync::oneshot;
    /// use wirepump::{config::ServerConfig, router::HandlerRouter, server::Server};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wirepump::server::ServerError> {
    /// let config = ServerConfig {
    ///     host: "127.0.0.1".into(),
    ///     tcp_port: 0,
    ///     ..ServerConfig::default()
    /// };
    /// let server = Arc::new(Server::new(config, HandlerRouter::new().build())?);
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn({
    ///     let server = Arc::clone(&server);
    ///     async move {
    ///         server
    ///             .run_with_shutdown(async {
    ///                 let _ = rx.await;
    ///             })
    ///             .await
    ///     }
    /// });
    ///
    /// let _ = tx.send(());
    /// handle.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// See [`Server::start`].
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(&self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let serving = self.start();
        tokio::pin!(serving);
        select! {
            res = &mut serving => return res,
            () = shutdown => self.stop(),
        }
        serving.await
    }

    /// Bind the configured transport and serve connections until
    /// [`Server::stop`] is called.
    ///
    /// Starts the worker pool, loads TLS material when both TLS files are
    /// configured, binds, signals readiness and runs the accept loop. On
    /// stop the listener closes, every connection is stopped and awaited,
    /// and the worker pool shuts down before this returns.
    ///
    /// # Errors
    /// Returns [`ServerError::AlreadyStarted`] on a second call,
    /// [`ServerError::Tls`], [`ServerError::MissingPrivateKey`] or
    /// [`ServerError::TlsConfig`] if TLS material cannot be loaded, and
    /// [`ServerError::Bind`] if the listener cannot be bound. Accept
    /// failures are retried with back-off and never surface here.
    pub async fn start(&self) -> Result<(), ServerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyStarted);
        }
        let transport = self.transport()?;

        let dispatcher = Arc::new(self.dispatcher());
        dispatcher.start();
        let conn_config = Arc::new(self.connection_config(Arc::clone(&dispatcher)));

        let listener = match TcpListener::bind(self.config.bind_addr()).await {
            Ok(listener) => listener,
            Err(e) => {
                dispatcher.stop().await;
                return Err(ServerError::Bind(e));
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                dispatcher.stop().await;
                return Err(ServerError::Bind(e));
            }
        };
        let _ = self.endpoint.set(local_addr);
        info!(
            "server listening: name={}, mode={}, addr={local_addr}, max_conn={}, workers={}",
            self.config.name, self.config.mode, self.config.max_conn, self.config.worker_pool_size
        );

        let ready = self.ready_tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = ready
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        let tracker = TaskTracker::new();
        let ctx = Arc::new(AcceptContext::new(
            transport,
            conn_config,
            Arc::clone(&self.manager),
            self.config.max_conn,
            self.shutdown.clone(),
            tracker.clone(),
            self.backoff,
        )
        .with_handshake_timeout(self.config.handshake_timeout));
        accept_loop(Arc::new(listener), ctx).await;

        self.manager.clear();
        tracker.close();
        tracker.wait().await;
        dispatcher.stop().await;
        info!("server stopped: name={}", self.config.name);
        Ok(())
    }

    fn transport(&self) -> Result<Transport, ServerError> {
        match self.config.mode {
            ServerMode::WebSocket => Ok(Transport::WebSocket(self.ws_auth.clone())),
            ServerMode::Tcp => match (&self.config.cert_file, &self.config.private_key_file) {
                (Some(cert), Some(key)) => Ok(Transport::Tls(tls::load_acceptor(cert, key)?)),
                _ => Ok(Transport::Tcp),
            },
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        self.interceptors.iter().fold(
            Dispatcher::builder(Arc::clone(&self.router))
                .pool_size(self.config.worker_pool_size)
                .queue_depth(self.config.max_worker_task_len)
                .mode(self.config.dispatch_mode)
                .heartbeat_msg_id(self.heartbeat.as_ref().map(|hb| hb.msg_id())),
            |builder, interceptor| builder.interceptor(Arc::clone(interceptor)),
        )
        .build()
    }

    fn connection_config(&self, dispatcher: Arc<Dispatcher>) -> ConnectionConfig {
        let packer = self
            .packer
            .clone()
            .unwrap_or_else(|| self.config.pack_kind.build(self.config.max_packet_size));
        let mut config = ConnectionConfig::new(packer, dispatcher);
        if let Some(field) = self.length_field {
            config = config.with_length_field(field);
        }
        let config = config
            .with_name(self.config.name.as_str())
            .with_manager(&self.manager)
            .with_hooks(self.hooks.clone())
            .with_io_read_buff_size(self.config.io_read_buff_size)
            .with_max_msg_chan_len(self.config.max_msg_chan_len)
            .with_send_buff_timeout(self.config.send_buff_timeout);
        match &self.heartbeat {
            Some(checker) => config.with_heartbeat(checker.clone()),
            None => config,
        }
    }
}
