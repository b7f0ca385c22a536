//! Running servers on ephemeral ports.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use rstest::fixture;
use tokio::{sync::oneshot, task::JoinHandle};
use wirepump::{
    config::ServerConfig,
    router::Router,
    server::{Server, ServerError},
};

/// Create a TCP listener bound to a free local port.
///
/// # Errors
/// Returns any IO error encountered while binding.
pub fn unused_listener() -> std::io::Result<StdTcpListener> {
    StdTcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
}

/// Localhost settings with an ephemeral port and a single worker.
#[fixture]
pub fn local_config() -> ServerConfig {
    ServerConfig {
        host: String::from("127.0.0.1"),
        tcp_port: 0,
        ws_port: 0,
        worker_pool_size: 1,
        ..ServerConfig::default()
    }
}

/// A server running on a background task.
pub struct RunningServer {
    /// The server, for `stop()` and inspection.
    pub server: Arc<Server>,
    /// Bound address.
    pub addr: SocketAddr,
    task: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    /// Stop the server and wait for `start` to return.
    ///
    /// # Panics
    /// Panics if the server task panicked or returned an error.
    pub async fn shutdown(self) {
        self.server.stop();
        self.task
            .await
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Build a server from `config` and `router` and run it.
///
/// # Errors
/// Returns [`ServerError`] if construction or binding fails.
pub async fn spawn_server(config: ServerConfig, router: Router) -> Result<RunningServer, ServerError> {
    spawn_with(Server::new(config, router)?).await
}

/// Run an already configured server and wait until it is bound.
///
/// # Errors
/// Returns the server's error if it stops before binding.
///
/// # Panics
/// Panics if the server task panics or returns `Ok` before binding.
pub async fn spawn_with(server: Server) -> Result<RunningServer, ServerError> {
    let (tx, rx) = oneshot::channel();
    let server = Arc::new(server.ready_signal(tx));
    let mut task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.start().await }
    });
    tokio::select! {
        ready = rx => {
            if ready.is_err() {
                panic!("readiness signal dropped before the server bound");
            }
        }
        finished = &mut task => {
            finished.expect("server task panicked")?;
            panic!("server stopped before signalling readiness");
        }
    }
    let addr = server.endpoint().expect("bound server reports its endpoint");
    Ok(RunningServer { server, addr, task })
}
