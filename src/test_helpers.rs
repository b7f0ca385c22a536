//! Connections over in-memory pipes for unit tests.

use std::sync::Arc;

use tokio::io::DuplexStream;

use crate::{
    connection::{
        ByteSource,
        Connection,
        ConnectionAddrs,
        ConnectionConfig,
        ConnectionId,
        transport::split_stream,
    },
    dispatch::Dispatcher,
    pack::PackKind,
    router::{HandlerRouter, Router},
};

pub(crate) struct TestConnection {
    pub conn: Arc<Connection>,
    /// Unread half of the transport; serve the connection with it.
    pub source: Box<dyn ByteSource>,
    /// Peer end of the in-memory pipe.
    pub remote: DuplexStream,
}

/// Settings with an inline dispatcher over `router` and the current layout.
pub(crate) fn test_config(router: Router) -> ConnectionConfig {
    let dispatcher = Arc::new(Dispatcher::inline(Arc::new(router)));
    ConnectionConfig::new(PackKind::LengthType.build(4096), dispatcher)
}

pub(crate) fn test_connection(id: u64) -> TestConnection {
    test_connection_with(id, test_config(HandlerRouter::new().build()), 64 * 1024)
}

pub(crate) fn test_connection_with(
    id: u64,
    config: ConnectionConfig,
    pipe_capacity: usize,
) -> TestConnection {
    let (local, remote) = tokio::io::duplex(pipe_capacity);
    let (source, sink) = split_stream(local);
    let conn = Connection::new(
        ConnectionId::new(id),
        ConnectionAddrs::default(),
        Arc::new(config),
        sink,
    );
    TestConnection {
        conn,
        source,
        remote,
    }
}
