//! Tests for accept loop behaviour.

use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    net::{TcpListener, TcpStream},
    time::{Instant, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    BackoffConfig,
    accept::{AcceptContext, MockAcceptListener, Transport, accept_loop, register},
};
use crate::{
    connection::{ConnectionAddrs, ConnectionId, transport::split_stream},
    manager::ConnectionManager,
    router::HandlerRouter,
    test_helpers::test_config,
};

struct Harness {
    addr: std::net::SocketAddr,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

async fn spawn_loop(max_conn: usize) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let manager = Arc::new(ConnectionManager::new());
    let shutdown = CancellationToken::new();
    let conn_config = test_config(HandlerRouter::new().build()).with_manager(&manager);
    let ctx = Arc::new(AcceptContext::new(
        Transport::Tcp,
        Arc::new(conn_config),
        Arc::clone(&manager),
        max_conn,
        shutdown.clone(),
        TaskTracker::new(),
        BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
    ));
    let task = tokio::spawn(accept_loop(Arc::new(listener), ctx));
    Harness {
        addr,
        manager,
        shutdown,
        task,
    }
}

async fn wait_for(manager: &ConnectionManager, ids: &[u64]) {
    let expected: Vec<ConnectionId> = ids.iter().copied().map(ConnectionId::new).collect();
    timeout(Duration::from_secs(5), async {
        loop {
            let mut live = manager.connection_ids();
            live.sort();
            if live == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connections settle");
}

#[tokio::test]
async fn ids_are_assigned_from_one_in_accept_order() {
    let harness = spawn_loop(8).await;
    let _first = TcpStream::connect(harness.addr).await.expect("connect");
    wait_for(&harness.manager, &[1]).await;
    let _second = TcpStream::connect(harness.addr).await.expect("connect");
    wait_for(&harness.manager, &[1, 2]).await;

    harness.shutdown.cancel();
    harness.task.await.expect("accept loop");
}

#[tokio::test]
async fn connection_limit_defers_admission() {
    let harness = spawn_loop(1).await;
    let first = TcpStream::connect(harness.addr).await.expect("connect");
    wait_for(&harness.manager, &[1]).await;

    let _second = TcpStream::connect(harness.addr).await.expect("connect");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.manager.len(), 1, "second connection admitted over the limit");

    drop(first);
    wait_for(&harness.manager, &[2]).await;

    harness.shutdown.cancel();
    harness.task.await.expect("accept loop");
}

#[tokio::test]
async fn loop_exits_on_shutdown_while_at_capacity() {
    let harness = spawn_loop(1).await;
    let _held = TcpStream::connect(harness.addr).await.expect("connect");
    wait_for(&harness.manager, &[1]).await;

    harness.shutdown.cancel();
    timeout(Duration::from_secs(1), harness.task)
        .await
        .expect("loop exits")
        .expect("accept loop");
}

fn context(manager: &Arc<ConnectionManager>, shutdown: &CancellationToken) -> AcceptContext {
    AcceptContext::new(
        Transport::Tcp,
        Arc::new(test_config(HandlerRouter::new().build()).with_manager(manager)),
        Arc::clone(manager),
        8,
        shutdown.clone(),
        TaskTracker::new(),
        BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
    )
}

#[tokio::test]
async fn connection_registered_after_final_sweep_is_stopped() {
    let manager = Arc::new(ConnectionManager::new());
    let shutdown = CancellationToken::new();
    let ctx = context(&manager, &shutdown);
    shutdown.cancel();
    manager.clear();

    // The peer stays open, so only shutdown can end the connection.
    let (local, _remote) = tokio::io::duplex(1024);
    register(&ctx, ConnectionAddrs::default(), split_stream(local));
    ctx.tracker.close();
    timeout(Duration::from_secs(1), ctx.tracker.wait())
        .await
        .expect("connection task finishes");
    assert!(manager.is_empty());
}

/// Listener whose every accept fails, logging the time of each call and
/// cancelling `shutdown` on the last one.
fn failing_listener(
    calls: &Arc<Mutex<Vec<Instant>>>,
    shutdown: &CancellationToken,
    num_calls: usize,
) -> MockAcceptListener {
    let mut listener = MockAcceptListener::new();
    let call_log = Arc::clone(calls);
    let shutdown = shutdown.clone();
    listener
        .expect_accept()
        .returning(move || {
            let call_log = Arc::clone(&call_log);
            let shutdown = shutdown.clone();
            Box::pin(async move {
                let mut log = call_log.lock().expect("lock");
                log.push(Instant::now());
                if log.len() == num_calls {
                    shutdown.cancel();
                }
                Err(io::Error::other("accept failed"))
            })
        })
        .times(num_calls);
    listener
        .expect_local_addr()
        .returning(|| Ok("127.0.0.1:0".parse().expect("addr parse")))
        .times(num_calls);
    listener
}

#[tokio::test(start_paused = true)]
async fn accept_errors_back_off_exponentially_up_to_the_cap() {
    let manager = Arc::new(ConnectionManager::new());
    let shutdown = CancellationToken::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(failing_listener(&calls, &shutdown, 5));
    let ctx = Arc::new(context(&manager, &shutdown));

    timeout(Duration::from_secs(1), accept_loop(listener, ctx))
        .await
        .expect("loop exits once cancelled");

    let calls = calls.lock().expect("lock");
    let intervals: Vec<Duration> = calls
        .windows(2)
        .filter_map(|pair| match pair {
            [a, b] => Some(b.duration_since(*a)),
            _ => None,
        })
        .collect();
    assert_eq!(
        intervals,
        [5, 10, 20, 20].map(Duration::from_millis),
        "delays double from the initial value and stop at the cap"
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_accept_error_back_off() {
    let manager = Arc::new(ConnectionManager::new());
    let shutdown = CancellationToken::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(failing_listener(&calls, &shutdown, 1));
    let ctx = Arc::new(context(&manager, &shutdown));
    let started = Instant::now();

    accept_loop(listener, ctx).await;
    assert!(started.elapsed() < Duration::from_millis(5));
}
