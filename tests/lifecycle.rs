//! Connection hooks, heartbeats and server logging over real sockets.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rstest::rstest;
use wirepump::{
    config::ServerConfig,
    heartbeat::{DEFAULT_HEARTBEAT_MSG_ID, HeartbeatChecker},
    router::HandlerRouter,
    server::Server,
};
use wirepump_testing::{FrameClient, LoggerHandle, TestResult, local_config, logger, spawn_with};

#[rstest]
#[tokio::test]
async fn hooks_greet_and_count_stops(local_config: ServerConfig) -> TestResult {
    let stops = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&stops);
    let server = Server::new(local_config, HandlerRouter::new().build())?
        .on_conn_start(|conn| async move {
            let greeting = format!("welcome {}", conn.id());
            conn.send_msg(0, greeting.as_bytes()).await.expect("greeting");
        })
        .on_conn_stop(move |_conn| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
    let running = spawn_with(server).await?;

    let mut client = FrameClient::connect(running.addr).await?;
    let greeting = client.recv().await?.expect("greeting");
    assert_eq!(&greeting.data()[..], b"welcome 1");
    client.close().await?;

    tokio::time::timeout(Duration::from_secs(5), async {
        while stops.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    running.shutdown().await;
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn silent_peer_is_probed_then_dropped(local_config: ServerConfig) -> TestResult {
    let checker = HeartbeatChecker::new(Duration::from_millis(50), Duration::from_millis(300));
    let server = Server::new(local_config, HandlerRouter::new().build())?.with_heartbeat(checker);
    let running = spawn_with(server).await?;

    let mut client = FrameClient::connect(running.addr).await?;
    let probe = client.recv().await?.expect("probe");
    assert_eq!(probe.msg_id(), DEFAULT_HEARTBEAT_MSG_ID);
    assert_eq!(&probe.data()[..], b"ping");

    // Further probes may arrive before the silence limit is reached.
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(Some(_)) = client.recv().await {}
    })
    .await?;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !running.server.manager().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    running.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn answering_peer_stays_connected(local_config: ServerConfig) -> TestResult {
    let checker = HeartbeatChecker::new(Duration::from_millis(50), Duration::from_millis(300));
    let server = Server::new(local_config, HandlerRouter::new().build())?.with_heartbeat(checker);
    let running = spawn_with(server).await?;

    let mut client = FrameClient::connect(running.addr).await?;
    for _ in 0..12 {
        let probe = client.recv().await?.expect("probe");
        // Answering with the heartbeat id is absorbed without a route.
        client.send(probe.msg_id(), b"pong").await?;
    }
    assert_eq!(running.server.manager().len(), 1);

    running.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn startup_is_logged(local_config: ServerConfig, mut logger: LoggerHandle) -> TestResult {
    let config = ServerConfig {
        name: String::from("logged"),
        ..local_config
    };
    let running = spawn_with(Server::new(config, HandlerRouter::new().build())?).await?;
    running.shutdown().await;
    let records = logger.drain();
    assert!(
        records
            .iter()
            .any(|(_, msg)| msg.starts_with("server listening: name=logged")),
        "startup not logged: {records:?}"
    );
    assert!(records.iter().any(|(_, msg)| msg == "server stopped: name=logged"));
    Ok(())
}
