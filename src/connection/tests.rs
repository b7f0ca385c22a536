use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
};

use super::{ConnectionConfig, ConnectionError};
use crate::{
    dispatch::Dispatcher,
    hooks::{ConnectionHooks, connection_hook},
    manager::ConnectionManager,
    pack::{DataPack, LengthTypePack},
    request::Request,
    router::{HandlerRouter, MsgHandler},
    test_helpers::{TestConnection, test_config, test_connection, test_connection_with},
};

struct Record(mpsc::UnboundedSender<(u32, Bytes)>);

#[async_trait]
impl MsgHandler for Record {
    async fn handle(&self, req: &Request) {
        let _ = self.0.send((req.msg_id(), req.data().clone()));
    }
}

fn recording_connection(id: u64) -> (TestConnection, mpsc::UnboundedReceiver<(u32, Bytes)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let router = HandlerRouter::new()
        .route(1, Record(tx.clone()))
        .and_then(|r| r.route(2, Record(tx)))
        .expect("unique routes")
        .build();
    (test_connection_with(id, test_config(router), 64 * 1024), rx)
}

#[tokio::test]
async fn properties_round_trip_through_connection() {
    let TestConnection { conn, .. } = test_connection(1);
    conn.set_property("user", String::from("ada"));
    assert_eq!(conn.get_property::<String>("user").as_deref().map(String::as_str), Some("ada"));
    assert!(conn.remove_property("user"));
    assert!(conn.get_property::<String>("user").is_none());
}

#[tokio::test]
async fn byte_at_a_time_input_dispatches_in_order() {
    let (TestConnection { conn, source, mut remote }, mut rx) = recording_connection(3);
    let serve = tokio::spawn(Arc::clone(&conn).serve(source));

    let packer = LengthTypePack::new(4096);
    let mut wire = packer.pack(1, b"first").expect("pack").to_vec();
    wire.extend_from_slice(&packer.pack(2, b"").expect("pack"));
    wire.extend_from_slice(&packer.pack(1, b"third").expect("pack"));
    for byte in wire {
        remote.write_all(&[byte]).await.expect("write");
        tokio::task::yield_now().await;
    }

    assert_eq!(rx.recv().await, Some((1, Bytes::from_static(b"first"))));
    assert_eq!(rx.recv().await, Some((2, Bytes::new())));
    assert_eq!(rx.recv().await, Some((1, Bytes::from_static(b"third"))));

    drop(remote);
    serve.await.expect("serve task");
    assert!(conn.is_closed());
}

#[tokio::test]
async fn finalization_runs_once_and_deregisters() {
    let stops = Arc::new(AtomicUsize::new(0));
    let manager = Arc::new(ConnectionManager::new());
    let counter = Arc::clone(&stops);
    let hooks = ConnectionHooks {
        on_start: None,
        on_stop: Some(connection_hook(move |_conn| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })),
    };
    let config = test_config(HandlerRouter::new().build())
        .with_manager(&manager)
        .with_hooks(hooks);
    let TestConnection { conn, source, remote } = test_connection_with(9, config, 1024);
    manager.add(Arc::clone(&conn));

    let serve = tokio::spawn(Arc::clone(&conn).serve(source));
    conn.stop();
    conn.stop();
    serve.await.expect("serve task");
    conn.stop();
    conn.finalize().await;

    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(manager.is_empty());
    assert!(matches!(conn.send(b"late").await, Err(ConnectionError::Closed)));
    assert!(matches!(
        conn.send_buff_msg(1, b"late").await,
        Err(ConnectionError::Closed)
    ));
    drop(remote);
}

#[tokio::test]
async fn on_start_hook_can_greet_the_peer() {
    let hooks = ConnectionHooks {
        on_start: Some(connection_hook(|conn| async move {
            conn.send_msg(7, b"welcome").await.expect("greeting");
        })),
        on_stop: None,
    };
    let config = test_config(HandlerRouter::new().build()).with_hooks(hooks);
    let TestConnection { conn, source, mut remote } = test_connection_with(2, config, 1024);
    let serve = tokio::spawn(Arc::clone(&conn).serve(source));

    let mut frame = [0u8; 15];
    remote.read_exact(&mut frame).await.expect("greeting frame");
    let message = LengthTypePack::new(64)
        .unpack_frame(Bytes::copy_from_slice(&frame))
        .expect("valid frame");
    assert_eq!(message.msg_id(), 7);
    assert_eq!(&message.data()[..], b"welcome");

    conn.stop();
    serve.await.expect("serve task");
}

#[tokio::test]
async fn oversized_frame_closes_the_connection() {
    let (TestConnection { conn, source, mut remote }, _rx) = recording_connection(4);
    let serve = tokio::spawn(Arc::clone(&conn).serve(source));
    // Declares a 5000 byte payload against a 4096 byte limit.
    remote
        .write_all(&[0, 0, 0x13, 0x88, 0, 0, 0, 1])
        .await
        .expect("write");
    serve.await.expect("serve task");
    assert!(conn.is_closed());
}

#[tokio::test]
async fn full_queue_reports_queue_full() {
    let config = test_config(HandlerRouter::new().build())
        .with_max_msg_chan_len(1)
        .with_send_buff_timeout(Duration::from_millis(5));
    // The peer never reads, so the write pump blocks on the first frame.
    let TestConnection { conn, remote, .. } = test_connection_with(5, config, 16);
    let payload = [0u8; 64];

    let mut saw_full = false;
    for _ in 0..5 {
        match conn.send_buff_msg(1, &payload).await {
            Ok(()) => tokio::task::yield_now().await,
            Err(ConnectionError::QueueFull) => {
                saw_full = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(saw_full, "queue never reported full");
    conn.stop();
    drop(remote);
}

#[tokio::test(start_paused = true)]
async fn liveness_tracks_inbound_activity() {
    let TestConnection { conn, .. } = test_connection(6);
    conn.touch();
    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(conn.is_alive(Duration::from_secs(10)));
    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(conn.is_alive(Duration::from_secs(10)), "silence equal to the limit is alive");
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!conn.is_alive(Duration::from_secs(10)));
    conn.touch();
    assert!(conn.is_alive(Duration::from_secs(10)));
    conn.stop();
    assert!(!conn.is_alive(Duration::from_secs(10)));
}

#[tokio::test]
async fn payload_over_limit_is_rejected_before_writing() {
    let TestConnection { conn, .. } = test_connection(8);
    let err = conn
        .send_msg(1, &vec![0u8; 5000])
        .await
        .expect_err("payload exceeds max packet size");
    assert!(matches!(err, ConnectionError::Pack(_)));
}

/// Signals once it starts, then never returns.
struct Stuck(mpsc::UnboundedSender<()>);

#[async_trait]
impl MsgHandler for Stuck {
    async fn handle(&self, _req: &Request) {
        let _ = self.0.send(());
        std::future::pending::<()>().await;
    }
}

#[tokio::test]
async fn stop_unblocks_pump_waiting_on_full_worker_queue() {
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let router = HandlerRouter::new()
        .route(1, Stuck(started_tx))
        .expect("unique route")
        .build();
    let dispatcher = Arc::new(
        Dispatcher::builder(Arc::new(router))
            .pool_size(1)
            .queue_depth(1)
            .build(),
    );
    dispatcher.start();
    let config = ConnectionConfig::new(Arc::new(LengthTypePack::new(4096)), Arc::clone(&dispatcher));
    let TestConnection {
        conn,
        source,
        mut remote,
    } = test_connection_with(11, config, 64 * 1024);
    let serve = tokio::spawn(Arc::clone(&conn).serve(source));

    let packer = LengthTypePack::new(4096);
    for _ in 0..4 {
        remote
            .write_all(&packer.pack(1, b"work").expect("pack"))
            .await
            .expect("write");
    }
    started.recv().await.expect("handler started");
    // Let the pump fill the queue and block on the next submit.
    tokio::time::sleep(Duration::from_millis(50)).await;

    conn.stop();
    tokio::time::timeout(Duration::from_secs(2), serve)
        .await
        .expect("serve returns promptly after stop")
        .expect("serve task");
    assert!(conn.is_closed());
    drop(remote);
}
