use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rstest::rstest;
use tokio::sync::mpsc;
use tracing_test::traced_test;

use super::*;
use crate::{
    message::Message,
    router::{HandlerRouter, MsgHandler},
    test_helpers::test_connection,
};

struct Record(mpsc::UnboundedSender<(u64, Bytes)>);

#[async_trait]
impl MsgHandler for Record {
    async fn handle(&self, req: &Request) {
        let _ = self.0.send((req.conn_id().as_u64(), req.data().clone()));
    }
}

struct Explode;

#[async_trait]
impl MsgHandler for Explode {
    async fn handle(&self, _req: &Request) { panic!("handler exploded"); }
}

fn router(tx: mpsc::UnboundedSender<(u64, Bytes)>) -> Arc<Router> {
    Arc::new(
        HandlerRouter::new()
            .route(1, Record(tx))
            .and_then(|r| r.route(2, Explode))
            .expect("routes")
            .build(),
    )
}

fn request(conn_id: u64, msg_id: u32, data: &'static [u8]) -> Request {
    Request::new(test_connection(conn_id).conn, Message::new(msg_id, data))
}

#[tokio::test]
async fn inline_dispatch_completes_before_submit_returns() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::inline(router(tx));
    dispatcher.submit(request(1, 1, b"now")).await;
    assert_eq!(rx.try_recv().ok(), Some((1, Bytes::from_static(b"now"))));
}

#[rstest]
#[case::by_connection(DispatchMode::ByConnection)]
#[case::round_robin_single_worker(DispatchMode::RoundRobin)]
#[tokio::test]
async fn pool_preserves_per_connection_order(#[case] mode: DispatchMode) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pool_size = if mode == DispatchMode::RoundRobin { 1 } else { 4 };
    let dispatcher = Dispatcher::builder(router(tx))
        .pool_size(pool_size)
        .queue_depth(8)
        .mode(mode)
        .build();
    dispatcher.start();

    let conn = test_connection(6).conn;
    let payloads: Vec<Bytes> = (0..50u8).map(|n| Bytes::from(vec![n])).collect();
    for payload in &payloads {
        let req = Request::new(Arc::clone(&conn), Message::new(1, payload.clone()));
        dispatcher.submit(req).await;
    }
    for expected in &payloads {
        let (conn_id, got) = rx.recv().await.expect("dispatched");
        assert_eq!(conn_id, 6);
        assert_eq!(&got, expected);
    }
    dispatcher.stop().await;
}

#[tokio::test]
#[traced_test]
async fn handler_panic_is_contained() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::builder(router(tx)).pool_size(1).build();
    dispatcher.start();

    dispatcher.submit(request(3, 2, b"boom")).await;
    dispatcher.submit(request(3, 1, b"after")).await;
    assert_eq!(rx.recv().await, Some((3, Bytes::from_static(b"after"))));
    assert!(logs_contain("handler panicked"));
    assert!(logs_contain("handler exploded"));
    dispatcher.stop().await;
}

#[tokio::test]
#[traced_test]
async fn submit_without_running_pool_drops_request() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::builder(router(tx)).pool_size(2).build();
    dispatcher.submit(request(1, 1, b"early")).await;
    assert!(logs_contain("worker pool not started"));

    dispatcher.start();
    dispatcher.stop().await;
    dispatcher.submit(request(1, 1, b"late")).await;
    assert!(logs_contain("worker pool stopped"));
    assert!(rx.try_recv().is_err());
}

struct Tag {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
    swallow: Option<u32>,
}

#[async_trait]
impl Interceptor for Tag {
    async fn intercept(&self, req: Request, next: Next<'_>) {
        self.log.lock().expect("lock").push(self.name);
        if Some(req.msg_id()) == self.swallow {
            return;
        }
        next.run(req).await;
    }
}

#[tokio::test]
async fn interceptors_wrap_routing_in_registration_order() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Dispatcher::builder(router(tx))
        .pool_size(0)
        .interceptor(Arc::new(Tag {
            name: "outer",
            log: Arc::clone(&log),
            swallow: None,
        }))
        .interceptor(Arc::new(Tag {
            name: "inner",
            log: Arc::clone(&log),
            swallow: Some(7),
        }))
        .build();

    dispatcher.submit(request(1, 1, b"routed")).await;
    assert_eq!(rx.try_recv().ok(), Some((1, Bytes::from_static(b"routed"))));
    dispatcher.submit(request(1, 7, b"swallowed")).await;
    assert_eq!(*log.lock().expect("lock"), ["outer", "inner", "outer", "inner"]);
}

#[tokio::test]
#[traced_test]
async fn heartbeat_id_without_route_is_absorbed_quietly() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::builder(router(tx))
        .pool_size(0)
        .heartbeat_msg_id(Some(99_999))
        .build();
    dispatcher.submit(request(1, 99_999, b"ping")).await;
    assert!(!logs_contain("no route for message id"));
    dispatcher.submit(request(1, 99, b"?")).await;
    assert!(logs_contain("no route for message id"));
}
