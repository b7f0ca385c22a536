//! Request dispatch: inline or on a fixed worker pool.
//!
//! With a pool size of zero each request runs on the connection's read pump,
//! so a connection handles one request at a time. Otherwise the dispatcher
//! owns `pool_size` worker tasks, each draining its own bounded queue.
//! [`DispatchMode::ByConnection`] pins a connection to worker
//! `conn_id % pool_size`, preserving per-connection order;
//! [`DispatchMode::RoundRobin`] spreads requests across workers and gives up
//! ordering for balance.
//!
//! A panicking handler is caught per request and logged; the worker keeps
//! serving.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::FutureExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    metrics::{self, ErrorKind},
    middleware::{Interceptor, Next},
    panic::format_panic,
    request::Request,
    router::Router,
};

/// Default number of workers.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;
/// Default depth of each worker's queue.
pub const DEFAULT_MAX_WORKER_TASK_LEN: usize = 1024;

/// How requests are assigned to workers.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// `conn_id % pool_size`; requests of one connection stay ordered.
    #[default]
    ByConnection,
    /// Rotate through workers regardless of connection.
    RoundRobin,
}

/// Interceptors and router shared by every worker.
struct Pipeline {
    router: Arc<Router>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    heartbeat_msg_id: Option<u32>,
}

impl Pipeline {
    async fn execute(&self, req: Request) {
        let msg_id = req.msg_id();
        let conn_id = req.conn_id();
        let next = Next::new(&self.interceptors, &self.router, self.heartbeat_msg_id);
        if let Err(panic) = AssertUnwindSafe(next.run(req)).catch_unwind().await {
            let panic_msg = format_panic(&*panic);
            tracing::error!(%conn_id, msg_id, panic = %panic_msg, "handler panicked");
            metrics::inc_errors(ErrorKind::HandlerPanic);
        }
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    router: Arc<Router>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    heartbeat_msg_id: Option<u32>,
    pool_size: usize,
    queue_depth: usize,
    mode: DispatchMode,
}

impl DispatcherBuilder {
    /// Number of workers; `0` runs requests inline.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Depth of each worker queue. Clamped to at least one.
    #[must_use]
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Worker assignment policy.
    #[must_use]
    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append an interceptor; interceptors run in registration order.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Absorb unrouted requests carrying `msg_id` without a warning.
    #[must_use]
    pub fn heartbeat_msg_id(mut self, msg_id: Option<u32>) -> Self {
        self.heartbeat_msg_id = msg_id;
        self
    }

    /// Finish the dispatcher. Workers start with [`Dispatcher::start`].
    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            pipeline: Arc::new(Pipeline {
                router: self.router,
                interceptors: self.interceptors,
                heartbeat_msg_id: self.heartbeat_msg_id,
            }),
            pool_size: self.pool_size,
            queue_depth: self.queue_depth,
            mode: self.mode,
            workers: OnceLock::new(),
            next: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }
}

/// Routes requests to handlers through the interceptor chain.
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    pool_size: usize,
    queue_depth: usize,
    mode: DispatchMode,
    workers: OnceLock<Vec<mpsc::Sender<Request>>>,
    next: AtomicUsize,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Dispatcher {
    /// Start configuring a dispatcher for `router` with default pool
    /// settings.
    #[must_use]
    pub fn builder(router: Arc<Router>) -> DispatcherBuilder {
        DispatcherBuilder {
            router,
            interceptors: Vec::new(),
            heartbeat_msg_id: None,
            pool_size: DEFAULT_WORKER_POOL_SIZE,
            queue_depth: DEFAULT_MAX_WORKER_TASK_LEN,
            mode: DispatchMode::default(),
        }
    }

    /// Dispatcher running every request inline.
    #[must_use]
    pub fn inline(router: Arc<Router>) -> Self { Self::builder(router).pool_size(0).build() }

    /// Router requests are dispatched to.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> { &self.pipeline.router }

    /// Configured worker count.
    #[must_use]
    pub fn pool_size(&self) -> usize { self.pool_size }

    /// Spawn the worker pool. Does nothing for inline dispatchers or when
    /// already started. Must be called within a Tokio runtime.
    pub fn start(&self) {
        if self.pool_size == 0 || self.workers.get().is_some() {
            return;
        }
        let mut senders = Vec::with_capacity(self.pool_size);
        let mut receivers = Vec::with_capacity(self.pool_size);
        for _ in 0..self.pool_size {
            let (tx, rx) = mpsc::channel(self.queue_depth);
            senders.push(tx);
            receivers.push(rx);
        }
        if self.workers.set(senders).is_err() {
            return;
        }
        for (worker_id, rx) in receivers.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let shutdown = self.shutdown.clone();
            self.tracker
                .spawn(worker_loop(worker_id, rx, pipeline, shutdown));
        }
        tracing::info!(
            workers = self.pool_size,
            queue_depth = self.queue_depth,
            mode = ?self.mode,
            "worker pool started"
        );
    }

    /// Stop the workers and wait for them to exit. Queued requests are
    /// dropped.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Hand `req` to its worker, or run it inline for a zero-sized pool.
    ///
    /// Waits while the chosen worker's queue is full. Requests submitted
    /// before [`Dispatcher::start`] or after [`Dispatcher::stop`] are dropped
    /// with a warning.
    pub async fn submit(&self, req: Request) {
        if self.pool_size == 0 {
            self.pipeline.execute(req).await;
            return;
        }
        let Some(workers) = self.workers.get() else {
            tracing::warn!(msg_id = req.msg_id(), "worker pool not started; request dropped");
            return;
        };
        if self.shutdown.is_cancelled() {
            tracing::warn!(msg_id = req.msg_id(), "worker pool stopped; request dropped");
            return;
        }
        let index = self.worker_index(&req, workers.len());
        if let Err(mpsc::error::SendError(req)) = workers[index].send(req).await {
            tracing::warn!(
                conn_id = %req.conn_id(),
                msg_id = req.msg_id(),
                worker = index,
                "worker queue closed; request dropped"
            );
        }
    }

    fn worker_index(&self, req: &Request, workers: usize) -> usize {
        match self.mode {
            DispatchMode::ByConnection => {
                let workers = u64::try_from(workers).unwrap_or(u64::MAX);
                usize::try_from(req.conn_id().as_u64() % workers).unwrap_or_default()
            }
            DispatchMode::RoundRobin => self.next.fetch_add(1, Ordering::Relaxed) % workers,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool_size", &self.pool_size)
            .field("queue_depth", &self.queue_depth)
            .field("mode", &self.mode)
            .field("started", &self.workers.get().is_some())
            .finish_non_exhaustive()
    }
}

async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<Request>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
) {
    tracing::trace!(worker_id, "worker started");
    loop {
        let req = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };
        pipeline.execute(req).await;
    }
    tracing::trace!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests;
