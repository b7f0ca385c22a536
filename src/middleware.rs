//! Interceptors wrapping the dispatch boundary.
//!
//! Interceptors see every request before it reaches the router. Each one
//! receives a [`Next`] continuation and decides whether, and when, to pass
//! the request on. Timing, logging and access control live here without
//! touching connection internals.
//!
//! ```
//! use async_trait::async_trait;
//! use wirepump::{
//!     middleware::{Interceptor, Next},
//!     request::Request,
//! };
//!
//! struct Timing;
//!
//! #[async_trait]
//! impl Interceptor for Timing {
//!     async fn intercept(&self, req: Request, next: Next<'_>) {
//!         let started = std::time::Instant::now();
//!         let msg_id = req.msg_id();
//!         next.run(req).await;
//!         tracing::debug!(msg_id, elapsed = ?started.elapsed(), "handled");
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::{request::Request, router::Router};

/// Code run around every dispatched request.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// Inspect `req` and usually call [`Next::run`]. Dropping `next` without
    /// running it swallows the request.
    async fn intercept(&self, req: Request, next: Next<'_>);
}

/// Continuation to the remaining interceptors and, last, the router.
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    router: &'a Router,
    heartbeat_msg_id: Option<u32>,
}

impl<'a> Next<'a> {
    pub(crate) const fn new(
        interceptors: &'a [Arc<dyn Interceptor>],
        router: &'a Router,
        heartbeat_msg_id: Option<u32>,
    ) -> Self {
        Self {
            interceptors,
            router,
            heartbeat_msg_id,
        }
    }

    /// Pass `req` to the next interceptor, or route it if none remain.
    pub async fn run(self, req: Request) {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                let next = Next::new(rest, self.router, self.heartbeat_msg_id);
                first.intercept(req, next).await;
            }
            None => {
                if self.router.dispatch(&req).await {
                    return;
                }
                if Some(req.msg_id()) == self.heartbeat_msg_id {
                    tracing::trace!(conn_id = %req.conn_id(), "heartbeat absorbed");
                } else {
                    tracing::warn!(
                        conn_id = %req.conn_id(),
                        msg_id = req.msg_id(),
                        "no route for message id"
                    );
                }
            }
        }
    }
}
