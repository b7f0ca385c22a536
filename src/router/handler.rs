//! Handler-per-route mode.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use super::{RouteError, Router};
use crate::request::Request;

/// Handler invoked for one message type id.
///
/// `pre_handle`, `handle` and `post_handle` run in that order for every
/// request. Only `handle` is required.
///
/// ```
/// use async_trait::async_trait;
/// use wirepump::{request::Request, router::MsgHandler};
///
/// struct Ping;
///
/// #[async_trait]
/// impl MsgHandler for Ping {
///     async fn handle(&self, req: &Request) {
///         let _ = req.connection().send_msg(1, b"pong").await;
///     }
/// }
/// ```
#[async_trait]
pub trait MsgHandler: Send + Sync + 'static {
    /// Runs before [`MsgHandler::handle`].
    async fn pre_handle(&self, _req: &Request) {}

    /// Handle the request.
    async fn handle(&self, req: &Request);

    /// Runs after [`MsgHandler::handle`].
    async fn post_handle(&self, _req: &Request) {}
}

/// Builder for a [`Router::Handlers`] table.
#[derive(Default)]
pub struct HandlerRouter {
    routes: HashMap<u32, Arc<dyn MsgHandler>>,
}

impl HandlerRouter {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `handler` for `msg_id`.
    ///
    /// # Errors
    /// Returns [`RouteError::DuplicateRoute`] if `msg_id` is already taken.
    pub fn route(mut self, msg_id: u32, handler: impl MsgHandler) -> Result<Self, RouteError> {
        if self.routes.contains_key(&msg_id) {
            return Err(RouteError::DuplicateRoute(msg_id));
        }
        self.routes.insert(msg_id, Arc::new(handler));
        tracing::debug!(msg_id, "handler registered");
        Ok(self)
    }

    /// Freeze the table.
    #[must_use]
    pub fn build(self) -> Router { Router::Handlers(self.routes) }
}
