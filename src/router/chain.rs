//! Handler-chain mode with global and grouped middleware.
//!
//! Every route owns an ordered list of [`ChainHandler`]s. When a request
//! arrives the chain for its id runs front to back until a handler returns
//! [`Flow::Abort`]. Global middleware registered with
//! [`ChainRouter::use_global`] runs first, then the middleware of the
//! [`Group`] the route was registered through, then the route's own
//! handlers.

use std::{collections::HashMap, ops::RangeInclusive, sync::Arc};

use futures::{FutureExt, future::BoxFuture};

use super::{RouteError, Router};
use crate::request::Request;

/// Whether a chain continues after a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Run the next handler.
    Continue,
    /// Skip the rest of the chain.
    Abort,
}

/// One link of a handler chain.
pub type ChainHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Flow> + Send + Sync>;

/// Wrap an async closure as a [`ChainHandler`].
pub fn chain_fn<F, Fut>(f: F) -> ChainHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Flow> + Send + 'static,
{
    Arc::new(move |req| f(req).boxed())
}

/// Builder for a [`Router::Chains`] table.
#[derive(Default)]
pub struct ChainRouter {
    global: Vec<ChainHandler>,
    routes: HashMap<u32, Vec<ChainHandler>>,
}

impl ChainRouter {
    /// Empty table with no global middleware.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append middleware that runs ahead of every route.
    #[must_use]
    pub fn use_global(mut self, handlers: impl IntoIterator<Item = ChainHandler>) -> Self {
        self.global.extend(handlers);
        self
    }

    /// Register the chain for `msg_id`.
    ///
    /// # Errors
    /// Returns [`RouteError::DuplicateRoute`] if `msg_id` is already taken.
    pub fn route(
        mut self,
        msg_id: u32,
        handlers: impl IntoIterator<Item = ChainHandler>,
    ) -> Result<Self, RouteError> {
        self.insert(msg_id, handlers.into_iter().collect())?;
        Ok(self)
    }

    /// Register routes restricted to `range`, each prefixed by `middleware`.
    ///
    /// ```
    /// use wirepump::router::{ChainRouter, Flow, chain_fn};
    ///
    /// let auth = chain_fn(|_req| async { Flow::Continue });
    /// let login = chain_fn(|_req| async { Flow::Continue });
    /// let router = ChainRouter::new()
    ///     .group(100..=199, [auth], |g| g.route(100, [login]))
    ///     .expect("routes are unique")
    ///     .build();
    /// # let _ = router;
    /// ```
    ///
    /// # Errors
    /// Propagates the first error returned while registering the group.
    pub fn group<F>(
        self,
        range: RangeInclusive<u32>,
        middleware: impl IntoIterator<Item = ChainHandler>,
        register: F,
    ) -> Result<Self, RouteError>
    where
        F: FnOnce(Group) -> Result<Group, RouteError>,
    {
        let group = Group {
            range,
            middleware: middleware.into_iter().collect(),
            router: self,
        };
        Ok(register(group)?.router)
    }

    fn insert(&mut self, msg_id: u32, chain: Vec<ChainHandler>) -> Result<(), RouteError> {
        if self.routes.contains_key(&msg_id) {
            return Err(RouteError::DuplicateRoute(msg_id));
        }
        tracing::debug!(msg_id, handlers = chain.len(), "chain registered");
        self.routes.insert(msg_id, chain);
        Ok(())
    }

    /// Freeze the table, prefixing every chain with the global middleware.
    #[must_use]
    pub fn build(self) -> Router {
        let global = self.global;
        let routes = self
            .routes
            .into_iter()
            .map(|(msg_id, chain)| {
                let full: Arc<[ChainHandler]> = global.iter().cloned().chain(chain).collect();
                (msg_id, full)
            })
            .collect();
        Router::Chains(routes)
    }
}

/// Routes sharing an id range and scoped middleware.
pub struct Group {
    range: RangeInclusive<u32>,
    middleware: Vec<ChainHandler>,
    router: ChainRouter,
}

impl Group {
    /// Register the chain for `msg_id` behind the group middleware.
    ///
    /// # Errors
    /// Returns [`RouteError::OutsideGroup`] if `msg_id` is outside the
    /// group's range and [`RouteError::DuplicateRoute`] if it is taken.
    pub fn route(
        mut self,
        msg_id: u32,
        handlers: impl IntoIterator<Item = ChainHandler>,
    ) -> Result<Self, RouteError> {
        if !self.range.contains(&msg_id) {
            return Err(RouteError::OutsideGroup {
                msg_id,
                start: *self.range.start(),
                end: *self.range.end(),
            });
        }
        let chain = self.middleware.iter().cloned().chain(handlers).collect();
        self.router.insert(msg_id, chain)?;
        Ok(self)
    }

    /// Append middleware for routes registered after this call.
    #[must_use]
    pub fn use_middleware(mut self, handlers: impl IntoIterator<Item = ChainHandler>) -> Self {
        self.middleware.extend(handlers);
        self
    }
}
