//! Message type id to handler routing.
//!
//! A [`Router`] is built once, in one of two modes, and is immutable while
//! the server runs:
//!
//! - [`Router::Handlers`] maps each id to a single [`MsgHandler`] with
//!   `pre_handle`, `handle` and `post_handle` steps.
//! - [`Router::Chains`] maps each id to an ordered chain of
//!   [`ChainHandler`]s, any of which may abort the rest.

mod chain;
mod handler;


use std::{collections::HashMap, fmt, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

pub use self::{
    chain::{ChainHandler, ChainRouter, Flow, Group, chain_fn},
    handler::{HandlerRouter, MsgHandler},
};
use crate::request::Request;

/// Errors raised while building a router.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// A route for this id already exists.
    #[error("route already registered for message id {0}")]
    DuplicateRoute(u32),
    /// A group tried to register an id outside its range.
    #[error("message id {msg_id} is outside group range {start}..={end}")]
    OutsideGroup {
        /// Rejected id.
        msg_id: u32,
        /// First id of the group.
        start: u32,
        /// Last id of the group.
        end: u32,
    },
}

/// Routing mode named in configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouterMode {
    /// One [`MsgHandler`] per id.
    #[default]
    Handler,
    /// A chain of [`ChainHandler`]s per id.
    Chain,
}

impl fmt::Display for RouterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Handler => "handler",
            Self::Chain => "chain",
        })
    }
}

/// Immutable routing table.
pub enum Router {
    /// Handler-per-route table.
    Handlers(HashMap<u32, Arc<dyn MsgHandler>>),
    /// Handler-chain table with middleware already folded in.
    Chains(HashMap<u32, Arc<[ChainHandler]>>),
}

impl Router {
    /// Mode this table was built in.
    #[must_use]
    pub fn mode(&self) -> RouterMode {
        match self {
            Self::Handlers(_) => RouterMode::Handler,
            Self::Chains(_) => RouterMode::Chain,
        }
    }

    /// `true` if a route exists for `msg_id`.
    #[must_use]
    pub fn contains(&self, msg_id: u32) -> bool {
        match self {
            Self::Handlers(routes) => routes.contains_key(&msg_id),
            Self::Chains(routes) => routes.contains_key(&msg_id),
        }
    }

    /// Run the route for `req`. Returns `false` when no route matches.
    pub async fn dispatch(&self, req: &Request) -> bool {
        match self {
            Self::Handlers(routes) => {
                let Some(handler) = routes.get(&req.msg_id()) else {
                    return false;
                };
                handler.pre_handle(req).await;
                handler.handle(req).await;
                handler.post_handle(req).await;
            }
            Self::Chains(routes) => {
                let Some(chain) = routes.get(&req.msg_id()) else {
                    return false;
                };
                for link in chain.iter() {
                    if link(req.clone()).await == Flow::Abort {
                        tracing::trace!(msg_id = req.msg_id(), "chain aborted");
                        break;
                    }
                }
            }
        }
        true
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<u32> = match self {
            Self::Handlers(routes) => routes.keys().copied().collect(),
            Self::Chains(routes) => routes.keys().copied().collect(),
        };
        ids.sort_unstable();
        f.debug_struct("Router")
            .field("mode", &self.mode())
            .field("routes", &ids)
            .finish()
    }
}
