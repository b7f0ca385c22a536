#![doc(html_root_url = "https://docs.rs/wirepump/latest")]
//! Public API for the `wirepump` library.
//!
//! `wirepump` is a connection engine for length-prefixed binary protocols
//! over TCP, TLS and WebSocket. It reassembles frames from arbitrary byte
//! chunks, routes decoded messages by id to handlers on a fixed worker pool,
//! tracks live connections and detects dead peers with heartbeats.

pub mod byte_order;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod frame;
pub mod heartbeat;
pub mod hooks;
pub mod manager;
pub mod message;
pub mod metrics;
pub mod middleware;
pub mod pack;
pub mod panic;
pub mod request;
pub mod router;
pub mod server;

#[cfg(test)]
mod test_helpers;

pub use client::{Client, ClientConfig, ClientError};
pub use config::{ConfigError, ServerConfig, ServerMode};
pub use connection::{Connection, ConnectionError, ConnectionId};
pub use dispatch::{DispatchMode, Dispatcher};
pub use frame::{FrameDecoder, FramingError, LengthField};
pub use heartbeat::HeartbeatChecker;
pub use manager::{ConnectionManager, ManagerError};
pub use message::Message;
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use pack::{DataPack, PackError, PackKind};
pub use request::Request;
pub use router::{ChainRouter, Flow, HandlerRouter, MsgHandler, RouteError, Router, RouterMode};
pub use server::{Server, ServerError};
