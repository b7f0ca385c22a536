//! Helpers for exercising `wirepump` servers and connections in tests.
//!
//! [`spawn_server`] runs a [`Server`](wirepump::server::Server) on an
//! ephemeral localhost port and hands back its address; [`FrameClient`]
//! speaks the packet layout over a raw TCP stream so tests can assert on
//! exact frames without going through a second engine.
//!
//! ```rust,no_run
//! use wirepump::router::HandlerRouter;
//! use wirepump_testing::{FrameClient, TestResult, local_config, spawn_server};
//!
//! async fn example() -> TestResult {
//!     let running = spawn_server(local_config(), HandlerRouter::new().build()).await?;
//!     let mut client = FrameClient::connect(running.addr).await?;
//!     client.send(1, b"hi").await?;
//!     running.shutdown().await;
//!     Ok(())
//! }
//! ```

mod frames;
mod logging;
mod server;

pub use frames::{FrameClient, encode_frames};
pub use logging::{LoggerHandle, logger};
pub use server::{RunningServer, local_config, spawn_server, spawn_with, unused_listener};

/// Shared result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
