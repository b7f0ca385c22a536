//! Demo server answering ping requests.
//!
//! Message id `1` is answered with `pong` on the same id. Everything else is
//! logged and ignored.

mod cli;

use std::process::ExitCode;

use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wirepump::{
    config::ServerConfig,
    request::Request,
    router::{HandlerRouter, MsgHandler},
    server::Server,
};

const PING: u32 = 1;

struct Ping;

#[async_trait]
impl MsgHandler for Ping {
    async fn handle(&self, req: &Request) {
        tracing::debug!(conn_id = %req.conn_id(), data = ?req.data(), "ping");
        if let Err(err) = req.connection().send_msg(PING, b"pong").await {
            tracing::warn!(conn_id = %req.conn_id(), error = %err, "failed to answer ping");
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    let mut config = match ServerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "configuration rejected");
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    let router = match HandlerRouter::new().route(PING, Ping) {
        Ok(router) => router.build(),
        Err(err) => {
            tracing::error!(error = %err, "failed to build router");
            return ExitCode::FAILURE;
        }
    };
    let server = match Server::new(config, router) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to create server");
            return ExitCode::FAILURE;
        }
    };
    let server = match cli.heartbeat {
        Some(interval) => server.with_default_heartbeat(interval),
        None => server,
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            ExitCode::FAILURE
        }
    }
}
