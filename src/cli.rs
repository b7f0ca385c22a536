//! Command line interface for the `wirepump` demo server.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use wirepump::config::{ServerConfig, ServerMode};

/// Command line arguments for the `wirepump` binary.
#[derive(Debug, Parser)]
#[command(name = "wirepump", version, about = "Demo ping server")]
pub struct Cli {
    /// TOML configuration file. Missing files fall back to defaults.
    #[arg(short, long, default_value = "wirepump.toml")]
    pub config: PathBuf,
    /// Interface to bind, overriding the configuration.
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind, overriding the port for the selected mode.
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Listening transport: `tcp` or `websocket`.
    #[arg(short, long)]
    pub mode: Option<ServerMode>,
    /// Probe connections at this interval, e.g. `3s`.
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub heartbeat: Option<Duration>,
}

impl Cli {
    /// Apply command line overrides to `config`.
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(port) = self.port {
            match config.mode {
                ServerMode::Tcp => config.tcp_port = port,
                ServerMode::WebSocket => config.ws_port = port,
            }
        }
    }
}
