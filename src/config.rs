//! Server settings.
//!
//! [`ServerConfig`] is a plain value: build it in code, or layer a TOML file
//! and `WIREPUMP_*` environment variables over the defaults with
//! [`ServerConfig::load`]. A server copies what it needs at construction, so
//! changing a config value afterwards has no effect on a running server.

use std::{fmt, path::Path, str::FromStr, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    connection::{DEFAULT_IO_READ_BUFF_SIZE, DEFAULT_MAX_MSG_CHAN_LEN, DEFAULT_SEND_BUFF_TIMEOUT},
    dispatch::{DEFAULT_MAX_WORKER_TASK_LEN, DEFAULT_WORKER_POOL_SIZE, DispatchMode},
    heartbeat::DEFAULT_HEARTBEAT_MAX,
    pack::PackKind,
    router::RouterMode,
};

/// Default time allowed for a TLS or WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix of environment variables read by [`ServerConfig::load`].
pub const ENV_PREFIX: &str = "WIREPUMP";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    /// A value is out of range or inconsistent with another.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Transport the server listens with.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServerMode {
    /// Raw TCP, optionally wrapped in TLS.
    #[default]
    Tcp,
    /// WebSocket over TCP.
    #[serde(rename = "websocket", alias = "ws")]
    WebSocket,
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::WebSocket => "websocket",
        })
    }
}

impl FromStr for ServerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "websocket" | "ws" => Ok(Self::WebSocket),
            _ => Err(ConfigError::Invalid("mode must be `tcp` or `websocket`")),
        }
    }
}

/// Settings for one server.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported by connections and logs.
    pub name: String,
    /// Interface to bind.
    pub host: String,
    /// Port used in [`ServerMode::Tcp`]. `0` picks a free port.
    pub tcp_port: u16,
    /// Port used in [`ServerMode::WebSocket`]. `0` picks a free port.
    pub ws_port: u16,
    /// Listening transport.
    pub mode: ServerMode,
    /// Live connections above which the accept loop waits.
    pub max_conn: usize,
    /// Largest payload accepted or sent. `0` disables the limit.
    pub max_packet_size: u32,
    /// Dispatcher workers; `0` handles requests on the read pump.
    pub worker_pool_size: usize,
    /// Queue depth of each worker.
    pub max_worker_task_len: usize,
    /// Depth of each connection's outbound queue.
    pub max_msg_chan_len: usize,
    /// Size of each connection's read buffer.
    pub io_read_buff_size: usize,
    /// Silence after which the heartbeat considers a peer dead.
    #[serde(with = "humantime_serde")]
    pub heartbeat_max: Duration,
    /// How long a buffered send waits for queue space.
    #[serde(with = "humantime_serde")]
    pub send_buff_timeout: Duration,
    /// Time allowed for a TLS or WebSocket handshake before the socket is
    /// dropped. Pending handshakes count toward `max_conn`.
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
    /// Routing mode the server's router must be built in.
    pub router_mode: RouterMode,
    /// Packet layout.
    pub pack_kind: PackKind,
    /// Worker assignment policy.
    pub dispatch_mode: DispatchMode,
    /// PEM certificate chain. TLS is enabled when this and the key are set.
    pub cert_file: Option<String>,
    /// PEM private key.
    pub private_key_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: String::from("wirepump"),
            host: String::from("0.0.0.0"),
            tcp_port: 8999,
            ws_port: 9000,
            mode: ServerMode::Tcp,
            max_conn: 12_000,
            max_packet_size: 4096,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            max_worker_task_len: DEFAULT_MAX_WORKER_TASK_LEN,
            max_msg_chan_len: DEFAULT_MAX_MSG_CHAN_LEN,
            io_read_buff_size: DEFAULT_IO_READ_BUFF_SIZE,
            heartbeat_max: DEFAULT_HEARTBEAT_MAX,
            send_buff_timeout: DEFAULT_SEND_BUFF_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            router_mode: RouterMode::Handler,
            pack_kind: PackKind::LengthType,
            dispatch_mode: DispatchMode::ByConnection,
            cert_file: None,
            private_key_file: None,
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid by the TOML file at `path` when it exists, overlaid
    /// by `WIREPUMP_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::Load`] if a source cannot be parsed and
    /// [`ConfigError::Invalid`] if the merged settings fail
    /// [`ServerConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        tracing::debug!(path = %path.display(), ?config, "configuration loaded");
        Ok(config)
    }

    /// Check values that would make the server unusable.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_conn == 0 {
            return Err(ConfigError::Invalid("max_conn must be at least 1"));
        }
        if self.io_read_buff_size == 0 {
            return Err(ConfigError::Invalid("io_read_buff_size must be at least 1"));
        }
        if self.max_msg_chan_len == 0 {
            return Err(ConfigError::Invalid("max_msg_chan_len must be at least 1"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::Invalid("handshake_timeout must be non-zero"));
        }
        if self.worker_pool_size > 0 && self.max_worker_task_len == 0 {
            return Err(ConfigError::Invalid(
                "max_worker_task_len must be at least 1 when workers are enabled",
            ));
        }
        if self.cert_file.is_some() != self.private_key_file.is_some() {
            return Err(ConfigError::Invalid(
                "cert_file and private_key_file must be set together",
            ));
        }
        if self.mode == ServerMode::WebSocket && self.tls_enabled() {
            return Err(ConfigError::Invalid("TLS is only supported in tcp mode"));
        }
        Ok(())
    }

    /// Port for the configured [`ServerMode`].
    #[must_use]
    pub fn port(&self) -> u16 {
        match self.mode {
            ServerMode::Tcp => self.tcp_port,
            ServerMode::WebSocket => self.ws_port,
        }
    }

    /// `host:port` the server binds.
    #[must_use]
    pub fn bind_addr(&self) -> String { format!("{}:{}", self.host, self.port()) }

    /// `true` when both TLS files are configured.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.cert_file.is_some() && self.private_key_file.is_some()
    }
}
