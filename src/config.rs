// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Agent configuration, read once at startup from a TOML file.
//!
//! # Example
//!
//! ```toml
//! [relay]
//! host = "bemfa.com"
//! port = 8344
//! uid = "0123456789abcdef"
//! topic = "pc001"
//!
//! [http]
//! port = 18080
//!
//! [devices.1]
//! mac = "00:11:22:33:44:55"
//! host = "192.168.1.20"
//! user = "admin"
//! password = "secret"
//!
//! [presets]
//! on = ["1"]
//! off = ["1"]
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::action::{RemoteShutdown, SystemActions, WakeOnLan};
use crate::device::{DeviceEntry, DeviceTable};
use crate::error::{ConfigError, ValueError};
use crate::protocol::{
    DEFAULT_READ_CHUNK, Endpoint, MatchMode, ReceiveOptions, SessionConfig,
};

/// Complete agent configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Relay connection.
    pub relay: RelayConfig,
    /// HTTP control surface.
    #[serde(default)]
    pub http: HttpConfig,
    /// Log output.
    #[serde(default)]
    pub log: LogConfig,
    /// Wake-on-LAN broadcast.
    #[serde(default)]
    pub wol: WolConfig,
    /// Remote shutdown client.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Preset devices by id.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
    /// Enabled-lists.
    #[serde(default)]
    pub presets: PresetConfig,
}

/// `[relay]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Relay host.
    #[serde(default = "default_relay_host")]
    pub host: String,
    /// Relay port.
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Client identifier sent in the subscribe frame.
    #[serde(default)]
    pub uid: String,
    /// Topic to subscribe to.
    #[serde(default)]
    pub topic: String,
    /// Seconds between heartbeats.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Seconds between connection attempts.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Optional read timeout in seconds. Absent means reads wait forever.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    /// Read buffer size in bytes.
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
    /// How notifications are matched against the topic.
    #[serde(default)]
    pub match_mode: MatchMode,
}

/// `[http]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Whether the control surface is served at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Listen address.
    #[serde(default = "default_http_bind")]
    pub bind: IpAddr,
    /// Listen port.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Log file. Rotated to `<file>.bak` when it grows past `max_bytes`.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// Rotation threshold in bytes.
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// `[wol]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WolConfig {
    /// Broadcast address.
    #[serde(default = "default_wol_broadcast")]
    pub broadcast: IpAddr,
    /// Destination port.
    #[serde(default = "default_wol_port")]
    pub port: u16,
}

/// `[shutdown]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    /// Command run on the remote host.
    #[serde(default = "default_shutdown_command")]
    pub command: String,
    /// Seconds before the SSH client is killed.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub timeout_secs: u64,
    /// SSH client program.
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,
    /// `sshpass` program.
    #[serde(default = "default_sshpass_program")]
    pub sshpass_program: String,
}

/// `[presets]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresetConfig {
    /// Ordered ids woken by a power-on directive.
    #[serde(default = "default_preset_list")]
    pub on: Vec<String>,
    /// Ordered ids shut down by a power-off directive.
    #[serde(default = "default_preset_list")]
    pub off: Vec<String>,
}

fn default_relay_host() -> String {
    Endpoint::DEFAULT_HOST.to_string()
}
fn default_relay_port() -> u16 {
    Endpoint::DEFAULT_PORT
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_retry_delay_secs() -> u64 {
    3
}
fn default_read_chunk() -> usize {
    DEFAULT_READ_CHUNK
}
fn default_true() -> bool {
    true
}
fn default_http_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_http_port() -> u16 {
    18080
}
fn default_log_file() -> PathBuf {
    PathBuf::from("wol.log")
}
fn default_log_max_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_wol_broadcast() -> IpAddr {
    IpAddr::V4(Ipv4Addr::BROADCAST)
}
fn default_wol_port() -> u16 {
    WakeOnLan::DEFAULT_PORT
}
fn default_shutdown_command() -> String {
    RemoteShutdown::DEFAULT_COMMAND.to_string()
}
fn default_shutdown_timeout_secs() -> u64 {
    RemoteShutdown::DEFAULT_TIMEOUT.as_secs()
}
fn default_ssh_program() -> String {
    "ssh".to_string()
}
fn default_sshpass_program() -> String {
    "sshpass".to_string()
}
fn default_preset_list() -> Vec<String> {
    vec!["1".to_string()]
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_http_bind(),
            port: default_http_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            max_bytes: default_log_max_bytes(),
            level: default_log_level(),
        }
    }
}

impl Default for WolConfig {
    fn default() -> Self {
        Self {
            broadcast: default_wol_broadcast(),
            port: default_wol_port(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            command: default_shutdown_command(),
            timeout_secs: default_shutdown_timeout_secs(),
            ssh_program: default_ssh_program(),
            sshpass_program: default_sshpass_program(),
        }
    }
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            on: default_preset_list(),
            off: default_preset_list(),
        }
    }
}

impl Config {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is not valid
    /// TOML, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML or fails
    /// validation.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.uid.trim().is_empty() {
            return Err(ConfigError::MissingField("relay.uid"));
        }
        if self.relay.topic.trim().is_empty() {
            return Err(ConfigError::MissingField("relay.topic"));
        }
        if self.relay.host.trim().is_empty() {
            return Err(ConfigError::MissingField("relay.host"));
        }
        for (field, value) in [
            ("relay.uid", &self.relay.uid),
            ("relay.topic", &self.relay.topic),
        ] {
            if value.chars().any(|c| c.is_control() || c == '&' || c == '=') {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must not contain control characters, '&' or '='".to_string(),
                });
            }
        }
        for (field, value) in [
            ("relay.heartbeat_secs", self.relay.heartbeat_secs),
            ("relay.retry_delay_secs", self.relay.retry_delay_secs),
            ("shutdown.timeout_secs", self.shutdown.timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.relay.read_chunk == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay.read_chunk".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.relay.read_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "relay.read_timeout_secs".to_string(),
                message: "omit the field to disable the timeout".to_string(),
            });
        }
        if let Some(id) = self
            .devices
            .keys()
            .chain(&self.presets.on)
            .chain(&self.presets.off)
            .find(|id| id.trim().is_empty())
        {
            return Err(ValueError::InvalidDeviceId(id.clone()).into());
        }
        Ok(())
    }

    /// Relay session settings.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(
            Endpoint::new(self.relay.host.clone(), self.relay.port),
            self.relay.uid.clone(),
            self.relay.topic.clone(),
        )
        .with_retry_delay(Duration::from_secs(self.relay.retry_delay_secs))
    }

    /// Receive loop settings.
    #[must_use]
    pub fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            chunk: self.relay.read_chunk,
            read_timeout: self.relay.read_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Interval between heartbeats.
    #[must_use]
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.relay.heartbeat_secs)
    }

    /// Builds the immutable device table.
    #[must_use]
    pub fn device_table(&self) -> DeviceTable {
        let mut table = DeviceTable::new();
        for (id, entry) in &self.devices {
            table.insert(id.clone(), entry.clone());
        }
        table
            .with_power_on(self.presets.on.iter().map(|s| s.trim().to_string()))
            .with_power_off(self.presets.off.iter().map(|s| s.trim().to_string()))
    }

    /// Builds the real device actions.
    #[must_use]
    pub fn system_actions(&self) -> SystemActions {
        let wol = WakeOnLan::new(SocketAddr::new(self.wol.broadcast, self.wol.port));
        let shutdown = RemoteShutdown::new()
            .with_command(self.shutdown.command.clone())
            .with_timeout(Duration::from_secs(self.shutdown.timeout_secs))
            .with_ssh_program(self.shutdown.ssh_program.clone())
            .with_sshpass_program(self.shutdown.sshpass_program.clone());
        SystemActions::new(wol, shutdown)
    }

    /// Address the HTTP control surface listens on.
    #[must_use]
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.bind, self.http.port)
    }
}
