// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `wol_relay` - keep a relay subscription open and turn its notifications
//! into Wake-on-LAN and remote shutdown actions.
//!
//! The agent holds one TCP session to a publish/subscribe relay. It sends a
//! subscribe frame on connect and a heartbeat every 30 seconds, and it reads
//! notifications of the form `topic=<T>&msg=on|off`. A power-on notification
//! wakes every device in the power-on list; a power-off notification shuts
//! down every device in the power-off list. The same actions are available
//! over a small local HTTP API.
//!
//! # Modules
//!
//! - [`protocol`]: the relay session (connection supervisor, heartbeat,
//!   receive loop, frame codec)
//! - [`action`]: Wake-on-LAN, remote shutdown, and the dispatcher that maps
//!   directives to them
//! - [`control`]: the HTTP control surface
//! - [`device`]: MAC addresses and the preset device table
//! - [`config`] and [`logging`]: startup plumbing for the binary
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wol_relay::action::{Dispatcher, SystemActions};
//! use wol_relay::protocol::{self, ReceiveOptions, SessionConfig, Supervisor, TcpConnector};
//! use wol_relay::{DeviceEntry, DeviceTable, Endpoint};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut table = DeviceTable::new();
//!     table.insert(
//!         "1",
//!         DeviceEntry {
//!             mac: Some("00:11:22:33:44:55".parse().unwrap()),
//!             ..DeviceEntry::default()
//!         },
//!     );
//!     let table = Arc::new(table.with_power_on(["1"]));
//!
//!     let config = SessionConfig::new(Endpoint::default(), "my-uid", "pc001");
//!     let dispatcher = Arc::new(Dispatcher::new(
//!         table,
//!         Arc::new(SystemActions::default()),
//!         config.topic(),
//!     ));
//!     let supervisor = Arc::new(Supervisor::new(TcpConnector, config));
//!
//!     supervisor.connect().await;
//!     let tasks = protocol::spawn_session(
//!         &supervisor,
//!         &dispatcher,
//!         protocol::DEFAULT_HEARTBEAT_PERIOD,
//!         ReceiveOptions::default(),
//!     );
//!     let _ = tasks.receiver.await;
//! }
//! ```

pub mod action;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod logging;
pub mod protocol;

pub use action::{DeviceActions, Dispatcher, PresetOutcome, SystemActions};
pub use config::Config;
pub use device::{
    DEFAULT_SSH_PORT, DeviceEntry, DeviceTable, MAGIC_PACKET_LEN, MacAddress, ShutdownTarget,
};
pub use error::{ActionError, ConfigError, Error, ProtocolError, Result, ValueError};
pub use protocol::{
    Directive, Endpoint, MatchMode, SessionSnapshot, SessionState, Supervisor, TcpConnector,
};
