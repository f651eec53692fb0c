// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Preset devices and the enabled-lists that gate them.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use super::MacAddress;

/// Default SSH port for remote shutdown.
pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Where and as whom to request a remote shutdown.
#[derive(Clone, PartialEq, Eq)]
pub struct ShutdownTarget {
    /// Hostname or IP address.
    pub host: String,
    /// Login user.
    pub user: String,
    /// Login password. `None` means agent or key based authentication.
    pub password: Option<String>,
    /// SSH port.
    pub port: u16,
}

impl ShutdownTarget {
    /// Creates a target on the default SSH port using agent authentication.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: None,
            port: DEFAULT_SSH_PORT,
        }
    }

    /// Sets the login password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the SSH port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Debug for ShutdownTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownTarget")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("port", &self.port)
            .finish()
    }
}

/// Control capabilities of one preset device.
///
/// A MAC address enables Wake-on-LAN. A complete host, user and password
/// triple enables remote shutdown.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    /// Hardware address for Wake-on-LAN.
    #[serde(default)]
    pub mac: Option<MacAddress>,
    /// Host for remote shutdown.
    #[serde(default, alias = "ip")]
    pub host: Option<String>,
    /// Login user for remote shutdown.
    #[serde(default)]
    pub user: Option<String>,
    /// Login password for remote shutdown.
    #[serde(default)]
    pub password: Option<String>,
    /// SSH port for remote shutdown.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl DeviceEntry {
    /// Returns the shutdown target if host, user and password are all set.
    #[must_use]
    pub fn shutdown_target(&self) -> Option<ShutdownTarget> {
        let host = self.host.as_deref().filter(|s| !s.is_empty())?;
        let user = self.user.as_deref().filter(|s| !s.is_empty())?;
        let password = self.password.as_deref().filter(|s| !s.is_empty())?;
        Some(
            ShutdownTarget::new(host, user)
                .with_password(password)
                .with_port(self.port),
        )
    }
}

impl fmt::Debug for DeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEntry")
            .field("mac", &self.mac)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("port", &self.port)
            .finish()
    }
}

/// Preset devices keyed by id, plus the ordered power-on and power-off
/// enabled-lists.
///
/// A device id that is missing from the relevant list is never actioned,
/// even if its entry exists.
///
/// # Examples
///
/// ```
/// use wol_relay::device::{DeviceEntry, DeviceTable};
///
/// let mut table = DeviceTable::new();
/// table.insert("1", DeviceEntry {
///     mac: Some("00:11:22:33:44:55".parse().unwrap()),
///     ..DeviceEntry::default()
/// });
/// let table = table.with_power_on(["1"]);
///
/// assert!(table.is_power_on_enabled("1"));
/// assert!(!table.is_power_off_enabled("1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeviceTable {
    devices: HashMap<String, DeviceEntry>,
    power_on: Vec<String>,
    power_off: Vec<String>,
}

impl DeviceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a device entry.
    pub fn insert(&mut self, id: impl Into<String>, entry: DeviceEntry) {
        self.devices.insert(id.into(), entry);
    }

    /// Sets the ordered power-on enabled-list.
    #[must_use]
    pub fn with_power_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.power_on = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the ordered power-off enabled-list.
    #[must_use]
    pub fn with_power_off<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.power_off = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Looks up a device entry.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DeviceEntry> {
        self.devices.get(id)
    }

    /// Returns the number of configured devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if no devices are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The power-on enabled-list in declaration order.
    #[must_use]
    pub fn power_on(&self) -> &[String] {
        &self.power_on
    }

    /// The power-off enabled-list in declaration order.
    #[must_use]
    pub fn power_off(&self) -> &[String] {
        &self.power_off
    }

    /// Returns true if `id` is on the power-on enabled-list.
    #[must_use]
    pub fn is_power_on_enabled(&self, id: &str) -> bool {
        self.power_on.iter().any(|x| x == id)
    }

    /// Returns true if `id` is on the power-off enabled-list.
    #[must_use]
    pub fn is_power_off_enabled(&self, id: &str) -> bool {
        self.power_off.iter().any(|x| x == id)
    }

    /// Enabled-list ids that have no entry in the table.
    pub fn dangling_ids(&self) -> impl Iterator<Item = &str> {
        self.power_on
            .iter()
            .chain(&self.power_off)
            .map(String::as_str)
            .filter(|id| !self.devices.contains_key(*id))
    }
}
