// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Maps relay directives and preset requests to device actions.

use std::sync::Arc;

use super::DeviceActions;
use crate::device::DeviceTable;
use crate::protocol::{Directive, MatchMode, decode_directives};

/// Result of running a single preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetOutcome {
    /// Actions were attempted; each entry describes one.
    Executed(Vec<String>),
    /// The device exists but has nothing to do for this preset.
    NoAction,
    /// The id is enabled but has no entry in the device table.
    NotFound,
    /// The id is not on the relevant enabled-list.
    NotEnabled,
}

/// Runs device actions for directives and presets.
///
/// Action failures are logged and swallowed: they never affect the relay
/// connection and are never retried.
#[derive(Debug)]
pub struct Dispatcher<A> {
    table: Arc<DeviceTable>,
    actions: Arc<A>,
    topic: String,
    mode: MatchMode,
}

impl<A: DeviceActions> Dispatcher<A> {
    /// Creates a dispatcher for directives addressed to `topic`.
    #[must_use]
    pub fn new(table: Arc<DeviceTable>, actions: Arc<A>, topic: impl Into<String>) -> Self {
        Self {
            table,
            actions,
            topic: topic.into(),
            mode: MatchMode::default(),
        }
    }

    /// Sets how inbound buffers are matched.
    #[must_use]
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the device table.
    #[must_use]
    pub fn table(&self) -> &DeviceTable {
        &self.table
    }

    /// Returns the action implementation.
    #[must_use]
    pub fn actions(&self) -> &A {
        &self.actions
    }

    /// Returns the subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Decodes a received buffer and runs every directive found in it.
    ///
    /// Returns the directives that fired, power-on first.
    pub async fn handle_frame(&self, text: &str) -> Vec<Directive> {
        let directives = decode_directives(text, &self.topic, self.mode);
        for directive in &directives {
            match directive {
                Directive::PowerOn => {
                    tracing::info!(topic = %self.topic, "Power-on directive received");
                    self.power_on_all().await;
                }
                Directive::PowerOff => {
                    tracing::info!(topic = %self.topic, "Power-off directive received");
                    self.power_off_all().await;
                }
            }
        }
        directives
    }

    /// Wakes every device on the power-on list that has a MAC address.
    ///
    /// Returns how many packets were sent successfully.
    pub async fn power_on_all(&self) -> usize {
        let mut sent = 0;
        for id in self.table.power_on() {
            let Some(mac) = self.table.get(id).and_then(|entry| entry.mac) else {
                tracing::debug!(device = %id, "No MAC configured, skipping");
                continue;
            };
            match self.actions.wake(mac).await {
                Ok(()) => {
                    tracing::info!(device = %id, mac = %mac, "Wake-on-LAN sent");
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(device = %id, mac = %mac, error = %e, "Wake-on-LAN failed");
                }
            }
        }
        sent
    }

    /// Shuts down every device on the power-off list that has complete
    /// credentials.
    ///
    /// Returns how many requests succeeded.
    pub async fn power_off_all(&self) -> usize {
        let mut done = 0;
        for id in self.table.power_off() {
            let Some(target) = self.table.get(id).and_then(|entry| entry.shutdown_target()) else {
                tracing::debug!(device = %id, "Shutdown credentials incomplete, skipping");
                continue;
            };
            match self.actions.shutdown(&target).await {
                Ok(()) => {
                    tracing::info!(device = %id, host = %target.host, "Shutdown requested");
                    done += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        device = %id,
                        host = %target.host,
                        error = %e,
                        "Shutdown failed"
                    );
                }
            }
        }
        done
    }

    /// Runs the power-on preset of a single device.
    pub async fn preset_on(&self, id: &str) -> PresetOutcome {
        if !self.table.is_power_on_enabled(id) {
            return PresetOutcome::NotEnabled;
        }
        let Some(entry) = self.table.get(id) else {
            tracing::warn!(device = %id, "Preset device not found");
            return PresetOutcome::NotFound;
        };
        tracing::info!(device = %id, config = ?entry, "Executing power-on preset");

        let Some(mac) = entry.mac else {
            tracing::info!(device = %id, "Preset has no valid action");
            return PresetOutcome::NoAction;
        };
        if let Err(e) = self.actions.wake(mac).await {
            tracing::warn!(device = %id, mac = %mac, error = %e, "Wake-on-LAN failed");
        }
        PresetOutcome::Executed(vec![format!("WOL({mac})")])
    }

    /// Runs the power-off preset of a single device.
    pub async fn preset_off(&self, id: &str) -> PresetOutcome {
        if !self.table.is_power_off_enabled(id) {
            return PresetOutcome::NotEnabled;
        }
        let Some(entry) = self.table.get(id) else {
            tracing::warn!(device = %id, "Preset device not found");
            return PresetOutcome::NotFound;
        };
        tracing::info!(device = %id, config = ?entry, "Executing power-off preset");

        let Some(target) = entry.shutdown_target() else {
            tracing::info!(device = %id, "Preset has no valid action");
            return PresetOutcome::NoAction;
        };
        if let Err(e) = self.actions.shutdown(&target).await {
            tracing::warn!(device = %id, host = %target.host, error = %e, "Shutdown failed");
        }
        PresetOutcome::Executed(vec![format!("Shutdown({})", target.host)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::testing::{Recorded, RecordingActions};
    use crate::device::{DeviceEntry, MacAddress};

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0, 0, 0, 0, 0, last])
    }

    fn shutdown_entry(host: &str) -> DeviceEntry {
        DeviceEntry {
            host: Some(host.to_string()),
            user: Some("u".to_string()),
            password: Some("p".to_string()),
            ..DeviceEntry::default()
        }
    }

    fn table() -> DeviceTable {
        let mut table = DeviceTable::new();
        table.insert("1", DeviceEntry { mac: Some(mac(1)), ..shutdown_entry("h1") });
        table.insert("2", DeviceEntry { mac: Some(mac(2)), ..DeviceEntry::default() });
        table.insert("3", DeviceEntry::default());
        table.insert("4", shutdown_entry("h4"));
        table.insert("5", DeviceEntry { password: None, ..shutdown_entry("h5") });
        table
            .with_power_on(["2", "1", "3", "missing"])
            .with_power_off(["4", "5", "missing", "1"])
    }

    fn dispatcher(actions: RecordingActions) -> Dispatcher<RecordingActions> {
        Dispatcher::new(Arc::new(table()), Arc::new(actions), "HOME")
    }

    #[tokio::test]
    async fn power_on_follows_list_order_and_skips_incomplete() {
        let d = dispatcher(RecordingActions::default());
        assert_eq!(d.power_on_all().await, 2);
        assert_eq!(
            d.actions().calls(),
            [Recorded::Wake(mac(2)), Recorded::Wake(mac(1))]
        );
    }

    #[tokio::test]
    async fn power_off_requires_complete_credentials() {
        let d = dispatcher(RecordingActions::default());
        assert_eq!(d.power_off_all().await, 2);
        assert_eq!(
            d.actions().calls(),
            [
                Recorded::Shutdown("h4".to_string()),
                Recorded::Shutdown("h1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn frame_with_both_directives_runs_on_then_off() {
        let d = dispatcher(RecordingActions::default());
        let fired = d
            .handle_frame("cmd=2&topic=HOME&msg=off\r\ncmd=2&topic=HOME&msg=on")
            .await;
        assert_eq!(fired, [Directive::PowerOn, Directive::PowerOff]);

        let calls = d.actions().calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[0], Recorded::Wake(_)));
        assert!(matches!(calls[3], Recorded::Shutdown(_)));
    }

    #[tokio::test]
    async fn frame_substring_with_envelope_triggers_power_on() {
        let d = dispatcher(RecordingActions::default());
        let fired = d.handle_frame("junk-prefix topic=HOME&msg=on-suffix").await;
        assert_eq!(fired, [Directive::PowerOn]);
        assert_eq!(d.actions().calls().len(), 2);
    }

    #[tokio::test]
    async fn strict_mode_ignores_envelope() {
        let d = dispatcher(RecordingActions::default()).with_match_mode(MatchMode::Strict);
        assert!(d.handle_frame("junk-prefix topic=HOME&msg=on-suffix").await.is_empty());
        assert!(d.actions().calls().is_empty());
    }

    #[tokio::test]
    async fn unrelated_frame_does_nothing() {
        let d = dispatcher(RecordingActions::default());
        assert!(d.handle_frame("cmd=0&res=1").await.is_empty());
        assert!(d.actions().calls().is_empty());
    }

    #[tokio::test]
    async fn action_failures_are_swallowed() {
        let d = dispatcher(RecordingActions::failing());
        assert_eq!(d.power_on_all().await, 0);
        assert_eq!(d.actions().calls().len(), 2);
    }

    #[tokio::test]
    async fn preset_gating() {
        let d = dispatcher(RecordingActions::default());

        // Present in the table, absent from the power-on list.
        assert_eq!(d.preset_on("4").await, PresetOutcome::NotEnabled);
        assert_eq!(d.preset_on("missing").await, PresetOutcome::NotFound);
        assert_eq!(d.preset_on("3").await, PresetOutcome::NoAction);
        assert_eq!(
            d.preset_on("2").await,
            PresetOutcome::Executed(vec!["WOL(00:00:00:00:00:02)".to_string()])
        );

        assert_eq!(d.preset_off("2").await, PresetOutcome::NotEnabled);
        assert_eq!(d.preset_off("5").await, PresetOutcome::NoAction);
        assert_eq!(
            d.preset_off("4").await,
            PresetOutcome::Executed(vec!["Shutdown(h4)".to_string()])
        );

        assert_eq!(
            d.actions().calls(),
            [Recorded::Wake(mac(2)), Recorded::Shutdown("h4".to_string())]
        );
    }
}
