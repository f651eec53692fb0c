// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device actions and the dispatcher that triggers them.
//!
//! [`DeviceActions`] is the seam between the agent and the outside world:
//! waking a machine and asking one to shut down. [`SystemActions`] does it
//! for real; tests substitute recording fakes. Actions are one-shot and are
//! never retried.

mod dispatcher;
mod shutdown;
mod wol;

use std::future::Future;

pub use dispatcher::{Dispatcher, PresetOutcome};
pub use shutdown::RemoteShutdown;
pub use wol::WakeOnLan;

use crate::device::{MacAddress, ShutdownTarget};
use crate::error::ActionError;

/// Side effects the agent can perform on devices.
pub trait DeviceActions: Send + Sync + 'static {
    /// Broadcasts a Wake-on-LAN magic packet for `mac`.
    fn wake(&self, mac: MacAddress) -> impl Future<Output = Result<(), ActionError>> + Send;

    /// Asks `target` to shut down.
    fn shutdown(
        &self,
        target: &ShutdownTarget,
    ) -> impl Future<Output = Result<(), ActionError>> + Send;
}

/// Real device actions: UDP broadcast and an external SSH client.
#[derive(Debug, Clone, Default)]
pub struct SystemActions {
    wol: WakeOnLan,
    shutdown: RemoteShutdown,
}

impl SystemActions {
    /// Creates actions from their two halves.
    #[must_use]
    pub fn new(wol: WakeOnLan, shutdown: RemoteShutdown) -> Self {
        Self { wol, shutdown }
    }
}

impl DeviceActions for SystemActions {
    async fn wake(&self, mac: MacAddress) -> Result<(), ActionError> {
        self.wol.send(mac).await
    }

    async fn shutdown(&self, target: &ShutdownTarget) -> Result<(), ActionError> {
        self.shutdown.run(target).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fake for [`DeviceActions`].

    use parking_lot::Mutex;

    use super::*;

    /// One recorded action.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Recorded {
        Wake(MacAddress),
        Shutdown(String),
    }

    /// Records every call; optionally fails them.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingActions {
        calls: Mutex<Vec<Recorded>>,
        fail: bool,
    }

    impl RecordingActions {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<Recorded> {
            self.calls.lock().clone()
        }

        fn outcome(&self) -> Result<(), ActionError> {
            if self.fail {
                Err(ActionError::Wake(std::io::Error::from(
                    std::io::ErrorKind::PermissionDenied,
                )))
            } else {
                Ok(())
            }
        }
    }

    impl DeviceActions for RecordingActions {
        async fn wake(&self, mac: MacAddress) -> Result<(), ActionError> {
            self.calls.lock().push(Recorded::Wake(mac));
            self.outcome()
        }

        async fn shutdown(&self, target: &ShutdownTarget) -> Result<(), ActionError> {
            self.calls.lock().push(Recorded::Shutdown(target.host.clone()));
            self.outcome()
        }
    }
}
