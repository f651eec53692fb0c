// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistent relay session.
//!
//! One TCP connection to the relay carries a subscribe frame, periodic
//! heartbeats, and inbound topic notifications. Three pieces cooperate on
//! it:
//!
//! - [`Supervisor`]: owns the transport, connects with infinite retry and
//!   replaces the session on failure
//! - [`run_heartbeat`]: writes a heartbeat every period
//! - [`run_receiver`]: the single reader; decodes notifications and hands
//!   them to the [`Dispatcher`](crate::action::Dispatcher)
//!
//! Any of them may report a failure. The supervisor guarantees that at most
//! one transport is live at a time.

mod codec;
mod heartbeat;
mod receiver;
mod supervisor;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub use codec::{Directive, InboundFrame, LINE_END, MatchMode, OutboundFrame, decode_directives};
pub use heartbeat::{DEFAULT_HEARTBEAT_PERIOD, beat, run_heartbeat};
pub use receiver::{DEFAULT_READ_CHUNK, ReadFault, ReceiveOptions, run_receiver};
pub use supervisor::{SessionConfig, SessionSnapshot, SessionState, Supervisor};
pub use transport::{Connector, Endpoint, TcpConnector};

use crate::action::{DeviceActions, Dispatcher};

/// Join handles of the background actors.
#[derive(Debug)]
pub struct SessionTasks {
    /// Heartbeat actor.
    pub heartbeat: JoinHandle<()>,
    /// Receive actor.
    pub receiver: JoinHandle<()>,
}

impl SessionTasks {
    /// Aborts both actors.
    pub fn abort(&self) {
        self.heartbeat.abort();
        self.receiver.abort();
    }
}

/// Spawns the heartbeat and receive actors for an already created
/// supervisor.
pub fn spawn_session<C, A>(
    supervisor: &Arc<Supervisor<C>>,
    dispatcher: &Arc<Dispatcher<A>>,
    heartbeat_period: Duration,
    options: ReceiveOptions,
) -> SessionTasks
where
    C: Connector,
    A: DeviceActions,
{
    let heartbeat = tokio::spawn(run_heartbeat(Arc::clone(supervisor), heartbeat_period));
    let receiver = tokio::spawn(run_receiver(
        Arc::clone(supervisor),
        Arc::clone(dispatcher),
        options,
    ));
    SessionTasks {
        heartbeat,
        receiver,
    }
}
