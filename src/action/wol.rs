// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wake-on-LAN magic packet sender.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::net::UdpSocket;

use crate::device::MacAddress;
use crate::error::ActionError;

/// Broadcasts magic packets over UDP.
///
/// # Examples
///
/// ```no_run
/// use wol_relay::action::WakeOnLan;
///
/// # async fn example() -> Result<(), wol_relay::error::ActionError> {
/// let wol = WakeOnLan::default();
/// wol.send("00:11:22:33:44:55".parse().unwrap()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeOnLan {
    target: SocketAddr,
}

impl WakeOnLan {
    /// Discard port, the conventional Wake-on-LAN destination.
    pub const DEFAULT_PORT: u16 = 9;

    /// Creates a sender for a specific destination.
    #[must_use]
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    /// Returns the destination address.
    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Sends one magic packet for `mac`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Wake`] if the socket cannot be opened or the
    /// datagram cannot be sent.
    pub async fn send(&self, mac: MacAddress) -> Result<(), ActionError> {
        let bind: SocketAddr = if self.target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind).await.map_err(ActionError::Wake)?;
        socket.set_broadcast(true).map_err(ActionError::Wake)?;
        socket
            .send_to(&mac.magic_packet(), self.target)
            .await
            .map_err(ActionError::Wake)?;

        tracing::debug!(mac = %mac, target = %self.target, "Magic packet sent");
        Ok(())
    }
}

impl Default for WakeOnLan {
    fn default() -> Self {
        Self::new(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::BROADCAST,
            Self::DEFAULT_PORT,
        )))
    }
}
