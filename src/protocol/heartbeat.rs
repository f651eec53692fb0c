// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic liveness frames on the relay session.

use std::sync::Arc;
use std::time::Duration;

use super::codec::OutboundFrame;
use super::supervisor::Supervisor;
use super::transport::Connector;

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// Sends a heartbeat every `period`, forever.
///
/// A failed write asks the supervisor to replace the session the write was
/// attempted on. The period stays fixed; retry pacing on the connect path
/// belongs to the supervisor.
pub async fn run_heartbeat<C: Connector>(supervisor: Arc<Supervisor<C>>, period: Duration) {
    loop {
        tokio::time::sleep(period).await;
        beat(&supervisor).await;
    }
}

/// Sends one heartbeat. Returns `false` if it failed and a reconnect was
/// requested.
pub async fn beat<C: Connector>(supervisor: &Supervisor<C>) -> bool {
    match supervisor.send(&OutboundFrame::Heartbeat).await {
        Ok(generation) => {
            tracing::debug!(generation, "Heartbeat sent");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Heartbeat failed");
            let observed = e
                .generation()
                .unwrap_or_else(|| supervisor.snapshot().generation);
            supervisor.reconnect(observed).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::protocol::supervisor::SessionConfig;
    use crate::protocol::testing::{MockConnector, Step};
    use crate::protocol::transport::Endpoint;

    fn config() -> SessionConfig {
        SessionConfig::new(Endpoint::default(), "u", "T")
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_every_period() {
        let connector = MockConnector::new([Step::Duplex]);
        let mut peers = connector.peers();
        let supervisor = Arc::new(Supervisor::new(connector, config()));
        supervisor.connect().await;
        let mut peer = peers.recv().await.unwrap();

        let task = tokio::spawn(run_heartbeat(Arc::clone(&supervisor), DEFAULT_HEARTBEAT_PERIOD));

        let mut expected = OutboundFrame::subscribe("u", "T").encode();
        expected.extend_from_slice(b"ping\r\nping\r\n");
        let mut buf = vec![0u8; expected.len()];
        let started = tokio::time::Instant::now();
        peer.read_exact(&mut buf).await.unwrap();

        assert_eq!(buf, expected);
        assert!(started.elapsed() >= Duration::from_secs(60));
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_heartbeat_triggers_one_reconnect() {
        let connector = MockConnector::new([Step::Duplex, Step::Duplex]);
        let attempts = connector.attempts();
        let mut peers = connector.peers();
        let supervisor = Arc::new(Supervisor::new(connector, config()));
        supervisor.connect().await;

        drop(peers.recv().await.unwrap());

        assert!(!beat(&supervisor).await);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(supervisor.snapshot().generation, 2);

        assert!(beat(&supervisor).await);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_before_connect_establishes_session() {
        let connector = MockConnector::new([Step::Duplex]);
        let supervisor = Supervisor::new(connector, config());

        assert!(!beat(&supervisor).await);
        assert_eq!(supervisor.snapshot().generation, 1);
    }
}
