// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection supervisor for the relay session.
//!
//! The supervisor owns the one live transport to the relay. Connecting
//! never fails from the caller's point of view: errors are logged and
//! retried after a fixed delay until a transport is open and the subscribe
//! frame has been written.
//!
//! # Sessions and generations
//!
//! Every installed transport gets a new generation number. Writers go
//! through [`Supervisor::send`], which holds the link lock for the whole
//! write, so frames from different actors never interleave. The read half
//! is handed to exactly one receive actor through
//! [`Supervisor::take_reader`].
//!
//! ```text
//!   Disconnected ──connect()──▶ Connecting ──subscribe ok──▶ Subscribed(g)
//!                                   ▲   │ error: log, sleep, retry   │
//!                                   │   └────────────────────────────┤
//!                                   └──────── reconnect(g) ──────────┘
//! ```
//!
//! `reconnect(g)` replaces the session only while `g` is still current. A
//! second actor reporting the same failure waits on the link lock and then
//! finds the generation already advanced, so concurrent failures never
//! produce two live transports.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, watch};

use super::codec::OutboundFrame;
use super::transport::{Connector, Endpoint};
use crate::error::ProtocolError;

/// Lifecycle state of the relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport has been opened yet.
    Disconnected,
    /// A transport is being (re)established.
    Connecting,
    /// A transport is open and the subscribe frame was written.
    Subscribed,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: SessionState,
    /// Generation of the most recently installed transport (0 = none yet).
    pub generation: u64,
}

impl SessionSnapshot {
    /// Returns true if `generation` is the live, subscribed session.
    #[must_use]
    pub fn is_live(&self, generation: u64) -> bool {
        self.state == SessionState::Subscribed && self.generation == generation
    }
}

/// Settings for the relay session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    endpoint: Endpoint,
    uid: String,
    topic: String,
    retry_delay: Duration,
    write_timeout: Duration,
}

impl SessionConfig {
    /// Delay between connection attempts.
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);
    /// Upper bound on a single frame write.
    pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a session configuration for `uid` subscribing to `topic`.
    #[must_use]
    pub fn new(endpoint: Endpoint, uid: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            endpoint,
            uid: uid.into(),
            topic: topic.into(),
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            write_timeout: Self::DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Sets the delay between connection attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Returns the relay endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the client identifier.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Returns the subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the delay between connection attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

/// Write side of the current session.
struct Link<W> {
    writer: Option<W>,
    generation: u64,
}

/// Owns the relay transport and replaces it on failure.
///
/// Share it between actors with an `Arc`.
pub struct Supervisor<C: Connector> {
    connector: C,
    config: SessionConfig,
    link: Mutex<Link<C::Writer>>,
    reader: parking_lot::Mutex<Option<(u64, C::Reader)>>,
    status: watch::Sender<SessionSnapshot>,
    failed_attempts: AtomicU64,
}

impl<C: Connector> Supervisor<C> {
    /// Creates a disconnected supervisor.
    #[must_use]
    pub fn new(connector: C, config: SessionConfig) -> Self {
        let (status, _) = watch::channel(SessionSnapshot {
            state: SessionState::Disconnected,
            generation: 0,
        });
        Self {
            connector,
            config,
            link: Mutex::new(Link {
                writer: None,
                generation: 0,
            }),
            reader: parking_lot::Mutex::new(None),
            status,
            failed_attempts: AtomicU64::new(0),
        }
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the current session snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        *self.status.borrow()
    }

    /// Subscribes to session changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.status.subscribe()
    }

    /// Total number of failed connection attempts since startup.
    #[must_use]
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    /// Establishes a session, retrying until it succeeds.
    ///
    /// If a session is already live it is replaced. Returns the new
    /// generation.
    pub async fn connect(&self) -> u64 {
        let mut link = self.link.lock().await;
        self.establish(&mut link).await
    }

    /// Replaces the session that was live at `observed`.
    ///
    /// If the session has already moved past `observed` this returns the
    /// current generation without touching the transport. Concurrent callers
    /// are serialised on the link lock.
    pub async fn reconnect(&self, observed: u64) -> u64 {
        let mut link = self.link.lock().await;
        if link.generation != observed {
            tracing::debug!(
                observed,
                current = link.generation,
                "Session already replaced, skipping reconnect"
            );
            return link.generation;
        }
        tracing::info!(generation = observed, "Reconnecting to relay");
        self.establish(&mut link).await
    }

    /// Writes a frame on the current session.
    ///
    /// Returns the generation the frame was written on.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotConnected`] if no session is live and
    /// [`ProtocolError::Send`] if the write fails or times out. Both carry
    /// the generation to pass to [`reconnect`](Self::reconnect).
    pub async fn send(&self, frame: &OutboundFrame) -> Result<u64, ProtocolError> {
        let mut link = self.link.lock().await;
        let generation = link.generation;
        let Some(writer) = link.writer.as_mut() else {
            return Err(ProtocolError::NotConnected { generation });
        };

        write_frame(writer, frame, self.config.write_timeout)
            .await
            .map_err(|source| ProtocolError::Send { generation, source })?;

        tracing::trace!(generation, frame = %frame, "Frame sent");
        Ok(generation)
    }

    /// Waits for the read half of the newest session and takes it.
    ///
    /// Only the receive actor calls this. The returned generation is the one
    /// to report to [`reconnect`](Self::reconnect) when the read fails.
    pub async fn take_reader(&self) -> (u64, C::Reader) {
        let mut status = self.status.subscribe();
        loop {
            let taken = self.reader.lock().take();
            if let Some(taken) = taken {
                return taken;
            }
            if status.changed().await.is_err() {
                // Unreachable while `self` holds the sender.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Tears down the current transport and opens a new one.
    async fn establish(&self, link: &mut Link<C::Writer>) -> u64 {
        // Drop both halves before dialing so two transports never coexist.
        link.writer = None;
        self.reader.lock().take();
        self.publish(SessionState::Connecting, link.generation);

        let endpoint = self.config.endpoint();
        let subscribe = OutboundFrame::subscribe(self.config.uid(), self.config.topic());
        let retry_in_ms = u64::try_from(self.config.retry_delay.as_millis()).unwrap_or(u64::MAX);
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            tracing::info!(endpoint = %endpoint, attempt, "Connecting to relay");

            match self.open(&subscribe).await {
                Ok((reader, writer)) => {
                    let generation = link.generation + 1;
                    link.generation = generation;
                    link.writer = Some(writer);
                    *self.reader.lock() = Some((generation, reader));
                    self.publish(SessionState::Subscribed, generation);
                    tracing::info!(
                        endpoint = %endpoint,
                        topic = %self.config.topic(),
                        generation,
                        "Connected and subscribed"
                    );
                    return generation;
                }
                Err(e) => {
                    self.failed_attempts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        retry_in_ms,
                        "Connection failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// Opens a transport and writes the subscribe frame on it.
    async fn open(
        &self,
        subscribe: &OutboundFrame,
    ) -> Result<(C::Reader, C::Writer), ProtocolError> {
        let endpoint = self.config.endpoint();
        let (reader, mut writer) = self.connector.connect(endpoint).await.map_err(|source| {
            ProtocolError::Connect {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;

        write_frame(&mut writer, subscribe, self.config.write_timeout)
            .await
            .map_err(|source| ProtocolError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;

        Ok((reader, writer))
    }

    fn publish(&self, state: SessionState, generation: u64) {
        self.status.send_replace(SessionSnapshot { state, generation });
    }
}

impl<C: Connector> std::fmt::Debug for Supervisor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("endpoint", &self.config.endpoint)
            .field("topic", &self.config.topic)
            .field("session", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Writes and flushes one frame, bounded by `timeout`.
async fn write_frame<W>(
    writer: &mut W,
    frame: &OutboundFrame,
    timeout: Duration,
) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let bytes = frame.encode();
    let write = async {
        writer.write_all(&bytes).await?;
        writer.flush().await
    };
    tokio::time::timeout(timeout, write)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "frame write timed out"))?
}
