// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Receive loop for the relay session.
//!
//! The receive actor is the only reader of the transport. It takes the read
//! half of each new session from the supervisor and reads until the session
//! fails or is replaced by another actor:
//!
//! - data is decoded and handed to the [`Dispatcher`]
//! - end of stream and transport errors request a reconnect
//! - read timeouts are logged and the read is retried
//!
//! Each read is raced against the session watch, so a reconnect started by
//! the heartbeat drops the stale reader instead of leaving it blocked.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

use super::supervisor::{SessionSnapshot, Supervisor};
use super::transport::Connector;
use crate::action::{DeviceActions, Dispatcher};

/// Default read buffer size.
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Tuning for the receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum bytes per read.
    pub chunk: usize,
    /// Optional bound on a single read. `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            chunk: DEFAULT_READ_CHUNK,
            read_timeout: None,
        }
    }
}

/// Why a read did not produce data.
#[derive(Debug)]
pub enum ReadFault {
    /// The relay closed the connection cleanly.
    Closed,
    /// The connection was reset by the relay.
    Reset(io::Error),
    /// The connection was aborted locally.
    Aborted(io::Error),
    /// No data arrived within the read timeout.
    TimedOut,
    /// Any other transport error.
    Transport(io::Error),
}

impl ReadFault {
    /// Classifies an I/O error from a read.
    #[must_use]
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => Self::Reset(err),
            io::ErrorKind::ConnectionAborted => Self::Aborted(err),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::TimedOut,
            _ => Self::Transport(err),
        }
    }

    /// Returns true unless the fault is a timeout.
    #[must_use]
    pub fn requires_reconnect(&self) -> bool {
        !matches!(self, Self::TimedOut)
    }
}

/// Reads from the relay forever, dispatching directives and reconnecting on
/// failure.
pub async fn run_receiver<C, A>(
    supervisor: Arc<Supervisor<C>>,
    dispatcher: Arc<Dispatcher<A>>,
    options: ReceiveOptions,
) where
    C: Connector,
    A: DeviceActions,
{
    let mut buf = vec![0u8; options.chunk.max(1)];
    loop {
        let (generation, mut reader) = supervisor.take_reader().await;
        let mut status = supervisor.watch();
        tracing::debug!(generation, "Receive loop attached to session");

        loop {
            let outcome = tokio::select! {
                biased;
                () = superseded(&mut status, generation) => {
                    tracing::debug!(generation, "Session replaced, dropping stale reader");
                    break;
                }
                outcome = read_chunk(&mut reader, &mut buf, options.read_timeout) => outcome,
            };

            match outcome {
                Ok(n) => {
                    let raw = String::from_utf8_lossy(&buf[..n]);
                    let text = raw.trim();
                    tracing::info!(generation, payload = %text, "Received from relay");
                    dispatcher.handle_frame(text).await;
                }
                Err(ReadFault::TimedOut) => {
                    tracing::warn!(generation, "Receive timed out, still waiting");
                }
                Err(fault) => {
                    log_fault(generation, &fault);
                    supervisor.reconnect(generation).await;
                    break;
                }
            }
        }
    }
}

fn log_fault(generation: u64, fault: &ReadFault) {
    match fault {
        ReadFault::Closed => {
            tracing::warn!(generation, "Relay closed the connection, reconnecting");
        }
        ReadFault::Reset(e) => {
            tracing::warn!(generation, error = %e, "Connection reset by relay, reconnecting");
        }
        ReadFault::Aborted(e) => {
            tracing::warn!(generation, error = %e, "Connection aborted, reconnecting");
        }
        ReadFault::Transport(e) => {
            tracing::warn!(generation, error = %e, "Socket error, reconnecting");
        }
        ReadFault::TimedOut => {}
    }
}

/// Reads one chunk, mapping end of stream and errors to a [`ReadFault`].
async fn read_chunk<R>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, ReadFault>
where
    R: AsyncRead + Unpin,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.read(buf)).await {
            Ok(result) => result,
            Err(_) => return Err(ReadFault::TimedOut),
        },
        None => reader.read(buf).await,
    };
    match result {
        Ok(0) => Err(ReadFault::Closed),
        Ok(n) => Ok(n),
        Err(e) => Err(ReadFault::from_io(e)),
    }
}

/// Resolves once `generation` is no longer the live session.
async fn superseded(status: &mut watch::Receiver<SessionSnapshot>, generation: u64) {
    loop {
        if !status.borrow_and_update().is_live(generation) {
            return;
        }
        if status.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
