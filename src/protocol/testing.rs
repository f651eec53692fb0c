// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted in-memory connector for protocol tests.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

use super::transport::{Connector, Endpoint};

pub(crate) type BoxReader = Box<dyn AsyncRead + Unpin + Send>;
pub(crate) type BoxWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// What the next connection attempt does.
pub(crate) enum Step {
    /// Fail the connect with this error kind.
    Refuse(io::ErrorKind),
    /// Connect to an in-memory peer delivered through [`MockConnector::peers`].
    Duplex,
    /// Connect, but every write fails.
    BrokenWriter,
    /// Connect with a reader that replays `reads` and then idles forever.
    /// Writes go to a sink.
    Scripted(Vec<Read>),
}

/// One scripted read result.
pub(crate) enum Read {
    Data(&'static [u8]),
    Error(io::ErrorKind),
    Eof,
}

/// Connector that replays a fixed script of connection outcomes.
///
/// Once the script is exhausted further connects never complete.
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Step>>,
    attempts: Arc<AtomicUsize>,
    peer_tx: mpsc::UnboundedSender<DuplexStream>,
    peer_rx: Mutex<Option<mpsc::UnboundedReceiver<DuplexStream>>>,
}

impl MockConnector {
    pub(crate) fn new(script: impl IntoIterator<Item = Step>) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: Arc::new(AtomicUsize::new(0)),
            peer_tx,
            peer_rx: Mutex::new(Some(peer_rx)),
        }
    }

    /// Relay-side ends of [`Step::Duplex`] connections, in connect order.
    pub(crate) fn peers(&self) -> mpsc::UnboundedReceiver<DuplexStream> {
        self.peer_rx.lock().take().expect("peers already taken")
    }

    /// Counter of connect attempts, including refused ones.
    pub(crate) fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

impl Connector for MockConnector {
    type Reader = BoxReader;
    type Writer = BoxWriter;

    async fn connect(&self, _endpoint: &Endpoint) -> io::Result<(BoxReader, BoxWriter)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front();
        match step {
            None => std::future::pending().await,
            Some(Step::Refuse(kind)) => Err(io::Error::from(kind)),
            Some(Step::Duplex) => {
                let (client, relay) = tokio::io::duplex(4096);
                let _ = self.peer_tx.send(relay);
                let (reader, writer) = tokio::io::split(client);
                Ok((Box::new(reader), Box::new(writer)))
            }
            Some(Step::BrokenWriter) => Ok((
                Box::new(ScriptedReader::new(Vec::new())),
                Box::new(BrokenWriter),
            )),
            Some(Step::Scripted(reads)) => Ok((
                Box::new(ScriptedReader::new(reads)),
                Box::new(tokio::io::sink()),
            )),
        }
    }
}

/// Reader that replays scripted results, then stays pending.
struct ScriptedReader {
    reads: VecDeque<Read>,
}

impl ScriptedReader {
    fn new(reads: Vec<Read>) -> Self {
        Self {
            reads: reads.into(),
        }
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.reads.pop_front() {
            Some(Read::Data(bytes)) => {
                buf.put_slice(bytes);
                Poll::Ready(Ok(()))
            }
            Some(Read::Error(kind)) => Poll::Ready(Err(io::Error::from(kind))),
            Some(Read::Eof) => Poll::Ready(Ok(())),
            None => Poll::Pending,
        }
    }
}

/// Writer whose every write fails.
struct BrokenWriter;

impl AsyncWrite for BrokenWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
