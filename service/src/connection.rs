//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Registered account connection
//!
//! An [`AccountConnection`] is the write side of a registered transport plus
//! the reply slot used to correlate requests. The read side is owned by the
//! connection's read loop, which hands replies back through
//! [`AccountConnection::deliver_reply`].

use crate::{ConnectionInfo, ConnectionSerial, Result, ServiceError};
use futures_util::SinkExt;
use marionette_protocol::{AccountId, Command, CommandCodec, ProtocolError};
use metrics::counter;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, oneshot};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// Type-erased write half of a transport
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A registered connection for one account
///
/// Cheap to clone; all clones share the same transport.
#[derive(Clone)]
pub struct AccountConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    // Metadata (lock-free access)
    account: AccountId,
    serial: ConnectionSerial,
    peer_addr: SocketAddr,
    created_at: Instant,
    write_timeout: Duration,

    // Core I/O
    writer: Mutex<FramedWrite<BoxedWriter, CommandCodec>>,
    request_lock: Mutex<()>,
    pending: std::sync::Mutex<Option<oneshot::Sender<Command>>>,
    cancel: CancellationToken,

    // Metrics (lock-free)
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
}

impl AccountConnection {
    /// Wrap the write half of a registered transport
    #[instrument(skip_all, fields(account = %account, serial = %serial))]
    pub fn new<W>(
        account: AccountId,
        serial: ConnectionSerial,
        peer_addr: SocketAddr,
        writer: W,
        codec: CommandCodec,
        write_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        debug!(peer_addr = %peer_addr, "Creating account connection");
        let writer: BoxedWriter = Box::new(writer);
        Self {
            inner: Arc::new(ConnectionInner {
                account,
                serial,
                peer_addr,
                created_at: Instant::now(),
                write_timeout,
                writer: Mutex::new(FramedWrite::new(writer, codec)),
                request_lock: Mutex::new(()),
                pending: std::sync::Mutex::new(None),
                cancel,
                frames_sent: AtomicU64::new(0),
                frames_received: AtomicU64::new(0),
            }),
        }
    }

    /// Get the account bound to this connection
    pub fn account(&self) -> AccountId {
        self.inner.account
    }

    /// Get the connection serial
    pub fn serial(&self) -> ConnectionSerial {
        self.inner.serial
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// Get when the connection was accepted
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    /// Get frames sent
    pub fn frames_sent(&self) -> u64 {
        self.inner.frames_sent.load(Ordering::Relaxed)
    }

    /// Get frames received
    pub fn frames_received(&self) -> u64 {
        self.inner.frames_received.load(Ordering::Relaxed)
    }

    /// Check if two handles refer to the same transport
    pub fn same_transport(&self, other: &AccountConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Snapshot of the connection
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            account: self.inner.account,
            serial: self.inner.serial,
            peer_addr: self.inner.peer_addr,
            created_at: self.inner.created_at,
            frames_sent: self.frames_sent(),
            frames_received: self.frames_received(),
        }
    }

    /// Write one frame without waiting for a reply
    #[instrument(skip(self, command), fields(account = %self.inner.account, command = command.name()))]
    pub async fn send(&self, command: &Command) -> Result<()> {
        if self.is_closed() {
            return Err(ServiceError::Disconnected(self.inner.account));
        }

        trace!(frame = %command, "Sending frame");
        let mut writer = self.inner.writer.lock().await;
        let result = tokio::time::timeout(
            self.inner.write_timeout,
            SinkExt::<&Command>::send(&mut *writer, command),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                self.inner.frames_sent.fetch_add(1, Ordering::Relaxed);
                counter!("marionette.frames.sent").increment(1);
                Ok(())
            }
            Ok(Err(ProtocolError::Io(err))) => Err(ServiceError::Io(err)),
            Ok(Err(err)) => Err(ServiceError::Protocol(err)),
            Err(_) => Err(ServiceError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "write timed out",
            ))),
        }
    }

    /// Write one frame and wait for the correlated reply
    ///
    /// The request lock is held for the whole exchange, so concurrent
    /// requests on the same transport are answered in order. The timeout
    /// covers waiting for the lock, the write and the reply. On timeout the
    /// transport stays open.
    pub async fn request(&self, command: &Command, timeout: Duration) -> Result<Command> {
        let exchange = async {
            let _lock = self.inner.request_lock.lock().await;
            let (reply_tx, reply_rx) = oneshot::channel();
            let _pending = PendingGuard::install(&self.inner, reply_tx);

            self.send(command).await?;

            tokio::select! {
                reply = reply_rx => {
                    reply.map_err(|_| ServiceError::Disconnected(self.inner.account))
                }
                _ = self.inner.cancel.cancelled() => {
                    Err(ServiceError::Disconnected(self.inner.account))
                }
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(account = %self.inner.account, command = command.name(), "Request timed out");
                Err(ServiceError::Timeout)
            }
        }
    }

    /// Hand a reply from the read loop to the pending requester
    ///
    /// Returns the command back if nobody is waiting for it.
    pub fn deliver_reply(&self, reply: Command) -> Option<Command> {
        let pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(reply_tx) => reply_tx.send(reply).err(),
            None => Some(reply),
        }
    }

    /// Check if a request is waiting for a reply
    pub fn has_pending_request(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Count a frame read by the read loop
    pub(crate) fn record_received(&self) {
        self.inner.frames_received.fetch_add(1, Ordering::Relaxed);
        counter!("marionette.frames.received").increment(1);
    }

    /// Close the connection
    ///
    /// Stops the read loop and fails any pending request. Idempotent.
    pub fn close(&self) {
        if !self.inner.cancel.is_cancelled() {
            debug!(account = %self.inner.account, serial = %self.inner.serial, "Closing connection");
            self.inner.cancel.cancel();
        }
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Check if the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Wait until the connection is closed
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Flush and shut down the write half
    pub async fn shutdown_writer(&self) {
        let mut writer = self.inner.writer.lock().await;
        let shutdown = writer.get_mut().shutdown();
        match tokio::time::timeout(self.inner.write_timeout, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                trace!(account = %self.inner.account, error = %err, "Writer shutdown failed")
            }
            Err(_) => warn!(account = %self.inner.account, "Writer shutdown timed out"),
        }
    }
}

impl std::fmt::Debug for AccountConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConnection")
            .field("account", &self.inner.account)
            .field("serial", &self.inner.serial)
            .field("peer_addr", &self.inner.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Clears the reply slot when a request finishes or is dropped
struct PendingGuard<'a> {
    inner: &'a ConnectionInner,
}

impl<'a> PendingGuard<'a> {
    fn install(inner: &'a ConnectionInner, reply_tx: oneshot::Sender<Command>) -> Self {
        *inner.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(reply_tx);
        Self { inner }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
