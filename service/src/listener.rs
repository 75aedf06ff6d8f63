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

//! Control listener
//!
//! The ControlListener accepts inbound connections from spawned clients,
//! performs the registration handshake and hands each registered transport
//! to its own [`ConnectionWorker`].

use crate::{
    AccountConnection, ConnectionHandler, ConnectionRegistry, ConnectionSerial, ConnectionWorker,
    ManagerConfig, Result, ServiceError,
};
use futures_util::{FutureExt, StreamExt};
use marionette_protocol::{Command, CommandCodec, Decoded};
use metrics::counter;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Delay before accepting again after an accept error
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP listener for client registrations
///
/// # Example
///
/// ```no_run
/// use marionette_service::{ConnectionHandler, ConnectionRegistry, ControlListener, ManagerConfig};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// struct Handler;
/// impl ConnectionHandler for Handler {}
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ManagerConfig::new("/opt/game/client");
///     let registry = Arc::new(ConnectionRegistry::new());
///     let listener = ControlListener::bind(&config, registry, CancellationToken::new()).await?;
///     listener.start(Arc::new(Handler))?;
///     // ...
///     listener.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct ControlListener {
    config: Arc<ManagerConfig>,
    registry: Arc<ConnectionRegistry>,
    listener: std::sync::Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    running: AtomicBool,
    next_serial: Arc<AtomicU64>,
    accept_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ControlListener {
    /// Bind the configured host and port, falling back through the
    /// configured alternative ports
    ///
    /// Does not start accepting; call [`ControlListener::start`].
    pub async fn bind(
        config: &ManagerConfig,
        registry: Arc<ConnectionRegistry>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let candidates = config.bind_candidates();
        let mut bound = None;
        for addr in &candidates {
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    bound = Some(listener);
                    break;
                }
                Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                    warn!(addr = %addr, "Port in use, trying next");
                }
                Err(err) => {
                    warn!(addr = %addr, error = %err, "Unable to bind");
                }
            }
        }

        let Some(listener) = bound else {
            error!(host = %config.host, "No control port could be bound");
            return Err(ServiceError::BindFailed {
                host: config.host.to_string(),
                ports: candidates.iter().map(SocketAddr::port).collect(),
            });
        };

        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Control listener bound");

        Ok(Self {
            config: Arc::new(config.clone()),
            registry,
            listener: std::sync::Mutex::new(Some(listener)),
            local_addr,
            cancel,
            running: AtomicBool::new(false),
            next_serial: Arc::new(AtomicU64::new(1)),
            accept_handle: std::sync::Mutex::new(None),
        })
    }

    /// Start accepting connections
    pub fn start(&self, handler: Arc<dyn ConnectionHandler>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::Other("Listener already running".to_string()));
        }
        let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            // Already started once and shut down
            self.running.store(false, Ordering::SeqCst);
            return Err(ServiceError::NotRunning);
        };

        info!(addr = %self.local_addr, "Accepting registrations");

        let context = AcceptContext {
            config: self.config.clone(),
            registry: self.registry.clone(),
            handler,
            cancel: self.cancel.clone(),
            next_serial: self.next_serial.clone(),
        };
        let handle = tokio::spawn(accept_loop(listener, context));
        *self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Stop accepting and close every connection opened by this listener
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::NotRunning);
        }

        info!(addr = %self.local_addr, "Shutting down control listener");
        self.cancel.cancel();

        let handle = self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        info!("Control listener shutdown complete");
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Check if the listener is accepting
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the registry connections are added to
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for ControlListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlListener")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("connections", &self.registry.len())
            .finish()
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("ControlListener dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            self.cancel.cancel();
        }
    }
}

#[derive(Clone)]
struct AcceptContext {
    config: Arc<ManagerConfig>,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn ConnectionHandler>,
    cancel: CancellationToken,
    next_serial: Arc<AtomicU64>,
}

async fn accept_loop(listener: TcpListener, context: AcceptContext) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => break,
            result = listener.accept() => result,
        };

        match accepted {
            Ok((socket, peer_addr)) => {
                counter!("marionette.connections.accepted").increment(1);
                debug!(peer_addr = %peer_addr, "Accepted connection");
                tokio::spawn(handle_connection(socket, peer_addr, context.clone()));
            }
            Err(err) => {
                error!(error = %err, "Failed to accept connection");
                tokio::select! {
                    _ = context.cancel.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                }
            }
        }
    }

    info!("Accept loop terminated");
}

#[instrument(skip_all, fields(peer_addr = %peer_addr))]
async fn handle_connection(socket: TcpStream, peer_addr: SocketAddr, context: AcceptContext) {
    if let Err(err) = socket.set_nodelay(true) {
        debug!(error = %err, "Unable to set TCP_NODELAY");
    }

    let codec = CommandCodec::new().with_max_frame_length(context.config.max_frame_length);
    let (read_half, write_half) = socket.into_split();
    let mut reader = FramedRead::new(read_half, codec.clone());

    let first = tokio::select! {
        _ = context.cancel.cancelled() => return,
        first = tokio::time::timeout(context.config.registration_timeout, reader.next()) => first,
    };
    let account = match first {
        Ok(Some(Ok(Decoded::Command(Command::Register(account))))) => account,
        Ok(Some(Ok(other))) => {
            counter!("marionette.connections.rejected").increment(1);
            debug!(frame = ?other, "First frame is not REGISTER, closing");
            return;
        }
        Ok(Some(Err(err))) => {
            counter!("marionette.connections.rejected").increment(1);
            debug!(error = %err, "Read failed before registration");
            return;
        }
        Ok(None) => {
            counter!("marionette.connections.rejected").increment(1);
            debug!("Peer closed before registering");
            return;
        }
        Err(_) => {
            counter!("marionette.connections.rejected").increment(1);
            debug!("Registration timed out, closing");
            return;
        }
    };

    let serial = ConnectionSerial::new(context.next_serial.fetch_add(1, Ordering::Relaxed));
    let connection = AccountConnection::new(
        account,
        serial,
        peer_addr,
        write_half,
        codec,
        context.config.write_timeout,
        context.cancel.child_token(),
    );

    if let Some(superseded) = context.registry.register(connection.clone()) {
        superseded.close();
    }

    if let Err(err) = connection.send(&Command::RegisteredOk).await {
        warn!(account = %account, error = %err, "Unable to acknowledge registration");
        context.registry.unregister_if(account, serial);
        connection.close();
        return;
    }

    let registry = context.registry.clone();
    let handler = context.handler.clone();
    let session = async {
        handler.on_register(&connection).await;
        ConnectionWorker::new(connection.clone(), reader, registry, handler.clone())
            .run()
            .await
    };

    if AssertUnwindSafe(session).catch_unwind().await.is_err() {
        error!(account = %account, serial = %serial, "Connection task panicked");
        context.registry.unregister_if(account, serial);
        connection.close();
    }
}
