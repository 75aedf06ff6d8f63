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

//! Managed client implementation

use crate::{ClientConfig, ClientError, ClientHandler, Result};
use futures_util::{SinkExt, StreamExt};
use marionette_protocol::{AccountId, Command, CommandCodec, Decoded};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, instrument, trace, warn};

/// Why [`ManagedClient::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The manager requested a shutdown and it was acknowledged
    ShutdownRequested,
    /// The manager closed the connection
    ManagerClosed,
}

/// Cloneable sending half of a managed client
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<ClientHandleInner>,
}

struct ClientHandleInner {
    account: AccountId,
    manager_addr: SocketAddr,
    writer: Mutex<FramedWrite<OwnedWriteHalf, CommandCodec>>,
    closed: AtomicBool,
}

impl ClientHandle {
    /// Account this client is registered for
    pub fn account(&self) -> AccountId {
        self.inner.account
    }

    /// Address of the manager
    pub fn manager_addr(&self) -> SocketAddr {
        self.inner.manager_addr
    }

    /// Send a command to the manager
    pub async fn send(&self, command: &Command) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        trace!(account = %self.inner.account, command = %command, "Sending");
        let mut writer = self.inner.writer.lock().await;
        writer.send(command).await?;
        Ok(())
    }

    /// Tell the manager this client is going away
    pub async fn notify_shutdown(&self) -> Result<()> {
        info!(account = %self.inner.account, "Notifying manager of shutdown");
        self.send(&Command::ClientShutdown).await
    }

    /// Close the sending half
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut writer = self.inner.writer.lock().await;
        writer.get_mut().shutdown().await?;
        Ok(())
    }

    /// Check if the sending half is closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("account", &self.inner.account)
            .field("manager_addr", &self.inner.manager_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A registered connection to the manager
///
/// # Example
///
/// ```no_run
/// use marionette_client::{CallbackHandler, ClientConfig, ManagedClient};
/// use marionette_protocol::AccountId;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::from_env(AccountId::new(7))?;
///     let client = ManagedClient::connect(config).await?;
///     let handler = CallbackHandler {
///         on_login: Some(Box::new(|_| Some("Aldric".to_string()))),
///         ..Default::default()
///     };
///     client.run(Arc::new(handler)).await?;
///     Ok(())
/// }
/// ```
pub struct ManagedClient {
    handle: ClientHandle,
    reader: FramedRead<OwnedReadHalf, CommandCodec>,
}

impl ManagedClient {
    /// Connect to the manager and register
    ///
    /// Candidate addresses are tried in order; the first one that accepts
    /// the connection must answer `REGISTER` with `REGISTERED_OK`.
    #[instrument(skip_all, fields(account = %config.account))]
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let candidates = config.candidates();
        for addr in &candidates {
            match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Self::register(stream, *addr, &config).await,
                Ok(Err(err)) => debug!(addr = %addr, error = %err, "Connection attempt failed"),
                Err(_) => debug!(addr = %addr, "Connection attempt timed out"),
            }
        }
        Err(ClientError::Unreachable(candidates))
    }

    async fn register(stream: TcpStream, addr: SocketAddr, config: &ClientConfig) -> Result<Self> {
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "Unable to set TCP_NODELAY");
        }
        let codec = CommandCodec::new().with_max_frame_length(config.max_frame_length);
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, codec.clone());
        let mut writer = FramedWrite::new(write_half, codec);

        writer.send(Command::Register(config.account)).await?;
        let reply = timeout(config.register_timeout, reader.next())
            .await
            .map_err(|_| ClientError::ConnectionTimeout)?;
        match reply {
            Some(Ok(Decoded::Command(Command::RegisteredOk))) => {}
            Some(Ok(Decoded::Command(other))) => {
                return Err(ClientError::RegistrationRejected(other.to_string()));
            }
            Some(Ok(Decoded::Malformed(frame))) => {
                return Err(ClientError::RegistrationRejected(frame.raw));
            }
            Some(Err(err)) => return Err(err.into()),
            None => return Err(ClientError::ConnectionClosed),
        }

        info!(manager = %addr, "Registered with manager");
        Ok(Self {
            handle: ClientHandle {
                inner: Arc::new(ClientHandleInner {
                    account: config.account,
                    manager_addr: addr,
                    writer: Mutex::new(writer),
                    closed: AtomicBool::new(false),
                }),
            },
            reader,
        })
    }

    /// Get a handle for sending from other tasks
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Account this client is registered for
    pub fn account(&self) -> AccountId {
        self.handle.account()
    }

    /// Tell the manager this client is going away
    pub async fn notify_shutdown(&self) -> Result<()> {
        self.handle.notify_shutdown().await
    }

    /// Serve manager requests until shutdown or disconnect
    #[instrument(skip_all, fields(account = %self.handle.account()))]
    pub async fn run<H: ClientHandler>(mut self, handler: Arc<H>) -> Result<RunOutcome> {
        let handle = self.handle.clone();
        let result = self.serve(&handle, handler.as_ref()).await;
        if let Err(err) = handle.close().await {
            debug!(error = %err, "Error closing connection");
        }
        handler.on_disconnect(&handle).await;
        result
    }

    async fn serve<H: ClientHandler>(
        &mut self,
        handle: &ClientHandle,
        handler: &H,
    ) -> Result<RunOutcome> {
        loop {
            let command = match self.reader.next().await {
                None => {
                    info!("Manager closed the connection");
                    return Ok(RunOutcome::ManagerClosed);
                }
                Some(Err(err)) if err.is_io() => return Err(err.into()),
                Some(Err(err)) => {
                    warn!(error = %err, "Stream error");
                    continue;
                }
                Some(Ok(Decoded::Malformed(frame))) => {
                    warn!(frame = %frame.raw, error = %frame.error, "Malformed frame from manager");
                    continue;
                }
                Some(Ok(Decoded::Command(command))) => command,
            };

            trace!(command = %command, "Received");
            let reply = match command {
                Command::Ping => Some(Command::Pong),
                Command::Login(request) => {
                    debug!(username = %request.username, "Login requested");
                    match handler.on_login(handle, request).await {
                        Some(name) => Some(Command::CharacterName(name)),
                        None => Some(Command::LoginFailed),
                    }
                }
                Command::Shutdown => {
                    if handler.on_shutdown(handle).await {
                        handle.send(&Command::ShutdownOk).await?;
                        info!("Shutdown acknowledged");
                        return Ok(RunOutcome::ShutdownRequested);
                    }
                    debug!("Shutdown declined");
                    None
                }
                Command::AutoState(enabled) => {
                    handler.on_auto_state(handle, enabled).await;
                    None
                }
                Command::AutoEvent { enabled, mode } => {
                    handler.on_auto_event(handle, enabled, &mode).await;
                    None
                }
                Command::AutoEquip { enabled, mode } => {
                    handler.on_auto_equip(handle, enabled, &mode).await;
                    None
                }
                Command::Unknown { name, .. } => {
                    debug!(name = %name, "Unknown command");
                    Some(Command::UnknownCommand)
                }
                other => {
                    debug!(command = %other, "Ignoring frame");
                    None
                }
            };

            if let Some(reply) = reply {
                handle.send(&reply).await?;
            }
        }
    }
}

impl std::fmt::Debug for ManagedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedClient")
            .field("handle", &self.handle)
            .finish()
    }
}
