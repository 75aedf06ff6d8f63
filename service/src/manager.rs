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

//! Account manager
//!
//! The AccountManager is the entry point for the presentation layer:
//! - Binding the control listener
//! - Starting and stopping accounts
//! - Sending automation toggles
//! - Status queries and the status update stream
//! - Graceful shutdown coordination

use crate::{
    AccountStore, CommandDispatcher, ConnectionRegistry, ControlListener, LoginOrchestrator,
    ManagerConfig, ManagerSnapshot, ProcessSupervisor, Result, ServiceError, SessionSnapshot,
    SessionStatus, StatusUpdate,
};
use marionette_protocol::{AccountId, Command};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Process-and-connection manager for game-client accounts
///
/// # Example
///
/// ```no_run
/// use marionette_service::{AccountManager, AccountRecord, ManagerConfig, MemoryAccountStore};
/// use marionette_protocol::AccountId;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = Arc::new(MemoryAccountStore::with_records([
///         AccountRecord::new(AccountId::new(1), "alice", "secret").with_server_index(2),
///     ]));
///     let manager = AccountManager::new(ManagerConfig::new("/opt/game/client"), store).await?;
///     manager.start()?;
///
///     let mut updates = manager.subscribe();
///     manager.start_account(AccountId::new(1)).await?;
///     while let Ok(update) = updates.recv().await {
///         println!("{} is {}", update.account, update.current);
///     }
///
///     manager.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct AccountManager {
    config: Arc<ManagerConfig>,
    registry: Arc<ConnectionRegistry>,
    supervisor: Arc<ProcessSupervisor>,
    orchestrator: Arc<LoginOrchestrator>,
    listener: ControlListener,
    cancel: CancellationToken,
    running: AtomicBool,
    started_at: Instant,
}

impl AccountManager {
    /// Validate the configuration and bind the control listener
    ///
    /// Does not accept registrations until [`AccountManager::start`].
    pub async fn new(config: ManagerConfig, store: Arc<dyn AccountStore>) -> Result<Self> {
        config.validate().map_err(ServiceError::InvalidConfig)?;

        let cancel = CancellationToken::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let listener = ControlListener::bind(&config, registry.clone(), cancel.child_token()).await?;

        let supervisor = Arc::new(
            ProcessSupervisor::new()
                .with_leading_args(config.executable_args.iter().cloned())
                .with_manager_addr(listener.local_addr()),
        );
        let dispatcher = CommandDispatcher::new(registry.clone());
        let config = Arc::new(config);
        let orchestrator = LoginOrchestrator::new(
            config.clone(),
            supervisor.clone(),
            dispatcher,
            store,
            cancel.child_token(),
        );

        Ok(Self {
            config,
            registry,
            supervisor,
            orchestrator,
            listener,
            cancel,
            running: AtomicBool::new(false),
            started_at: Instant::now(),
        })
    }

    /// Start accepting client registrations
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::Other("Manager already running".to_string()));
        }
        self.listener.start(self.orchestrator.clone())?;
        info!(addr = %self.listener.local_addr(), "Account manager started");
        Ok(())
    }

    /// Check if the manager is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Launch the client for an account and log it in once it registers
    pub async fn start_account(&self, account: AccountId) -> Result<()> {
        self.ensure_running()?;
        self.orchestrator.start(account).await
    }

    /// Shut down the client for an account
    pub async fn stop_account(&self, account: AccountId) -> Result<()> {
        self.orchestrator.stop(account).await
    }

    /// Toggle automation in a client
    ///
    /// A failed write drops the transport and marks the account disconnected.
    #[instrument(skip(self))]
    pub async fn set_auto_state(&self, account: AccountId, enabled: bool) -> Result<()> {
        self.orchestrator
            .send(account, &Command::AutoState(enabled))
            .await
    }

    /// Toggle an event-automation mode in a client
    #[instrument(skip(self, mode))]
    pub async fn set_auto_event(
        &self,
        account: AccountId,
        enabled: bool,
        mode: impl Into<String>,
    ) -> Result<()> {
        let command = Command::AutoEvent {
            enabled,
            mode: mode.into(),
        };
        self.orchestrator.send(account, &command).await
    }

    /// Toggle an equip-automation mode in a client
    #[instrument(skip(self, mode))]
    pub async fn set_auto_equip(
        &self,
        account: AccountId,
        enabled: bool,
        mode: impl Into<String>,
    ) -> Result<()> {
        let command = Command::AutoEquip {
            enabled,
            mode: mode.into(),
        };
        self.orchestrator.send(account, &command).await
    }

    /// Get the status of an account
    pub fn status(&self, account: AccountId) -> SessionStatus {
        self.orchestrator.status(account)
    }

    /// Snapshot of one account, if it is managed
    pub fn session(&self, account: AccountId) -> Option<SessionSnapshot> {
        self.orchestrator.session(account).map(|session| {
            session.snapshot(
                self.supervisor.is_running(account),
                self.registry.is_connected(account),
            )
        })
    }

    /// Snapshots of every managed account
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .orchestrator
            .sessions()
            .into_iter()
            .map(|session| {
                let account = session.account();
                session.snapshot(
                    self.supervisor.is_running(account),
                    self.registry.is_connected(account),
                )
            })
            .collect();
        sessions.sort_by_key(|snapshot| snapshot.account);
        sessions
    }

    /// Snapshot of the manager
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            bind_address: self.listener.local_addr(),
            sessions: self.orchestrator.len(),
            connections: self.registry.len(),
            processes: self.supervisor.len(),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Subscribe to status updates
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.orchestrator.subscribe()
    }

    /// Get the control listener address
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Get the configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Stop every account and the listener
    ///
    /// Processes that outlive their stop sequence are killed.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::NotRunning);
        }

        info!("Shutting down account manager");
        self.orchestrator.stop_all().await;
        if let Err(err) = self.listener.shutdown().await {
            warn!(error = %err, "Listener shutdown failed");
        }
        self.registry.close_all();
        self.supervisor.kill_all().await;
        self.cancel.cancel();

        info!("Account manager shutdown complete");
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(ServiceError::NotRunning)
        }
    }
}

impl std::fmt::Debug for AccountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager")
            .field("bind_address", &self.listener.local_addr())
            .field("running", &self.is_running())
            .field("sessions", &self.orchestrator.len())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for AccountManager {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("AccountManager dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountRecord, MemoryAccountStore};

    fn config() -> ManagerConfig {
        ManagerConfig::new("/bin/sh").with_port(0)
    }

    #[tokio::test]
    async fn test_manager_lifecycle() {
        let manager = AccountManager::new(config(), Arc::new(MemoryAccountStore::new()))
            .await
            .unwrap();
        assert!(!manager.is_running());
        assert!(manager.start_account(AccountId::new(1)).await.is_err());

        manager.start().unwrap();
        assert!(manager.is_running());
        assert!(manager.start().is_err());

        manager.shutdown().await.unwrap();
        assert!(!manager.is_running());
        assert!(manager.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let err = AccountManager::new(
            ManagerConfig::default().with_port(0),
            Arc::new(MemoryAccountStore::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let manager = AccountManager::new(config(), Arc::new(MemoryAccountStore::new()))
            .await
            .unwrap();
        manager.start().unwrap();

        let err = manager.start_account(AccountId::new(3)).await.unwrap_err();
        assert!(matches!(err, ServiceError::AccountNotFound(_)));
        assert_eq!(manager.status(AccountId::new(3)), SessionStatus::Offline);
        assert!(manager.sessions().is_empty());
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_requires_connection() {
        let store = MemoryAccountStore::with_records([AccountRecord::new(
            AccountId::new(2),
            "alice",
            "secret",
        )]);
        let manager = AccountManager::new(config(), Arc::new(store)).await.unwrap();
        manager.start().unwrap();

        let err = manager
            .set_auto_state(AccountId::new(2), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotConnected(_)));
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_executable_keeps_offline() {
        let store = MemoryAccountStore::with_records([AccountRecord::new(
            AccountId::new(4),
            "alice",
            "secret",
        )]);
        let config = ManagerConfig::new("/definitely/not/a/client").with_port(0);
        let manager = AccountManager::new(config, Arc::new(store)).await.unwrap();
        manager.start().unwrap();
        let mut updates = manager.subscribe();

        let err = manager.start_account(AccountId::new(4)).await.unwrap_err();
        assert!(matches!(err, ServiceError::ExecutableNotFound(_)));
        assert_eq!(manager.status(AccountId::new(4)), SessionStatus::Offline);

        let first = updates.recv().await.unwrap();
        assert_eq!(first.current, SessionStatus::Starting);
        let second = updates.recv().await.unwrap();
        assert_eq!(second.current, SessionStatus::Offline);
        manager.shutdown().await.unwrap();
    }
}
