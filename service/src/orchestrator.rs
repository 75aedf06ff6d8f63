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

//! Login orchestrator
//!
//! Drives each account from start to in-game and back to offline:
//! - `start` loads the account, spawns its process and starts the
//!   process-watch and liveness loops
//! - a registration starts a login after the settle delay
//! - `stop` runs the single stop sequence
//! - a process exit always forces the session offline

use crate::{
    AccountConnection, AccountSession, AccountStore, CommandDispatcher, ConnectionHandler,
    DisconnectReason, LivenessMonitor, ManagerConfig, ProcessState, ProcessSupervisor, Result,
    ServiceError, SessionEvent, SessionStatus, StatusUpdate, StopOutcome,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use marionette_protocol::{AccountId, Command};
use metrics::counter;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Per-account login state machine driver
pub struct LoginOrchestrator {
    config: Arc<ManagerConfig>,
    sessions: DashMap<AccountId, Arc<AccountSession>>,
    supervisor: Arc<ProcessSupervisor>,
    dispatcher: CommandDispatcher,
    monitor: LivenessMonitor,
    store: Arc<dyn AccountStore>,
    updates: broadcast::Sender<StatusUpdate>,
    cancel: CancellationToken,
    this: Weak<LoginOrchestrator>,
}

impl LoginOrchestrator {
    /// Create an orchestrator
    ///
    /// Session tokens are children of `cancel`.
    pub fn new(
        config: Arc<ManagerConfig>,
        supervisor: Arc<ProcessSupervisor>,
        dispatcher: CommandDispatcher,
        store: Arc<dyn AccountStore>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (updates, _) = broadcast::channel(config.status_channel_capacity.max(1));
        let monitor = LivenessMonitor::new(
            dispatcher.clone(),
            config.ping_interval,
            config.ping_timeout,
        );
        Arc::new_cyclic(|this| Self {
            config,
            sessions: DashMap::new(),
            supervisor,
            dispatcher,
            monitor,
            store,
            updates,
            cancel,
            this: this.clone(),
        })
    }

    /// Subscribe to status updates
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    /// Get the session of an account
    pub fn session(&self, account: AccountId) -> Option<Arc<AccountSession>> {
        self.sessions.get(&account).map(|entry| entry.value().clone())
    }

    /// All current sessions
    pub fn sessions(&self) -> Vec<Arc<AccountSession>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Get the status of an account (offline if it has no session)
    pub fn status(&self, account: AccountId) -> SessionStatus {
        self.session(account)
            .map(|session| session.status())
            .unwrap_or(SessionStatus::Offline)
    }

    /// Number of managed sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is managed
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start an account
    ///
    /// Returns once the process is spawned; login happens in the background
    /// after the client registers.
    #[instrument(skip_all, fields(account = %account))]
    pub async fn start(&self, account: AccountId) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ServiceError::NotRunning);
        }
        if self.sessions.contains_key(&account) {
            return Err(ServiceError::AlreadyRunning(account));
        }

        let record = self.store.load(account).await?;
        let session = Arc::new(AccountSession::new(
            record,
            self.cancel.child_token(),
            self.store.clone(),
            self.updates.clone(),
        ));
        match self.sessions.entry(account) {
            Entry::Occupied(_) => return Err(ServiceError::AlreadyRunning(account)),
            Entry::Vacant(vacant) => {
                vacant.insert(session.clone());
            }
        }

        session.apply(SessionEvent::StartRequested).await;
        if let Err(err) = self.supervisor.start(account, &self.config.executable) {
            warn!(error = %err, "Unable to start account");
            session.apply(SessionEvent::SpawnFailed).await;
            session.cancellation().cancel();
            self.remove_session(&session);
            return Err(err);
        }
        session.apply(SessionEvent::Spawned).await;

        self.spawn_process_watch(session.clone());
        self.monitor.spawn(session);
        Ok(())
    }

    /// Stop an account
    ///
    /// Sends `SHUTDOWN` once, waits for the process within the stop grace
    /// period, force-kills it otherwise and releases everything. Stopping an
    /// account without a session is a no-op.
    #[instrument(skip_all, fields(account = %account))]
    pub async fn stop(&self, account: AccountId) -> Result<()> {
        let Some(session) = self.session(account) else {
            debug!("No session to stop");
            return Ok(());
        };
        if !session.begin_stop() {
            debug!("Stop already in progress");
            return Ok(());
        }

        session.apply(SessionEvent::StopRequested).await;
        session.cancellation().cancel();

        let grace = self.config.stop_grace;
        let deadline = Instant::now() + grace;
        if self.dispatcher.registry().is_connected(account) {
            match self
                .dispatcher
                .send_and_await(account, &Command::Shutdown, grace)
                .await
            {
                Ok(Command::ShutdownOk) => debug!("Shutdown acknowledged"),
                Ok(other) => debug!(reply = %other, "Unexpected shutdown reply"),
                Err(err) => debug!(error = %err, "Shutdown not acknowledged"),
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = self.supervisor.stop(account, remaining).await;
        match &outcome {
            Ok(StopOutcome::Killed) => warn!("Process force-killed"),
            Ok(outcome) => debug!(outcome = ?outcome, "Process stopped"),
            Err(err) => warn!(error = %err, "Failed to stop process"),
        }
        self.supervisor.release(account);

        if let Some(connection) = self.dispatcher.registry().unregister(account) {
            connection.close();
        }
        session.apply(SessionEvent::StopCompleted).await;
        self.remove_session(&session);
        info!("Account stopped");
        outcome.map(|_| ())
    }

    /// Write a command to an account's client without waiting for a reply
    ///
    /// A transport failure forces the session to disconnected.
    #[instrument(skip_all, fields(account = %account, command = command.name()))]
    pub async fn send(&self, account: AccountId, command: &Command) -> Result<()> {
        let result = self.dispatcher.send(account, command).await;
        if let Err(ServiceError::Disconnected(_)) = &result {
            match self.session(account) {
                Some(session) if !session.is_stopping() => {
                    warn!("Transport lost while sending");
                    session.apply(SessionEvent::TransportLost).await;
                }
                _ => {}
            }
        }
        result
    }

    /// Stop every session
    pub async fn stop_all(&self) {
        let accounts: Vec<AccountId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let stops = accounts.into_iter().map(|account| async move {
            if let Err(err) = self.stop(account).await {
                warn!(account = %account, error = %err, "Stop failed");
            }
        });
        futures_util::future::join_all(stops).await;
    }

    fn remove_session(&self, session: &Arc<AccountSession>) {
        self.sessions
            .remove_if(&session.account(), |_, current| Arc::ptr_eq(current, session));
    }

    fn spawn_process_watch(&self, session: Arc<AccountSession>) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let account = session.account();
            let mut ticker = tokio::time::interval(this.config.process_poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = session.cancellation().cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match this.supervisor.poll_exit(account) {
                    ProcessState::Running => {}
                    ProcessState::Exited(_) | ProcessState::Absent => {
                        this.on_process_exit(&session).await;
                        break;
                    }
                }
            }
            debug!(account = %account, "Process watch ended");
        });
    }

    async fn on_process_exit(&self, session: &Arc<AccountSession>) {
        if session.is_stopping() {
            return;
        }
        let account = session.account();
        info!(account = %account, "Process exited, session offline");
        session.cancellation().cancel();
        if let Some(connection) = self.dispatcher.registry().unregister(account) {
            connection.close();
        }
        session.apply(SessionEvent::ProcessExited).await;
        self.remove_session(session);
    }

    fn request_login(&self, session: Arc<AccountSession>) {
        if !session.request_login() {
            debug!(account = %session.account(), "Login already running, folded");
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            loop {
                while session.take_login_request() {
                    this.run_login(&session).await;
                }
                if !session.finish_login() {
                    break;
                }
            }
        });
    }

    async fn run_login(&self, session: &AccountSession) {
        let account = session.account();
        let cancel = session.cancellation();

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.config.settle_delay) => {}
        }
        if !session.status().accepts_login() {
            debug!(account = %account, status = %session.status(), "Login no longer needed");
            return;
        }
        if !self.dispatcher.registry().is_connected(account) {
            debug!(account = %account, "Transport gone before login");
            return;
        }
        if session.apply(SessionEvent::LoginStarted).await.is_none() {
            return;
        }

        let login = Command::Login(session.record().login_request());
        let reply = tokio::select! {
            _ = cancel.cancelled() => return,
            reply = self.dispatcher.send_and_await(account, &login, self.config.login_timeout) => reply,
        };

        let event = match reply {
            Ok(Command::CharacterName(name)) => {
                counter!("marionette.logins.succeeded").increment(1);
                info!(account = %account, character = %name, "Login succeeded");
                SessionEvent::LoginSucceeded(name)
            }
            Ok(Command::LoginFailed) => {
                counter!("marionette.logins.failed").increment(1);
                warn!(account = %account, "Login rejected by client");
                SessionEvent::LoginFailed
            }
            Ok(other) => {
                counter!("marionette.logins.failed").increment(1);
                warn!(account = %account, reply = %other, "Unexpected login reply");
                SessionEvent::LoginFailed
            }
            Err(err) if err.is_connection_error() => {
                counter!("marionette.logins.failed").increment(1);
                warn!(account = %account, error = %err, "Transport lost during login");
                SessionEvent::TransportLost
            }
            Err(err) => {
                counter!("marionette.logins.failed").increment(1);
                warn!(account = %account, error = %err, "Login failed");
                SessionEvent::LoginFailed
            }
        };
        if !session.is_stopping() {
            session.apply(event).await;
        }
    }
}

#[async_trait]
impl ConnectionHandler for LoginOrchestrator {
    async fn on_register(&self, conn: &AccountConnection) {
        let account = conn.account();
        let Some(session) = self.session(account) else {
            warn!(account = %account, "Registration for an account that is not managed, closing");
            self.dispatcher
                .registry()
                .unregister_if(account, conn.serial());
            conn.close();
            return;
        };
        let status = session.status();
        if status.accepts_login() && !session.is_stopping() {
            debug!(account = %account, status = %status, "Registration, login scheduled");
            self.request_login(session);
        } else {
            debug!(account = %account, status = %status, "Registration, no login needed");
        }
    }

    async fn on_unsolicited(&self, conn: &AccountConnection, command: Command) {
        let account = conn.account();
        match command {
            Command::CharacterName(name) => match self.session(account) {
                Some(session) if !session.is_stopping() => {
                    session.apply(SessionEvent::CharacterChanged(name)).await;
                }
                _ => debug!(account = %account, "Character name for an idle session"),
            },
            other => debug!(account = %account, command = %other, "Unsolicited frame ignored"),
        }
    }

    async fn on_disconnect(&self, conn: &AccountConnection, reason: DisconnectReason) {
        let account = conn.account();
        let Some(session) = self.session(account) else {
            return;
        };
        if session.is_stopping() {
            return;
        }
        debug!(account = %account, reason = %reason, "Transport ended");
        session.apply(SessionEvent::TransportLost).await;
    }
}

impl std::fmt::Debug for LoginOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginOrchestrator")
            .field("sessions", &self.sessions.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
