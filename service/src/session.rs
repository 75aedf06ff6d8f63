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

//! Account sessions and their status machine

use crate::{AccountRecord, AccountStore, SessionSnapshot};
use marionette_protocol::AccountId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Status of a managed account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// No process and no transport
    Offline,
    /// Start requested, process not spawned yet
    Starting,
    /// Process spawned, waiting for its registration
    WaitingConnection,
    /// `LOGIN` sent, waiting for the result
    LoggingIn,
    /// Logged in and answering probes
    InGame,
    /// Logged in, but the last probe went unanswered
    NoConnection,
    /// Transport lost or login failed while the process may still run
    Disconnected,
    /// Stop in progress
    ShuttingDown,
}

impl SessionStatus {
    /// Check if the liveness monitor probes sessions in this status
    pub fn is_probe_eligible(self) -> bool {
        matches!(self, Self::InGame | Self::NoConnection)
    }

    /// Check if a registration in this status leads to a login
    pub fn accepts_login(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::WaitingConnection | Self::Disconnected
        )
    }

    /// Check if the session is logged in
    pub fn is_in_game(self) -> bool {
        matches!(self, Self::InGame | Self::NoConnection)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Starting => write!(f, "starting"),
            Self::WaitingConnection => write!(f, "waiting for connection"),
            Self::LoggingIn => write!(f, "logging in"),
            Self::InGame => write!(f, "in game"),
            Self::NoConnection => write!(f, "no connection"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Something that happened to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Start requested
    StartRequested,
    /// Process spawned
    Spawned,
    /// Process could not be spawned
    SpawnFailed,
    /// Settle delay elapsed after a registration, `LOGIN` about to be sent
    LoginStarted,
    /// `CHARACTER_NAME` received
    LoginSucceeded(String),
    /// `LOGIN_FAILED`, an unexpected reply or a login timeout
    LoginFailed,
    /// Character name reported outside a login
    CharacterChanged(String),
    /// `PONG` received
    PingSucceeded,
    /// Probe timed out or was answered with something else
    PingFailed,
    /// The registered transport failed or closed
    TransportLost,
    /// The process exited
    ProcessExited,
    /// Stop requested
    StopRequested,
    /// Stop sequence finished
    StopCompleted,
}

/// Status transition function
///
/// Returns `None` when the event does not apply in the current status.
pub fn next_status(current: SessionStatus, event: &SessionEvent) -> Option<SessionStatus> {
    use SessionStatus::*;

    match (current, event) {
        (Offline, SessionEvent::StartRequested) => Some(Starting),
        (Starting, SessionEvent::Spawned) => Some(WaitingConnection),
        (Starting, SessionEvent::SpawnFailed) => Some(Offline),
        (Starting | WaitingConnection | Disconnected, SessionEvent::LoginStarted) => Some(LoggingIn),
        (LoggingIn, SessionEvent::LoginSucceeded(_)) => Some(InGame),
        (LoggingIn, SessionEvent::LoginFailed) => Some(Disconnected),
        (InGame | NoConnection, SessionEvent::CharacterChanged(_)) => Some(current),
        (LoggingIn | InGame | NoConnection, SessionEvent::PingSucceeded) => Some(InGame),
        (InGame, SessionEvent::PingFailed) => Some(NoConnection),
        (
            WaitingConnection | LoggingIn | InGame | NoConnection,
            SessionEvent::TransportLost,
        ) => Some(Disconnected),
        (Offline, SessionEvent::ProcessExited) => None,
        (_, SessionEvent::ProcessExited) => Some(Offline),
        (Offline | ShuttingDown, SessionEvent::StopRequested) => None,
        (_, SessionEvent::StopRequested) => Some(ShuttingDown),
        (ShuttingDown, SessionEvent::StopCompleted) => Some(Offline),
        _ => None,
    }
}

/// Status change published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Account
    pub account: AccountId,
    /// Status before the change
    pub previous: SessionStatus,
    /// Status after the change
    pub current: SessionStatus,
    /// Character name after the change
    pub character_name: Option<String>,
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    character_name: Option<String>,
}

/// One managed account
///
/// Holds the account settings loaded at start time, the current status and
/// the cancellation token shared by the session's background tasks.
pub struct AccountSession {
    account: AccountId,
    record: AccountRecord,
    started_at: Instant,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
    stopping: AtomicBool,
    login_requested: AtomicBool,
    login_running: AtomicBool,
    store: Arc<dyn AccountStore>,
    updates: broadcast::Sender<StatusUpdate>,
}

impl AccountSession {
    pub(crate) fn new(
        record: AccountRecord,
        cancel: CancellationToken,
        store: Arc<dyn AccountStore>,
        updates: broadcast::Sender<StatusUpdate>,
    ) -> Self {
        Self {
            account: record.id,
            record,
            started_at: Instant::now(),
            state: Mutex::new(SessionState {
                status: SessionStatus::Offline,
                character_name: None,
            }),
            cancel,
            stopping: AtomicBool::new(false),
            login_requested: AtomicBool::new(false),
            login_running: AtomicBool::new(false),
            store,
            updates,
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the account
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Get the account settings loaded at start time
    pub fn record(&self) -> &AccountRecord {
        &self.record
    }

    /// Get the current status
    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    /// Get the character name, once logged in
    pub fn character_name(&self) -> Option<String> {
        self.state().character_name.clone()
    }

    /// Get when the session was started
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Get the token cancelling this session's tasks
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Check if the session's tasks have been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Mark the session as stopping
    ///
    /// Returns `false` if a stop was already in progress.
    pub(crate) fn begin_stop(&self) -> bool {
        !self.stopping.swap(true, Ordering::SeqCst)
    }

    /// Check if a stop is in progress
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Ask for a login; returns `true` if the caller should start the login task
    pub(crate) fn request_login(&self) -> bool {
        self.login_requested.store(true, Ordering::SeqCst);
        !self.login_running.swap(true, Ordering::SeqCst)
    }

    /// Take a pending login request
    pub(crate) fn take_login_request(&self) -> bool {
        self.login_requested.swap(false, Ordering::SeqCst)
    }

    /// Mark the login task finished; returns `true` if a request arrived
    /// meanwhile and the caller should start another task
    pub(crate) fn finish_login(&self) -> bool {
        self.login_running.store(false, Ordering::SeqCst);
        self.login_requested.load(Ordering::SeqCst) && !self.login_running.swap(true, Ordering::SeqCst)
    }

    /// Apply an event to the status
    ///
    /// Publishes and records the change. Returns `None` if the event does not
    /// apply or changes nothing.
    pub(crate) async fn apply(&self, event: SessionEvent) -> Option<StatusUpdate> {
        let update = {
            let mut state = self.state();
            let previous = state.status;
            let Some(current) = next_status(previous, &event) else {
                trace!(account = %self.account, status = %previous, event = ?event, "Event ignored");
                return None;
            };

            let character_name = match &event {
                SessionEvent::LoginSucceeded(name) | SessionEvent::CharacterChanged(name) => {
                    Some(name.clone())
                }
                _ if matches!(current, SessionStatus::InGame | SessionStatus::NoConnection) => {
                    state.character_name.clone()
                }
                _ => None,
            };
            if current == previous && character_name == state.character_name {
                return None;
            }

            state.status = current;
            state.character_name = character_name.clone();
            StatusUpdate {
                account: self.account,
                previous,
                current,
                character_name,
            }
        };

        info!(
            account = %self.account,
            from = %update.previous,
            to = %update.current,
            "Status changed"
        );
        if self.updates.send(update.clone()).is_err() {
            debug!(account = %self.account, "No status subscribers");
        }
        if let Err(err) = self
            .store
            .record_status(self.account, update.current, update.character_name.as_deref())
            .await
        {
            warn!(account = %self.account, error = %err, "Failed to record status");
        }
        Some(update)
    }

    /// Snapshot of the session
    pub fn snapshot(&self, process_running: bool, connected: bool) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            account: self.account,
            status: state.status,
            character_name: state.character_name.clone(),
            process_running,
            connected,
            is_favorite: self.record.is_favorite,
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSession")
            .field("account", &self.account)
            .field("status", &self.status())
            .field("stopping", &self.is_stopping())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryAccountStore;
    use super::SessionStatus::*;

    #[test]
    fn test_login_path() {
        let mut status = Offline;
        for event in [
            SessionEvent::StartRequested,
            SessionEvent::Spawned,
            SessionEvent::LoginStarted,
            SessionEvent::LoginSucceeded("Ayla".to_string()),
        ] {
            status = next_status(status, &event).unwrap();
        }
        assert_eq!(status, InGame);
    }

    #[test]
    fn test_spawn_failure_returns_offline() {
        assert_eq!(next_status(Starting, &SessionEvent::SpawnFailed), Some(Offline));
    }

    #[test]
    fn test_ping_transitions() {
        assert_eq!(next_status(InGame, &SessionEvent::PingFailed), Some(NoConnection));
        assert_eq!(next_status(NoConnection, &SessionEvent::PingSucceeded), Some(InGame));
        assert_eq!(next_status(LoggingIn, &SessionEvent::PingSucceeded), Some(InGame));
        // A failed probe never leaves a non-game status
        assert_eq!(next_status(LoggingIn, &SessionEvent::PingFailed), None);
        assert_eq!(next_status(NoConnection, &SessionEvent::PingFailed), None);
    }

    #[test]
    fn test_transport_lost() {
        for status in [WaitingConnection, LoggingIn, InGame, NoConnection] {
            assert_eq!(next_status(status, &SessionEvent::TransportLost), Some(Disconnected));
        }
        assert_eq!(next_status(ShuttingDown, &SessionEvent::TransportLost), None);
        assert_eq!(next_status(Offline, &SessionEvent::TransportLost), None);
    }

    #[test]
    fn test_relogin_after_disconnect() {
        assert_eq!(next_status(Disconnected, &SessionEvent::LoginStarted), Some(LoggingIn));
        assert_eq!(next_status(InGame, &SessionEvent::LoginStarted), None);
    }

    #[test]
    fn test_process_exit_always_wins() {
        for status in [
            Starting,
            WaitingConnection,
            LoggingIn,
            InGame,
            NoConnection,
            Disconnected,
            ShuttingDown,
        ] {
            assert_eq!(next_status(status, &SessionEvent::ProcessExited), Some(Offline));
        }
    }

    #[test]
    fn test_stop_sequence() {
        assert_eq!(next_status(InGame, &SessionEvent::StopRequested), Some(ShuttingDown));
        assert_eq!(next_status(ShuttingDown, &SessionEvent::StopRequested), None);
        assert_eq!(next_status(ShuttingDown, &SessionEvent::LoginStarted), None);
        assert_eq!(next_status(ShuttingDown, &SessionEvent::StopCompleted), Some(Offline));
    }

    #[tokio::test]
    async fn test_apply_publishes_and_records() {
        let store = Arc::new(MemoryAccountStore::new());
        let (updates, mut rx) = broadcast::channel(16);
        let session = AccountSession::new(
            AccountRecord::new(AccountId::new(8), "alice", "secret"),
            CancellationToken::new(),
            store.clone(),
            updates,
        );

        session.apply(SessionEvent::StartRequested).await.unwrap();
        session.apply(SessionEvent::Spawned).await.unwrap();
        session.apply(SessionEvent::LoginStarted).await.unwrap();
        let update = session
            .apply(SessionEvent::LoginSucceeded("Ayla".to_string()))
            .await
            .unwrap();
        assert_eq!(update.previous, LoggingIn);
        assert_eq!(update.current, InGame);
        assert_eq!(session.character_name().as_deref(), Some("Ayla"));

        // Not applicable
        assert!(session.apply(SessionEvent::Spawned).await.is_none());

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update.current);
        }
        assert_eq!(seen, vec![Starting, WaitingConnection, LoggingIn, InGame]);
        assert_eq!(
            store.last_status(AccountId::new(8)),
            Some((InGame, Some("Ayla".to_string())))
        );
    }

    #[tokio::test]
    async fn test_character_name_cleared_offline() {
        let (updates, _rx) = broadcast::channel(16);
        let session = AccountSession::new(
            AccountRecord::new(AccountId::new(9), "bob", "pw"),
            CancellationToken::new(),
            Arc::new(MemoryAccountStore::new()),
            updates,
        );
        session.apply(SessionEvent::StartRequested).await;
        session.apply(SessionEvent::Spawned).await;
        session.apply(SessionEvent::LoginStarted).await;
        session.apply(SessionEvent::LoginSucceeded("Bo".to_string())).await;
        session.apply(SessionEvent::PingFailed).await;
        assert_eq!(session.character_name().as_deref(), Some("Bo"));

        session.apply(SessionEvent::ProcessExited).await;
        assert_eq!(session.status(), Offline);
        assert!(session.character_name().is_none());
    }

    #[test]
    fn test_login_request_flags() {
        let (updates, _rx) = broadcast::channel(1);
        let session = AccountSession::new(
            AccountRecord::new(AccountId::new(10), "c", "d"),
            CancellationToken::new(),
            Arc::new(MemoryAccountStore::new()),
            updates,
        );
        assert!(session.request_login());
        // Second request while running is folded into the first task
        assert!(!session.request_login());
        assert!(session.take_login_request());
        assert!(!session.take_login_request());
        assert!(!session.finish_login());
    }
}
