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

//! End-to-end test helpers
//!
//! The `mock-client` binary in this crate plays the game client; the
//! helpers here build managers that launch it.

use marionette_protocol::AccountId;
use marionette_service::{
    AccountManager, AccountRecord, ManagerConfig, MemoryAccountStore, SessionStatus,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Character name the mock client reports for an account
pub fn character_name(account: AccountId) -> String {
    format!("Hero{}", account.as_u64())
}

/// Manager configuration with short timings for tests
pub fn test_config(executable: impl AsRef<Path>) -> ManagerConfig {
    ManagerConfig::new(executable.as_ref())
        .with_port(0)
        .with_registration_timeout(Duration::from_secs(2))
        .with_settle_delay(Duration::from_millis(50))
        .with_login_timeout(Duration::from_secs(2))
        .with_ping_interval(Duration::from_millis(200))
        .with_ping_timeout(Duration::from_millis(500))
        .with_process_poll_interval(Duration::from_millis(50))
        .with_stop_grace(Duration::from_secs(1))
}

/// Store holding accounts `1..=count`
pub fn store_with_accounts(count: u64) -> Arc<MemoryAccountStore> {
    Arc::new(MemoryAccountStore::with_records((1..=count).map(|id| {
        AccountRecord::new(AccountId::new(id), format!("user{id}"), format!("pass{id}"))
            .with_server_index(1)
    })))
}

/// Build and start a manager
pub async fn start_manager(
    config: ManagerConfig,
    store: Arc<MemoryAccountStore>,
) -> marionette_service::Result<AccountManager> {
    let manager = AccountManager::new(config, store).await?;
    manager.start()?;
    Ok(manager)
}

/// Wait until an account reaches a status
///
/// Returns false if it does not within `timeout`.
pub async fn wait_for_status(
    manager: &AccountManager,
    account: AccountId,
    status: SessionStatus,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if manager.status(account) == status {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Install a log subscriber honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
