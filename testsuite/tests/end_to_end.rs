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

//! End-to-end scenarios against real mock-client processes

use marionette_protocol::AccountId;
use marionette_service::{ServiceError, SessionStatus};
use marionette_testsuite::{
    character_name, init_tracing, start_manager, store_with_accounts, test_config,
    wait_for_status,
};
use std::time::{Duration, Instant};

const MOCK_CLIENT: &str = env!("CARGO_BIN_EXE_mock-client");
const SETTLE: Duration = Duration::from_secs(10);

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_reaches_in_game() {
    init_tracing();
    let manager = start_manager(test_config(MOCK_CLIENT), store_with_accounts(1))
        .await
        .unwrap();
    let account = AccountId::new(1);
    let mut updates = manager.subscribe();

    manager.start_account(account).await.unwrap();
    assert!(wait_for_status(&manager, account, SessionStatus::InGame, SETTLE).await);

    let snapshot = manager.session(account).unwrap();
    assert_eq!(snapshot.character_name, Some(character_name(account)));
    assert!(snapshot.process_running);
    assert!(snapshot.connected);

    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update.current);
    }
    assert_eq!(
        seen,
        vec![
            SessionStatus::Starting,
            SessionStatus::WaitingConnection,
            SessionStatus::LoggingIn,
            SessionStatus::InGame,
        ]
    );

    manager.set_auto_state(account, true).await.unwrap();
    manager.set_auto_event(account, true, "fishing").await.unwrap();
    manager.set_auto_equip(account, false, "weapons").await.unwrap();

    manager.stop_account(account).await.unwrap();
    assert_eq!(manager.status(account), SessionStatus::Offline);
    assert!(manager.session(account).is_none());
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_login_is_disconnected() {
    init_tracing();
    let config = test_config(MOCK_CLIENT).with_executable_args(["--reject-login"]);
    let manager = start_manager(config, store_with_accounts(1)).await.unwrap();
    let account = AccountId::new(1);

    manager.start_account(account).await.unwrap();
    assert!(wait_for_status(&manager, account, SessionStatus::Disconnected, SETTLE).await);
    let snapshot = manager.session(account).unwrap();
    assert_eq!(snapshot.character_name, None);
    assert!(snapshot.process_running);

    manager.shutdown().await.unwrap();
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test]
async fn test_accounts_are_isolated() {
    init_tracing();
    let manager = start_manager(test_config(MOCK_CLIENT), store_with_accounts(3))
        .await
        .unwrap();
    let accounts: Vec<AccountId> = (1..=3).map(AccountId::new).collect();

    for account in &accounts {
        manager.start_account(*account).await.unwrap();
    }
    for account in &accounts {
        assert!(wait_for_status(&manager, *account, SessionStatus::InGame, SETTLE).await);
        assert_eq!(
            manager.session(*account).unwrap().character_name,
            Some(character_name(*account))
        );
    }
    assert_eq!(manager.snapshot().connections, 3);

    manager.stop_account(accounts[1]).await.unwrap();
    assert_eq!(manager.status(accounts[1]), SessionStatus::Offline);

    // Survivors keep answering probes
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(manager.status(accounts[0]), SessionStatus::InGame);
    assert_eq!(manager.status(accounts[2]), SessionStatus::InGame);
    manager.set_auto_state(accounts[2], true).await.unwrap();
    let err = manager.set_auto_state(accounts[1], true).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotConnected(_)));

    manager.shutdown().await.unwrap();
    assert!(manager.sessions().is_empty());
}

#[tokio::test]
async fn test_duplicate_start_rejected() {
    init_tracing();
    let manager = start_manager(test_config(MOCK_CLIENT), store_with_accounts(1))
        .await
        .unwrap();
    let account = AccountId::new(1);

    manager.start_account(account).await.unwrap();
    let err = manager.start_account(account).await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyRunning(_)));
    assert_eq!(manager.snapshot().processes, 1);

    manager.shutdown().await.unwrap();
}

// ============================================================================
// Stop and exit
// ============================================================================

#[tokio::test]
async fn test_unresponsive_client_is_killed() {
    init_tracing();
    let config = test_config(MOCK_CLIENT)
        .with_executable_args(["--ignore-shutdown"])
        .with_stop_grace(Duration::from_millis(500));
    let manager = start_manager(config, store_with_accounts(1)).await.unwrap();
    let account = AccountId::new(1);

    manager.start_account(account).await.unwrap();
    assert!(wait_for_status(&manager, account, SessionStatus::InGame, SETTLE).await);

    let started = Instant::now();
    manager.stop_account(account).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(manager.status(account), SessionStatus::Offline);
    assert_eq!(manager.snapshot().processes, 0);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_crash_forces_offline() {
    init_tracing();
    let config = test_config(MOCK_CLIENT).with_executable_args(["--exit-after-ms", "1500"]);
    let manager = start_manager(config, store_with_accounts(1)).await.unwrap();
    let account = AccountId::new(1);

    manager.start_account(account).await.unwrap();
    assert!(wait_for_status(&manager, account, SessionStatus::InGame, SETTLE).await);
    assert!(wait_for_status(&manager, account, SessionStatus::Offline, SETTLE).await);
    assert!(manager.session(account).is_none());
    assert_eq!(manager.snapshot().processes, 0);

    // A crashed account can be started again
    manager.start_account(account).await.unwrap();
    assert!(wait_for_status(&manager, account, SessionStatus::InGame, SETTLE).await);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_shutdown_notice() {
    init_tracing();
    let config = test_config(MOCK_CLIENT)
        .with_executable_args(["--exit-after-ms", "1500", "--notify-exit"]);
    let manager = start_manager(config, store_with_accounts(1)).await.unwrap();
    let account = AccountId::new(1);

    manager.start_account(account).await.unwrap();
    assert!(wait_for_status(&manager, account, SessionStatus::InGame, SETTLE).await);
    assert!(wait_for_status(&manager, account, SessionStatus::Offline, SETTLE).await);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_every_account() {
    init_tracing();
    let manager = start_manager(test_config(MOCK_CLIENT), store_with_accounts(2))
        .await
        .unwrap();
    for id in 1..=2 {
        manager.start_account(AccountId::new(id)).await.unwrap();
    }
    for id in 1..=2 {
        assert!(
            wait_for_status(&manager, AccountId::new(id), SessionStatus::InGame, SETTLE).await
        );
    }

    manager.shutdown().await.unwrap();
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.sessions, 0);
    assert_eq!(snapshot.connections, 0);
    assert_eq!(snapshot.processes, 0);
}
