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

//! Account Manager Example
//!
//! Starts a manager with an in-memory account store, launches the given
//! accounts and prints their status changes until Ctrl+C.
//!
//! ## Usage
//!
//! ```bash
//! cargo build -p marionette-testsuite --bin mock-client
//! cargo run --example run_manager -- target/debug/mock-client 1 2 3
//! ```

use marionette_protocol::AccountId;
use marionette_service::{AccountManager, AccountRecord, ManagerConfig, MemoryAccountStore};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let executable = args
        .next()
        .ok_or("usage: run_manager <client executable> [account id...]")?;
    let accounts = args
        .map(|id| id.parse().map(AccountId::new))
        .collect::<Result<Vec<_>, _>>()?;

    // One record per account, all on the first server
    let store = Arc::new(MemoryAccountStore::with_records(accounts.iter().map(
        |account| {
            AccountRecord::new(
                *account,
                format!("user{}", account.as_u64()),
                format!("pass{}", account.as_u64()),
            )
        },
    )));

    let manager = AccountManager::new(ManagerConfig::new(executable), store).await?;
    manager.start()?;
    println!("Account manager listening on {}", manager.local_addr());
    println!("Press Ctrl+C to stop");

    let mut updates = manager.subscribe();
    for account in &accounts {
        if let Err(err) = manager.start_account(*account).await {
            eprintln!("{account}: {err}");
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(update) => match &update.character_name {
                    Some(name) => println!("{}: {} -> {} ({name})", update.account, update.previous, update.current),
                    None => println!("{}: {} -> {}", update.account, update.previous, update.current),
                },
                Err(RecvError::Lagged(missed)) => eprintln!("missed {missed} status updates"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!("{}", manager.snapshot());
    manager.shutdown().await?;
    Ok(())
}
