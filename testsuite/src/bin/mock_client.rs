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

//! Scripted managed client
//!
//! Launched by the manager as `mock-client [flags] <account id>`.

use async_trait::async_trait;
use clap::Parser;
use marionette_client::{ClientConfig, ClientHandle, ClientHandler, ManagedClient, RunOutcome};
use marionette_protocol::{AccountId, LoginRequest};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted game client for marionette tests", long_about = None)]
struct Args {
    /// Answer LOGIN with LOGIN_FAILED
    #[arg(long)]
    reject_login: bool,

    /// Never acknowledge SHUTDOWN
    #[arg(long)]
    ignore_shutdown: bool,

    /// Exit without notice after this many milliseconds
    #[arg(long)]
    exit_after_ms: Option<u64>,

    /// Send CLIENT_SHUTDOWN before exiting on a timer
    #[arg(long)]
    notify_exit: bool,

    /// Character name reported on login (defaults to Hero<account>)
    #[arg(long)]
    character: Option<String>,

    /// Account id assigned by the manager
    account: u64,
}

struct MockGame {
    args: Args,
}

#[async_trait]
impl ClientHandler for MockGame {
    async fn on_login(&self, _client: &ClientHandle, request: LoginRequest) -> Option<String> {
        info!(username = %request.username, server = request.server_index, "Login requested");
        if self.args.reject_login {
            return None;
        }
        Some(
            self.args
                .character
                .clone()
                .unwrap_or_else(|| marionette_testsuite::character_name(AccountId::new(self.args.account))),
        )
    }

    async fn on_shutdown(&self, _client: &ClientHandle) -> bool {
        !self.args.ignore_shutdown
    }

    async fn on_auto_state(&self, _client: &ClientHandle, enabled: bool) {
        info!(enabled, "Automation toggled");
    }

    async fn on_auto_event(&self, _client: &ClientHandle, enabled: bool, mode: &str) {
        info!(enabled, mode, "Event automation toggled");
    }

    async fn on_auto_equip(&self, _client: &ClientHandle, enabled: bool, mode: &str) {
        info!(enabled, mode, "Equip automation toggled");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    marionette_testsuite::init_tracing();
    let args = Args::parse();
    let account = AccountId::new(args.account);

    let config = match ClientConfig::from_env(account) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Invalid configuration");
            return ExitCode::from(2);
        }
    };
    let client = match ManagedClient::connect(config).await {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "Unable to register");
            return ExitCode::from(3);
        }
    };

    let exit_after = args.exit_after_ms.map(Duration::from_millis);
    let notify_exit = args.notify_exit;
    let handle = client.handle();
    let run = client.run(Arc::new(MockGame { args }));

    let result = match exit_after {
        Some(delay) => {
            tokio::select! {
                result = run => result,
                _ = tokio::time::sleep(delay) => {
                    if notify_exit {
                        let _ = handle.notify_shutdown().await;
                    }
                    info!("Exiting on timer");
                    return ExitCode::from(1);
                }
            }
        }
        None => run.await,
    };

    match result {
        Ok(RunOutcome::ShutdownRequested) => {
            info!("Shut down by manager");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::ManagerClosed) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Client failed");
            ExitCode::FAILURE
        }
    }
}
