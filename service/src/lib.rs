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

//! Marionette Account Manager
//!
//! Launches one game-client process per account, accepts the control
//! connection each client opens back to the manager, logs the client in and
//! keeps watching it until it is stopped or exits.
//!
//! # Architecture
//!
//! ```text
//! AccountManager
//!     ├── ControlListener → ConnectionWorker → AccountConnection
//!     ├── ConnectionRegistry ← CommandDispatcher
//!     ├── ProcessSupervisor
//!     └── LoginOrchestrator → AccountSession
//!             └── LivenessMonitor
//! ```
//!
//! - The listener performs the `REGISTER` handshake and hands each transport
//!   to a worker, the only reader of its socket.
//! - The registry maps accounts to their current transport. A new
//!   registration supersedes and closes the previous one.
//! - The dispatcher sends commands and correlates replies, removing a
//!   transport the moment it fails.
//! - The orchestrator owns the per-account status machine and reacts to
//!   registrations, process exits and probe results.
//!
//! # Example
//!
//! ```no_run
//! use marionette_service::{AccountManager, AccountRecord, ManagerConfig, MemoryAccountStore};
//! use marionette_protocol::AccountId;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryAccountStore::with_records([AccountRecord::new(
//!         AccountId::new(7),
//!         "alice",
//!         "secret",
//!     )]));
//!     let manager = AccountManager::new(ManagerConfig::new("/opt/game/client"), store).await?;
//!     manager.start()?;
//!     manager.start_account(AccountId::new(7)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod dispatcher;
mod error;
mod handler;
mod listener;
mod manager;
mod monitor;
mod orchestrator;
mod registry;
mod session;
mod store;
mod supervisor;
mod types;
mod worker;

pub use config::ManagerConfig;
pub use connection::{AccountConnection, BoxedWriter};
pub use dispatcher::CommandDispatcher;
pub use error::{Result, ServiceError};
pub use handler::ConnectionHandler;
pub use listener::ControlListener;
pub use manager::AccountManager;
pub use monitor::{LivenessMonitor, ProbeOutcome};
pub use orchestrator::LoginOrchestrator;
pub use registry::ConnectionRegistry;
pub use session::{AccountSession, SessionEvent, SessionStatus, StatusUpdate, next_status};
pub use store::{AccountRecord, AccountStore, MemoryAccountStore};
pub use supervisor::{ProcessHandle, ProcessState, ProcessSupervisor, StopOutcome};
pub use types::{
    ConnectionInfo, ConnectionSerial, DisconnectReason, ManagerSnapshot, SessionSnapshot,
};
pub use worker::ConnectionWorker;
