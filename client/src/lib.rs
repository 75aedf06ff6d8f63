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

//! # Marionette Managed Client
//!
//! The client half of the marionette control protocol, for processes
//! launched by the manager.
//!
//! ## Features
//!
//! - **Registration** - Connects to the manager address exported in the
//!   environment (or the default port and its fallbacks) and registers
//! - **Liveness** - Answers `PING` without involving the handler
//! - **Event-Driven** - Handler-based API for login, shutdown and
//!   automation toggles
//!
//! ## Quick Start
//!
//! ```no_run
//! use marionette_client::{ClientConfig, ClientHandle, ClientHandler, ManagedClient};
//! use marionette_protocol::{AccountId, LoginRequest};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Game;
//!
//! #[async_trait]
//! impl ClientHandler for Game {
//!     async fn on_login(&self, _client: &ClientHandle, request: LoginRequest) -> Option<String> {
//!         Some(format!("{}-main", request.username))
//!     }
//!
//!     async fn on_auto_state(&self, _client: &ClientHandle, enabled: bool) {
//!         println!("automation {}", if enabled { "on" } else { "off" });
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let account: u64 = std::env::args().nth(1).unwrap_or_default().parse()?;
//!     let config = ClientConfig::from_env(AccountId::new(account))?;
//!     let client = ManagedClient::connect(config).await?;
//!     client.run(Arc::new(Game)).await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod handler;

pub use client::{ClientHandle, ManagedClient, RunOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use handler::{CallbackHandler, ClientHandler};
