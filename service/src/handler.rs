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

//! Handler trait for registered connections

use crate::{AccountConnection, DisconnectReason};
use async_trait::async_trait;
use marionette_protocol::Command;

/// Connection event handler trait
///
/// Implement this trait to react to registered connections. All methods are
/// async and have default implementations that do nothing. Handlers run on
/// the connection's task, so a slow handler delays only that connection.
///
/// # Example
///
/// ```no_run
/// use marionette_service::{AccountConnection, ConnectionHandler};
/// use marionette_protocol::Command;
/// use async_trait::async_trait;
///
/// struct MyHandler;
///
/// #[async_trait]
/// impl ConnectionHandler for MyHandler {
///     async fn on_unsolicited(&self, conn: &AccountConnection, command: Command) {
///         println!("{} sent {}", conn.account(), command);
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called after a connection registered and `REGISTERED_OK` was sent
    ///
    /// Runs before the read loop starts; long work belongs in a spawned task.
    async fn on_register(&self, _conn: &AccountConnection) {}

    /// Called for a frame that is neither a reply to a pending request nor
    /// answered by the read loop itself
    async fn on_unsolicited(&self, _conn: &AccountConnection, _command: Command) {}

    /// Called when the read loop of the current transport ends
    ///
    /// Not called for a transport that was superseded by a newer
    /// registration.
    async fn on_disconnect(&self, _conn: &AccountConnection, _reason: DisconnectReason) {}
}
