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

//! Command dispatch to registered accounts

use crate::{AccountConnection, ConnectionRegistry, Result, ServiceError};
use marionette_protocol::{AccountId, Command};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Sends commands to the transport registered for an account
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl CommandDispatcher {
    /// Create a dispatcher over a registry
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Get the underlying registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn connection(&self, account: AccountId) -> Result<AccountConnection> {
        self.registry
            .get(account)
            .ok_or(ServiceError::NotConnected(account))
    }

    /// Write a command without waiting for a reply
    ///
    /// A transport failure removes the transport. Applying the status change
    /// is up to the caller.
    pub async fn send(&self, account: AccountId, command: &Command) -> Result<()> {
        let connection = self.connection(account)?;
        connection
            .send(command)
            .await
            .map_err(|err| self.on_failure(&connection, err))
    }

    /// Write a command and wait up to `timeout` for the correlated reply
    ///
    /// On timeout the transport stays registered. On a transport failure it
    /// is closed and removed, and [`ServiceError::Disconnected`] is returned.
    pub async fn send_and_await(
        &self,
        account: AccountId,
        command: &Command,
        timeout: Duration,
    ) -> Result<Command> {
        let connection = self.connection(account)?;
        let reply = connection
            .request(command, timeout)
            .await
            .map_err(|err| self.on_failure(&connection, err))?;
        debug!(account = %account, command = command.name(), reply = reply.name(), "Received reply");
        Ok(reply)
    }

    fn on_failure(&self, connection: &AccountConnection, err: ServiceError) -> ServiceError {
        match err {
            ServiceError::Io(io) => {
                warn!(account = %connection.account(), error = %io, "Transport failed, removing");
                self.drop_transport(connection);
                ServiceError::Disconnected(connection.account())
            }
            ServiceError::Disconnected(account) => {
                self.drop_transport(connection);
                ServiceError::Disconnected(account)
            }
            other => other,
        }
    }

    fn drop_transport(&self, connection: &AccountConnection) {
        self.registry
            .unregister_if(connection.account(), connection.serial());
        connection.close();
    }
}
