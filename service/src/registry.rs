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

//! Connection registry
//!
//! Maps each account to its single live transport. One mutex guards the map
//! and is never held across an `.await`.

use crate::{AccountConnection, ConnectionSerial};
use marionette_protocol::AccountId;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Account to transport map
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<AccountId, AccountConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<AccountId, AccountConnection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a transport for its account
    ///
    /// Returns the transport it replaced, if any. The caller is responsible
    /// for closing it.
    pub fn register(&self, connection: AccountConnection) -> Option<AccountConnection> {
        let account = connection.account();
        let serial = connection.serial();
        let superseded = self.map().insert(account, connection);

        match &superseded {
            Some(old) => {
                counter!("marionette.connections.superseded").increment(1);
                warn!(
                    account = %account,
                    old_serial = %old.serial(),
                    new_serial = %serial,
                    "Registration supersedes existing transport"
                );
            }
            None => {
                gauge!("marionette.connections.registered").increment(1.0);
                info!(account = %account, serial = %serial, "Account registered");
            }
        }
        superseded
    }

    /// Remove the transport for an account
    ///
    /// Unregistering an account that is not registered is a no-op.
    pub fn unregister(&self, account: AccountId) -> Option<AccountConnection> {
        let removed = self.map().remove(&account);
        if removed.is_some() {
            gauge!("marionette.connections.registered").decrement(1.0);
            debug!(account = %account, "Account unregistered");
        }
        removed
    }

    /// Remove the transport for an account only if it is still `serial`
    ///
    /// Returns `true` if the transport was removed.
    pub fn unregister_if(&self, account: AccountId, serial: ConnectionSerial) -> bool {
        let mut map = self.map();
        let current = map
            .get(&account)
            .is_some_and(|connection| connection.serial() == serial);
        if current {
            map.remove(&account);
            drop(map);
            gauge!("marionette.connections.registered").decrement(1.0);
            debug!(account = %account, serial = %serial, "Account unregistered");
        }
        current
    }

    /// Get the transport for an account
    pub fn get(&self, account: AccountId) -> Option<AccountConnection> {
        self.map().get(&account).cloned()
    }

    /// Check if an account has a registered transport
    pub fn is_connected(&self, account: AccountId) -> bool {
        self.map().contains_key(&account)
    }

    /// Check if `serial` is the current transport of `account`
    pub fn is_current(&self, account: AccountId, serial: ConnectionSerial) -> bool {
        self.map()
            .get(&account)
            .is_some_and(|connection| connection.serial() == serial)
    }

    /// Accounts with a registered transport
    pub fn accounts(&self) -> Vec<AccountId> {
        self.map().keys().copied().collect()
    }

    /// Number of registered transports
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Check if no transport is registered
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Remove and close every transport
    pub fn close_all(&self) {
        let drained: Vec<AccountConnection> = self.map().drain().map(|(_, c)| c).collect();
        for connection in drained {
            gauge!("marionette.connections.registered").decrement(1.0);
            connection.close();
        }
    }
}
