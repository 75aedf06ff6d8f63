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

//! Account persistence boundary

use crate::{Result, ServiceError, SessionStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use marionette_protocol::{AccountId, LoginRequest};
use std::fmt;

/// Account settings as held by the persistence service
#[derive(Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Account id
    pub id: AccountId,
    /// Login name
    pub username: String,
    /// Login password
    pub password: String,
    /// Game server to select
    pub server_index: u32,
    /// Character slot to select
    pub character_index: u32,
    /// Whether the account is pinned in the presentation layer
    pub is_favorite: bool,
}

impl AccountRecord {
    /// Create a record for the first server and character slot
    pub fn new(id: AccountId, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            password: password.into(),
            server_index: 0,
            character_index: 0,
            is_favorite: false,
        }
    }

    /// Set the server index
    pub fn with_server_index(mut self, index: u32) -> Self {
        self.server_index = index;
        self
    }

    /// Set the character index
    pub fn with_character_index(mut self, index: u32) -> Self {
        self.character_index = index;
        self
    }

    /// Set the favorite flag
    pub fn with_favorite(mut self, favorite: bool) -> Self {
        self.is_favorite = favorite;
        self
    }

    /// Build the `LOGIN` request for this account
    pub fn login_request(&self) -> LoginRequest {
        LoginRequest::new(
            self.username.as_str(),
            self.password.as_str(),
            self.server_index,
            self.character_index,
        )
    }
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"***")
            .field("server_index", &self.server_index)
            .field("character_index", &self.character_index)
            .field("is_favorite", &self.is_favorite)
            .finish()
    }
}

/// Persistence service consumed by the manager
///
/// # Example
///
/// ```no_run
/// use marionette_service::{AccountRecord, AccountStore, Result, ServiceError, SessionStatus};
/// use marionette_protocol::AccountId;
/// use async_trait::async_trait;
///
/// struct RemoteStore;
///
/// #[async_trait]
/// impl AccountStore for RemoteStore {
///     async fn load(&self, account: AccountId) -> Result<AccountRecord> {
///         Err(ServiceError::AccountNotFound(account))
///     }
///
///     async fn record_status(
///         &self,
///         _account: AccountId,
///         _status: SessionStatus,
///         _character_name: Option<&str>,
///     ) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Load the settings of an account
    ///
    /// Fails with [`ServiceError::AccountNotFound`] for unknown accounts.
    async fn load(&self, account: AccountId) -> Result<AccountRecord>;

    /// Record the latest status of an account
    async fn record_status(
        &self,
        account: AccountId,
        status: SessionStatus,
        character_name: Option<&str>,
    ) -> Result<()>;
}

/// In-memory [`AccountStore`]
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: DashMap<AccountId, AccountRecord>,
    statuses: DashMap<AccountId, (SessionStatus, Option<String>)>,
}

impl MemoryAccountStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given records
    pub fn with_records(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Add or replace a record
    pub fn insert(&self, record: AccountRecord) -> Option<AccountRecord> {
        self.records.insert(record.id, record)
    }

    /// Remove a record
    pub fn remove(&self, account: AccountId) -> Option<AccountRecord> {
        self.records.remove(&account).map(|(_, record)| record)
    }

    /// Last recorded status and character name of an account
    pub fn last_status(&self, account: AccountId) -> Option<(SessionStatus, Option<String>)> {
        self.statuses.get(&account).map(|entry| entry.value().clone())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn load(&self, account: AccountId) -> Result<AccountRecord> {
        self.records
            .get(&account)
            .map(|entry| entry.value().clone())
            .ok_or(ServiceError::AccountNotFound(account))
    }

    async fn record_status(
        &self,
        account: AccountId,
        status: SessionStatus,
        character_name: Option<&str>,
    ) -> Result<()> {
        self.statuses
            .insert(account, (status, character_name.map(str::to_string)));
        Ok(())
    }
}
