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

//! Error types for the marionette service

use marionette_protocol::{AccountId, ProtocolError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O error from a socket or process
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error from the codec layer
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The client executable does not exist
    #[error("Executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    /// A live process already exists for the account
    #[error("Process for {0} is already running")]
    AlreadyRunning(AccountId),

    /// The account store has no record for the account
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    /// No transport is registered for the account
    #[error("{0} is not connected")]
    NotConnected(AccountId),

    /// The transport for the account failed and was removed
    #[error("{0} disconnected")]
    Disconnected(AccountId),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// The peer answered with something other than the expected reply
    #[error("Unexpected reply from {account}: {reply}")]
    UnexpectedReply {
        /// Account that answered
        account: AccountId,
        /// The reply, with credentials masked
        reply: String,
    },

    /// None of the candidate ports could be bound
    #[error("Unable to bind any of ports {ports:?} on {host}")]
    BindFailed {
        /// Host address
        host: String,
        /// Ports that were tried
        ports: Vec<u16>,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The manager is not running
    #[error("Manager not running")]
    NotRunning,

    /// Generic error with a message
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors leave the session usable; retrying later may
    /// succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout | ServiceError::NotConnected(_) | ServiceError::UnexpectedReply { .. }
        )
    }

    /// Check if the error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ServiceError::NotConnected(_) | ServiceError::Disconnected(_) | ServiceError::Io(_)
        )
    }

    /// Check if the error prevented a process from launching
    pub fn is_launch_error(&self) -> bool {
        matches!(
            self,
            ServiceError::ExecutableNotFound(_)
                | ServiceError::AlreadyRunning(_)
                | ServiceError::AccountNotFound(_)
        )
    }
}
