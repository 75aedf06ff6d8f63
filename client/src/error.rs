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

//! Client error types

use marionette_protocol::ProtocolError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error from the codec
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection timeout
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// Connection closed by the manager
    #[error("Connection closed by manager")]
    ConnectionClosed,

    /// No candidate address accepted the connection
    #[error("Unable to reach the manager at any of {0:?}")]
    Unreachable(Vec<SocketAddr>),

    /// The manager answered the registration with something other than `REGISTERED_OK`
    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Check if the error means the manager went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            Self::Protocol(err) => err.is_io(),
            _ => false,
        }
    }
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;
