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

//! Core types for the marionette service

use crate::SessionStatus;
use marionette_protocol::AccountId;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Identifier of an accepted transport (monotonically increasing, never reused)
///
/// Distinguishes a superseded connection from its replacement when both
/// belong to the same account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionSerial(u64);

impl ConnectionSerial {
    /// Create a new connection serial
    pub fn new(serial: u64) -> Self {
        Self(serial)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a connection read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the socket
    PeerClosed,
    /// The peer sent `CLIENT_SHUTDOWN`
    ClientShutdown,
    /// A read or write failed
    TransportError,
    /// The connection was closed locally (superseded, stopped or shut down)
    Closed,
}

impl DisconnectReason {
    /// Check if the peer ended the connection on purpose
    pub fn is_graceful(self) -> bool {
        matches!(self, Self::ClientShutdown | Self::Closed)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::ClientShutdown => write!(f, "client shutdown"),
            Self::TransportError => write!(f, "transport error"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Connection information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Account bound to the connection
    pub account: AccountId,
    /// Connection serial
    pub serial: ConnectionSerial,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// When the connection was accepted
    pub created_at: Instant,
    /// Total frames sent
    pub frames_sent: u64,
    /// Total frames received
    pub frames_received: u64,
}

impl ConnectionInfo {
    /// Get the connection duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Point-in-time view of one managed account
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Account
    pub account: AccountId,
    /// Current status
    pub status: SessionStatus,
    /// Character name, once logged in
    pub character_name: Option<String>,
    /// Whether a process is running for the account
    pub process_running: bool,
    /// Whether a transport is registered for the account
    pub connected: bool,
    /// Whether the account is marked favorite in the store
    pub is_favorite: bool,
    /// When the session was started
    pub started_at: Instant,
}

/// Manager snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ManagerSnapshot {
    /// Control listener address
    pub bind_address: SocketAddr,
    /// Number of managed sessions
    pub sessions: usize,
    /// Number of registered transports
    pub connections: usize,
    /// Number of running processes
    pub processes: usize,
    /// Manager uptime
    pub uptime: Duration,
}

impl fmt::Display for ManagerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AccountManager {{ addr: {}, sessions: {}, connections: {}, processes: {}, uptime: {:?} }}",
            self.bind_address, self.sessions, self.connections, self.processes, self.uptime
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_serial() {
        let first = ConnectionSerial::new(1);
        let second = ConnectionSerial::new(2);

        assert_eq!(first.as_u64(), 1);
        assert_ne!(first, second);
        assert!(first < second);
        assert_eq!(second.to_string(), "conn-2");
    }

    #[test]
    fn test_disconnect_reason() {
        assert!(DisconnectReason::ClientShutdown.is_graceful());
        assert!(!DisconnectReason::TransportError.is_graceful());
        assert_eq!(DisconnectReason::PeerClosed.to_string(), "peer closed");
    }

    #[test]
    fn test_manager_snapshot_display() {
        let snapshot = ManagerSnapshot {
            bind_address: "127.0.0.1:8888".parse().unwrap(),
            sessions: 3,
            connections: 2,
            processes: 3,
            uptime: Duration::from_secs(1),
        };
        let text = snapshot.to_string();
        assert!(text.contains("127.0.0.1:8888"));
        assert!(text.contains("sessions: 3"));
    }
}
