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

//! Manager configuration
//!
//! # Example
//!
//! ```
//! use marionette_service::ManagerConfig;
//! use std::time::Duration;
//!
//! let config = ManagerConfig::new("/opt/game/client.exe")
//!     .with_port(9000)
//!     .with_settle_delay(Duration::from_secs(8))
//!     .with_stop_grace(Duration::from_secs(3));
//! assert!(config.validate().is_ok());
//! ```

use marionette_protocol::consts::{DEFAULT_MAX_FRAME_LENGTH, DEFAULT_PORT, FALLBACK_PORTS};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Manager configuration
///
/// Passed once at construction; every session reads its settings from here
/// rather than from process-wide state.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Address the control listener binds to
    pub host: IpAddr,

    /// Preferred control port (0 picks an ephemeral port)
    pub port: u16,

    /// Ports tried in order when `port` is already bound
    pub fallback_ports: Vec<u16>,

    /// Maximum frame length in bytes
    pub max_frame_length: usize,

    /// Time a new connection has to send `REGISTER`
    pub registration_timeout: Duration,

    /// Default reply timeout for correlated commands
    pub command_timeout: Duration,

    /// Reply timeout for `LOGIN`
    pub login_timeout: Duration,

    /// Reply timeout for `PING`
    pub ping_timeout: Duration,

    /// Interval between liveness probes
    pub ping_interval: Duration,

    /// Interval between process exit checks
    pub process_poll_interval: Duration,

    /// Wait between registration and `LOGIN`, giving the client time to boot
    pub settle_delay: Duration,

    /// Time a process has to exit after `SHUTDOWN` before it is killed
    pub stop_grace: Duration,

    /// Timeout for a single frame write
    pub write_timeout: Duration,

    /// Client executable launched per account
    pub executable: PathBuf,

    /// Arguments placed before the account id on the command line
    pub executable_args: Vec<String>,

    /// Capacity of the status update broadcast channel
    pub status_channel_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            fallback_ports: FALLBACK_PORTS.to_vec(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            registration_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            login_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(2),
            ping_interval: Duration::from_secs(5),
            process_poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(5),
            stop_grace: Duration::from_secs(2),
            write_timeout: Duration::from_secs(5),
            executable: PathBuf::new(),
            executable_args: Vec::new(),
            status_channel_capacity: 256,
        }
    }
}

impl ManagerConfig {
    /// Create a new configuration for the given client executable
    ///
    /// All other settings will use their default values.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    /// Set the listener host address
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Set the preferred control port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the fallback ports
    pub fn with_fallback_ports(mut self, ports: impl Into<Vec<u16>>) -> Self {
        self.fallback_ports = ports.into();
        self
    }

    /// Set the maximum frame length
    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }

    /// Set the registration timeout
    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    /// Set the default command reply timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the login reply timeout
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Set the ping reply timeout
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Set the liveness probe interval
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the process exit poll interval
    pub fn with_process_poll_interval(mut self, interval: Duration) -> Self {
        self.process_poll_interval = interval;
        self
    }

    /// Set the settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the stop grace period
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Set the write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the client executable
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Set the arguments placed before the account id
    pub fn with_executable_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.executable_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the status channel capacity
    pub fn with_status_channel_capacity(mut self, capacity: usize) -> Self {
        self.status_channel_capacity = capacity;
        self
    }

    /// Socket addresses to try when binding, preferred port first
    pub fn bind_candidates(&self) -> Vec<SocketAddr> {
        if self.port == 0 {
            return vec![SocketAddr::new(self.host, 0)];
        }
        std::iter::once(self.port)
            .chain(self.fallback_ports.iter().copied().filter(|p| *p != self.port))
            .map(|port| SocketAddr::new(self.host, port))
            .collect()
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.executable.as_os_str().is_empty() {
            return Err("executable must be set".to_string());
        }

        if self.max_frame_length == 0 {
            return Err("max_frame_length must be greater than 0".to_string());
        }

        if self.status_channel_capacity == 0 {
            return Err("status_channel_capacity must be greater than 0".to_string());
        }

        let durations = [
            ("registration_timeout", self.registration_timeout),
            ("command_timeout", self.command_timeout),
            ("login_timeout", self.login_timeout),
            ("ping_timeout", self.ping_timeout),
            ("ping_interval", self.ping_interval),
            ("process_poll_interval", self.process_poll_interval),
            ("stop_grace", self.stop_grace),
            ("write_timeout", self.write_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(format!("{} must be greater than 0", name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.port, 8888);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.max_frame_length, 1024);
        assert_eq!(config.stop_grace, Duration::from_secs(2));
        // No executable yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ManagerConfig::new("/bin/sh")
            .with_port(9000)
            .with_executable_args(["-c", "sleep 5"])
            .with_ping_interval(Duration::from_millis(250));

        assert_eq!(config.port, 9000);
        assert_eq!(config.executable_args, vec!["-c", "sleep 5"]);
        assert_eq!(config.ping_interval, Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = ManagerConfig::new("/bin/sh");
        assert!(config.validate().is_ok());

        config.ping_timeout = Duration::ZERO;
        assert_eq!(
            config.validate().unwrap_err(),
            "ping_timeout must be greater than 0"
        );

        config.ping_timeout = Duration::from_secs(1);
        config.max_frame_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_candidates() {
        let config = ManagerConfig::new("/bin/sh").with_fallback_ports([8889, 8888, 8890]);
        let ports: Vec<u16> = config.bind_candidates().iter().map(|a| a.port()).collect();
        assert_eq!(ports, vec![8888, 8889, 8890]);

        let ephemeral = ManagerConfig::new("/bin/sh").with_port(0);
        assert_eq!(ephemeral.bind_candidates().len(), 1);
    }
}
