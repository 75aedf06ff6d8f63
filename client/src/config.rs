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

//! Client configuration

use crate::{ClientError, Result};
use marionette_protocol::AccountId;
use marionette_protocol::consts::{
    DEFAULT_MAX_FRAME_LENGTH, DEFAULT_PORT, FALLBACK_PORTS, MANAGER_ADDR_ENV,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Managed client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account this client runs for
    pub account: AccountId,

    /// Manager host address
    pub host: IpAddr,

    /// Manager port
    pub port: u16,

    /// Ports tried, in order, when `port` refuses the connection
    pub fallback_ports: Vec<u16>,

    /// Timeout for each connection attempt
    pub connect_timeout: Duration,

    /// Timeout for the `REGISTERED_OK` answer
    pub register_timeout: Duration,

    /// Maximum accepted frame length
    pub max_frame_length: usize,
}

impl ClientConfig {
    /// Create a configuration for the default manager address
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            fallback_ports: FALLBACK_PORTS.to_vec(),
            connect_timeout: Duration::from_secs(5),
            register_timeout: Duration::from_secs(5),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    /// Create a configuration from the environment
    ///
    /// The manager exports its bound address in `MARIONETTE_MANAGER_ADDR`
    /// to every process it launches. When the variable is present its
    /// address is tried alone; otherwise the default port and fallbacks are.
    pub fn from_env(account: AccountId) -> Result<Self> {
        let config = Self::new(account);
        match std::env::var(MANAGER_ADDR_ENV) {
            Ok(value) => {
                let addr: SocketAddr = value.trim().parse().map_err(|_| {
                    ClientError::InvalidConfig(format!("{MANAGER_ADDR_ENV} is not an address: {value:?}"))
                })?;
                Ok(config.with_manager_addr(addr))
            }
            Err(_) => Ok(config),
        }
    }

    /// Use exactly this manager address
    pub fn with_manager_addr(mut self, addr: SocketAddr) -> Self {
        self.host = addr.ip();
        self.port = addr.port();
        self.fallback_ports.clear();
        self
    }

    /// Set the manager host
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Set the manager port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the fallback ports
    pub fn with_fallback_ports(mut self, ports: impl Into<Vec<u16>>) -> Self {
        self.fallback_ports = ports.into();
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the registration timeout
    pub fn with_register_timeout(mut self, timeout: Duration) -> Self {
        self.register_timeout = timeout;
        self
    }

    /// Set the maximum frame length
    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }

    /// Addresses to try, in order
    pub fn candidates(&self) -> Vec<SocketAddr> {
        let mut addrs = vec![SocketAddr::new(self.host, self.port)];
        for port in &self.fallback_ports {
            let addr = SocketAddr::new(self.host, *port);
            if !addrs.contains(&addr) {
                addrs.push(addr);
            }
        }
        addrs
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ClientError::InvalidConfig("port must be set".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }
        if self.register_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "register_timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_frame_length == 0 {
            return Err(ClientError::InvalidConfig(
                "max_frame_length must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_candidates() {
        let config = ClientConfig::new(AccountId::new(1));
        let ports: Vec<u16> = config.candidates().iter().map(SocketAddr::port).collect();
        assert_eq!(ports, vec![8888, 8889, 8890, 8891, 8892]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_manager_addr_drops_fallbacks() {
        let config =
            ClientConfig::new(AccountId::new(1)).with_manager_addr("127.0.0.1:9100".parse().unwrap());
        assert_eq!(config.candidates(), vec!["127.0.0.1:9100".parse().unwrap()]);
    }

    #[test]
    fn test_duplicate_fallbacks_removed() {
        let config = ClientConfig::new(AccountId::new(1))
            .with_port(9000)
            .with_fallback_ports([9000, 9001, 9001]);
        assert_eq!(config.candidates().len(), 2);
    }

    #[test]
    fn test_validate() {
        let config = ClientConfig::new(AccountId::new(1)).with_port(0);
        assert!(config.validate().is_err());

        let config = ClientConfig::new(AccountId::new(1)).with_connect_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
