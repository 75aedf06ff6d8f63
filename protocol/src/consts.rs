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

//! Wire constants

/// Separator between the command name and each argument
pub const SEPARATOR: char = '|';

/// [`SEPARATOR`] as a string slice, for joining
pub const SEPARATOR_STR: &str = "|";

/// Frame terminator appended by the encoder
pub const TERMINATOR: u8 = b'\n';

/// Default maximum frame length in bytes (one read buffer)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024;

/// Default control-plane port
pub const DEFAULT_PORT: u16 = 8888;

/// Ports tried, in order, when [`DEFAULT_PORT`] is already bound
pub const FALLBACK_PORTS: [u16; 4] = [8889, 8890, 8891, 8892];

/// Environment variable carrying the manager address to spawned clients
pub const MANAGER_ADDR_ENV: &str = "MARIONETTE_MANAGER_ADDR";

pub const REGISTER: &str = "REGISTER";
pub const REGISTERED_OK: &str = "REGISTERED_OK";
pub const PING: &str = "PING";
pub const PONG: &str = "PONG";
pub const LOGIN: &str = "LOGIN";
pub const CHARACTER_NAME: &str = "CHARACTER_NAME";
pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
pub const SHUTDOWN: &str = "SHUTDOWN";
pub const SHUTDOWN_OK: &str = "SHUTDOWN_OK";
pub const CLIENT_SHUTDOWN: &str = "CLIENT_SHUTDOWN";
pub const AUTO_STATE: &str = "AUTO_STATE";
pub const AUTO_EVENT: &str = "AUTO_EVENT";
pub const AUTO_EQUIP: &str = "AUTO_EQUIP";
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
pub const ERROR: &str = "ERROR";
