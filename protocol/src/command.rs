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

use crate::consts::{self, SEPARATOR, SEPARATOR_STR};
use crate::{AccountId, Frame, ProtocolError, ProtocolResult};
use enum_kinds::EnumKind;
use std::fmt;
use std::str::FromStr;

/// Credentials and character selection sent with `LOGIN`.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginRequest {
    /// Account user name
    pub username: String,
    /// Account password
    pub password: String,
    /// Index of the game server to join
    pub server_index: u32,
    /// Index of the character to select
    pub character_index: u32,
}

impl LoginRequest {
    /// Create a new login request
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        server_index: u32,
        character_index: u32,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            server_index,
            character_index,
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server_index", &self.server_index)
            .field("character_index", &self.character_index)
            .finish()
    }
}

/// Typed control-plane command.
///
/// Covers both directions of the protocol. Names that are not part of the
/// vocabulary decode to [`Command::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, EnumKind)]
#[enum_kind(CommandKind, derive(Hash))]
pub enum Command {
    /// `REGISTER|<accountId>`: bind this connection to an account (client → manager)
    Register(AccountId),
    /// `REGISTERED_OK`: registration accepted (manager → client)
    RegisteredOk,
    /// `PING`: liveness probe
    Ping,
    /// `PONG`: liveness reply
    Pong,
    /// `LOGIN|<user>|<password>|<server>|<character>` (manager → client)
    Login(LoginRequest),
    /// `CHARACTER_NAME|<name>`: login succeeded (client → manager)
    CharacterName(String),
    /// `LOGIN_FAILED` (client → manager)
    LoginFailed,
    /// `SHUTDOWN`: request a graceful exit (manager → client)
    Shutdown,
    /// `SHUTDOWN_OK`: shutdown acknowledged (client → manager)
    ShutdownOk,
    /// `CLIENT_SHUTDOWN`: client-initiated disconnect notice
    ClientShutdown,
    /// `AUTO_STATE|<bool>`: toggle automation
    AutoState(bool),
    /// `AUTO_EVENT|<bool>|<type>`: toggle an event-automation mode
    AutoEvent {
        /// Whether the mode is switched on
        enabled: bool,
        /// Mode name
        mode: String,
    },
    /// `AUTO_EQUIP|<bool>|<type>`: toggle an equip-automation mode
    AutoEquip {
        /// Whether the mode is switched on
        enabled: bool,
        /// Mode name
        mode: String,
    },
    /// `UNKNOWN_COMMAND`: the peer did not recognize the last frame
    UnknownCommand,
    /// `ERROR[|<detail>]`: the peer could not process the last frame
    Error(Option<String>),
    /// A frame whose name is not part of the vocabulary
    Unknown {
        /// Raw command name
        name: String,
        /// Raw arguments
        args: Vec<String>,
    },
}

impl CommandKind {
    /// Wire name, or `None` for [`CommandKind::Unknown`]
    pub fn wire_name(self) -> Option<&'static str> {
        Some(match self {
            CommandKind::Register => consts::REGISTER,
            CommandKind::RegisteredOk => consts::REGISTERED_OK,
            CommandKind::Ping => consts::PING,
            CommandKind::Pong => consts::PONG,
            CommandKind::Login => consts::LOGIN,
            CommandKind::CharacterName => consts::CHARACTER_NAME,
            CommandKind::LoginFailed => consts::LOGIN_FAILED,
            CommandKind::Shutdown => consts::SHUTDOWN,
            CommandKind::ShutdownOk => consts::SHUTDOWN_OK,
            CommandKind::ClientShutdown => consts::CLIENT_SHUTDOWN,
            CommandKind::AutoState => consts::AUTO_STATE,
            CommandKind::AutoEvent => consts::AUTO_EVENT,
            CommandKind::AutoEquip => consts::AUTO_EQUIP,
            CommandKind::UnknownCommand => consts::UNKNOWN_COMMAND,
            CommandKind::Error => consts::ERROR,
            CommandKind::Unknown => return None,
        })
    }

    /// Check if a client sends this kind in answer to a manager request
    pub fn is_reply(self) -> bool {
        matches!(
            self,
            CommandKind::Pong
                | CommandKind::CharacterName
                | CommandKind::LoginFailed
                | CommandKind::ShutdownOk
                | CommandKind::UnknownCommand
                | CommandKind::Error
        )
    }

    /// Check if the manager originates this kind
    pub fn is_manager_request(self) -> bool {
        matches!(
            self,
            CommandKind::RegisteredOk
                | CommandKind::Ping
                | CommandKind::Login
                | CommandKind::Shutdown
                | CommandKind::AutoState
                | CommandKind::AutoEvent
                | CommandKind::AutoEquip
        )
    }
}

impl Command {
    /// Get the kind of this command
    pub fn kind(&self) -> CommandKind {
        CommandKind::from(self)
    }

    /// Name used in logs and metrics
    pub fn name(&self) -> &str {
        match self {
            Command::Unknown { name, .. } => name.as_str(),
            other => other.kind().wire_name().unwrap_or_default(),
        }
    }

    /// Decode a single frame (without terminator)
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Self::try_from(Frame::parse(text)?)
    }

    /// Encode into a single frame (without terminator)
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(self.to_frame()?.to_string())
    }

    /// Convert into an untyped frame, validating every field.
    pub fn to_frame(&self) -> ProtocolResult<Frame> {
        let frame = match self {
            Command::Register(id) => Frame::new(consts::REGISTER).with_arg(id.as_u64().to_string()),
            Command::RegisteredOk => Frame::new(consts::REGISTERED_OK),
            Command::Ping => Frame::new(consts::PING),
            Command::Pong => Frame::new(consts::PONG),
            Command::Login(request) => {
                check_field(consts::LOGIN, "username", &request.username, false)?;
                check_field(consts::LOGIN, "password", &request.password, true)?;
                Frame::new(consts::LOGIN)
                    .with_arg(request.username.as_str())
                    .with_arg(request.password.as_str())
                    .with_arg(request.server_index.to_string())
                    .with_arg(request.character_index.to_string())
            }
            Command::CharacterName(name) => {
                check_field(consts::CHARACTER_NAME, "name", name, true)?;
                Frame::new(consts::CHARACTER_NAME).with_arg(name.as_str())
            }
            Command::LoginFailed => Frame::new(consts::LOGIN_FAILED),
            Command::Shutdown => Frame::new(consts::SHUTDOWN),
            Command::ShutdownOk => Frame::new(consts::SHUTDOWN_OK),
            Command::ClientShutdown => Frame::new(consts::CLIENT_SHUTDOWN),
            Command::AutoState(enabled) => {
                Frame::new(consts::AUTO_STATE).with_arg(encode_bool(*enabled))
            }
            Command::AutoEvent { enabled, mode } => {
                check_field(consts::AUTO_EVENT, "type", mode, false)?;
                Frame::new(consts::AUTO_EVENT)
                    .with_arg(encode_bool(*enabled))
                    .with_arg(mode.as_str())
            }
            Command::AutoEquip { enabled, mode } => {
                check_field(consts::AUTO_EQUIP, "type", mode, false)?;
                Frame::new(consts::AUTO_EQUIP)
                    .with_arg(encode_bool(*enabled))
                    .with_arg(mode.as_str())
            }
            Command::UnknownCommand => Frame::new(consts::UNKNOWN_COMMAND),
            Command::Error(None) => Frame::new(consts::ERROR),
            Command::Error(Some(detail)) => {
                check_field(consts::ERROR, "detail", detail, true)?;
                Frame::new(consts::ERROR).with_arg(detail.as_str())
            }
            Command::Unknown { name, args } => {
                check_field(name, "name", name, false)?;
                if name.trim().is_empty() {
                    return Err(ProtocolError::EmptyFrame);
                }
                let mut frame = Frame::new(name.as_str());
                for arg in args {
                    check_field(name, "argument", arg, false)?;
                    frame = frame.with_arg(arg.as_str());
                }
                frame
            }
        };
        Ok(frame)
    }
}

impl TryFrom<Frame> for Command {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> ProtocolResult<Self> {
        let (name, args) = frame.into_parts();
        let command = match name.as_str() {
            consts::REGISTER => {
                expect_args(consts::REGISTER, &args, 1)?;
                let id = args[0]
                    .parse::<AccountId>()
                    .map_err(|_| invalid(consts::REGISTER, "accountId", &args[0]))?;
                Command::Register(id)
            }
            consts::REGISTERED_OK => bare(consts::REGISTERED_OK, &args, Command::RegisteredOk)?,
            consts::PING => bare(consts::PING, &args, Command::Ping)?,
            consts::PONG => bare(consts::PONG, &args, Command::Pong)?,
            consts::LOGIN => {
                if args.len() < 4 {
                    return Err(ProtocolError::TooFewArguments {
                        command: consts::LOGIN,
                        minimum: 4,
                        actual: args.len(),
                    });
                }
                // Indices are the last two fields; the password absorbs any separators.
                let last = args.len() - 1;
                let server_index = parse_index(consts::LOGIN, "serverIndex", &args[last - 1])?;
                let character_index = parse_index(consts::LOGIN, "characterIndex", &args[last])?;
                Command::Login(LoginRequest {
                    username: args[0].clone(),
                    password: args[1..last - 1].join(SEPARATOR_STR),
                    server_index,
                    character_index,
                })
            }
            consts::CHARACTER_NAME => {
                let name = args.join(SEPARATOR_STR);
                if name.trim().is_empty() {
                    return Err(invalid(consts::CHARACTER_NAME, "name", &name));
                }
                Command::CharacterName(name)
            }
            consts::LOGIN_FAILED => bare(consts::LOGIN_FAILED, &args, Command::LoginFailed)?,
            consts::SHUTDOWN => bare(consts::SHUTDOWN, &args, Command::Shutdown)?,
            consts::SHUTDOWN_OK => bare(consts::SHUTDOWN_OK, &args, Command::ShutdownOk)?,
            consts::CLIENT_SHUTDOWN => {
                bare(consts::CLIENT_SHUTDOWN, &args, Command::ClientShutdown)?
            }
            consts::AUTO_STATE => {
                expect_args(consts::AUTO_STATE, &args, 1)?;
                Command::AutoState(parse_bool(consts::AUTO_STATE, &args[0])?)
            }
            consts::AUTO_EVENT => {
                expect_args(consts::AUTO_EVENT, &args, 2)?;
                Command::AutoEvent {
                    enabled: parse_bool(consts::AUTO_EVENT, &args[0])?,
                    mode: args[1].clone(),
                }
            }
            consts::AUTO_EQUIP => {
                expect_args(consts::AUTO_EQUIP, &args, 2)?;
                Command::AutoEquip {
                    enabled: parse_bool(consts::AUTO_EQUIP, &args[0])?,
                    mode: args[1].clone(),
                }
            }
            consts::UNKNOWN_COMMAND => {
                bare(consts::UNKNOWN_COMMAND, &args, Command::UnknownCommand)?
            }
            consts::ERROR => {
                if args.is_empty() {
                    Command::Error(None)
                } else {
                    Command::Error(Some(args.join(SEPARATOR_STR)))
                }
            }
            _ => Command::Unknown { name, args },
        };
        Ok(command)
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::decode(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never print credentials.
            Command::Login(request) => write!(
                f,
                "{}{sep}{}{sep}***{sep}{}{sep}{}",
                consts::LOGIN,
                request.username,
                request.server_index,
                request.character_index,
                sep = SEPARATOR
            ),
            other => match other.to_frame() {
                Ok(frame) => write!(f, "{}", frame),
                Err(_) => write!(f, "{}", other.name()),
            },
        }
    }
}

fn bare(command: &'static str, args: &[String], value: Command) -> ProtocolResult<Command> {
    expect_args(command, args, 0)?;
    Ok(value)
}

fn expect_args(command: &'static str, args: &[String], expected: usize) -> ProtocolResult<()> {
    if args.len() != expected {
        return Err(ProtocolError::ArgumentCount {
            command,
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

fn invalid(command: &'static str, field: &'static str, value: &str) -> ProtocolError {
    ProtocolError::InvalidArgument {
        command,
        field,
        value: value.to_string(),
    }
}

fn parse_index(command: &'static str, field: &'static str, value: &str) -> ProtocolResult<u32> {
    value.trim().parse().map_err(|_| invalid(command, field, value))
}

fn parse_bool(command: &'static str, value: &str) -> ProtocolResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(command, "enabled", value)),
    }
}

fn encode_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn check_field(
    command: &str,
    field: &'static str,
    value: &str,
    allow_separator: bool,
) -> ProtocolResult<()> {
    let reserved = |c: char| c == '\r' || c == '\n' || (!allow_separator && c == SEPARATOR);
    if value.contains(reserved) {
        return Err(ProtocolError::ReservedCharacter {
            command: command.to_string(),
            field,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_register() {
        assert_eq!(
            Command::decode("REGISTER|42").unwrap(),
            Command::Register(AccountId::new(42))
        );
        assert!(matches!(
            Command::decode("REGISTER|abc"),
            Err(ProtocolError::InvalidArgument { field: "accountId", .. })
        ));
        assert!(matches!(
            Command::decode("REGISTER"),
            Err(ProtocolError::ArgumentCount { expected: 1, actual: 0, .. })
        ));
    }

    #[test]
    fn test_decode_login() {
        let command = Command::decode("LOGIN|alice|secret|2|0").unwrap();
        assert_eq!(
            command,
            Command::Login(LoginRequest::new("alice", "secret", 2, 0))
        );
    }

    #[test]
    fn test_decode_login_password_with_separator() {
        let command = Command::decode("LOGIN|alice|se|cr|et|7|1").unwrap();
        let Command::Login(request) = command else {
            panic!("expected login");
        };
        assert_eq!(request.username, "alice");
        assert_eq!(request.password, "se|cr|et");
        assert_eq!(request.server_index, 7);
        assert_eq!(request.character_index, 1);
    }

    #[test]
    fn test_decode_login_short() {
        assert!(matches!(
            Command::decode("LOGIN|alice|secret"),
            Err(ProtocolError::TooFewArguments { minimum: 4, actual: 2, .. })
        ));
        assert!(matches!(
            Command::decode("LOGIN|alice|secret|x|0"),
            Err(ProtocolError::InvalidArgument { field: "serverIndex", .. })
        ));
    }

    #[test]
    fn test_decode_character_name() {
        assert_eq!(
            Command::decode("CHARACTER_NAME|Aldric").unwrap(),
            Command::CharacterName("Aldric".to_string())
        );
        assert!(Command::decode("CHARACTER_NAME").is_err());
        assert!(Command::decode("CHARACTER_NAME|  ").is_err());
    }

    #[test]
    fn test_decode_booleans() {
        assert_eq!(Command::decode("AUTO_STATE|True").unwrap(), Command::AutoState(true));
        assert_eq!(Command::decode("AUTO_STATE|0").unwrap(), Command::AutoState(false));
        assert!(Command::decode("AUTO_STATE|maybe").is_err());
        assert_eq!(
            Command::decode("AUTO_EQUIP|false|armor").unwrap(),
            Command::AutoEquip {
                enabled: false,
                mode: "armor".to_string()
            }
        );
    }

    #[test]
    fn test_decode_bare_commands_reject_arguments() {
        assert_eq!(Command::decode("PING").unwrap(), Command::Ping);
        assert!(matches!(
            Command::decode("PONG|extra"),
            Err(ProtocolError::ArgumentCount { expected: 0, actual: 1, .. })
        ));
    }

    #[test]
    fn test_decode_unknown() {
        assert_eq!(
            Command::decode("TELEPORT|x|y").unwrap(),
            Command::Unknown {
                name: "TELEPORT".to_string(),
                args: vec!["x".to_string(), "y".to_string()],
            }
        );
        // Names are case sensitive.
        assert_eq!(Command::decode("ping").unwrap().kind(), CommandKind::Unknown);
    }

    #[test]
    fn test_decode_error_detail() {
        assert_eq!(Command::decode("ERROR").unwrap(), Command::Error(None));
        assert_eq!(
            Command::decode("ERROR|bad|frame").unwrap(),
            Command::Error(Some("bad|frame".to_string()))
        );
    }

    #[test]
    fn test_encode() {
        let login = Command::Login(LoginRequest::new("alice", "secret", 2, 0));
        assert_eq!(login.encode().unwrap(), "LOGIN|alice|secret|2|0");
        assert_eq!(Command::AutoState(true).encode().unwrap(), "AUTO_STATE|true");
        assert_eq!(
            Command::Register(AccountId::new(7)).encode().unwrap(),
            "REGISTER|7"
        );
    }

    #[test]
    fn test_encode_rejects_reserved_characters() {
        let login = Command::Login(LoginRequest::new("al|ice", "secret", 2, 0));
        assert!(matches!(
            login.encode(),
            Err(ProtocolError::ReservedCharacter { field: "username", .. })
        ));
        let name = Command::CharacterName("two\nlines".to_string());
        assert!(name.encode().is_err());
        let mode = Command::AutoEvent {
            enabled: true,
            mode: "a|b".to_string(),
        };
        assert!(mode.encode().is_err());
    }

    #[test]
    fn test_display_hides_password() {
        let login = Command::Login(LoginRequest::new("alice", "secret", 2, 0));
        let shown = login.to_string();
        assert_eq!(shown, "LOGIN|alice|***|2|0");
        assert!(!format!("{:?}", login).contains("secret"));
    }

    #[test]
    fn test_kind_classification() {
        assert!(CommandKind::Pong.is_reply());
        assert!(CommandKind::CharacterName.is_reply());
        assert!(!CommandKind::ClientShutdown.is_reply());
        assert!(CommandKind::Login.is_manager_request());
        assert!(!CommandKind::Register.is_manager_request());
        assert_eq!(CommandKind::Unknown.wire_name(), None);
        assert_eq!(Command::Shutdown.name(), "SHUTDOWN");
    }
}
