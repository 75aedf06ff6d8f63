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

//! # Marionette Control Protocol
//!
//! This crate implements the line-oriented text protocol spoken between the
//! marionette manager and the game clients it supervises.
//!
//! ## Overview
//!
//! Every message is a single frame: a command name followed by its arguments,
//! joined by `|`:
//!
//! ```text
//! REGISTER|42
//! LOGIN|alice|secret|2|0
//! CHARACTER_NAME|Aldric
//! ```
//!
//! ## Core Components
//!
//! ### [`Frame`]
//!
//! The untyped view of a message: a name and an ordered list of string
//! arguments.
//!
//! ### [`Command`]
//!
//! The typed vocabulary. Unrecognized names decode to [`Command::Unknown`]
//! instead of failing, so peers running a newer protocol revision do not get
//! disconnected.
//!
//! ### [`CommandCodec`]
//!
//! A [`tokio_util::codec`] implementation. Decoding yields [`Decoded`], which
//! separates well-formed commands from malformed frames so that a bad frame
//! never terminates the stream.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use futures_util::{SinkExt, StreamExt};
//! use marionette_protocol::{AccountId, Command, CommandCodec, Decoded};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:8888").await?;
//! let mut framed = Framed::new(stream, CommandCodec::new());
//!
//! framed.send(Command::Register(AccountId::new(42))).await?;
//! if let Some(Ok(Decoded::Command(Command::RegisteredOk))) = framed.next().await {
//!     println!("registered");
//! }
//! # Ok(())
//! # }
//! ```

mod account;
mod codec;
mod command;
pub mod consts;
mod frame;
mod result;

pub use account::AccountId;
pub use codec::{CommandCodec, Decoded, MalformedFrame};
pub use command::{Command, CommandKind, LoginRequest};
pub use frame::Frame;
pub use result::{ProtocolError, ProtocolResult};
