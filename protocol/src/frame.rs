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

use crate::consts::SEPARATOR;
use crate::{ProtocolError, ProtocolResult};
use std::fmt;

/// Untyped protocol frame: a command name and its ordered arguments.
///
/// A frame does not know the vocabulary; see [`crate::Command`] for the typed
/// view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    name: String,
    args: Vec<String>,
}

impl Frame {
    /// Create a frame without arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a frame on the separator.
    ///
    /// Surrounding whitespace is ignored. An empty name is an error; empty
    /// arguments are preserved.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let mut parts = text.trim().split(SEPARATOR);
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        Ok(Self {
            name: name.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    /// Command name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Consume the frame into its parts
    pub fn into_parts(self) -> (String, Vec<String>) {
        (self.name, self.args)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, "{}{}", SEPARATOR, arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_arguments() {
        let frame = Frame::parse("LOGIN|alice|secret|2|0").unwrap();
        assert_eq!(frame.name(), "LOGIN");
        assert_eq!(frame.args(), ["alice", "secret", "2", "0"]);
    }

    #[test]
    fn test_parse_preserves_empty_arguments() {
        let frame = Frame::parse("AUTO_EVENT||").unwrap();
        assert_eq!(frame.args(), ["", ""]);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let frame = Frame::parse("  PING \r").unwrap();
        assert_eq!(frame.name(), "PING");
        assert!(frame.args().is_empty());
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(Frame::parse(""), Err(ProtocolError::EmptyFrame)));
        assert!(matches!(Frame::parse("|42"), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn test_display() {
        let frame = Frame::new("AUTO_EQUIP").with_arg("true").with_arg("armor");
        assert_eq!(frame.to_string(), "AUTO_EQUIP|true|armor");
        assert_eq!(Frame::new("PING").to_string(), "PING");
    }
}
