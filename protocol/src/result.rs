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

/// Result Type for Protocol Operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while framing, decoding or encoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// An I/O error occurred on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame contained no command name.
    #[error("Empty frame")]
    EmptyFrame,

    /// The frame is longer than the configured limit.
    #[error("Frame of {length} bytes exceeds the limit of {limit} bytes")]
    FrameTooLong {
        /// Length of the offending frame
        length: usize,
        /// Configured maximum frame length
        limit: usize,
    },

    /// The frame is not valid UTF-8.
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    /// A command received the wrong number of arguments.
    #[error("{command} expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        /// Command name
        command: &'static str,
        /// Exact number of arguments required
        expected: usize,
        /// Number of arguments present
        actual: usize,
    },

    /// A command received fewer arguments than it needs.
    #[error("{command} expects at least {minimum} argument(s), got {actual}")]
    TooFewArguments {
        /// Command name
        command: &'static str,
        /// Minimum number of arguments required
        minimum: usize,
        /// Number of arguments present
        actual: usize,
    },

    /// An argument could not be parsed.
    #[error("Invalid {field} for {command}: {value:?}")]
    InvalidArgument {
        /// Command name
        command: &'static str,
        /// Argument name
        field: &'static str,
        /// Raw argument value
        value: String,
    },

    /// A field contains a character that cannot be carried inside a frame.
    #[error("Field {field} of {command} contains a reserved character")]
    ReservedCharacter {
        /// Command name
        command: String,
        /// Field name
        field: &'static str,
    },
}

impl ProtocolError {
    /// Check if the error came from the transport rather than the frame content
    pub fn is_io(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::ArgumentCount {
            command: "REGISTER",
            expected: 1,
            actual: 0,
        };
        assert_eq!(err.to_string(), "REGISTER expects 1 argument(s), got 0");

        let err = ProtocolError::FrameTooLong {
            length: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Frame of 2048 bytes exceeds the limit of 1024 bytes"
        );
    }

    #[test]
    fn test_error_is_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(ProtocolError::from(io).is_io());
        assert!(!ProtocolError::EmptyFrame.is_io());
    }
}
