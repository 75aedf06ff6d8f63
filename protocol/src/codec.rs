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

use crate::consts::{DEFAULT_MAX_FRAME_LENGTH, TERMINATOR};
use crate::{Command, ProtocolError};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Longest prefix of an invalid frame kept for diagnostics
const MALFORMED_PREVIEW: usize = 64;

/// A frame that could not be turned into a [`Command`].
#[derive(Debug)]
pub struct MalformedFrame {
    /// The frame text (lossy and truncated for oversize or non-UTF-8 frames)
    pub raw: String,
    /// Why decoding failed
    pub error: ProtocolError,
}

/// Result of decoding a single frame.
///
/// Malformed frames are items, not stream errors, so the connection survives
/// a bad frame and the caller can answer with `ERROR`.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed command (possibly [`Command::Unknown`])
    Command(Command),
    /// A frame that failed to decode
    Malformed(MalformedFrame),
}

impl Decoded {
    /// Get the command if the frame was well-formed
    pub fn command(self) -> Option<Command> {
        match self {
            Decoded::Command(command) => Some(command),
            Decoded::Malformed(_) => None,
        }
    }

    fn malformed(raw: &[u8], error: ProtocolError) -> Self {
        let preview = &raw[..raw.len().min(MALFORMED_PREVIEW)];
        Decoded::Malformed(MalformedFrame {
            raw: String::from_utf8_lossy(preview).into_owned(),
            error,
        })
    }
}

/// Codec for the marionette control protocol.
///
/// The encoder writes one frame per item followed by `\n`. The decoder splits
/// on `\n`; by default bytes remaining after a read without a terminator are
/// taken as a whole frame, which keeps unterminated "one write, one message"
/// peers working.
///
/// # Example
/// ```
/// use bytes::BytesMut;
/// use marionette_protocol::{Command, CommandCodec, Decoded};
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = CommandCodec::new();
/// let mut buffer = BytesMut::new();
/// codec.encode(Command::Ping, &mut buffer).unwrap();
/// assert_eq!(&buffer[..], b"PING\n");
///
/// let decoded = codec.decode(&mut buffer).unwrap();
/// assert!(matches!(decoded, Some(Decoded::Command(Command::Ping))));
/// ```
#[derive(Debug, Clone)]
pub struct CommandCodec {
    max_frame_length: usize,
    terminate_frames: bool,
    require_terminator: bool,
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            terminate_frames: true,
            require_terminator: false,
        }
    }
}

impl CommandCodec {
    /// Creates a codec that terminates outgoing frames and accepts both
    /// terminated and unterminated incoming frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a codec that neither writes nor expects terminators.
    pub fn legacy() -> Self {
        Self {
            terminate_frames: false,
            ..Self::default()
        }
    }

    /// Creates a codec that buffers until a terminator arrives.
    ///
    /// Oversize unterminated input becomes a stream error, because the frame
    /// boundary is lost.
    pub fn strict() -> Self {
        Self {
            require_terminator: true,
            ..Self::default()
        }
    }

    /// Set the maximum frame length in bytes
    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }

    /// Maximum frame length in bytes
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Whether encoded frames end with a terminator
    pub fn terminates_frames(&self) -> bool {
        self.terminate_frames
    }
}

impl Decoder for CommandCodec {
    type Item = Decoded;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            let (line_length, consumed) = match src.iter().position(|b| *b == TERMINATOR) {
                Some(position) => (position, position + 1),
                None if self.require_terminator => {
                    if src.len() > self.max_frame_length {
                        return Err(ProtocolError::FrameTooLong {
                            length: src.len(),
                            limit: self.max_frame_length,
                        });
                    }
                    return Ok(None);
                }
                None => (src.len(), src.len()),
            };

            let chunk = src.split_to(consumed);
            let line = &chunk[..line_length];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if line.len() > self.max_frame_length {
                return Ok(Some(Decoded::malformed(
                    line,
                    ProtocolError::FrameTooLong {
                        length: line.len(),
                        limit: self.max_frame_length,
                    },
                )));
            }

            let Ok(text) = std::str::from_utf8(line) else {
                return Ok(Some(Decoded::malformed(line, ProtocolError::InvalidUtf8)));
            };

            let text = text.trim();
            if text.is_empty() {
                // Blank keep-alive lines carry nothing.
                continue;
            }

            trace!(frame = text, "Decoding frame");
            return Ok(Some(match Command::decode(text) {
                Ok(command) => Decoded::Command(command),
                Err(error) => Decoded::malformed(text.as_bytes(), error),
            }));
        }
    }
}

impl Encoder<Command> for CommandCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&Command>>::encode(self, &item, dst)
    }
}

impl Encoder<&Command> for CommandCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = item.encode()?;
        if text.len() > self.max_frame_length {
            return Err(ProtocolError::FrameTooLong {
                length: text.len(),
                limit: self.max_frame_length,
            });
        }
        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        if self.terminate_frames {
            dst.put_u8(TERMINATOR);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccountId;

    fn decode_all(codec: &mut CommandCodec, input: &[u8]) -> Vec<Decoded> {
        let mut buffer = BytesMut::from(input);
        let mut items = Vec::new();
        while let Some(item) = codec.decode(&mut buffer).unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_decode_coalesced_frames() {
        let mut codec = CommandCodec::new();
        let items = decode_all(&mut codec, b"PONG\nCHARACTER_NAME|Aldric\r\n");
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Decoded::Command(Command::Pong)));
        assert!(matches!(
            &items[1],
            Decoded::Command(Command::CharacterName(name)) if name == "Aldric"
        ));
    }

    #[test]
    fn test_decode_unterminated_frame() {
        let mut codec = CommandCodec::new();
        let items = decode_all(&mut codec, b"REGISTER|9");
        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Decoded::Command(Command::Register(id)) if id == AccountId::new(9)
        ));
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = CommandCodec::new();
        let items = decode_all(&mut codec, b"\n\r\n  \nPING\n");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_decode_malformed_is_an_item() {
        let mut codec = CommandCodec::new();
        let items = decode_all(&mut codec, b"REGISTER|x\nPING\n");
        assert_eq!(items.len(), 2);
        match &items[0] {
            Decoded::Malformed(frame) => {
                assert_eq!(frame.raw, "REGISTER|x");
                assert!(matches!(frame.error, ProtocolError::InvalidArgument { .. }));
            }
            other => panic!("unexpected item: {:?}", other),
        }
        assert!(matches!(items[1], Decoded::Command(Command::Ping)));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut codec = CommandCodec::new();
        let items = decode_all(&mut codec, b"PI\xffNG\n");
        assert!(matches!(
            &items[0],
            Decoded::Malformed(MalformedFrame { error: ProtocolError::InvalidUtf8, .. })
        ));
    }

    #[test]
    fn test_decode_oversize_frame() {
        let mut codec = CommandCodec::new().with_max_frame_length(8);
        let items = decode_all(&mut codec, b"CHARACTER_NAME|Aldric\nPING\n");
        assert_eq!(items.len(), 2);
        assert!(matches!(
            &items[0],
            Decoded::Malformed(MalformedFrame {
                error: ProtocolError::FrameTooLong { length: 21, limit: 8 },
                ..
            })
        ));
    }

    #[test]
    fn test_strict_waits_for_terminator() {
        let mut codec = CommandCodec::strict();
        let mut buffer = BytesMut::from(&b"PI"[..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        buffer.extend_from_slice(b"NG\n");
        assert!(matches!(
            codec.decode(&mut buffer).unwrap(),
            Some(Decoded::Command(Command::Ping))
        ));
    }

    #[test]
    fn test_strict_rejects_oversize_unterminated() {
        let mut codec = CommandCodec::strict().with_max_frame_length(4);
        let mut buffer = BytesMut::from(&b"REGISTER"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::FrameTooLong { .. })
        ));
    }

    #[test]
    fn test_encode_terminated_and_legacy() {
        let mut buffer = BytesMut::new();
        CommandCodec::new()
            .encode(Command::AutoState(false), &mut buffer)
            .unwrap();
        assert_eq!(&buffer[..], b"AUTO_STATE|false\n");

        buffer.clear();
        CommandCodec::legacy()
            .encode(Command::RegisteredOk, &mut buffer)
            .unwrap();
        assert_eq!(&buffer[..], b"REGISTERED_OK");
    }

    #[test]
    fn test_encode_oversize() {
        let mut codec = CommandCodec::new().with_max_frame_length(10);
        let mut buffer = BytesMut::new();
        let result = codec.encode(Command::CharacterName("A".repeat(32)), &mut buffer);
        assert!(matches!(result, Err(ProtocolError::FrameTooLong { .. })));
        assert!(buffer.is_empty());
    }
}
