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

//! Stream-level tests for the command codec

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use marionette_protocol::{AccountId, Command, CommandCodec, Decoded, LoginRequest};
use proptest::prelude::*;
use tokio::io::{AsyncWriteExt, duplex};
use tokio::time::{Duration, timeout};
use tokio_util::codec::{Decoder, FramedRead, FramedWrite};
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn test_framed_session_exchange() {
    let (client, server) = duplex(4096);
    let mut writer = FramedWrite::new(client, CommandCodec::new());
    let mut reader = FramedRead::new(server, CommandCodec::new());

    writer
        .send(Command::Register(AccountId::new(3)))
        .await
        .unwrap();
    writer
        .send(Command::Login(LoginRequest::new("alice", "secret", 2, 0)))
        .await
        .unwrap();

    let first = reader.next().await.unwrap().unwrap();
    assert!(matches!(
        first,
        Decoded::Command(Command::Register(id)) if id == AccountId::new(3)
    ));

    let second = reader.next().await.unwrap().unwrap();
    let Decoded::Command(Command::Login(request)) = second else {
        panic!("expected login, got {:?}", second);
    };
    assert_eq!(request.username, "alice");
    assert_eq!(request.password, "secret");
    assert!(logs_contain("Decoding frame"));
}

#[tokio::test]
async fn test_unterminated_writes_from_legacy_peer() {
    let (mut client, server) = duplex(4096);
    let mut reader = FramedRead::new(server, CommandCodec::new());

    client.write_all(b"PONG").await.unwrap();
    client.flush().await.unwrap();
    let item = timeout(Duration::from_secs(1), reader.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(item, Decoded::Command(Command::Pong)));

    client.write_all(b"LOGIN_FAILED").await.unwrap();
    let item = timeout(Duration::from_secs(1), reader.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(item, Decoded::Command(Command::LoginFailed)));
}

#[tokio::test]
async fn test_malformed_frame_does_not_end_stream() {
    let (mut client, server) = duplex(4096);
    let mut reader = FramedRead::new(server, CommandCodec::new());

    client
        .write_all(b"AUTO_STATE|perhaps\nSHUTDOWN_OK\n")
        .await
        .unwrap();
    drop(client);

    let first = reader.next().await.unwrap().unwrap();
    assert!(matches!(first, Decoded::Malformed(_)));
    let second = reader.next().await.unwrap().unwrap();
    assert!(matches!(second, Decoded::Command(Command::ShutdownOk)));
    assert!(reader.next().await.is_none());
}

proptest! {
    #[test]
    fn decoder_consumes_arbitrary_input(input in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let mut codec = CommandCodec::new();
        let mut buffer = BytesMut::from(&input[..]);
        let mut items = 0usize;
        while let Some(_item) = codec.decode(&mut buffer).unwrap() {
            items += 1;
            prop_assert!(items <= input.len());
        }
        prop_assert!(buffer.is_empty());
    }

    #[test]
    fn character_names_survive_the_wire(name in "[A-Za-z][A-Za-z0-9 _|-]{0,40}") {
        let mut codec = CommandCodec::new();
        let mut buffer = BytesMut::new();
        tokio_util::codec::Encoder::encode(&mut codec, Command::CharacterName(name.clone()), &mut buffer).unwrap();
        let decoded = codec.decode(&mut buffer).unwrap().and_then(Decoded::command);
        prop_assert_eq!(decoded, Some(Command::CharacterName(name.trim().to_string())));
    }
}
