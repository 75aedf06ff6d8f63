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

//! Connection read loop
//!
//! The ConnectionWorker is the single reader of a registered transport:
//! - Replies go to the pending requester
//! - `PING` is answered with `PONG`
//! - Unknown commands get `UNKNOWN_COMMAND`, malformed frames get `ERROR`
//! - Everything else is handed to the [`ConnectionHandler`]
//! - On exit the transport is closed and unregistered if still current

use crate::{
    AccountConnection, ConnectionHandler, ConnectionRegistry, DisconnectReason, Result,
};
use futures_util::StreamExt;
use marionette_protocol::{Command, CommandCodec, CommandKind, Decoded, MalformedFrame};
use metrics::counter;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

/// Read loop for one registered transport
pub struct ConnectionWorker<R> {
    connection: AccountConnection,
    reader: FramedRead<R, CommandCodec>,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn ConnectionHandler>,
}

impl<R> ConnectionWorker<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create a new connection worker
    pub fn new(
        connection: AccountConnection,
        reader: FramedRead<R, CommandCodec>,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Self {
        Self {
            connection,
            reader,
            registry,
            handler,
        }
    }

    /// Run the read loop until the transport ends, then clean up
    pub async fn run(mut self) -> DisconnectReason {
        let reason = self.read_loop().await;
        self.cleanup(reason).await;
        reason
    }

    async fn read_loop(&mut self) -> DisconnectReason {
        loop {
            let item = tokio::select! {
                biased;
                _ = self.connection.closed() => return DisconnectReason::Closed,
                item = self.reader.next() => item,
            };

            let decoded = match item {
                Some(Ok(decoded)) => decoded,
                Some(Err(err)) => {
                    debug!(account = %self.connection.account(), error = %err, "Read failed");
                    return DisconnectReason::TransportError;
                }
                None => return DisconnectReason::PeerClosed,
            };
            self.connection.record_received();

            let outcome = match decoded {
                Decoded::Command(command) => self.dispatch(command).await,
                Decoded::Malformed(frame) => self.reject(frame).await.map(|()| None),
            };
            match outcome {
                Ok(None) => {}
                Ok(Some(reason)) => return reason,
                Err(err) if err.is_connection_error() => {
                    debug!(account = %self.connection.account(), error = %err, "Write failed");
                    return DisconnectReason::TransportError;
                }
                Err(err) => {
                    warn!(account = %self.connection.account(), error = %err, "Failed to answer frame");
                }
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Option<DisconnectReason>> {
        trace!(account = %self.connection.account(), frame = %command, "Frame received");
        match command.kind() {
            CommandKind::Ping => self.connection.send(&Command::Pong).await?,
            CommandKind::ClientShutdown => {
                debug!(account = %self.connection.account(), "Client announced shutdown");
                return Ok(Some(DisconnectReason::ClientShutdown));
            }
            CommandKind::Unknown => {
                debug!(account = %self.connection.account(), command = command.name(), "Unknown command");
                self.connection.send(&Command::UnknownCommand).await?
            }
            CommandKind::Register => {
                counter!("marionette.protocol.errors").increment(1);
                warn!(account = %self.connection.account(), "Repeated REGISTER on a registered transport");
                self.connection
                    .send(&Command::Error(Some("already registered".to_string())))
                    .await?
            }
            kind if kind.is_reply() => {
                if let Some(unsolicited) = self.connection.deliver_reply(command) {
                    debug!(
                        account = %self.connection.account(),
                        command = unsolicited.name(),
                        "Reply without pending request"
                    );
                    self.handler
                        .on_unsolicited(&self.connection, unsolicited)
                        .await;
                }
            }
            kind => {
                counter!("marionette.protocol.errors").increment(1);
                warn!(
                    account = %self.connection.account(),
                    command = ?kind,
                    "Client sent a manager-only command"
                );
                self.connection
                    .send(&Command::Error(Some(format!("unexpected {}", command.name()))))
                    .await?
            }
        }
        Ok(None)
    }

    async fn reject(&mut self, frame: MalformedFrame) -> Result<()> {
        counter!("marionette.protocol.errors").increment(1);
        warn!(
            account = %self.connection.account(),
            raw = %frame.raw,
            error = %frame.error,
            "Malformed frame"
        );
        let detail: String = frame
            .error
            .to_string()
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        self.connection.send(&Command::Error(Some(detail))).await
    }

    async fn cleanup(&mut self, reason: DisconnectReason) {
        let account = self.connection.account();
        let serial = self.connection.serial();

        self.connection.close();
        self.connection.shutdown_writer().await;

        if self.registry.unregister_if(account, serial) {
            debug!(account = %account, serial = %serial, reason = %reason, "Connection ended");
            self.handler.on_disconnect(&self.connection, reason).await;
        } else {
            debug!(account = %account, serial = %serial, reason = %reason, "Stale connection ended");
        }
    }
}

impl<R> std::fmt::Debug for ConnectionWorker<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("connection", &self.connection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionSerial;
    use async_trait::async_trait;
    use futures_util::SinkExt;
    use marionette_protocol::AccountId;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};
    use tokio_util::codec::Framed;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct TestHandler {
        unsolicited: Mutex<Vec<Command>>,
        disconnects: Mutex<Vec<DisconnectReason>>,
    }

    #[async_trait]
    impl ConnectionHandler for TestHandler {
        async fn on_unsolicited(&self, _conn: &AccountConnection, command: Command) {
            self.unsolicited.lock().unwrap().push(command);
        }

        async fn on_disconnect(&self, _conn: &AccountConnection, reason: DisconnectReason) {
            self.disconnects.lock().unwrap().push(reason);
        }
    }

    struct Fixture {
        connection: AccountConnection,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<TestHandler>,
        peer: Framed<DuplexStream, CommandCodec>,
        worker: tokio::task::JoinHandle<DisconnectReason>,
    }

    fn start(account: u64) -> Fixture {
        let (local, remote) = duplex(4096);
        let (read_half, write_half) = tokio::io::split(local);
        let connection = AccountConnection::new(
            AccountId::new(account),
            ConnectionSerial::new(1),
            "127.0.0.1:40000".parse().unwrap(),
            write_half,
            CommandCodec::new(),
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        let registry = Arc::new(ConnectionRegistry::new());
        registry.register(connection.clone());
        let handler = Arc::new(TestHandler::default());
        let worker = ConnectionWorker::new(
            connection.clone(),
            FramedRead::new(read_half, CommandCodec::new()),
            registry.clone(),
            handler.clone(),
        );
        Fixture {
            connection,
            registry,
            handler,
            peer: Framed::new(remote, CommandCodec::new()),
            worker: tokio::spawn(worker.run()),
        }
    }

    async fn next_command(peer: &mut Framed<DuplexStream, CommandCodec>) -> Command {
        tokio::time::timeout(Duration::from_secs(1), peer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .command()
            .unwrap()
    }

    #[tokio::test]
    async fn test_answers_ping_and_unknown() {
        let mut fixture = start(1);
        fixture.peer.send(Command::Ping).await.unwrap();
        assert_eq!(next_command(&mut fixture.peer).await, Command::Pong);

        fixture.peer.get_mut().write_all(b"DANCE|now\n").await.unwrap();
        assert_eq!(next_command(&mut fixture.peer).await, Command::UnknownCommand);
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error() {
        let mut fixture = start(2);
        fixture
            .peer
            .get_mut()
            .write_all(b"AUTO_STATE|maybe\n")
            .await
            .unwrap();
        assert!(matches!(
            next_command(&mut fixture.peer).await,
            Command::Error(Some(_))
        ));
        assert!(!fixture.connection.is_closed());
    }

    #[tokio::test]
    async fn test_reply_reaches_requester() {
        let mut fixture = start(3);
        let requester = fixture.connection.clone();
        let request = tokio::spawn(async move {
            requester
                .request(&Command::Shutdown, Duration::from_secs(1))
                .await
        });

        assert_eq!(next_command(&mut fixture.peer).await, Command::Shutdown);
        fixture.peer.send(Command::ShutdownOk).await.unwrap();
        assert_eq!(request.await.unwrap().unwrap(), Command::ShutdownOk);
    }

    #[tokio::test]
    async fn test_unsolicited_reply_goes_to_handler() {
        let mut fixture = start(4);
        fixture
            .peer
            .send(Command::CharacterName("Ayla".to_string()))
            .await
            .unwrap();
        fixture.peer.send(Command::ClientShutdown).await.unwrap();

        let reason = fixture.worker.await.unwrap();
        assert_eq!(reason, DisconnectReason::ClientShutdown);
        assert_eq!(
            *fixture.handler.unsolicited.lock().unwrap(),
            vec![Command::CharacterName("Ayla".to_string())]
        );
        assert_eq!(
            *fixture.handler.disconnects.lock().unwrap(),
            vec![DisconnectReason::ClientShutdown]
        );
        assert!(fixture.registry.is_empty());
    }

    #[tokio::test]
    async fn test_local_close_ends_loop() {
        let fixture = start(5);
        fixture.registry.unregister(AccountId::new(5));
        fixture.connection.close();

        let reason = fixture.worker.await.unwrap();
        assert_eq!(reason, DisconnectReason::Closed);
        // Not current any more, so the handler is not told
        assert!(fixture.handler.disconnects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_peer_close_unregisters() {
        let fixture = start(6);
        drop(fixture.peer);

        let reason = fixture.worker.await.unwrap();
        assert_eq!(reason, DisconnectReason::PeerClosed);
        assert!(!fixture.registry.is_connected(AccountId::new(6)));
        assert!(fixture.connection.is_closed());
    }
}
