//! Per-client receive loop

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use linechat_protocol::{
    LineReader, MessageValidator, ProtocolError, ReadOutcome, INVALID_MESSAGE_REPLY,
};
use tokio::net::tcp::OwnedReadHalf;

use crate::engine::{Outbound, OutboundSender};
use crate::registry::SessionRegistry;
use crate::session::Session;

/// Why a receive loop ended
#[derive(Debug)]
enum CloseReason {
    PeerClosed,
    Transport(ProtocolError),
    ReplyTimedOut,
    SessionClosed,
    ServerStopped,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::ReplyTimedOut => write!(f, "error reply timed out"),
            Self::SessionClosed => write!(f, "session closed"),
            Self::ServerStopped => write!(f, "server stopped"),
        }
    }
}

/// Reads lines from one client and forwards accepted ones to the queue.
///
/// Never writes broadcast content itself; the only thing it ever sends is
/// the error reply to its own client.
pub(crate) struct ReceiveLoop {
    session: Arc<Session>,
    registry: SessionRegistry,
    queue: OutboundSender,
    validator: MessageValidator,
    write_timeout: Duration,
}

impl ReceiveLoop {
    pub(crate) fn new(
        session: Arc<Session>,
        registry: SessionRegistry,
        queue: OutboundSender,
        validator: MessageValidator,
        write_timeout: Duration,
    ) -> Self {
        Self {
            session,
            registry,
            queue,
            validator,
            write_timeout,
        }
    }

    /// Run until the client goes away, then clean up the session.
    pub(crate) async fn run(self, mut reader: LineReader<OwnedReadHalf>) {
        let reason = self.receive(&mut reader).await;
        let id = self.session.id();

        self.registry.remove(id).await;
        self.session.close().await;
        drop(reader);

        let remaining = self.registry.len().await;
        match &reason {
            CloseReason::Transport(e) if !e.is_disconnect() => tracing::warn!(
                "Client {} ({}) dropped: {}. Remaining: {}",
                id,
                self.session.peer(),
                reason,
                remaining
            ),
            _ => tracing::info!(
                "Client {} ({}) disconnected: {}. Remaining: {}",
                id,
                self.session.peer(),
                reason,
                remaining
            ),
        }
    }

    async fn receive(&self, reader: &mut LineReader<OwnedReadHalf>) -> CloseReason {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.session.closed() => return CloseReason::SessionClosed,
                outcome = reader.read_line() => outcome,
            };

            // Oversized lines were never buffered; they are rejected like
            // any other over-length message
            let line = match outcome {
                Ok(ReadOutcome::Line(line)) => Some(line),
                Ok(ReadOutcome::Oversized) => None,
                Ok(ReadOutcome::Eof) => return CloseReason::PeerClosed,
                Err(e) => return CloseReason::Transport(e),
            };

            match line.as_deref().and_then(|line| self.validator.validate(line)) {
                Some(text) => {
                    tracing::debug!("{} queued {:?}", self.session.id(), text);
                    if self.queue.send(Outbound::Message(text.to_string())).is_err() {
                        return CloseReason::ServerStopped;
                    }
                }
                None => {
                    tracing::debug!("{} sent invalid message", self.session.id());
                    if let Err(reason) = self.reply_invalid().await {
                        return reason;
                    }
                }
            }
        }
    }

    async fn reply_invalid(&self) -> Result<(), CloseReason> {
        let reply = self.session.send_line(INVALID_MESSAGE_REPLY);
        match tokio::time::timeout(self.write_timeout, reply).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CloseReason::Transport(e)),
            Err(_) => Err(CloseReason::ReplyTimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::connected_session;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::mpsc;

    async fn spawn_loop() -> (
        Arc<Session>,
        SessionRegistry,
        mpsc::UnboundedReceiver<Outbound>,
        tokio::net::TcpStream,
        tokio::task::JoinHandle<()>,
    ) {
        let (session, reader, client) = connected_session().await;
        let registry = SessionRegistry::new();
        registry.add(Arc::clone(&session)).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let receive_loop = ReceiveLoop::new(
            Arc::clone(&session),
            registry.clone(),
            tx,
            MessageValidator::default(),
            Duration::from_secs(1),
        );
        let task = tokio::spawn(receive_loop.run(reader));
        (session, registry, rx, client, task)
    }

    #[tokio::test]
    async fn test_valid_line_is_queued_not_echoed() {
        let (_session, _registry, mut rx, mut client, _task) = spawn_loop().await;

        client.write_all(b"hola\r\n").await.unwrap();
        assert_eq!(rx.recv().await, Some(Outbound::Message("hola".into())));
    }

    #[tokio::test]
    async fn test_invalid_line_gets_error_reply() {
        let (_session, _registry, mut rx, client, _task) = spawn_loop().await;
        let (read_half, mut write_half) = client.into_split();

        write_half.write_all(b"   \n").await.unwrap();

        let mut lines = BufReader::new(read_half).lines();
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some(INVALID_MESSAGE_REPLY)
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_line_gets_error_reply_and_loop_continues() {
        let (_session, _registry, mut rx, client, _task) = spawn_loop().await;
        let (read_half, mut write_half) = client.into_split();

        let huge = vec![b'a'; 1024 * 1024];
        let writer = tokio::spawn(async move {
            write_half.write_all(&huge).await.unwrap();
            write_half.write_all(b"\nhola\n").await.unwrap();
            write_half
        });

        let mut lines = BufReader::new(read_half).lines();
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some(INVALID_MESSAGE_REPLY)
        );
        assert_eq!(rx.recv().await, Some(Outbound::Message("hola".into())));
        let _write_half = writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_removes_and_closes_session() {
        let (session, registry, _rx, client, task) = spawn_loop().await;

        drop(client);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(session.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_external_close_ends_loop() {
        let (session, registry, _rx, _client, task) = spawn_loop().await;

        registry.remove(session.id()).await;
        session.close().await;

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_closed_queue_ends_loop() {
        let (session, registry, rx, mut client, task) = spawn_loop().await;
        drop(rx);

        client.write_all(b"hola\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(session.is_closed());
        assert!(!registry.contains(session.id()).await);
    }
}
