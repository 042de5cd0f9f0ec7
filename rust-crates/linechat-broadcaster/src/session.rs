//! Per-client session state

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use linechat_protocol::{split_with_limit, LineReader, LineWriter, ProtocolError};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One connected client
///
/// The session keeps the write half of the connection. The read half is
/// handed out once by [`Session::new`] and owned by the client's receive
/// loop, so exactly one reader can ever be bound to a session.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    writer: Mutex<Option<LineWriter<OwnedWriteHalf>>>,
    closed: watch::Sender<bool>,
}

impl Session {
    /// Wrap an accepted connection. Returns the session and its reader,
    /// which buffers at most `max_line_bytes` per line.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        max_line_bytes: usize,
    ) -> (Self, LineReader<OwnedReadHalf>) {
        let (reader, writer) = split_with_limit(stream, max_line_bytes);
        let (closed, _) = watch::channel(false);

        let session = Self {
            id: SessionId::next(),
            peer,
            writer: Mutex::new(Some(writer)),
            closed,
        };
        (session, reader)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Write one line to this client.
    ///
    /// Fails with a `NotConnected` error once the session is closed.
    pub async fn send_line(&self, text: &str) -> linechat_protocol::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => writer.write_line(text).await,
            None => Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "session closed",
            ))),
        }
    }

    /// Mark the session closed and release its write half.
    ///
    /// Safe to call any number of times from any task. Returns `true` only
    /// for the call that actually closed it.
    pub async fn close(&self) -> bool {
        let first = !self.closed.send_replace(true);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("{}: shutdown after close failed: {}", self.id, e);
            }
        }

        first
    }

    /// Flag the session closed without waiting on the writer.
    ///
    /// The receive loop observes the flag and finishes the cleanup itself.
    pub(crate) fn signal_close(&self) {
        self.closed.send_replace(true);
    }

    /// Resolves once the session has been closed by anyone.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        wait_until_set(&mut rx).await;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Wait until a shutdown flag flips to `true` (or its sender is gone).
pub(crate) async fn wait_until_set(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
