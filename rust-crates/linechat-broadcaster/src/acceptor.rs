//! Accept loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use linechat_protocol::MessageValidator;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::engine::OutboundSender;
use crate::receiver::ReceiveLoop;
use crate::registry::SessionRegistry;
use crate::session::{wait_until_set, Session};

/// Pause after a failed accept so a persistent OS error doesn't spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

pub(crate) struct AcceptLoop {
    listener: TcpListener,
    registry: SessionRegistry,
    queue: OutboundSender,
    shutdown: watch::Receiver<bool>,
    validator: MessageValidator,
    write_timeout: Duration,
}

impl AcceptLoop {
    pub(crate) fn new(
        listener: TcpListener,
        registry: SessionRegistry,
        queue: OutboundSender,
        shutdown: watch::Receiver<bool>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            listener,
            registry,
            queue,
            shutdown,
            validator: config.validator(),
            write_timeout: config.write_timeout(),
        }
    }

    /// Accept clients until shutdown is signalled. The listener is closed
    /// when this returns.
    pub(crate) async fn run(mut self) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = wait_until_set(&mut self.shutdown) => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.register(stream, peer).await,
                Err(e) => {
                    tracing::warn!("Failed to accept client: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        drop(self.listener);
        tracing::info!("Accept loop stopped");
    }

    /// Register the session before its receive loop starts, so a broadcast
    /// already in flight can still reach it.
    async fn register(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
        }

        let (session, reader) = Session::new(stream, peer, self.validator.max_line_bytes());
        let session = Arc::new(session);
        let total = self.registry.add(Arc::clone(&session)).await;
        tracing::info!("Client {} connected from {}. Total: {}", session.id(), peer, total);

        let receive_loop = ReceiveLoop::new(
            session,
            self.registry.clone(),
            self.queue.clone(),
            self.validator,
            self.write_timeout,
        );
        tokio::spawn(receive_loop.run(reader));
    }
}
