//! Broadcast engine: the single consumer of the outbound queue
//!
//! Every accepted message goes through one unbounded FIFO and is written out
//! by this worker alone, which is what gives all clients the same order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};

use crate::config::ServerConfig;
use crate::registry::SessionRegistry;
use crate::server::ServerState;

/// Item on the outbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    /// Accepted text, without line terminator
    Message(String),
    /// Stop the engine
    Shutdown,
}

pub(crate) type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub(crate) type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// Result of one fan-out pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
}

pub(crate) struct BroadcastEngine {
    registry: SessionRegistry,
    state: Arc<RwLock<ServerState>>,
    inclusion_window: Duration,
    dequeue_wait: Duration,
    write_timeout: Duration,
}

impl BroadcastEngine {
    pub(crate) fn new(
        registry: SessionRegistry,
        state: Arc<RwLock<ServerState>>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            registry,
            state,
            inclusion_window: config.inclusion_window(),
            dequeue_wait: config.dequeue_wait(),
            write_timeout: config.write_timeout(),
        }
    }

    /// Drain the queue until the shutdown sentinel arrives.
    pub(crate) async fn run(self, mut queue: OutboundReceiver) {
        tracing::info!("Broadcast engine started");

        loop {
            match tokio::time::timeout(self.dequeue_wait, queue.recv()).await {
                Ok(Some(Outbound::Message(text))) => {
                    if !self.inclusion_window.is_zero() {
                        tokio::time::sleep(self.inclusion_window).await;
                    }
                    let result = self.fan_out(&text).await;
                    tracing::debug!(
                        "Broadcast {:?} to {} client(s), dropped {}",
                        text,
                        result.delivered,
                        result.dropped
                    );
                }
                Ok(Some(Outbound::Shutdown)) | Ok(None) => break,
                Err(_) => {
                    // Queue idle; bail out if the server stopped without a sentinel
                    if *self.state.read().await == ServerState::Stopped {
                        break;
                    }
                }
            }
        }

        tracing::info!("Broadcast engine stopped");
    }

    /// Write `text` to every session in a registry snapshot.
    ///
    /// Sessions whose write fails or times out are removed and closed after
    /// the pass. A failing session never blocks delivery to the others.
    pub(crate) async fn fan_out(&self, text: &str) -> FanOut {
        let sessions = self.registry.snapshot().await;
        let mut failed = Vec::new();
        let mut delivered = 0;

        for session in &sessions {
            match tokio::time::timeout(self.write_timeout, session.send_line(text)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::debug!("Failed to send to {}: {}", session.id(), e);
                    failed.push(session);
                }
                Err(_) => {
                    tracing::warn!(
                        "Write to {} timed out after {:?}",
                        session.id(),
                        self.write_timeout
                    );
                    failed.push(session);
                }
            }
        }

        for session in &failed {
            self.registry.remove(session.id()).await;
            if session.close().await {
                tracing::info!(
                    "Removed dead client {} ({}). Remaining: {}",
                    session.id(),
                    session.peer(),
                    self.registry.len().await
                );
            }
        }

        FanOut {
            delivered,
            dropped: failed.len(),
        }
    }
}
