use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use linechat_protocol::strip_line_ending;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::acceptor::AcceptLoop;
use crate::config::ServerConfig;
use crate::engine::{BroadcastEngine, Outbound, OutboundSender};
use crate::error::{BroadcasterError, Result};
use crate::registry::SessionRegistry;

/// Lifecycle state of a [`ChatServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
}

/// Handles owned while the server is running
struct RunningTasks {
    local_addr: SocketAddr,
    queue: OutboundSender,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    engine_task: JoinHandle<()>,
}

/// Line-based chat server with a single global delivery order
pub struct ChatServer {
    config: ServerConfig,
    registry: SessionRegistry,
    state: Arc<RwLock<ServerState>>,
    tasks: Mutex<Option<RunningTasks>>,
}

impl ChatServer {
    /// Create a stopped server
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
            state: Arc::new(RwLock::new(ServerState::Stopped)),
            tasks: Mutex::new(None),
        }
    }

    /// Bind the listener and start the accept loop and broadcast engine.
    ///
    /// Returns the address actually bound, which differs from the configured
    /// one when port 0 was requested.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(BroadcasterError::AlreadyRunning);
        }

        let address = self.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| BroadcasterError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (queue, queue_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        *self.state.write().await = ServerState::Running;

        let engine = BroadcastEngine::new(
            self.registry.clone(),
            Arc::clone(&self.state),
            &self.config,
        );
        let engine_task = tokio::spawn(engine.run(queue_rx));

        let acceptor = AcceptLoop::new(
            listener,
            self.registry.clone(),
            queue.clone(),
            shutdown_rx,
            &self.config,
        );
        let accept_task = tokio::spawn(acceptor.run());

        tracing::info!("Chat server listening on {}", local_addr);

        *tasks = Some(RunningTasks {
            local_addr,
            queue,
            shutdown,
            accept_task,
            engine_task,
        });

        Ok(local_addr)
    }

    /// Stop accepting, stop the engine and close every session.
    ///
    /// Returns [`BroadcasterError::NotStarted`] without side effects if the
    /// server is not running. The lifecycle lock is held until shutdown is
    /// complete, so a concurrent `start()` waits instead of racing the drain.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.tasks.lock().await;
        let Some(tasks) = lifecycle.take() else {
            return Err(BroadcasterError::NotStarted);
        };

        *self.state.write().await = ServerState::Stopped;
        let grace = self.config.shutdown_timeout();

        // Listener is dropped when the accept loop returns
        let _ = tasks.shutdown.send(true);
        join_with_timeout("accept loop", tasks.accept_task, grace).await;

        let _ = tasks.queue.send(Outbound::Shutdown);

        let sessions = self.registry.drain().await;
        for session in &sessions {
            session.close().await;
        }

        join_with_timeout("broadcast engine", tasks.engine_task, grace).await;

        tracing::info!("Chat server stopped ({} client(s) closed)", sessions.len());
        drop(lifecycle);
        Ok(())
    }

    /// Queue a server-originated message for every client.
    ///
    /// Takes the same path as client messages, so it is ordered with them.
    /// With no clients connected this is a no-op.
    pub async fn broadcast(&self, text: &str) -> Result<()> {
        let tasks = self.tasks.lock().await;
        let tasks = tasks.as_ref().ok_or(BroadcasterError::NotStarted)?;

        tasks
            .queue
            .send(Outbound::Message(strip_line_ending(text).to_string()))
            .map_err(|_| BroadcasterError::NotStarted)
    }

    /// Bound address while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.tasks.lock().await.as_ref().map(|t| t.local_addr)
    }

    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == ServerState::Running
    }

    /// Get current client count
    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }

}

impl Drop for ChatServer {
    fn drop(&mut self) {
        // Best effort when dropped without stop(): wake every task so they wind down
        if let Some(tasks) = self.tasks.get_mut().take() {
            let _ = tasks.shutdown.send(true);
            let _ = tasks.queue.send(Outbound::Shutdown);
            for session in self.registry.try_drain() {
                session.signal_close();
            }
        }
    }
}

async fn join_with_timeout(name: &str, mut handle: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("{} task failed: {}", name, e),
        Err(_) => {
            tracing::warn!("{} did not stop within {:?}, aborting", name, grace);
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio_test::{assert_err, assert_ok};

    fn config() -> ServerConfig {
        ServerConfig::new("127.0.0.1", 0)
    }

    #[tokio::test]
    async fn test_server_create() {
        let server = ChatServer::new(config());
        assert_eq!(server.state().await, ServerState::Stopped);
        assert_eq!(server.client_count().await, 0);
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_start_stop_no_clients() {
        let server = ChatServer::new(config());

        let addr = assert_ok!(server.start().await);
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert!(addr.port() > 0);
        assert_eq!(server.local_addr().await, Some(addr));
        assert!(server.is_running().await);

        // Broadcasting to nobody is fine
        assert_ok!(server.broadcast("ping").await);

        assert_ok!(server.stop().await);
        assert_eq!(server.state().await, ServerState::Stopped);
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_misuse_is_reported() {
        let server = ChatServer::new(config());

        assert!(matches!(server.stop().await, Err(BroadcasterError::NotStarted)));
        assert!(matches!(server.broadcast("x").await, Err(BroadcasterError::NotStarted)));

        server.start().await.unwrap();
        assert!(matches!(server.start().await, Err(BroadcasterError::AlreadyRunning)));

        server.stop().await.unwrap();
        assert_err!(server.stop().await);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let server = ChatServer::new(config());
        server.start().await.unwrap();
        server.stop().await.unwrap();

        assert_ok!(server.start().await);
        assert_ok!(server.stop().await);
    }

    #[tokio::test]
    async fn test_start_during_stop_waits_for_shutdown() {
        let server = ChatServer::new(config());
        let addr = server.start().await.unwrap();
        let old_client = tokio::net::TcpStream::connect(addr).await.unwrap();
        for _ in 0..200 {
            if server.client_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // stop() is polled first and takes the lifecycle lock
        let (stopped, restarted) = tokio::join!(server.stop(), server.start());
        assert_ok!(stopped);
        let new_addr = assert_ok!(restarted);
        assert_eq!(server.client_count().await, 0);
        drop(old_client);

        // Sessions of the restarted server are not swept by the earlier stop
        let client = tokio::net::TcpStream::connect(new_addr).await.unwrap();
        for _ in 0..200 {
            if server.client_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(server.client_count().await, 1);

        server.broadcast("hola").await.unwrap();
        let mut lines = tokio::io::BufReader::new(client).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("hola"));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_listener_closed_after_stop() {
        let server = ChatServer::new(config());
        let addr = server.start().await.unwrap();
        server.stop().await.unwrap();

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let holder = ChatServer::new(config());
        let addr = holder.start().await.unwrap();

        let clash = ChatServer::new(ServerConfig::new("127.0.0.1", addr.port()));
        assert!(matches!(clash.start().await, Err(BroadcasterError::Bind { .. })));
        assert_eq!(clash.state().await, ServerState::Stopped);

        holder.stop().await.unwrap();
    }
}
