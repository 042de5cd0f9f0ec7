//! Registry of live sessions

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::session::{Session, SessionId};

/// Thread-safe collection of connected sessions
///
/// All structural changes and snapshots are serialized by one lock. No I/O
/// ever happens while it is held: broadcasters iterate over a snapshot.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<Vec<Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns the new total.
    pub async fn add(&self, session: Arc<Session>) -> usize {
        let mut sessions = self.sessions.lock().await;
        sessions.push(session);
        sessions.len()
    }

    /// Remove a session if present. Removing an absent session is a no-op.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;
        let idx = sessions.iter().position(|s| s.id() == id)?;
        Some(sessions.swap_remove(idx))
    }

    /// Point-in-time copy of all live sessions
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.clone()
    }

    /// Remove and return every session
    pub async fn drain(&self) -> Vec<Arc<Session>> {
        std::mem::take(&mut *self.sessions.lock().await)
    }

    /// Non-blocking [`drain`](Self::drain) for use from `Drop`
    pub(crate) fn try_drain(&self) -> Vec<Arc<Session>> {
        match self.sessions.try_lock() {
            Ok(mut sessions) => std::mem::take(&mut *sessions),
            Err(_) => Vec::new(),
        }
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().await.iter().any(|s| s.id() == id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::connected_session;

    #[tokio::test]
    async fn test_add_remove() {
        let registry = SessionRegistry::new();
        let (a, _ra, _ca) = connected_session().await;
        let (b, _rb, _cb) = connected_session().await;

        assert_eq!(registry.add(Arc::clone(&a)).await, 1);
        assert_eq!(registry.add(Arc::clone(&b)).await, 2);
        assert!(registry.contains(a.id()).await);

        let removed = registry.remove(a.id()).await.unwrap();
        assert_eq!(removed.id(), a.id());
        assert!(!registry.contains(a.id()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let (a, _ra, _ca) = connected_session().await;
        registry.add(Arc::clone(&a)).await;

        assert!(registry.remove(a.id()).await.is_some());
        assert!(registry.remove(a.id()).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let registry = SessionRegistry::new();
        let (a, _ra, _ca) = connected_session().await;
        let (b, _rb, _cb) = connected_session().await;
        registry.add(Arc::clone(&a)).await;

        let snapshot = registry.snapshot().await;
        registry.add(Arc::clone(&b)).await;
        registry.remove(a.id()).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), a.id());
        assert_eq!(registry.snapshot().await[0].id(), b.id());
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = SessionRegistry::new();
        let (a, _ra, _ca) = connected_session().await;
        registry.add(a).await;

        assert_eq!(registry.drain().await.len(), 1);
        assert!(registry.is_empty().await);
        assert!(registry.try_drain().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_remove() {
        let registry = SessionRegistry::new();
        let mut handles = Vec::new();

        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (session, _reader, _client) = connected_session().await;
                registry.add(Arc::clone(&session)).await;
                let _ = registry.snapshot().await;
                registry.remove(session.id()).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(registry.is_empty().await);
    }
}
