use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::Result;
use crate::session::Session;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;

/// Trait for storing and retrieving completion sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn put(&self, session: Session) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    /// Drops idle sessions and returns how many were removed.
    async fn expire(&self) -> Result<usize>;
}

struct StoredSession {
    session: Session,
    touched: Instant,
}

/// In-memory implementation of SessionStore, bounded by an idle TTL and a
/// maximum number of sessions. When full, the least recently touched
/// session is evicted.
#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, StoredSession>>,
    ttl: Duration,
    capacity: usize,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().touched)
            .map(|entry| entry.key().clone());
        if let Some(id) = oldest {
            self.sessions.remove(&id);
            debug!(session_id = %id, "Evicted session at capacity");
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_SESSION_CAPACITY)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let expired = match self.sessions.get_mut(id) {
            Some(mut entry) => {
                if entry.touched.elapsed() > self.ttl {
                    true
                } else {
                    entry.touched = Instant::now();
                    return Ok(Some(entry.session.clone()));
                }
            }
            None => return Ok(None),
        };
        if expired {
            self.sessions.remove(id);
            debug!(session_id = %id, "Session expired");
        }
        Ok(None)
    }

    async fn put(&self, session: Session) -> Result<()> {
        if !self.sessions.contains_key(&session.id) && self.sessions.len() >= self.capacity {
            self.evict_oldest();
        }
        self.sessions.insert(
            session.id.clone(),
            StoredSession {
                session,
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn expire(&self) -> Result<usize> {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions.retain(|_, stored| stored.touched.elapsed() <= ttl);
        Ok(before.saturating_sub(self.sessions.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::classify::ScoringTables;

    fn session(id: &str) -> Session {
        let text = "Please process this.";
        Session::start(id, text, analyze(text, &ScoringTables::default()))
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let store = InMemorySessionStore::default();
        store.put(session("a")).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().map(|s| s.id), Some("a".to_string()));
        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_touched() {
        let store = InMemorySessionStore::new(DEFAULT_SESSION_TTL, 2);
        store.put(session("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.put(session("b")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.get("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.put(session("c")).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("b").await.unwrap().is_none());
        assert!(store.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = InMemorySessionStore::new(Duration::from_millis(10), 10);
        store.put(session("a")).await.unwrap();
        store.put(session("b")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.expire().await.unwrap(), 1);
        assert!(store.is_empty());
    }
}
