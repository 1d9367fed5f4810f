use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

use crate::completion::CompletionClient;
use crate::config::DEFAULT_SESSION_IDLE_TTL;
use crate::error::Result;
use crate::workflow::{WorkflowController, WorkflowSettings};

/// One browser session and the workflow it drives
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub workflow: WorkflowController,
}

impl Session {
    pub fn new(client: Arc<dyn CompletionClient>, settings: WorkflowSettings) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            workflow: WorkflowController::new(client, settings),
        }
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

struct StoredSession {
    session: Session,
    last_seen: Instant,
}

impl StoredSession {
    fn is_idle(&self, idle_ttl: Duration) -> bool {
        self.last_seen.elapsed() > idle_ttl
    }
}

/// Sessions live only as long as the process, and only while they are used.
/// Each save sweeps out sessions idle for longer than the TTL; a lookup of an
/// idle session removes it.
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, StoredSession>>,
    idle_ttl: Duration,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::with_idle_ttl(DEFAULT_SESSION_IDLE_TTL)
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn sweep(&self) {
        let before = self.sessions.len();
        self.sessions.retain(|_, stored| !stored.is_idle(self.idle_ttl));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!(removed, "Expired idle sessions");
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sweep();
        self.sessions.insert(
            session.id.clone(),
            StoredSession {
                session,
                last_seen: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        match self.sessions.get_mut(id) {
            Some(mut stored) if !stored.is_idle(self.idle_ttl) => {
                stored.last_seen = Instant::now();
                return Ok(Some(stored.session.clone()));
            }
            Some(_) => {}
            None => return Ok(None),
        }

        self.sessions.remove_if(id, |_, stored| stored.is_idle(self.idle_ttl));
        info!(session_id = %id, "Session expired");
        Ok(None)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletionClient;
    use crate::models::CandidateDocument;
    use crate::workflow::WorkflowStatus;

    #[tokio::test]
    async fn stored_sessions_share_their_workflow() {
        let storage = InMemorySessionStorage::new();
        let created = session();
        let id = created.id.clone();
        storage.save(created).await.unwrap();

        let loaded = storage.get(&id).await.unwrap().unwrap();
        let candidate = CandidateDocument::from_bytes("a.pdf", "application/pdf", b"pdf".to_vec());
        loaded.workflow.select_document(candidate).unwrap();

        let again = storage.get(&id).await.unwrap().unwrap();
        assert_eq!(again.workflow.state().status(), WorkflowStatus::DocumentSelected);

        storage.delete(&id).await.unwrap();
        assert!(storage.get(&id).await.unwrap().is_none());
        assert!(storage.is_empty());
    }

    fn session() -> Session {
        Session::new(
            Arc::new(ScriptedCompletionClient::default()),
            WorkflowSettings::default(),
        )
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let storage = InMemorySessionStorage::with_idle_ttl(Duration::from_millis(20));
        let stale = session();
        let stale_id = stale.id.clone();
        storage.save(stale).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(storage.get(&stale_id).await.unwrap().is_none());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn saving_sweeps_idle_sessions() {
        let storage = InMemorySessionStorage::with_idle_ttl(Duration::from_millis(20));
        storage.save(session()).await.unwrap();
        storage.save(session()).await.unwrap();
        assert_eq!(storage.len(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let fresh = session();
        let fresh_id = fresh.id.clone();
        storage.save(fresh).await.unwrap();

        assert_eq!(storage.len(), 1);
        assert!(storage.get(&fresh_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lookups_keep_a_session_alive() {
        let storage = InMemorySessionStorage::with_idle_ttl(Duration::from_millis(200));
        let active = session();
        let id = active.id.clone();
        storage.save(active).await.unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert!(storage.get(&id).await.unwrap().is_some());
        }
    }
}
