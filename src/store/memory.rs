use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use super::SessionStore;
use crate::db::ACTIVE_SESSION_CONFLICT;
use crate::models::{NewSession, SessionUpdate, StudySession};

/// Session store kept entirely in process memory.
///
/// Applies the same rules as the SQLite store: one open session per user,
/// finishing is conditional on the row still being open.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<Mutex<Vec<StudySession>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with existing rows, e.g. sessions left open by a
    /// previous process.
    pub fn with_sessions(sessions: Vec<StudySession>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(sessions)),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<StudySession> {
        self.lock()
            .iter()
            .find(|session| session.id == session_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<StudySession> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StudySession>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_active(&self, user_id: &str) -> Result<Option<StudySession>> {
        Ok(self
            .lock()
            .iter()
            .filter(|session| session.user_id == user_id && session.is_active())
            .max_by_key(|session| session.started_at)
            .cloned())
    }

    async fn create(&self, new: NewSession) -> Result<StudySession> {
        let mut sessions = self.lock();
        if sessions
            .iter()
            .any(|session| session.user_id == new.user_id && session.is_active())
        {
            bail!(ACTIVE_SESSION_CONFLICT);
        }

        let session = StudySession {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            source_type: new.source_type,
            started_at: new.started_at,
            updated_at: Some(new.updated_at),
            ended_at: None,
            duration_seconds: 0,
            planned_duration_seconds: new.planned_duration_seconds,
            tag: new.tag,
            notes: String::new(),
            created_at: new.started_at,
        };
        sessions.push(session.clone());
        Ok(session)
    }

    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<()> {
        let mut sessions = self.lock();
        let session = sessions
            .iter_mut()
            .find(|session| session.id == session_id)
            .ok_or_else(|| anyhow!("study session {session_id} not found"))?;

        if !session.is_active() {
            return Ok(());
        }

        match update {
            SessionUpdate::Heartbeat { updated_at } => {
                session.updated_at = Some(updated_at);
            }
            SessionUpdate::Finish {
                ended_at,
                duration_seconds,
            } => {
                session.ended_at = Some(ended_at);
                session.updated_at = Some(ended_at);
                session.duration_seconds = duration_seconds;
            }
        }
        Ok(())
    }
}
