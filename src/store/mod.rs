//! Persistence contract consumed by the session tracker.

use anyhow::Result;
use async_trait::async_trait;

use crate::db::Database;
use crate::models::{NewSession, SessionUpdate, StudySession};

mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The single open session of `user_id`, most recent start first.
    async fn find_active(&self, user_id: &str) -> Result<Option<StudySession>>;

    /// Inserts an open session. Must fail if the user already has one open.
    async fn create(&self, new: NewSession) -> Result<StudySession>;

    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<()>;
}

#[async_trait]
impl SessionStore for Database {
    async fn find_active(&self, user_id: &str) -> Result<Option<StudySession>> {
        self.find_active_session(user_id).await
    }

    async fn create(&self, new: NewSession) -> Result<StudySession> {
        self.insert_session(new).await
    }

    async fn update(&self, session_id: &str, update: SessionUpdate) -> Result<()> {
        self.apply_session_update(session_id, update).await
    }
}
