use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SourceType {
    Manual,
    Pomodoro,
    Youtube,
    Pdf,
    Notes,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Manual => "manual",
            SourceType::Pomodoro => "pomodoro",
            SourceType::Youtube => "youtube",
            SourceType::Pdf => "pdf",
            SourceType::Notes => "notes",
        }
    }
}

/// A persisted study session row.
///
/// `ended_at == None` means the session is active; at most one such row exists
/// per `user_id`. `updated_at` is the liveness marker refreshed by the heartbeat
/// and is `None` for rows written before the column existed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub user_id: String,
    pub source_type: SourceType,
    pub started_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    pub planned_duration_seconds: Option<u64>,
    pub tag: Option<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl StudySession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Timestamp used to judge whether an open session was abandoned.
    pub fn liveness_reference(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.started_at)
    }
}

/// In-memory projection of the active session held by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub source_type: SourceType,
    pub planned_duration_seconds: Option<u64>,
    pub tag: Option<String>,
}

impl From<StudySession> for ActiveSession {
    fn from(session: StudySession) -> Self {
        Self {
            id: session.id,
            started_at: session.started_at,
            updated_at: session.updated_at,
            source_type: session.source_type,
            planned_duration_seconds: session.planned_duration_seconds,
            tag: session.tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: String,
    pub source_type: SourceType,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub planned_duration_seconds: Option<u64>,
    pub tag: Option<String>,
}

/// Field sets the tracker writes to an existing row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionUpdate {
    /// Liveness renewal; only `updated_at` changes.
    Heartbeat { updated_at: DateTime<Utc> },
    /// Closes the row. `updated_at` is moved to `ended_at` as well.
    Finish {
        ended_at: DateTime<Utc>,
        duration_seconds: u64,
    },
}
