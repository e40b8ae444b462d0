use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    helpers::{
        format_datetime, parse_datetime, parse_optional_datetime, parse_source_type, to_i64,
        to_u64,
    },
    Database,
};
use crate::models::{NewSession, SessionUpdate, StudySession};

pub const ACTIVE_SESSION_CONFLICT: &str = "another study session is already active";

const SESSION_COLUMNS: &str = "id, user_id, source_type, started_at, updated_at, ended_at, \
     duration_seconds, planned_duration_seconds, tag, notes, created_at";

fn row_to_session(row: &Row) -> Result<StudySession> {
    let source_type: String = row.get("source_type")?;
    let started_at: String = row.get("started_at")?;
    let updated_at: Option<String> = row.get("updated_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let duration_seconds: i64 = row.get("duration_seconds")?;
    let planned: Option<i64> = row.get("planned_duration_seconds")?;
    let created_at: String = row.get("created_at")?;

    Ok(StudySession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        source_type: parse_source_type(&source_type)?,
        started_at: parse_datetime(&started_at, "started_at")?,
        updated_at: parse_optional_datetime(updated_at, "updated_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        duration_seconds: to_u64(duration_seconds, "duration_seconds")?,
        planned_duration_seconds: planned
            .map(|value| to_u64(value, "planned_duration_seconds"))
            .transpose()?,
        tag: row.get("tag")?,
        notes: row.get("notes")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl Database {
    /// Inserts a new open session. Fails if the user already has one; the
    /// partial unique index makes the check and the insert a single step.
    pub async fn insert_session(&self, new: NewSession) -> Result<StudySession> {
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

        let record = session.clone();
        self.execute(move |conn| {
            let planned = record.planned_duration_seconds.map(to_i64).transpose()?;
            let result = conn.execute(
                "INSERT INTO study_sessions (id, user_id, source_type, started_at, updated_at, planned_duration_seconds, tag, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.user_id,
                    record.source_type.as_str(),
                    format_datetime(&record.started_at),
                    record.updated_at.as_ref().map(format_datetime),
                    planned,
                    record.tag,
                    format_datetime(&record.created_at),
                ],
            );

            match result {
                Ok(_) => Ok(()),
                Err(err) if is_unique_violation(&err) => bail!(ACTIVE_SESSION_CONFLICT),
                Err(err) => Err(anyhow::Error::new(err).context("failed to insert study session")),
            }
        })
        .await?;

        Ok(session)
    }

    pub async fn find_active_session(&self, user_id: &str) -> Result<Option<StudySession>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM study_sessions
                 WHERE user_id = ?1 AND ended_at IS NULL
                 ORDER BY started_at DESC
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query(params![user_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<StudySession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = ?1"
            ))?;

            let mut rows = stmt.query(params![session_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn touch_session(&self, session_id: &str, updated_at: DateTime<Utc>) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE study_sessions
                 SET updated_at = ?1
                 WHERE id = ?2 AND ended_at IS NULL",
                params![format_datetime(&updated_at), session_id],
            )
            .context("failed to record session heartbeat")?;
            Ok(())
        })
        .await
    }

    /// Closes an open session. Finishing a row that is already closed leaves
    /// it untouched and succeeds.
    pub async fn finish_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
        duration_seconds: u64,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let ended = format_datetime(&ended_at);
            let rows_affected = conn
                .execute(
                    "UPDATE study_sessions
                     SET ended_at = ?1,
                         updated_at = ?1,
                         duration_seconds = ?2
                     WHERE id = ?3 AND ended_at IS NULL",
                    params![ended, to_i64(duration_seconds)?, session_id],
                )
                .context("failed to finish study session")?;

            if rows_affected == 0 {
                let exists: Option<String> = conn
                    .query_row(
                        "SELECT id FROM study_sessions WHERE id = ?1",
                        params![session_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                if exists.is_none() {
                    return Err(anyhow!("study session {session_id} not found"));
                }
            }

            Ok(())
        })
        .await
    }

    pub async fn apply_session_update(&self, session_id: &str, update: SessionUpdate) -> Result<()> {
        match update {
            SessionUpdate::Heartbeat { updated_at } => {
                self.touch_session(session_id, updated_at).await
            }
            SessionUpdate::Finish {
                ended_at,
                duration_seconds,
            } => {
                self.finish_session(session_id, ended_at, duration_seconds)
                    .await
            }
        }
    }

    /// Most recent sessions of a user, newest first.
    pub async fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<StudySession>> {
        let user_id = user_id.to_string();
        let limit = limit as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM study_sessions
                 WHERE user_id = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2"
            ))?;

            let mut rows = stmt.query(params![user_id, limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    pub async fn list_sessions_started_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StudySession>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM study_sessions
                 WHERE user_id = ?1 AND started_at >= ?2
                 ORDER BY started_at DESC"
            ))?;

            let mut rows = stmt.query(params![user_id, format_datetime(&since)])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    /// Free-form note attached to a session from the history view.
    pub async fn update_session_notes(&self, session_id: &str, notes: String) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE study_sessions SET notes = ?1 WHERE id = ?2",
                params![notes, session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }

            Ok(())
        })
        .await
    }
}
