//! Study session tracking for a personal study workspace.
//!
//! The centerpiece is [`SessionTracker`], which keeps at most one timed or
//! open-ended study session active per user, renews a liveness marker while
//! the session runs, closes sessions abandoned by a crashed process, and
//! stops timed sessions once they reach their planned duration.

pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod notify;
pub mod settings;
pub mod stats;
pub mod store;
pub mod timer;
pub mod utils;

use std::{path::Path, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use log::info;

pub use db::Database;
pub use error::TrackerError;
pub use identity::{CurrentUser, IdentityProvider, StaticIdentity};
pub use models::{ActiveSession, SourceType, StudySession};
pub use notify::{LogNotifier, NotificationPermission, Notifier};
pub use settings::{SettingsStore, TrackerSettings};
pub use stats::{HistorySummary, SessionFilter, StudyTotals};
pub use store::{MemoryStore, SessionStore};
pub use timer::{
    SessionMode, SessionTracker, StartRequest, StopOptions, StopOutcome, TrackerSnapshot,
    TrackerStatus,
};
pub use utils::init_logging;

/// Everything an application shell needs for one data directory.
pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub tracker: SessionTracker,
    identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Opens the database and settings under `data_dir` and builds a tracker
    /// on top of them. The tracker still has to be mounted.
    pub fn open(
        data_dir: &Path,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        init_logging();
        std::fs::create_dir_all(data_dir)?;

        let db = Database::new(data_dir.join("studydesk.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let tracker_settings = settings.tracker().with_env_overrides();

        let tracker = SessionTracker::new(
            Arc::new(db.clone()),
            identity.clone(),
            notifier,
            tracker_settings,
        );

        info!("Study workspace opened at {}", data_dir.display());

        Ok(Self {
            db,
            settings,
            tracker,
            identity,
        })
    }

    async fn user_id(&self) -> Result<String> {
        self.identity
            .current_user()
            .await
            .map(|user| user.id)
            .ok_or_else(|| anyhow::Error::new(TrackerError::IdentityUnavailable))
    }

    /// Recent sessions of the signed-in user, filtered and summarized.
    pub async fn history(
        &self,
        filter: SessionFilter,
        query: &str,
        now: DateTime<Utc>,
    ) -> Result<(Vec<StudySession>, HistorySummary)> {
        let user_id = self.user_id().await?;
        let sessions = self.db.list_sessions(&user_id, stats::HISTORY_LIMIT).await?;
        let filtered = stats::filter_sessions(&sessions, filter, query);
        let summary = stats::summarize_history(&filtered, now);
        let filtered = filtered.into_iter().cloned().collect();
        Ok((filtered, summary))
    }

    pub async fn study_totals<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<StudyTotals> {
        let user_id = self.user_id().await?;
        let since = stats::seven_day_window_start(now);
        let sessions = self.db.list_sessions_started_since(&user_id, since).await?;
        let goal = self.settings.tracker().daily_goal_minutes;
        Ok(stats::study_totals(&sessions, now, goal))
    }
}
