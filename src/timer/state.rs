use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::models::{ActiveSession, SourceType, StudySession};
use crate::settings::TrackerSettings;
use crate::utils::seconds_between;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    Loading,
    Idle,
    Active,
}

/// Auto-stop progress of one active session. Lives inside `ActiveState`, so
/// a new session always starts `Armed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AutoStop {
    Armed,
    /// Notification sent and stop requested; never fires again for this session.
    Triggered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveState {
    pub session: ActiveSession,
    pub elapsed_seconds: u64,
    pub auto_stop: AutoStop,
    /// Shown once the triggered auto-stop has been written.
    pub completion_message: Option<String>,
}

impl ActiveState {
    pub fn new(session: ActiveSession, now: DateTime<Utc>) -> Self {
        let mut state = Self {
            session,
            elapsed_seconds: 0,
            auto_stop: AutoStop::Armed,
            completion_message: None,
        };
        state.sync_elapsed(now);
        state
    }

    pub fn sync_elapsed(&mut self, now: DateTime<Utc>) {
        self.elapsed_seconds = seconds_between(self.session.started_at, now);
    }

    pub fn planned_seconds(&self) -> Option<u64> {
        self.session.planned_duration_seconds.filter(|planned| *planned > 0)
    }

    /// Elapsed time capped at the planned duration, for display.
    pub fn display_seconds(&self) -> u64 {
        match self.planned_seconds() {
            Some(planned) => self.elapsed_seconds.min(planned),
            None => self.elapsed_seconds,
        }
    }

    pub fn completion_percent(&self) -> Option<u8> {
        self.planned_seconds().map(|planned| {
            let ratio = self.display_seconds() as f64 / planned as f64;
            (ratio * 100.0).round().min(100.0) as u8
        })
    }

    /// Moves to `Triggered` the first time elapsed reaches the plan and
    /// returns the planned duration to record. Later calls return `None`.
    pub fn try_trigger_auto_stop(&mut self) -> Option<u64> {
        if self.auto_stop != AutoStop::Armed {
            return None;
        }
        let planned = self.planned_seconds()?;
        if self.elapsed_seconds < planned {
            return None;
        }
        self.auto_stop = AutoStop::Triggered;
        Some(planned)
    }

    /// Duration to write when the session is stopped now. Once auto-stop has
    /// triggered, any stop records the plan rather than the live elapsed time.
    pub fn stop_duration(&self) -> u64 {
        match (self.auto_stop, self.planned_seconds()) {
            (AutoStop::Triggered, Some(planned)) => planned,
            _ => self.elapsed_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerState {
    Loading,
    Idle,
    Active(ActiveState),
}

impl TrackerState {
    pub fn status(&self) -> TrackerStatus {
        match self {
            TrackerState::Loading => TrackerStatus::Loading,
            TrackerState::Idle => TrackerStatus::Idle,
            TrackerState::Active(_) => TrackerStatus::Active,
        }
    }

    pub fn active(&self) -> Option<&ActiveState> {
        match self {
            TrackerState::Active(active) => Some(active),
            _ => None,
        }
    }

    /// Active state, only if it still belongs to `session_id`.
    pub fn active_for(&mut self, session_id: &str) -> Option<&mut ActiveState> {
        match self {
            TrackerState::Active(active) if active.session.id == session_id => Some(active),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "minutes")]
pub enum SessionMode {
    Manual,
    Preset(u32),
    Custom(u32),
}

impl SessionMode {
    pub fn is_timed(&self) -> bool {
        !matches!(self, SessionMode::Manual)
    }

    pub fn source_type(&self) -> SourceType {
        if self.is_timed() {
            SourceType::Pomodoro
        } else {
            SourceType::Manual
        }
    }

    pub fn planned_duration_seconds(
        &self,
        settings: &TrackerSettings,
    ) -> Result<Option<u64>, TrackerError> {
        match *self {
            SessionMode::Manual => Ok(None),
            SessionMode::Preset(minutes) => {
                if !settings.pomodoro_presets.contains(&minutes) {
                    return Err(TrackerError::UnknownPreset(minutes));
                }
                Ok(Some(u64::from(minutes) * 60))
            }
            SessionMode::Custom(minutes) => {
                let clamped = minutes
                    .max(settings.custom_minutes_min)
                    .min(settings.custom_minutes_max);
                Ok(Some(u64::from(clamped) * 60))
            }
        }
    }
}

/// Trims and truncates a user tag; blank input becomes `None`.
pub fn normalize_tag(raw: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let truncated: String = trimmed.chars().take(max_chars).collect();
    let truncated = truncated.trim_end();
    if truncated.is_empty() {
        None
    } else {
        Some(truncated.to_string())
    }
}

/// Outcome of checking an open session found at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Fresh,
    /// Abandoned; close it at its last sign of life.
    Stale {
        ended_at: DateTime<Utc>,
        duration_seconds: u64,
    },
}

pub fn assess_liveness(
    session: &StudySession,
    now: DateTime<Utc>,
    stale_after: chrono::Duration,
) -> Liveness {
    let reference = session.liveness_reference();
    if now - reference > stale_after {
        Liveness::Stale {
            ended_at: reference,
            duration_seconds: seconds_between(session.started_at, reference),
        }
    } else {
        Liveness::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap()
    }

    fn active(planned: Option<u64>) -> ActiveSession {
        ActiveSession {
            id: "s1".into(),
            started_at: base(),
            updated_at: Some(base()),
            source_type: SourceType::Pomodoro,
            planned_duration_seconds: planned,
            tag: None,
        }
    }

    fn row(updated_at: Option<DateTime<Utc>>) -> StudySession {
        StudySession {
            id: "s1".into(),
            user_id: "u1".into(),
            source_type: SourceType::Manual,
            started_at: base(),
            updated_at,
            ended_at: None,
            duration_seconds: 0,
            planned_duration_seconds: None,
            tag: None,
            notes: String::new(),
            created_at: base(),
        }
    }

    #[test]
    fn display_is_clamped_to_plan() {
        let mut state = ActiveState::new(active(Some(60)), base());
        state.sync_elapsed(base() + Duration::seconds(75));
        assert_eq!(state.elapsed_seconds, 75);
        assert_eq!(state.display_seconds(), 60);
        assert_eq!(state.completion_percent(), Some(100));
    }

    #[test]
    fn open_ended_sessions_have_no_completion() {
        let mut state = ActiveState::new(active(None), base());
        state.sync_elapsed(base() + Duration::seconds(4000));
        assert_eq!(state.display_seconds(), 4000);
        assert_eq!(state.completion_percent(), None);
    }

    #[test]
    fn completion_rounds_to_nearest_percent() {
        let mut state = ActiveState::new(active(Some(1500)), base());
        state.sync_elapsed(base() + Duration::seconds(751));
        assert_eq!(state.completion_percent(), Some(50));
    }

    #[test]
    fn elapsed_never_goes_negative_on_clock_skew() {
        let state = ActiveState::new(active(None), base() - Duration::seconds(30));
        assert_eq!(state.elapsed_seconds, 0);
    }

    #[test]
    fn auto_stop_triggers_once() {
        let mut state = ActiveState::new(active(Some(60)), base());
        state.sync_elapsed(base() + Duration::seconds(59));
        assert_eq!(state.try_trigger_auto_stop(), None);

        state.sync_elapsed(base() + Duration::seconds(61));
        assert_eq!(state.try_trigger_auto_stop(), Some(60));
        assert_eq!(state.auto_stop, AutoStop::Triggered);

        state.sync_elapsed(base() + Duration::seconds(62));
        assert_eq!(state.try_trigger_auto_stop(), None);
    }

    #[test]
    fn stop_after_trigger_records_the_plan() {
        let mut state = ActiveState::new(active(Some(60)), base());
        state.sync_elapsed(base() + Duration::seconds(45));
        assert_eq!(state.stop_duration(), 45);

        state.sync_elapsed(base() + Duration::seconds(64));
        assert_eq!(state.try_trigger_auto_stop(), Some(60));
        state.sync_elapsed(base() + Duration::seconds(66));
        assert_eq!(state.stop_duration(), 60);
    }

    #[test]
    fn zero_plan_never_auto_stops() {
        let mut state = ActiveState::new(active(Some(0)), base());
        state.sync_elapsed(base() + Duration::seconds(10));
        assert_eq!(state.try_trigger_auto_stop(), None);
        assert_eq!(state.completion_percent(), None);
    }

    #[test]
    fn tags_are_trimmed_truncated_and_blank_is_none() {
        assert_eq!(
            normalize_tag(Some("  research "), 60).as_deref(),
            Some("research")
        );
        assert_eq!(normalize_tag(Some(""), 60), None);
        assert_eq!(normalize_tag(Some("   \t "), 60), None);
        assert_eq!(normalize_tag(None, 60), None);

        let long = "x".repeat(75);
        assert_eq!(normalize_tag(Some(&long), 60).unwrap().chars().count(), 60);

        let accented = "ö".repeat(61);
        assert_eq!(normalize_tag(Some(&accented), 60).unwrap(), "ö".repeat(60));
    }

    #[test]
    fn modes_map_to_source_and_plan() {
        let settings = TrackerSettings::default();
        assert_eq!(SessionMode::Manual.planned_duration_seconds(&settings), Ok(None));
        assert_eq!(SessionMode::Manual.source_type(), SourceType::Manual);

        assert_eq!(
            SessionMode::Preset(25).planned_duration_seconds(&settings),
            Ok(Some(1500))
        );
        assert_eq!(SessionMode::Preset(25).source_type(), SourceType::Pomodoro);
        assert_eq!(
            SessionMode::Preset(40).planned_duration_seconds(&settings),
            Err(TrackerError::UnknownPreset(40))
        );

        assert_eq!(
            SessionMode::Custom(0).planned_duration_seconds(&settings),
            Ok(Some(60))
        );
        assert_eq!(
            SessionMode::Custom(500).planned_duration_seconds(&settings),
            Ok(Some(180 * 60))
        );
    }

    #[test]
    fn staleness_threshold_is_strict() {
        let stale_after = Duration::seconds(300);

        let fresh = row(Some(base() + Duration::seconds(600)));
        let now = base() + Duration::seconds(600 + 299);
        assert_eq!(assess_liveness(&fresh, now, stale_after), Liveness::Fresh);

        let now = base() + Duration::seconds(600 + 301);
        assert_eq!(
            assess_liveness(&fresh, now, stale_after),
            Liveness::Stale {
                ended_at: base() + Duration::seconds(600),
                duration_seconds: 600,
            }
        );
    }

    #[test]
    fn missing_liveness_marker_falls_back_to_start() {
        let legacy = row(None);
        let now = base() + Duration::seconds(301);
        assert_eq!(
            assess_liveness(&legacy, now, Duration::seconds(300)),
            Liveness::Stale {
                ended_at: base(),
                duration_seconds: 0,
            }
        );
    }
}
