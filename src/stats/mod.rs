//! Session history filtering and study statistics.

mod types;

pub use types::{HistorySummary, SessionFilter, StudyTotals};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::models::{SourceType, StudySession};
use crate::utils::{format_clock, seconds_between};

pub const HISTORY_LIMIT: usize = 200;

/// Best known duration of a session: the recorded value when there is one,
/// otherwise the span up to its end (or up to `now` while still open).
pub fn resolve_duration(session: &StudySession, now: DateTime<Utc>) -> u64 {
    if session.duration_seconds > 0 {
        return session.duration_seconds;
    }
    let end = session.ended_at.unwrap_or(now);
    seconds_between(session.started_at, end)
}

impl SessionFilter {
    pub fn matches(&self, session: &StudySession) -> bool {
        match self {
            SessionFilter::All => true,
            SessionFilter::Manual => session.source_type == SourceType::Manual,
            SessionFilter::Pomodoro => session.source_type == SourceType::Pomodoro,
            SessionFilter::Active => session.is_active(),
            SessionFilter::Completed => !session.is_active(),
        }
    }
}

/// Applies the filter, then a case-insensitive query against source type,
/// tag and notes. A blank query matches everything.
pub fn filter_sessions<'a>(
    sessions: &'a [StudySession],
    filter: SessionFilter,
    query: &str,
) -> Vec<&'a StudySession> {
    let query = query.trim().to_lowercase();
    sessions
        .iter()
        .filter(|session| filter.matches(session))
        .filter(|session| {
            if query.is_empty() {
                return true;
            }
            session.source_type.as_str().contains(&query)
                || session
                    .tag
                    .as_deref()
                    .is_some_and(|tag| tag.to_lowercase().contains(&query))
                || session.notes.to_lowercase().contains(&query)
        })
        .collect()
}

pub fn summarize_history(sessions: &[&StudySession], now: DateTime<Utc>) -> HistorySummary {
    let total_seconds = sessions
        .iter()
        .map(|session| resolve_duration(session, now))
        .sum::<u64>();

    HistorySummary {
        total_sessions: sessions.len(),
        total_seconds,
        total_clock: format_clock(total_seconds.min(i64::MAX as u64) as i64),
        active_sessions: sessions.iter().filter(|session| session.is_active()).count(),
    }
}

fn local_midnight<Tz: TimeZone>(zone: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    zone.from_local_datetime(&midnight)
        .earliest()
        .map(|value| value.with_timezone(&Utc))
}

pub fn today_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    local_midnight(&now.timezone(), now.date_naive()).unwrap_or_else(|| now.with_timezone(&Utc))
}

/// Monday 00:00 of the week containing `now`, in `now`'s zone.
pub fn week_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let offset = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(offset);
    local_midnight(&now.timezone(), monday).unwrap_or_else(|| now.with_timezone(&Utc))
}

/// Start of the seven-day window the statistics are computed over.
pub fn seven_day_window_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let first_day = now.date_naive() - Duration::days(6);
    local_midnight(&now.timezone(), first_day).unwrap_or_else(|| now.with_timezone(&Utc))
}

pub fn study_totals<Tz: TimeZone>(
    sessions: &[StudySession],
    now: &DateTime<Tz>,
    daily_goal_minutes: u32,
) -> StudyTotals {
    let now_utc = now.with_timezone(&Utc);
    let week_start = week_start(now);
    let today_start = today_start(now);

    let mut weekly_session_seconds = 0;
    let mut weekly_session_count = 0;
    let mut today_session_seconds = 0;

    for session in sessions {
        let duration = resolve_duration(session, now_utc);
        if session.started_at >= week_start {
            weekly_session_seconds += duration;
            weekly_session_count += 1;
        }
        if session.started_at >= today_start {
            today_session_seconds += duration;
        }
    }

    let goal_seconds = (u64::from(daily_goal_minutes) * 60).max(1);
    let percent = (today_session_seconds as f64 / goal_seconds as f64 * 100.0).round();

    StudyTotals {
        weekly_session_seconds,
        weekly_session_count,
        today_session_seconds,
        daily_goal_minutes,
        daily_goal_percent: percent.min(100.0) as u8,
    }
}
