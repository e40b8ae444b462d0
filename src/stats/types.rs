use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionFilter {
    #[default]
    All,
    Manual,
    Pomodoro,
    Active,
    Completed,
}

/// Totals over a filtered history list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total_sessions: usize,
    pub total_seconds: u64,
    pub total_clock: String,
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudyTotals {
    pub weekly_session_seconds: u64,
    pub weekly_session_count: usize,
    pub today_session_seconds: u64,
    pub daily_goal_minutes: u32,
    pub daily_goal_percent: u8,
}
