use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerSettings {
    pub tick_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
    /// Open sessions whose liveness marker is older than this are closed on load.
    pub stale_after_secs: u64,
    pub pomodoro_presets: Vec<u32>,
    pub custom_minutes_min: u32,
    pub custom_minutes_max: u32,
    pub tag_max_chars: usize,
    pub daily_goal_minutes: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            heartbeat_interval_secs: 60,
            stale_after_secs: 300,
            pomodoro_presets: vec![25, 5],
            custom_minutes_min: 1,
            custom_minutes_max: 180,
            tag_max_chars: 60,
            daily_goal_minutes: 120,
        }
    }
}

impl TrackerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs.min(i64::MAX as u64) as i64)
    }

    /// `STUDYDESK_DEBUG=1` heartbeats on every tick so recovery can be
    /// exercised without waiting a minute.
    pub fn with_env_overrides(mut self) -> Self {
        let debug_mode = std::env::var("STUDYDESK_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if debug_mode {
            self.heartbeat_interval_secs = (self.tick_interval_ms / 1_000).max(1);
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    tracker: TrackerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn tracker(&self) -> TrackerSettings {
        match self.data.read() {
            Ok(guard) => guard.tracker.clone(),
            Err(poisoned) => poisoned.into_inner().tracker.clone(),
        }
    }

    pub fn update_tracker(&self, settings: TrackerSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.tracker = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
