//! Errors returned by tracker operations.
//!
//! The `Display` text of each variant is the short message shown to the user.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Session info unavailable. Please sign in again.")]
    IdentityUnavailable,

    #[error("A study session is already running.")]
    AlreadyActive,

    #[error("Another session operation is still in progress.")]
    Busy,

    #[error("Session state is still loading.")]
    NotReady,

    #[error("Unknown pomodoro preset: {0} minutes.")]
    UnknownPreset(u32),

    #[error("{0}")]
    Store(String),
}

impl TrackerError {
    pub(crate) fn store(err: anyhow::Error) -> Self {
        TrackerError::Store(err.to_string())
    }
}
