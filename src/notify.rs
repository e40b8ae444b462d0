use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

pub const COMPLETION_TITLE: &str = "Pomodoro complete";
pub const COMPLETION_BODY: &str = "Time is up. The session was ended automatically.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationPermission {
    Granted,
    Denied,
    Default,
    Unsupported,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    /// Prompts the user. Only called from a timed start, which is the one
    /// user gesture the tracker sees.
    async fn request_permission(&self) -> NotificationPermission;

    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Notifier that writes completion notifications to the application log.
pub struct LogNotifier {
    permission: Mutex<NotificationPermission>,
    grant_on_request: bool,
}

impl LogNotifier {
    pub fn new(permission: NotificationPermission, grant_on_request: bool) -> Self {
        Self {
            permission: Mutex::new(permission),
            grant_on_request,
        }
    }

    fn set(&self, value: NotificationPermission) {
        let mut guard = match self.permission.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = value;
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(NotificationPermission::Granted, true)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        match self.permission.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn request_permission(&self) -> NotificationPermission {
        let current = self.permission();
        if current != NotificationPermission::Default {
            return current;
        }

        let decided = if self.grant_on_request {
            NotificationPermission::Granted
        } else {
            NotificationPermission::Denied
        };
        self.set(decided);
        decided
    }

    fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!("[notification] {title}: {body}");
        Ok(())
    }
}
