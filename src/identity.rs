use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` when the session has expired.
    async fn current_user(&self) -> Option<CurrentUser>;
}

/// Identity held in process, switched by the embedding application on
/// sign-in and sign-out.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: RwLock<Option<CurrentUser>>,
}

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user: RwLock::new(Some(CurrentUser { id: user_id.into() })),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn set_user(&self, user: Option<CurrentUser>) {
        let mut guard = match self.user.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = user;
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<CurrentUser> {
        match self.user.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
