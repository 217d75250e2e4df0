use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::user::User;
use crate::repositories::user::CredentialStore;

/// [`CredentialStore`] kept in process memory.
///
/// Used when no database is configured, and by tests.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a user outright. Test support; the service layer never deletes.
    pub async fn delete(&self, id: Uuid) -> Option<User> {
        self.users.write().await.remove(&id)
    }

    /// Number of stored users. Test support.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Test support.
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn save(&self, mut user: User) -> Result<User> {
        if user.has_pending_password() || user.credential.as_hash().is_empty() {
            return Err(AppError::Internal(
                "Refusing to store a user without a hashed credential".to_string(),
            ));
        }

        let mut users = self.users.write().await;

        if users
            .values()
            .any(|existing| existing.email == user.email && existing.id != user.id)
        {
            return Err(AppError::Conflict("User already exists".to_string()));
        }

        let mut updated_at = Utc::now();
        if let Some(existing) = users.get(&user.id) {
            if existing.updated_at != user.updated_at {
                return Err(stale_write());
            }
            updated_at = updated_at.max(existing.updated_at + Duration::microseconds(1));
        }

        user.updated_at = updated_at;
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

fn stale_write() -> AppError {
    AppError::Conflict("User was changed by another request".to_string())
}
