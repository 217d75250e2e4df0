use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::user::User;

/// Hands a freshly minted reset token to the user out of band.
#[async_trait]
pub trait ResetTokenDelivery: Send + Sync {
    async fn deliver(&self, user: &User, plaintext: &str, expires_at: DateTime<Utc>) -> Result<()>;
}

/// Records that a token was issued without recording the token.
pub struct LogDelivery;

#[async_trait]
impl ResetTokenDelivery for LogDelivery {
    async fn deliver(&self, user: &User, _plaintext: &str, expires_at: DateTime<Utc>) -> Result<()> {
        tracing::info!(
            user_id = %user.id,
            %expires_at,
            "📧 Password reset token issued (no mail transport configured)"
        );
        Ok(())
    }
}

/// Keeps delivered tokens in memory so tests can redeem them.
///
/// Test support only: it holds plaintext tokens, so the server never wires it
/// in (`AppState::new` uses [`LogDelivery`]).
#[derive(Default)]
pub struct CapturingDelivery {
    delivered: Mutex<Vec<(Uuid, String)>>,
}

impl CapturingDelivery {
    /// The most recent token delivered to `user_id`.
    pub fn last_for(&self, user_id: Uuid) -> Option<String> {
        self.delivered
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|(id, _)| *id == user_id)
            .map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl ResetTokenDelivery for CapturingDelivery {
    async fn deliver(&self, user: &User, plaintext: &str, _expires_at: DateTime<Utc>) -> Result<()> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push((user.id, plaintext.to_string()));
        }
        Ok(())
    }
}
