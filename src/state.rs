use chrono::Duration;
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::{
    password::PasswordHasher, reset_token::ResetTokenService, session_token::SessionTokenService,
};
use crate::error::Result;
use crate::repositories::{memory::InMemoryCredentialStore, user::CredentialStore};
use crate::services::delivery::{LogDelivery, ResetTokenDelivery};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// Where user records live.
    pub store: Arc<dyn CredentialStore>,
    /// Password hashing.
    pub hasher: PasswordHasher,
    /// Session token signer and verifier.
    pub sessions: Arc<SessionTokenService>,
    /// Password-reset token minting.
    pub resets: ResetTokenService,
    /// Out-of-band channel for reset tokens.
    pub reset_delivery: Arc<dyn ResetTokenDelivery>,
    /// Whether cookies are marked `Secure`.
    pub secure_cookies: bool,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// Connects to PostgreSQL and applies migrations when `DATABASE_URL` is
    /// set; otherwise users are kept in memory.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match &config.database_url {
            Some(url) => {
                let pool = crate::db::create_pool(url)?;
                crate::db::run_migrations(&pool).await?;
                tracing::info!("✅ PostgreSQL credential store initialized");
                Arc::new(crate::repositories::user::PgCredentialStore::new(pool))
            }
            None => {
                tracing::warn!("⚠️  DATABASE_URL not set, users are kept in memory");
                Arc::new(InMemoryCredentialStore::new())
            }
        };

        let sessions = SessionTokenService::new(
            &config.jwt_secret,
            Duration::hours(config.session_ttl_hours),
        )?;
        tracing::info!("✅ Session token service initialized");

        Ok(Self {
            store,
            hasher: PasswordHasher::default(),
            sessions: Arc::new(sessions),
            resets: ResetTokenService::default(),
            reset_delivery: Arc::new(LogDelivery),
            secure_cookies: config.secure_cookies,
        })
    }

    /// Builds state from already constructed parts.
    pub fn from_parts(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        sessions: SessionTokenService,
        reset_delivery: Arc<dyn ResetTokenDelivery>,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions: Arc::new(sessions),
            resets: ResetTokenService::default(),
            reset_delivery,
            secure_cookies: false,
        }
    }
}
