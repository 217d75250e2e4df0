use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::user::{Credential, User, normalize_email};
use crate::state::AppState;

/// `last_active_at` is only written when it is older than this.
const ACTIVITY_RESOLUTION_SECS: i64 = 60;

/// Saves a user, hashing the password first if one was set since the last save.
///
/// This is the only place a credential gets hashed. A user whose credential is
/// already a hash goes to the store untouched.
pub async fn save_user(state: &AppState, mut user: User) -> Result<User> {
    if let Some(plaintext) = user.take_pending_password() {
        let hash = state.hasher.hash_blocking(plaintext.to_string()).await?;
        user.credential = Credential::from_hash(hash);
        tracing::debug!("🔐 Credential re-hashed for user: {}", user.id);
    }

    state.store.save(user).await
}

/// Creates a new user.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `name` - The user's display name.
/// * `email` - The user's email address.
/// * `password` - The user's password.
///
/// # Returns
///
/// A `Result` containing the created `User`.
pub async fn create_user(
    state: &AppState,
    name: String,
    email: &str,
    password: String,
) -> Result<User> {
    let email = normalize_email(email);
    tracing::debug!("🔐 Creating user");

    if state.store.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let user = save_user(state, User::new(name, &email, password)).await?;

    tracing::info!("✅ User created with ID: {}", user.id);
    Ok(user)
}

/// Authenticates a user.
///
/// Unknown email and wrong password produce the same error and cost the same
/// Argon2 work.
pub async fn authenticate_user(state: &AppState, email: &str, password: String) -> Result<User> {
    let email = normalize_email(email);

    let Some(user) = state.store.find_by_email(&email).await? else {
        let _ = state
            .hasher
            .verify_blocking(password, state.hasher.dummy_hash().to_string())
            .await;
        return Err(AppError::Unauthenticated(
            "Invalid email or password".to_string(),
        ));
    };

    if !state
        .hasher
        .verify_blocking(password, user.credential.as_hash().to_string())
        .await?
    {
        return Err(AppError::Unauthenticated(
            "Invalid email or password".to_string(),
        ));
    }

    tracing::info!("✅ User authenticated: {}", user.id);

    Ok(user)
}

/// Changes a user's password after checking the current one.
pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    old_password: String,
    new_password: String,
) -> Result<()> {
    tracing::info!("🔑 Changing password for user: {}", user_id);

    let mut user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if !state
        .hasher
        .verify_blocking(old_password, user.credential.as_hash().to_string())
        .await?
    {
        return Err(AppError::Unauthenticated(
            "Invalid current password".to_string(),
        ));
    }

    user.set_password(new_password);
    user.clear_reset_token();
    save_user(state, user).await?;

    tracing::info!("✅ Password changed for user: {}", user_id);

    Ok(())
}

/// Mints a reset token for the account behind `email`, if there is one.
///
/// The digest and expiry are saved on the user and the plaintext goes to the
/// delivery channel. Returns the user it was issued for. Fails with
/// [`AppError::Conflict`] if the account changed after it was read.
pub async fn request_password_reset(state: &AppState, email: &str) -> Result<Option<User>> {
    let email = normalize_email(email);

    let Some(mut user) = state.store.find_by_email(&email).await? else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(None);
    };

    let token = state.resets.generate();
    user.reset_token_digest = Some(token.digest.clone());
    user.reset_token_expires_at = Some(token.expires_at);
    let user = state.store.save(user).await?;

    state
        .reset_delivery
        .deliver(&user, &token.plaintext, token.expires_at)
        .await?;

    tracing::info!("🔑 Password reset token issued for user: {}", user.id);
    Ok(Some(user))
}

/// Redeems a reset token and replaces the password.
///
/// The digest is cleared in the same save that stores the new credential, so a
/// token works once. An expired token is cleared too and reported as expired.
pub async fn reset_password(
    state: &AppState,
    email: &str,
    token: &str,
    new_password: String,
) -> Result<User> {
    let email = normalize_email(email);

    let mut user = state
        .store
        .find_by_email(&email)
        .await?
        .ok_or(AppError::InvalidToken)?;

    let (Some(digest), Some(expires_at)) =
        (user.reset_token_digest.clone(), user.reset_token_expires_at)
    else {
        return Err(AppError::InvalidToken);
    };

    match state.resets.validate(token, &digest, expires_at) {
        Ok(true) => {}
        Ok(false) => return Err(AppError::InvalidToken),
        Err(AppError::ExpiredToken) => {
            user.clear_reset_token();
            if let Err(e) = state.store.save(user).await {
                tracing::warn!("Failed to clear expired reset token: {}", e);
            }
            return Err(AppError::ExpiredToken);
        }
        Err(e) => return Err(e),
    }

    user.set_password(new_password);
    user.clear_reset_token();
    let user = save_user(state, user).await?;

    tracing::info!("✅ Password reset for user: {}", user.id);
    Ok(user)
}

/// Bumps `last_active_at`. Best effort: failures are logged and dropped.
///
/// `user` may be a copy read some time ago. If anything else saved the account
/// since, the store rejects the write, so the bump never reverts a credential
/// change or brings back a consumed reset token.
pub async fn record_activity(state: &AppState, user: &User) {
    let now = Utc::now();
    if now - user.last_active_at < Duration::seconds(ACTIVITY_RESOLUTION_SECS) {
        return;
    }

    let mut touched = user.clone();
    touched.last_active_at = now;
    if let Err(e) = state.store.save(touched).await {
        tracing::debug!("Could not record activity for user {}: {}", user.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::password::{HashCost, PasswordHasher};
    use crate::crypto::session_token::SessionTokenService;
    use crate::repositories::memory::InMemoryCredentialStore;
    use crate::repositories::user::CredentialStore;
    use crate::services::delivery::CapturingDelivery;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Serves one fixed snapshot from `find_by_email`, as a request that read
    /// the account before a concurrent write would see it.
    struct SnapshotReads {
        inner: InMemoryCredentialStore,
        snapshot: User,
    }

    #[async_trait]
    impl CredentialStore for SnapshotReads {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_email(&self, _email: &str) -> Result<Option<User>> {
            Ok(Some(self.snapshot.clone()))
        }

        async fn save(&self, user: User) -> Result<User> {
            self.inner.save(user).await
        }
    }

    fn test_state() -> (AppState, Arc<CapturingDelivery>) {
        state_over(Arc::new(InMemoryCredentialStore::new()))
    }

    fn test_state_with(store: &InMemoryCredentialStore) -> (AppState, Arc<CapturingDelivery>) {
        state_over(Arc::new(store.clone()))
    }

    fn state_over(store: Arc<dyn CredentialStore>) -> (AppState, Arc<CapturingDelivery>) {
        let delivery = Arc::new(CapturingDelivery::default());
        let state = AppState::from_parts(
            store,
            PasswordHasher::new(HashCost::minimal()),
            SessionTokenService::new(b"test-secret-key-that-is-at-least-32-chars", Duration::hours(24))
                .unwrap(),
            delivery.clone(),
        );
        (state, delivery)
    }

    #[tokio::test]
    async fn create_then_authenticate() {
        let (state, _) = test_state();
        let user = create_user(&state, "Ada".into(), "Ada@Example.com", "analytical".into())
            .await
            .unwrap();

        assert!(user.credential.as_hash().starts_with("$argon2id$"));

        let authed = authenticate_user(&state, "ada@example.com", "analytical".into())
            .await
            .unwrap();
        assert_eq!(authed.id, user.id);

        let wrong = authenticate_user(&state, "ada@example.com", "wrong-password".into()).await;
        assert!(matches!(wrong, Err(AppError::Unauthenticated(_))));

        let unknown = authenticate_user(&state, "bob@example.com", "analytical".into()).await;
        assert!(matches!(unknown, Err(AppError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (state, _) = test_state();
        create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();

        let again = create_user(&state, "Ada".into(), "ADA@example.com", "analytical".into()).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_storing() {
        let (state, _) = test_state();
        let result = create_user(&state, "Ada".into(), "ada@example.com", "short".into()).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(state.store.find_by_email("ada@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saving_without_a_new_password_keeps_the_hash() {
        let (state, _) = test_state();
        let user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();
        let original_hash = user.credential.as_hash().to_string();

        let mut renamed = user.clone();
        renamed.name = "Ada L.".into();
        let saved = save_user(&state, renamed).await.unwrap();

        assert_eq!(saved.credential.as_hash(), original_hash);
        assert!(authenticate_user(&state, "ada@example.com", "analytical".into())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let (state, _) = test_state();
        let user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();

        let bad = change_password(&state, user.id, "nope-nope".into(), "brand-new-pass".into()).await;
        assert!(matches!(bad, Err(AppError::Unauthenticated(_))));

        change_password(&state, user.id, "analytical".into(), "brand-new-pass".into())
            .await
            .unwrap();

        assert!(authenticate_user(&state, "ada@example.com", "brand-new-pass".into())
            .await
            .is_ok());
        assert!(authenticate_user(&state, "ada@example.com", "analytical".into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn reset_token_works_exactly_once() {
        let (state, delivery) = test_state();
        let user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();

        request_password_reset(&state, "ada@example.com").await.unwrap();
        let token = delivery.last_for(user.id).unwrap();

        let stored = state.store.find_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(stored.reset_token_digest.as_deref(), Some(token.as_str()));

        reset_password(&state, "ada@example.com", &token, "after-reset-1".into())
            .await
            .unwrap();

        let cleared = state.store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(cleared.reset_token_digest.is_none());
        assert!(cleared.reset_token_expires_at.is_none());

        let second = reset_password(&state, "ada@example.com", &token, "after-reset-2".into()).await;
        assert!(matches!(second, Err(AppError::InvalidToken)));

        assert!(authenticate_user(&state, "ada@example.com", "after-reset-1".into())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn wrong_reset_token_is_invalid_and_kept() {
        let (state, _) = test_state();
        let user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();
        request_password_reset(&state, "ada@example.com").await.unwrap();

        let result = reset_password(&state, "ada@example.com", "deadbeef", "whatever-pass".into()).await;
        assert!(matches!(result, Err(AppError::InvalidToken)));

        let stored = state.store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.reset_token_digest.is_some());
    }

    #[tokio::test]
    async fn expired_reset_token_is_cleared() {
        let (state, delivery) = test_state();
        let user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();
        request_password_reset(&state, "ada@example.com").await.unwrap();
        let token = delivery.last_for(user.id).unwrap();

        let mut stored = state.store.find_by_id(user.id).await.unwrap().unwrap();
        stored.reset_token_expires_at = Some(Utc::now() - Duration::minutes(1));
        state.store.save(stored).await.unwrap();

        let result = reset_password(&state, "ada@example.com", &token, "after-reset".into()).await;
        assert!(matches!(result, Err(AppError::ExpiredToken)));

        let cleared = state.store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(cleared.reset_token_digest.is_none());
        assert!(authenticate_user(&state, "ada@example.com", "analytical".into())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn reset_for_unknown_email_is_silent() {
        let (state, _) = test_state();
        assert!(request_password_reset(&state, "ghost@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn activity_is_throttled() {
        let (state, _) = test_state();
        let mut user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();

        let recent = user.last_active_at;
        record_activity(&state, &user).await;
        let stored = state.store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.last_active_at, recent);

        user.last_active_at = Utc::now() - Duration::hours(1);
        record_activity(&state, &user).await;
        let stored = state.store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.last_active_at > user.last_active_at);
    }

    #[tokio::test]
    async fn activity_from_an_old_copy_does_not_undo_a_reset() {
        let (state, delivery) = test_state();
        let user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();
        let mut stale = state.store.find_by_id(user.id).await.unwrap().unwrap();
        stale.last_active_at = Utc::now() - Duration::hours(1);

        request_password_reset(&state, "ada@example.com").await.unwrap();
        let token = delivery.last_for(user.id).unwrap();
        reset_password(&state, "ada@example.com", &token, "new-password-1".into())
            .await
            .unwrap();

        record_activity(&state, &stale).await;

        assert!(authenticate_user(&state, "ada@example.com", "new-password-1".into())
            .await
            .is_ok());
        assert!(authenticate_user(&state, "ada@example.com", "analytical".into())
            .await
            .is_err());

        let stored = state.store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.reset_token_digest.is_none());
        let replay = reset_password(&state, "ada@example.com", &token, "new-password-2".into()).await;
        assert!(matches!(replay, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn forgot_password_overlapping_a_password_change_keeps_the_new_hash() {
        let store = InMemoryCredentialStore::new();
        let (state, _) = test_state_with(&store);
        let user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();
        let before_change = store.find_by_id(user.id).await.unwrap().unwrap();

        change_password(&state, user.id, "analytical".into(), "brand-new-pass".into())
            .await
            .unwrap();

        let (overlapping, overlapping_delivery) = state_over(Arc::new(SnapshotReads {
            inner: store.clone(),
            snapshot: before_change,
        }));
        let result = request_password_reset(&overlapping, "ada@example.com").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(overlapping_delivery.last_for(user.id).is_none());

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.reset_token_digest.is_none());
        assert!(authenticate_user(&state, "ada@example.com", "brand-new-pass".into())
            .await
            .is_ok());
        assert!(authenticate_user(&state, "ada@example.com", "analytical".into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn clearing_an_expired_token_from_an_old_copy_keeps_the_new_hash() {
        let store = InMemoryCredentialStore::new();
        let (state, delivery) = test_state_with(&store);
        let user = create_user(&state, "Ada".into(), "ada@example.com", "analytical".into())
            .await
            .unwrap();
        request_password_reset(&state, "ada@example.com").await.unwrap();
        let token = delivery.last_for(user.id).unwrap();

        let mut expired = store.find_by_id(user.id).await.unwrap().unwrap();
        expired.reset_token_expires_at = Some(Utc::now() - Duration::minutes(1));
        let expired = store.save(expired).await.unwrap();

        change_password(&state, user.id, "analytical".into(), "brand-new-pass".into())
            .await
            .unwrap();

        let (overlapping, _) = state_over(Arc::new(SnapshotReads {
            inner: store.clone(),
            snapshot: expired,
        }));
        let result = reset_password(&overlapping, "ada@example.com", &token, "after-reset".into()).await;
        assert!(matches!(result, Err(AppError::ExpiredToken)));

        assert!(authenticate_user(&state, "ada@example.com", "brand-new-pass".into())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_email_still_runs_a_verification() {
        let (state, _) = test_state();
        let dummy = state.hasher.dummy_hash().to_string();
        assert!(!state
            .hasher
            .verify_blocking("password123".into(), dummy)
            .await
            .unwrap());

        let result = authenticate_user(&state, "nobody@example.com", "password123".into()).await;
        assert!(matches!(result, Err(AppError::Unauthenticated(ref m)) if m == "Invalid email or password"));
    }
}
