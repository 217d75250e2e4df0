use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::{Credential, User},
};

/// Persistent user records.
///
/// Each call is a single-record operation; atomicity per record is the
/// store's job.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Finds a user by their ID.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Finds a user by their (normalised) email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Inserts the user, or overwrites the record with the same ID.
    ///
    /// An existing record is only overwritten when its `updated_at` still
    /// equals `user.updated_at`; otherwise the copy is stale and the call fails
    /// with [`AppError::Conflict`] without writing. The returned user carries
    /// the new `updated_at`.
    ///
    /// Stores `user.credential` verbatim. Hashing a changed password is done
    /// before this is called, see `services::auth::save_user`.
    async fn save(&self, user: User) -> Result<User>;
}

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User::from_stored(
        row.try_get("id")?,
        row.try_get("name")?,
        row.try_get("email")?,
        role.parse()?,
        Credential::from_hash(row.try_get("password_hash")?),
        row.try_get("reset_token_digest")?,
        row.try_get("reset_token_expires_at")?,
        row.try_get("last_active_at")?,
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}

/// [`CredentialStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: Pool,
}

impl PgCredentialStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT *
                FROM users
                WHERE id = $1
                "#,
                &[&id],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT *
                FROM users
                WHERE email = $1
                "#,
                &[&email],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn save(&self, user: User) -> Result<User> {
        if user.has_pending_password() || user.credential.as_hash().is_empty() {
            return Err(AppError::Internal(
                "Refusing to store a user without a hashed credential".to_string(),
            ));
        }

        let client = self.pool.get().await?;
        let role = user.role.as_str();
        let row = client
            .query_opt(
                r#"
                INSERT INTO users (
                    id, name, email, role, password_hash,
                    reset_token_digest, reset_token_expires_at,
                    last_active_at, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    email = EXCLUDED.email,
                    role = EXCLUDED.role,
                    password_hash = EXCLUDED.password_hash,
                    reset_token_digest = EXCLUDED.reset_token_digest,
                    reset_token_expires_at = EXCLUDED.reset_token_expires_at,
                    last_active_at = EXCLUDED.last_active_at,
                    updated_at = GREATEST(NOW(), users.updated_at + INTERVAL '1 microsecond')
                WHERE users.updated_at = $10
                RETURNING *
                "#,
                &[
                    &user.id,
                    &user.name,
                    &user.email,
                    &role,
                    &user.credential.as_hash(),
                    &user.reset_token_digest,
                    &user.reset_token_expires_at,
                    &user.last_active_at,
                    &user.created_at,
                    &user.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) {
                    AppError::Conflict("User already exists".to_string())
                } else {
                    AppError::Database(e)
                }
            })?;

        match row {
            Some(row) => row_to_user(&row),
            None => Err(AppError::Conflict(
                "User was changed by another request".to_string(),
            )),
        }
    }
}
