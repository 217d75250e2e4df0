use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::AppError;

/// The closed set of roles a principal can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Validation(format!("Unknown role: {}", other))),
        }
    }
}

/// A stored password hash in PHC format. Never holds plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a hash read back from storage.
    pub fn from_hash(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_hash(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Represents a user in the system.
#[derive(Clone)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's display name.
    pub name: String,
    /// The user's email address, normalised to lowercase.
    pub email: String,
    /// The user's role.
    pub role: Role,
    /// The user's hashed password.
    pub credential: Credential,
    /// SHA-256 digest of an outstanding password-reset token.
    pub reset_token_digest: Option<String>,
    /// When the outstanding password-reset token stops being accepted.
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    /// The last time the user did anything authenticated.
    pub last_active_at: DateTime<Utc>,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the user was last updated.
    pub updated_at: DateTime<Utc>,
    /// A new plaintext password waiting to be hashed on the next save.
    pending_password: Option<Zeroizing<String>>,
}

impl User {
    /// Creates a fresh student account. The password is hashed when the user
    /// is first saved.
    pub fn new(name: String, email: &str, password: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email: normalize_email(email),
            role: Role::default(),
            credential: Credential::from_hash(String::new()),
            reset_token_digest: None,
            reset_token_expires_at: None,
            last_active_at: now,
            created_at: now,
            updated_at: now,
            pending_password: Some(Zeroizing::new(password)),
        }
    }

    /// Rebuilds a user from stored fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        id: Uuid,
        name: String,
        email: String,
        role: Role,
        credential: Credential,
        reset_token_digest: Option<String>,
        reset_token_expires_at: Option<DateTime<Utc>>,
        last_active_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            email,
            role,
            credential,
            reset_token_digest,
            reset_token_expires_at,
            last_active_at,
            created_at,
            updated_at,
            pending_password: None,
        }
    }

    /// Marks the credential as changed. This is the only thing that causes a
    /// save to hash: an already-hashed credential is never hashed again.
    pub fn set_password(&mut self, plaintext: String) {
        self.pending_password = Some(Zeroizing::new(plaintext));
    }

    /// Takes the pending plaintext, if any, leaving the user unchanged otherwise.
    pub fn take_pending_password(&mut self) -> Option<Zeroizing<String>> {
        self.pending_password.take()
    }

    pub fn has_pending_password(&self) -> bool {
        self.pending_password.is_some()
    }

    /// Forgets any outstanding reset token.
    pub fn clear_reset_token(&mut self) {
        self.reset_token_digest = None;
        self.reset_token_expires_at = None;
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            last_active_at: self.last_active_at,
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("last_active_at", &self.last_active_at)
            .finish_non_exhaustive()
    }
}

/// The publicly visible fields of a user.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Student, Role::Instructor, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn new_user_defaults_to_student_with_pending_password() {
        let user = User::new("Ada".into(), "  Ada@Example.COM ", "correct horse".into());
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.email, "ada@example.com");
        assert!(user.has_pending_password());
    }

    #[test]
    fn stored_user_has_no_pending_password() {
        let now = Utc::now();
        let mut user = User::from_stored(
            Uuid::new_v4(),
            "Ada".into(),
            "ada@example.com".into(),
            Role::Admin,
            Credential::from_hash("$argon2id$...".into()),
            None,
            None,
            now,
            now,
            now,
        );
        assert!(!user.has_pending_password());

        user.set_password("new password".into());
        assert!(user.take_pending_password().is_some());
        assert!(user.take_pending_password().is_none());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let user = User::new("Ada".into(), "ada@example.com", "hunter2hunter2".into());
        let rendered = format!("{:?}", user);
        assert!(!rendered.contains("hunter2hunter2"));
    }
}
