use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AppError, Result};

/// Random bytes per reset token (160 bits).
const RESET_TOKEN_BYTES: usize = 20;
/// How long a reset token is accepted, in minutes.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

/// A freshly minted reset token.
///
/// `plaintext` goes to the requester and nowhere else; only `digest` and
/// `expires_at` are stored.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ResetToken {
    pub plaintext: String,
    #[zeroize(skip)]
    pub digest: String,
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Mints and checks one-time password-reset tokens.
#[derive(Debug, Clone)]
pub struct ResetTokenService {
    ttl: Duration,
}

impl Default for ResetTokenService {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        }
    }
}

impl ResetTokenService {
    pub fn generate(&self) -> ResetToken {
        self.generate_at(Utc::now())
    }

    pub fn generate_at(&self, now: DateTime<Utc>) -> ResetToken {
        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let plaintext = hex::encode(bytes);
        bytes.zeroize();

        ResetToken {
            digest: digest(&plaintext),
            plaintext,
            expires_at: now + self.ttl,
        }
    }

    /// Checks a presented token against the stored digest and expiry.
    ///
    /// Expiry wins over a matching digest.
    pub fn validate(
        &self,
        presented: &str,
        stored_digest: &str,
        stored_expiry: DateTime<Utc>,
    ) -> Result<bool> {
        self.validate_at(presented, stored_digest, stored_expiry, Utc::now())
    }

    pub fn validate_at(
        &self,
        presented: &str,
        stored_digest: &str,
        stored_expiry: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if now > stored_expiry {
            return Err(AppError::ExpiredToken);
        }

        let presented_digest = digest(presented);
        Ok(presented_digest
            .as_bytes()
            .ct_eq(stored_digest.as_bytes())
            .into())
    }
}

/// Hex-encoded SHA-256 of a reset token.
pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
