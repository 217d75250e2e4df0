use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::session::SessionClaims;

/// Issues and verifies stateless HS256 session tokens.
///
/// Holds nothing but the key and the lifetime, so a single instance is shared
/// across every request.
pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionTokenService {
    /// Creates a new service.
    ///
    /// # Arguments
    ///
    /// * `secret` - The signing key. Must not be empty.
    /// * `ttl` - How long an issued token stays valid.
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(AppError::Configuration(
                "Session signing key must not be empty".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `subject`, valid from now for the configured lifetime.
    pub fn issue(&self, subject: Uuid) -> Result<String> {
        self.issue_at(subject, Utc::now())
    }

    /// Issues a token as if it had been issued at `issued_at`.
    pub fn issue_at(&self, subject: Uuid, issued_at: DateTime<Utc>) -> Result<String> {
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))
    }

    /// Verifies a token and returns its subject.
    ///
    /// Signature failures and anything malformed are [`AppError::InvalidToken`];
    /// a correctly signed token past its expiry is [`AppError::ExpiredToken`].
    pub fn verify(&self, token: &str) -> Result<Uuid> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => {
                    tracing::debug!("Session token rejected: {:?}", e.kind());
                    AppError::InvalidToken
                }
            })?;

        Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key-that-is-at-least-32-chars";

    fn service() -> SessionTokenService {
        SessionTokenService::new(SECRET, Duration::hours(24)).unwrap()
    }

    #[test]
    fn issue_then_verify_returns_subject() {
        let service = service();
        let subject = Uuid::new_v4();

        let token = service.issue(subject).unwrap();
        assert_eq!(service.verify(&token).unwrap(), subject);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let service = service();
        let token = service
            .issue_at(Uuid::new_v4(), Utc::now() - Duration::hours(25))
            .unwrap();

        assert!(matches!(service.verify(&token), Err(AppError::ExpiredToken)));
    }

    #[test]
    fn token_from_other_key_is_invalid() {
        let other =
            SessionTokenService::new(b"secret-two-that-is-32-chars-long", Duration::hours(24))
                .unwrap();
        let token = other.issue(Uuid::new_v4()).unwrap();

        assert!(matches!(service().verify(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn expired_token_from_other_key_is_invalid_not_expired() {
        let other =
            SessionTokenService::new(b"secret-two-that-is-32-chars-long", Duration::hours(24))
                .unwrap();
        let token = other
            .issue_at(Uuid::new_v4(), Utc::now() - Duration::days(3))
            .unwrap();

        assert!(matches!(service().verify(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn tampered_and_garbage_tokens_are_invalid() {
        let service = service();
        let token = service.issue(Uuid::new_v4()).unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_claims = "eyJzdWIiOiIwMDAwMDAwMC0wMDAwLTAwMDAtMDAwMC0wMDAwMDAwMDAwMDAiLCJpYXQiOjAsImV4cCI6OTk5OTk5OTk5OX0";
        parts[1] = forged_claims;
        let tampered = parts.join(".");

        assert!(matches!(service.verify(&tampered), Err(AppError::InvalidToken)));
        assert!(matches!(service.verify("invalid.token.here"), Err(AppError::InvalidToken)));
        assert!(matches!(service.verify(""), Err(AppError::InvalidToken)));
    }

    #[test]
    fn claims_span_the_configured_lifetime() {
        let service = service();
        let issued_at = Utc::now();
        let token = service.issue_at(Uuid::new_v4(), issued_at).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = decode::<SessionClaims>(&token, &DecodingKey::from_secret(SECRET), &validation)
            .unwrap()
            .claims;

        assert_eq!(claims.iat, issued_at.timestamp());
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn empty_key_is_a_configuration_error() {
        assert!(matches!(
            SessionTokenService::new(b"", Duration::hours(24)),
            Err(AppError::Configuration(_))
        ));
    }
}
