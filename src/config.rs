use std::env;
use std::net::SocketAddr;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// Default session lifetime in hours.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The lifetime of a session token in hours.
    pub session_ttl_hours: i64,
    /// The symmetric key session tokens are signed with.
    pub jwt_secret: Zeroizing<Vec<u8>>,
    /// Whether cookies are marked `Secure`.
    pub secure_cookies: bool,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Creates a new `Config` from an arbitrary variable lookup.
    ///
    /// Fails with [`AppError::Configuration`] when `JWT_SECRET` is missing or
    /// empty: there is no safe default signing key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = Zeroizing::new(
            lookup("JWT_SECRET")
                .ok_or_else(|| {
                    AppError::Configuration(
                        "JWT_SECRET must be set (generate with: openssl rand -hex 32)".to_string(),
                    )
                })?
                .into_bytes(),
        );

        if jwt_secret.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::Configuration(
                "JWT_SECRET must not be empty".to_string(),
            ));
        }

        if jwt_secret.len() < 32 {
            tracing::warn!("⚠️  JWT_SECRET is shorter than 32 bytes");
        }

        let session_ttl_hours = match lookup("SESSION_TTL_HOURS") {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                AppError::Configuration(format!("Invalid SESSION_TTL_HOURS: {}", raw))
            })?,
            None => DEFAULT_SESSION_TTL_HOURS,
        };

        if session_ttl_hours <= 0 {
            return Err(AppError::Configuration(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| AppError::Configuration(format!("Invalid BIND_ADDR: {}", bind_addr)))?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            bind_addr,
            session_ttl_hours,
            jwt_secret,
            secure_cookies: lookup("APP_ENV").as_deref() == Some("production"),
        })
    }
}
