//! Credential and session-authorization core for the course platform.
//!
//! Passwords are hashed with Argon2id, sessions are stateless HS256 tokens
//! carried in an httpOnly cookie, password resets use one-time tokens of which
//! only a SHA-256 digest is stored, and requests are gated by the
//! `require_auth`, `optional_auth` and `require_role` middleware.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod password;
    pub mod reset_token;
    pub mod session_token;
}

pub mod models {
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod memory;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod delivery;
}

pub mod handlers {
    pub mod auth;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod auth;
}

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
