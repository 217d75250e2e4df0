use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::user::User;

/// The payload of a signed session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// The ID of the user this session belongs to.
    pub sub: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Who the current request is acting as.
///
/// Inserted into request extensions by the auth middleware and never mutated
/// afterwards. A request with no context at all never went through
/// `require_auth` or `optional_auth`.
#[derive(Debug, Clone)]
pub enum AuthContext {
    Anonymous,
    Authenticated(Arc<User>),
}

impl AuthContext {
    pub fn principal(&self) -> Option<&User> {
        match self {
            AuthContext::Anonymous => None,
            AuthContext::Authenticated(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthContext::Authenticated(_))
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or(AuthContext::Anonymous))
    }
}

/// Extractor for handlers that must have an authenticated principal.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Arc<User>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(AuthContext::Authenticated(user)) => Ok(CurrentUser(user.clone())),
            _ => Err(AppError::Unauthenticated(
                "You are not logged in. Please log in to get access.".to_string(),
            )),
        }
    }
}
