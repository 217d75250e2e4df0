use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    models::{session::AuthContext, user::{Role, User}},
    services::auth as auth_service,
    state::AppState,
};

/// The name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "token";

/// Extracts the session token from the request cookies.
fn extract_session_token(cookies: &Cookies) -> Option<String> {
    cookies
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Verifies a session token and loads the principal it names.
async fn resolve_principal(state: &AppState, token: &str) -> Result<User> {
    let user_id = state.sessions.verify(token)?;

    state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!("❌ Valid session for missing user: {}", user_id);
            AppError::NotFound("User")
        })
}

/// A middleware that requires a valid session to be present.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`, or the `AppError` that rejected the request.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    tracing::debug!("🔐 Checking authentication...");

    let token = extract_session_token(&cookies).ok_or_else(|| {
        tracing::debug!("❌ No session cookie found");
        AppError::Unauthenticated("You are not logged in. Please log in to get access.".to_string())
    })?;

    let user = resolve_principal(&state, &token).await?;

    tracing::debug!("✅ User authenticated: {}", user.id);

    auth_service::record_activity(&state, &user).await;

    request
        .extensions_mut()
        .insert(AuthContext::Authenticated(Arc::new(user)));

    Ok(next.run(request).await)
}

/// Like [`require_auth`], but never rejects.
///
/// Any failure leaves the request anonymous.
pub async fn optional_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let context = match extract_session_token(&cookies) {
        Some(token) => match resolve_principal(&state, &token).await {
            Ok(user) => AuthContext::Authenticated(Arc::new(user)),
            Err(e) => {
                tracing::debug!("Continuing anonymously: {}", e);
                AuthContext::Anonymous
            }
        },
        None => AuthContext::Anonymous,
    };

    request.extensions_mut().insert(context);

    next.run(request).await
}

/// The roles allowed through a [`require_role`] stage.
#[derive(Debug, Clone)]
pub struct RoleGate {
    allowed: Arc<HashSet<Role>>,
}

impl RoleGate {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: Arc::new(roles.into_iter().collect()),
        }
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }
}

/// A middleware that only lets principals with an allowed role through.
///
/// Must run after [`require_auth`]. With no principal attached it denies.
pub async fn require_role(
    State(gate): State<RoleGate>,
    request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let role = match request.extensions().get::<AuthContext>() {
        Some(AuthContext::Authenticated(user)) => user.role,
        Some(AuthContext::Anonymous) => {
            return Err(AppError::Unauthenticated(
                "You are not logged in. Please log in to get access.".to_string(),
            ));
        }
        None => {
            tracing::error!("❌ require_role ran without require_auth, denying");
            return Err(AppError::Unauthenticated(
                "You are not logged in. Please log in to get access.".to_string(),
            ));
        }
    };

    if !gate.allows(role) {
        tracing::warn!("❌ Role {} not permitted", role);
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}
