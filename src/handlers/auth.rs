use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::SESSION_COOKIE,
    models::{
        session::{AuthContext, CurrentUser},
        user::{User, UserProfile, normalize_email},
    },
    services::auth as auth_service,
    state::AppState,
    validation::auth::*,
};

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl AuthResponse {
    fn message(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            user: None,
        }
    }

    fn with_user(message: &str, user: &User) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            user: Some(user.profile()),
        }
    }
}

/// Whether the caller has a session.
#[derive(Serialize)]
pub struct SessionStatus {
    pub success: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Creates the session cookie: httpOnly, SameSite=Strict, lives as long as the token.
fn create_session_cookie(value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);

    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(tower_cookies::cookie::SameSite::Strict);
    cookie.set_max_age(Duration::seconds(max_age_secs));
    cookie.set_path("/");

    cookie
}

/// Issues a session token for `user` and sets it as a cookie.
fn start_session(state: &AppState, cookies: &Cookies, user: &User) -> Result<()> {
    let token = state.sessions.issue(user.id)?;
    cookies.add(create_session_cookie(
        token,
        state.sessions.ttl().num_seconds(),
        state.secure_cookies,
    ));
    tracing::debug!("🔑 Session started for user: {}", user.id);
    Ok(())
}

/// Handles user registration.
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Response> {
    payload.email = normalize_email(&payload.email);
    payload.name = payload.name.trim().to_string();
    validate_payload(&payload)?;
    validate_password(&payload.password)?;

    let user = auth_service::create_user(&state, payload.name, &payload.email, payload.password)
        .await?;

    start_session(&state, &cookies, &user)?;

    tracing::info!("✅ User registered: {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::with_user("Registration successful. Welcome!", &user)),
    )
        .into_response())
}

/// Handles user login.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Response> {
    payload.email = normalize_email(&payload.email);
    validate_payload(&payload)?;

    let user = auth_service::authenticate_user(&state, &payload.email, payload.password).await?;

    start_session(&state, &cookies, &user)?;
    auth_service::record_activity(&state, &user).await;

    tracing::info!("✅ User logged in: {}", user.id);

    Ok((
        StatusCode::OK,
        Json(AuthResponse::with_user("Login successful", &user)),
    )
        .into_response())
}

/// Handles user logout. Tokens are stateless, so this only drops the cookie.
pub async fn logout(cookies: Cookies) -> Result<Response> {
    let mut session_cookie = Cookie::new(SESSION_COOKIE, "");
    session_cookie.set_max_age(Duration::seconds(0));
    session_cookie.set_path("/");
    cookies.remove(session_cookie);

    Ok((StatusCode::OK, Json(AuthResponse::message("Logout successful"))).into_response())
}

/// Returns the current user's profile.
pub async fn me(CurrentUser(user): CurrentUser) -> Result<Response> {
    Ok((StatusCode::OK, Json(AuthResponse::with_user("OK", &user))).into_response())
}

/// Reports whether the request carries a usable session.
pub async fn session_status(context: AuthContext) -> Json<SessionStatus> {
    Json(SessionStatus {
        success: true,
        authenticated: context.is_authenticated(),
        user: context.principal().map(User::profile),
    })
}

/// Handles changing a user's password.
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response> {
    validate_payload(&payload)?;
    validate_password(&payload.new_password)?;

    auth_service::change_password(&state, user.id, payload.old_password, payload.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse::message("Password changed successfully")),
    )
        .into_response())
}

/// Starts a password reset. Answers the same whether or not the email exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Response> {
    payload.email = normalize_email(&payload.email);
    validate_payload(&payload)?;

    auth_service::request_password_reset(&state, &payload.email).await?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse::message(
            "If that email is registered, a reset link has been sent",
        )),
    )
        .into_response())
}

/// Redeems a reset token, sets the new password and starts a session.
pub async fn reset_password(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(mut payload): Json<ResetPasswordRequest>,
) -> Result<Response> {
    payload.email = normalize_email(&payload.email);
    validate_payload(&payload)?;
    validate_password(&payload.password)?;

    let user = auth_service::reset_password(&state, &payload.email, &payload.token, payload.password)
        .await
        .map_err(|e| match e {
            AppError::InvalidToken => AppError::Unauthenticated(
                "Password reset token is invalid".to_string(),
            ),
            AppError::ExpiredToken => AppError::Unauthenticated(
                "Password reset token has expired. Please request a new one.".to_string(),
            ),
            other => other,
        })?;

    start_session(&state, &cookies, &user)?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse::with_user("Password reset successful", &user)),
    )
        .into_response())
}

/// Looks up any user. Mounted behind the admin role gate.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Response> {
    let user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok((StatusCode::OK, Json(AuthResponse::with_user("OK", &user))).into_response())
}
