use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_cookies::CookieManagerLayer;

use crate::{
    handlers,
    middleware_layer::auth::{self as auth_layer, RoleGate},
    models::user::Role,
    state::AppState,
};

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .with_state(state.clone());

    let optional_routes = Router::new()
        .route("/api/auth/session", get(handlers::auth::session_status))
        .route_layer(from_fn_with_state(
            state.clone(),
            auth_layer::optional_auth,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))
        .route(
            "/api/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            auth_layer::require_auth,
        ))
        .with_state(state.clone());

    // Layers run outside-in: require_auth wraps require_role.
    let admin_routes = Router::new()
        .route("/api/admin/users/{user_id}", get(handlers::auth::get_user))
        .route_layer(from_fn_with_state(
            RoleGate::new([Role::Admin]),
            auth_layer::require_role,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            auth_layer::require_auth,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(optional_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(CookieManagerLayer::new())
}
