use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Malformed input, such as a password that is too short.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No session, or the session's principal cannot act.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// A session or reset token whose signature or digest does not check out.
    #[error("Invalid token")]
    InvalidToken,

    /// A session or reset token past its expiry.
    #[error("Token expired")]
    ExpiredToken,

    /// The principal's role is not allowed to perform the operation.
    #[error("Forbidden")]
    Forbidden,

    /// A resource not found error.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness conflict, such as a duplicate email.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or unusable process configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A stored password hash could not be parsed or produced.
    #[error("Hash error: {0}")]
    Hash(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) | AppError::InvalidToken | AppError::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Configuration(_)
            | AppError::Hash(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                "Database error".to_string()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::Unauthenticated(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                msg.clone()
            }

            AppError::InvalidToken => {
                tracing::warn!("Rejected invalid token");
                "Invalid token. Please log in again.".to_string()
            }

            AppError::ExpiredToken => {
                tracing::debug!("Rejected expired token");
                "Your token has expired. Please log in again.".to_string()
            }

            AppError::Forbidden => {
                tracing::warn!("Authorization failed");
                "You do not have permission to perform this action".to_string()
            }

            AppError::NotFound(what) => {
                tracing::debug!("{} not found", what);
                format!("{} not found", what)
            }

            AppError::Conflict(ref msg) => {
                tracing::debug!("Conflict: {}", msg);
                msg.clone()
            }

            AppError::Configuration(ref msg) => {
                tracing::error!("Configuration error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::Hash(ref msg) => {
                tracing::error!("Hash error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "success": false,
            "message": message
        }))
        .unwrap_or_else(|_| r#"{"success":false,"message":"Internal server error"}"#.to_string());

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
