use garde::Validate;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Minimum password length in characters.
pub const PASSWORD_MIN_LEN: usize = 8;
/// Maximum password length in characters.
pub const PASSWORD_MAX_LEN: usize = 128;

/// The request payload for user registration.
#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(length(min = 1, max = 50))]
    pub name: String,
    #[garde(email)]
    pub email: String,
    #[garde(skip)]
    pub password: String,
}

/// The request payload for user login.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1))]
    pub password: String,
}

/// The request payload for changing a user's password.
#[derive(Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[garde(length(min = 1))]
    pub old_password: String,
    #[garde(skip)]
    pub new_password: String,
}

/// The request payload for requesting a reset token.
#[derive(Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[garde(email)]
    pub email: String,
}

/// The request payload for redeeming a reset token.
#[derive(Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[garde(email)]
    pub email: String,
    #[garde(ascii, length(min = 1, max = 128))]
    pub token: String,
    #[garde(skip)]
    pub password: String,
}

/// Runs the derived `garde` rules and maps the report to a validation error.
pub fn validate_payload<T: Validate<Context = ()>>(payload: &T) -> Result<()> {
    payload
        .validate()
        .map_err(|report| AppError::Validation(report.to_string().trim().to_string()))
}

/// Validates a password.
///
/// # Arguments
///
/// * `password` - The password to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the password is valid.
pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }

    let len = password.chars().count();

    if len < PASSWORD_MIN_LEN {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if len > PASSWORD_MAX_LEN {
        return Err(AppError::Validation(
            "Password must be at most 128 characters".to_string(),
        ));
    }

    Ok(())
}
