//! Input validation for local registration and login.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email regex is valid")
});

/// Field-level validation failures, safe to report back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters")]
    UsernameLength,

    #[error("Password must be at least {PASSWORD_MIN_LEN} characters")]
    PasswordTooShort,

    #[error("Email address is invalid")]
    EmailInvalid,
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) || username.trim() != username {
        return Err(ValidationError::UsernameLength);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() > 254 || !EMAIL_RE.is_match(email) {
        return Err(ValidationError::EmailInvalid);
    }
    Ok(())
}

/// Validate a full registration request.
pub fn validate_registration(
    username: &str,
    password: &str,
    email: &str,
) -> Result<(), ValidationError> {
    validate_username(username)?;
    validate_password(password)?;
    validate_email(email)
}
