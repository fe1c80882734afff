/// Input validators
///
/// Every check returns a `FieldError` naming the offending field. Handlers
/// collect them with [`Validator`] so a single 422 lists every problem.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AppError, FieldError};
use crate::store::normalize_email;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;
const MIN_NAME_LENGTH: usize = 2;
const MAX_NAME_LENGTH: usize = 100;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).unwrap();

    static ref NAME_REGEX: Regex = Regex::new(r"^[a-zA-Z\s'-]+$").unwrap();
}

/// Returns the normalized (trimmed, lower-cased) address.
pub fn validate_email(email: &str) -> Result<String, FieldError> {
    let normalized = normalize_email(email);
    if normalized.is_empty() {
        return Err(FieldError::new("email", "Email is required"));
    }
    if normalized.len() > MAX_EMAIL_LENGTH || !EMAIL_REGEX.is_match(&normalized) {
        return Err(FieldError::new("email", "Invalid email address"));
    }
    Ok(normalized)
}

/// Strength rules for new passwords. Reports the first rule broken.
pub fn validate_password(password: &str) -> Result<(), FieldError> {
    let err = |message: &str| Err(FieldError::new("password", message));
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return err("Password must be at least 8 characters");
    }
    if length > MAX_PASSWORD_LENGTH {
        return err("Password must be at most 128 characters");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return err("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return err("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return err("Password must contain at least one digit");
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return err("Password must contain at least one special character");
    }
    Ok(())
}

/// Display name: letters, spaces, apostrophes and hyphens. Returns it trimmed.
pub fn validate_name(name: &str) -> Result<String, FieldError> {
    let trimmed = name.trim();
    let length = trimmed.chars().count();

    if length < MIN_NAME_LENGTH {
        return Err(FieldError::new("name", "Name must be at least 2 characters"));
    }
    if length > MAX_NAME_LENGTH {
        return Err(FieldError::new("name", "Name must be at most 100 characters"));
    }
    if !NAME_REGEX.is_match(trimmed) {
        return Err(FieldError::new(
            "name",
            "Name may only contain letters, spaces, apostrophes and hyphens",
        ));
    }
    Ok(trimmed.to_string())
}

/// Required free text, trimmed, `min..=max` characters.
pub fn validate_text(field: &str, value: &str, min: usize, max: usize) -> Result<String, FieldError> {
    let trimmed = value.trim();
    let length = trimmed.chars().count();
    if length < min {
        return Err(FieldError::new(field, format!("{} must be at least {} characters", field, min)));
    }
    if length > max {
        return Err(FieldError::new(field, format!("{} must be at most {} characters", field, max)));
    }
    Ok(trimmed.to_string())
}

pub fn validate_optional_text(
    field: &str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, FieldError> {
    match value {
        Some(v) if v.chars().count() > max => Err(FieldError::new(
            field,
            format!("{} must be at most {} characters", field, max),
        )),
        other => Ok(other),
    }
}

/// Optional non-negative amount bounded by `max`.
pub fn validate_amount<T>(field: &str, value: Option<T>, max: T) -> Result<Option<T>, FieldError>
where
    T: PartialOrd + Default + Copy,
{
    match value {
        Some(v) if v < T::default() => Err(FieldError::new(field, format!("{} must not be negative", field))),
        Some(v) if v > max => Err(FieldError::new(field, format!("{} is too large", field))),
        other => Ok(other),
    }
}

/// Collects field errors across several checks
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the value on success, record the error otherwise
    pub fn check<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    pub fn push(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError::new(field, message));
    }

    /// `Err(AppError::Validation)` if anything was recorded
    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}
