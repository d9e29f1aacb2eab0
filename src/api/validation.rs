//! Input validation for API requests.
//!
//! Each check returns `Err(message)` for the offending field; handlers feed
//! them into a `ValidationErrorBuilder` so every problem is reported at once.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{UserRole, MAX_NOTES_CHARS};

lazy_static! {
    /// Pragmatic address shape: local part, `@`, dotted domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)+$"
    ).unwrap();

    /// Plan identifiers such as `starter` or `growth-annual`
    static ref PLAN_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str, min_length: usize) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < min_length {
        return Err(format!(
            "Password must be at least {} characters",
            min_length
        ));
    }

    Ok(())
}

/// Validate a required display name such as a company or case name
pub fn validate_name(name: &str, label: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", label));
    }

    if trimmed.chars().count() > 255 {
        return Err(format!("{} is too long (max 255 characters)", label));
    }

    Ok(())
}

pub fn validate_plan(plan: &str) -> Result<(), String> {
    if plan.is_empty() {
        return Err("Plan is required".to_string());
    }

    if plan.len() > 64 {
        return Err("Plan is too long (max 64 characters)".to_string());
    }

    if !PLAN_REGEX.is_match(plan) {
        return Err("Plan must be alphanumeric with dashes or underscores".to_string());
    }

    Ok(())
}

/// Parse the optional registration role; absent or blank means client
pub fn parse_role(role: Option<&str>) -> Result<UserRole, String> {
    match role.map(str::trim) {
        None | Some("") => Ok(UserRole::Client),
        Some(r) => r.parse::<UserRole>().map_err(|_| "Unsupported role".to_string()),
    }
}

pub fn validate_notes(notes: &str) -> Result<(), String> {
    if notes.chars().count() > MAX_NOTES_CHARS {
        return Err(format!(
            "Notes are too long (max {} characters)",
            MAX_NOTES_CHARS
        ));
    }
    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}
