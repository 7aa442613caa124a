//! Input validation for API requests.
//!
//! For collecting multiple validation errors and returning them as an ApiError,
//! use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;

use crate::db::{Role, Severity, TicketStatus};

lazy_static! {
    /// Regex for validating email addresses (pragmatic, not RFC-complete)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)+$"
    ).unwrap();
}

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_MESSAGE_LEN: usize = 10_000;

/// Validate an email address
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

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Name is required".to_string());
    }

    if name.len() > MAX_NAME_LEN {
        return Err(format!("Name is too long (max {} characters)", MAX_NAME_LEN));
    }

    Ok(())
}

/// Validate and normalize a severity value (lowercased on success)
pub fn validate_severity(severity: &str) -> Result<Severity, String> {
    Severity::from_str(severity)
        .map_err(|_| "Invalid severity. Must be one of: low, medium, high".to_string())
}

/// Validate a ticket status value (case-insensitive)
pub fn validate_status(status: &str) -> Result<TicketStatus, String> {
    TicketStatus::from_str(status)
        .map_err(|_| "Invalid status. Must be one of: open, in_progress, closed".to_string())
}

/// Validate an assignable account role. The `ai` role is reserved for the
/// synthetic assistant user and is rejected here.
pub fn validate_role(role: &str) -> Result<Role, String> {
    match Role::from_str(role) {
        Ok(Role::Ai) | Err(_) => {
            Err("Invalid role. Must be one of: user, tech, admin".to_string())
        }
        Ok(role) => Ok(role),
    }
}

/// Validate a ticket description
pub fn validate_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("Description is required".to_string());
    }

    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "Description is too long (max {} characters)",
            MAX_DESCRIPTION_LEN
        ));
    }

    Ok(())
}

/// Validate message content
pub fn validate_message_content(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message content is required".to_string());
    }

    if content.len() > MAX_MESSAGE_LEN {
        return Err(format!(
            "Message is too long (max {} characters)",
            MAX_MESSAGE_LEN
        ));
    }

    Ok(())
}

/// Validate an id path/body parameter
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.domain.org").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Alice Johnson").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_severity() {
        assert_eq!(validate_severity("low").unwrap(), Severity::Low);
        assert_eq!(validate_severity("MEDIUM").unwrap(), Severity::Medium);
        assert_eq!(validate_severity("High").unwrap(), Severity::High);

        assert!(validate_severity("urgent").is_err());
        assert!(validate_severity("").is_err());
    }

    #[test]
    fn test_validate_status() {
        assert_eq!(validate_status("open").unwrap(), TicketStatus::Open);
        assert_eq!(
            validate_status("IN_PROGRESS").unwrap(),
            TicketStatus::InProgress
        );
        assert_eq!(validate_status("closed").unwrap(), TicketStatus::Closed);

        assert!(validate_status("done").is_err());
    }

    #[test]
    fn test_validate_role_rejects_ai() {
        assert_eq!(validate_role("user").unwrap(), Role::User);
        assert_eq!(validate_role("tech").unwrap(), Role::Tech);
        assert_eq!(validate_role("admin").unwrap(), Role::Admin);

        assert!(validate_role("ai").is_err());
        assert!(validate_role("root").is_err());
    }

    #[test]
    fn test_validate_message_content() {
        assert!(validate_message_content("my printer is on fire").is_ok());
        assert!(validate_message_content("").is_err());
        assert!(validate_message_content("  \n ").is_err());
        assert!(validate_message_content(&"x".repeat(10_001)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "ticket_id").is_ok());
        assert!(validate_uuid("", "ticket_id").is_err());
        assert!(validate_uuid("not-a-uuid", "ticket_id").is_err());
    }
}
