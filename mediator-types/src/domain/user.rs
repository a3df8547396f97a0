//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a User.
    UserId
);

text_enum!(
    /// Authorization role carried by every user.
    Role {
        Admin => "admin",
        User => "user",
    }
);

/// A person or system account allowed to call the API.
///
/// Users are never hard-deleted; deactivation revokes access instead.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new active user.
    ///
    /// # Validation
    /// - Username: 3 to 64 characters of letters, digits, `_`, `.` or `-`
    /// - Email must contain `@` with text on both sides
    pub fn new(
        username: String,
        email: String,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_username(&username)?;
        validate_email(&email)?;

        Ok(Self {
            id: UserId::new(),
            username,
            email: email.to_ascii_lowercase(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Changes the email address.
    pub fn set_email(&mut self, email: String, now: DateTime<Utc>) -> Result<(), DomainError> {
        validate_email(&email)?;
        self.email = email.to_ascii_lowercase();
        self.updated_at = now;
        Ok(())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }
}

pub fn validate_username(username: &str) -> Result<(), DomainError> {
    let len = username.chars().count();
    if !(3..=64).contains(&len) {
        return Err(DomainError::validation(
            "Username must be between 3 and 64 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(DomainError::validation(
            "Username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), DomainError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && email.len() <= 254 => {
            Ok(())
        }
        _ => Err(DomainError::validation(format!("Invalid email: {}", email))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_creation_normalizes_email() {
        let user = User::new(
            "alice".into(),
            "Alice@Example.com".into(),
            Role::User,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_active);
        assert!(!user.is_admin());
    }

    #[test]
    fn test_invalid_usernames_rejected() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("ok_name-1.x").is_ok());
    }

    #[test]
    fn test_invalid_emails_rejected() {
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("a@b.io").is_ok());
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }
}
