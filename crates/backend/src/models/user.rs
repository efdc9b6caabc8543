//! User domain types.

use chrono::{DateTime, Utc};

use cheap_electra_core::{Email, UserId, Username};

/// A shop user (domain type).
///
/// The password hash is never part of this type; it is only read by the
/// authentication service.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Unique login name (natural key).
    pub username: Username,
    /// Contact address, if one was given.
    pub email: Option<Email>,
    /// Display name; may be empty.
    pub first_name: String,
    /// Staff users can manage the catalog, all orders and other users.
    pub is_staff: bool,
    /// Inactive users cannot log in.
    pub is_active: bool,
    /// When the user last logged in.
    pub last_login: Option<DateTime<Utc>>,
    /// When the user was created.
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Name to show for this user: the display name, or the username when
    /// no display name was set.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.first_name.trim().is_empty() {
            self.username.as_str()
        } else {
            &self.first_name
        }
    }
}

/// Validated input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Username,
    pub email: Option<Email>,
    pub first_name: String,
    pub is_staff: bool,
}

/// Partial update of a user. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub email: Option<Email>,
    pub is_staff: Option<bool>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(first_name: &str) -> User {
        User {
            id: UserId::new(1),
            username: Username::parse("testuser").unwrap(),
            email: None,
            first_name: first_name.to_string(),
            is_staff: false,
            is_active: true,
            last_login: None,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        assert_eq!(user("").display_name(), "testuser");
        assert_eq!(user("  ").display_name(), "testuser");
        assert_eq!(user("Test User").display_name(), "Test User");
    }
}
