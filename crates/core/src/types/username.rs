//! Username type.
//!
//! Usernames are the natural key for users: they are unique across the
//! database and are what exported fixtures use to reference users.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Username`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    /// The input is empty or only whitespace.
    #[error("username cannot be blank")]
    Blank,
    /// The input is too long.
    #[error("username must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside letters, digits and `@.+-_`.
    #[error("username may only contain letters, digits and @/./+/-/_ characters")]
    InvalidCharacter,
}

/// A validated username.
///
/// Surrounding whitespace is stripped. Allowed characters are alphanumerics
/// and `@ . + - _`.
///
/// ```
/// use cheap_electra_core::Username;
///
/// assert_eq!(Username::parse(" testuser ").unwrap().as_str(), "testuser");
/// assert!(Username::parse("").is_err());
/// assert!(Username::parse("has space").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Maximum username length in characters.
    pub const MAX_LENGTH: usize = 150;

    /// Parse a `Username` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is blank, longer than
    /// [`Self::MAX_LENGTH`] characters, or contains disallowed characters.
    pub fn parse(s: &str) -> Result<Self, UsernameError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(UsernameError::Blank);
        }
        if s.chars().count() > Self::MAX_LENGTH {
            return Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !s
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
        {
            return Err(UsernameError::InvalidCharacter);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Username` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_django_style_names() {
        for name in ["testuser", "jane.doe", "a+b", "x-y_z", "me@home", "Ünïcode"] {
            assert!(Username::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert_eq!(Username::parse(""), Err(UsernameError::Blank));
        assert_eq!(Username::parse(" \t "), Err(UsernameError::Blank));
    }

    #[test]
    fn test_parse_rejects_bad_characters() {
        assert_eq!(
            Username::parse("two words"),
            Err(UsernameError::InvalidCharacter)
        );
        assert_eq!(
            Username::parse("semi;colon"),
            Err(UsernameError::InvalidCharacter)
        );
    }

    #[test]
    fn test_parse_length_limit() {
        assert!(Username::parse(&"a".repeat(150)).is_ok());
        assert!(matches!(
            Username::parse(&"a".repeat(151)),
            Err(UsernameError::TooLong { max: 150 })
        ));
    }
}
