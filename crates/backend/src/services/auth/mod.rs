//! Authentication service.
//!
//! Provides username/password registration, login and profile changes.
//! Passwords are hashed with Argon2id and stored apart from the user row.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;

use cheap_electra_core::{Email, UserId, Username, UsernameError};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::error::FieldErrors;
use crate::models::user::{NewUser, User, UserChanges};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

const REQUIRED: &str = "This field is required.";

/// Raw registration fields as submitted.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Display name; defaults to empty.
    pub name: Option<String>,
}

/// Raw self-service profile changes as submitted. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Authentication service.
///
/// Handles user registration, login, and profile changes.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a new user with a password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRegistration` with every failing field if
    /// the input is incomplete or invalid.
    /// Returns `AuthError::UsernameTaken` if the username is already registered.
    pub async fn register(
        &self,
        registration: &Registration,
        is_staff: bool,
    ) -> Result<User, AuthError> {
        let (mut new_user, password) =
            validate_registration(registration).map_err(AuthError::InvalidRegistration)?;
        new_user.is_staff = is_staff;

        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create_with_password(&new_user, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UsernameTaken,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, username = %user.username, is_staff, "User registered");

        Ok(user)
    }

    /// Login with username and password.
    ///
    /// Records the login time on success.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the username/password is wrong.
    /// Returns `AuthError::InactiveUser` if the account has been deactivated.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = Username::parse(username).map_err(|_| AuthError::InvalidCredentials)?;

        // Get user with password hash
        let (user, password_hash) = self
            .users
            .get_password_hash(&username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        self.users.record_login(user.id).await?;

        Ok(user)
    }

    /// Apply self-service changes to a user's own profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::WeakPassword` for invalid
    /// input, `AuthError::UserNotFound` if the user no longer exists.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, AuthError> {
        let email = update
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(Email::parse)
            .transpose()?;

        let password_hash = match update.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let changes = UserChanges {
            first_name: update.name.clone(),
            email,
            is_staff: None,
        };

        let user = self
            .users
            .update_with_password(user_id, &changes, password_hash.as_deref())
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })?;

        if password_hash.is_some() {
            tracing::info!(user_id = %user_id, "Password changed");
        }

        Ok(user)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

/// Check every registration field, collecting all problems.
///
/// Returns the user to create and the plain password to hash.
///
/// # Errors
///
/// Returns the per-field messages if any field is missing or invalid.
pub fn validate_registration(
    registration: &Registration,
) -> Result<(NewUser, &str), FieldErrors> {
    let mut errors = FieldErrors::new();

    let username = match registration.username.as_deref() {
        None => {
            errors.add("username", REQUIRED);
            None
        }
        Some(raw) => match Username::parse(raw) {
            Ok(username) => Some(username),
            Err(UsernameError::Blank) => {
                errors.add("username", "This field may not be blank.");
                None
            }
            Err(e) => {
                errors.add("username", e.to_string());
                None
            }
        },
    };

    let email = match registration.email.as_deref() {
        None => {
            errors.add("email", REQUIRED);
            None
        }
        Some(raw) if raw.trim().is_empty() => {
            errors.add("email", "This field may not be blank.");
            None
        }
        Some(raw) => match Email::parse(raw) {
            Ok(email) => Some(email),
            Err(_) => {
                errors.add("email", "Enter a valid email address.");
                None
            }
        },
    };

    let password = match registration.password.as_deref() {
        None => {
            errors.add("password", REQUIRED);
            None
        }
        Some(raw) => {
            if let Err(AuthError::WeakPassword(msg)) = validate_password(raw) {
                errors.add("password", msg);
            }
            Some(raw)
        }
    };

    errors.into_result()?;

    match (username, password) {
        (Some(username), Some(password)) => Ok((
            NewUser {
                username,
                email,
                first_name: registration.name.clone().unwrap_or_default(),
                is_staff: false,
            },
            password,
        )),
        _ => Err(FieldErrors::single("non_field_errors", "Invalid registration.")),
    }
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` describing the first failed rule.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters."
        )));
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword(
            "This password is entirely numeric.".to_string(),
        ));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
