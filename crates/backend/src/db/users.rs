//! User repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use cheap_electra_core::{Email, UserId, Username};

use super::RepositoryError;
use crate::models::user::{NewUser, User, UserChanges};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.first_name, u.is_staff, u.is_active, \
                            u.last_login, u.date_joined";

const UPSERT_PASSWORD: &str = r"
    INSERT INTO shop.user_password (user_id, password_hash)
    VALUES ($1, $2)
    ON CONFLICT (user_id)
    DO UPDATE SET password_hash = EXCLUDED.password_hash, updated_at = NOW()
";

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    username: String,
    email: Option<String>,
    first_name: String,
    is_staff: bool,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    date_joined: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let username = Username::parse(&row.username).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid username in database: {e}"))
        })?;
        let email = row
            .email
            .filter(|e| !e.is_empty())
            .map(|e| Email::parse(&e))
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;

        Ok(Self {
            id: UserId::new(row.id),
            username,
            email,
            first_name: row.first_name,
            is_staff: row.is_staff,
            is_active: row.is_active,
            last_login: row.last_login,
            date_joined: row.date_joined,
        })
    }
}

/// Internal row type for a user joined with their password hash.
#[derive(Debug, sqlx::FromRow)]
struct UserWithPasswordRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: Option<String>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all users, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row holds invalid data.
    pub async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM shop.user u ORDER BY u.id ASC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// List all users together with their password hash (for export).
    ///
    /// Takes a connection so the export can read every table in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row holds invalid data.
    pub async fn list_with_password_hashes(
        conn: &mut PgConnection,
    ) -> Result<Vec<(User, Option<String>)>, RepositoryError> {
        let rows: Vec<UserWithPasswordRow> = sqlx::query_as(&format!(
            r"
            SELECT {USER_COLUMNS}, p.password_hash
            FROM shop.user u
            LEFT JOIN shop.user_password p ON u.id = p.user_id
            ORDER BY u.id ASC
            "
        ))
        .fetch_all(conn)
        .await?;

        rows.into_iter()
            .map(|r| Ok((User::try_from(r.user)?, r.password_hash)))
            .collect()
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the row holds invalid data.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM shop.user u WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a user by their username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the row holds invalid data.
    pub async fn get_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM shop.user u WHERE u.username = $1"
        ))
        .bind(username.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Create a new user with a password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_with_password(
        &self,
        new_user: &NewUser,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: UserRow = sqlx::query_as(&format!(
            r"
            INSERT INTO shop.user AS u (username, email, first_name, is_staff)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(new_user.username.as_str())
        .bind(new_user.email.as_ref().map(Email::as_str))
        .bind(&new_user.first_name)
        .bind(new_user.is_staff)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "username already exists"))?;

        let user = User::try_from(row)?;

        sqlx::query(
            r"
            INSERT INTO shop.user_password (user_id, password_hash)
            VALUES ($1, $2)
            ",
        )
        .bind(user.id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user)
    }

    /// Get a user and their password hash by username.
    ///
    /// Returns `None` if the user doesn't exist or has no password set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        username: &Username,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row: Option<UserWithPasswordRow> = sqlx::query_as(&format!(
            r"
            SELECT {USER_COLUMNS}, p.password_hash
            FROM shop.user u
            LEFT JOIN shop.user_password p ON u.id = p.user_id
            WHERE u.username = $1
            "
        ))
        .bind(username.as_str())
        .fetch_optional(self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        let Some(password_hash) = r.password_hash else {
            return Ok(None);
        };

        Ok(Some((User::try_from(r.user)?, password_hash)))
    }

    /// Apply a partial update to a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update(&self, id: UserId, changes: &UserChanges) -> Result<User, RepositoryError> {
        self.update_with_password(id, changes, None).await
    }

    /// Apply a partial update and optionally replace the password hash.
    ///
    /// Both writes happen in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_with_password(
        &self,
        id: UserId,
        changes: &UserChanges,
        password_hash: Option<&str>,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<UserRow> = sqlx::query_as(&format!(
            r"
            UPDATE shop.user AS u
            SET first_name = COALESCE($2, u.first_name),
                email = COALESCE($3, u.email),
                is_staff = COALESCE($4, u.is_staff)
            WHERE u.id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(changes.first_name.as_deref())
        .bind(changes.email.as_ref().map(Email::as_str))
        .bind(changes.is_staff)
        .fetch_optional(&mut *tx)
        .await?;

        let user = User::try_from(row.ok_or(RepositoryError::NotFound)?)?;

        if let Some(hash) = password_hash {
            sqlx::query(UPSERT_PASSWORD)
                .bind(id)
                .bind(hash)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(user)
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn record_login(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE shop.user SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Delete a user.
    ///
    /// Orders, reviews and products created by the user are kept with their
    /// owner reference cleared.
    ///
    /// # Returns
    ///
    /// Returns `true` if the user was deleted, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.user WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all users.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shop.user")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
