//! User repository, including the one-slot refresh-token rotation.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use vidhub_core::models::{User, UserRole};
use vidhub_core::AppError;

const USER_COLUMNS: &str = "id, email, password_hash, name, role, organization_id, active, \
     last_login_at, refresh_token_current, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a user. Duplicate email is a conflict.
    #[tracing::instrument(skip(self, password_hash))]
    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: UserRole,
        organization_id: Uuid,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<Postgres, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, name, role, organization_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role)
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("Email already registered".to_string())
            }
            _ => AppError::Database(e),
        })?;

        tracing::info!(user_id = %user.id, org_id = %organization_id, role = %role, "User created");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<Postgres, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by id")?;
        Ok(user)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<Postgres, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by email")?;
        Ok(user)
    }

    pub async fn touch_last_login(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update last_login_at")?;
        Ok(())
    }

    /// Store a new refresh-token digest unconditionally (login).
    pub async fn set_refresh_token(&self, id: Uuid, digest: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET refresh_token_current = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .execute(&self.pool)
        .await
        .context("Failed to store refresh token")?;
        Ok(())
    }

    /// Rotate the one-slot refresh token: succeeds only when the stored
    /// digest still equals `expected`. A zero-row update means the
    /// token was already spent (replay) or rotated concurrently.
    #[tracing::instrument(skip(self, expected, next))]
    pub async fn swap_refresh_token(&self, id: Uuid, expected: &str, next: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_current = $3, updated_at = NOW()
            WHERE id = $1 AND refresh_token_current = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await
        .context("Failed to rotate refresh token")?;
        Ok(result.rows_affected() == 1)
    }

    /// Clear the refresh-token slot (logout).
    pub async fn clear_refresh_token(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE users SET refresh_token_current = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to clear refresh token")?;
        Ok(())
    }
}
