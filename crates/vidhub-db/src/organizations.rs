//! Organization repository.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use vidhub_core::models::{Organization, OrganizationSettings};
use vidhub_core::AppError;

const ORG_COLUMNS: &str =
    "id, name, slug, owner_id, settings, active, created_at, updated_at";

#[derive(Clone)]
pub struct OrganizationRepository {
    pool: PgPool,
}

impl OrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an organization. A taken slug is a conflict surfaced to
    /// the client, not an internal error.
    #[tracing::instrument(skip(self, settings))]
    pub async fn create(
        &self,
        name: &str,
        slug: &str,
        settings: &OrganizationSettings,
    ) -> Result<Organization, AppError> {
        let settings_json = serde_json::to_value(settings)?;
        let org = sqlx::query_as::<Postgres, Organization>(&format!(
            r#"
            INSERT INTO organizations (name, slug, settings)
            VALUES ($1, $2, $3)
            RETURNING {ORG_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(slug)
        .bind(settings_json)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Organization '{}' already exists", name))
            }
            _ => AppError::Database(e),
        })?;

        tracing::info!(org_id = %org.id, slug = %org.slug, "Organization created");
        Ok(org)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Organization>> {
        let org = sqlx::query_as::<Postgres, Organization>(&format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch organization by id")?;
        Ok(org)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        let org = sqlx::query_as::<Postgres, Organization>(&format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch organization by slug")?;
        Ok(org)
    }

    /// Fill in the owner once the owner's user row exists.
    #[tracing::instrument(skip(self))]
    pub async fn set_owner(&self, org_id: Uuid, owner_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE organizations SET owner_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(org_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .context("Failed to set organization owner")?;
        Ok(())
    }

    /// Total bytes of stored originals for the organization, for quota
    /// checks at upload time.
    pub async fn storage_used_bytes(&self, org_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(file_size), 0)::BIGINT AS used FROM videos WHERE organization_id = $1",
        )
        .bind(org_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute storage usage")?;
        Ok(row.try_get("used")?)
    }
}
