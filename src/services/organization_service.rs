use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

use crate::database::models::Organization;
use crate::database::{is_valid_tenant_key, DatabaseError, DatabaseManager};
use crate::tenant::{ConnectionRouter, TenantDirectory, TenantError};

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("Organization name must not be blank")]
    BlankName,

    #[error("Invalid subdomain: {0}")]
    InvalidSubdomain(String),

    #[error("Subdomain already taken: {0}")]
    SubdomainTaken(String),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Organization signup and administration.
///
/// Creating an organization provisions its tenant database as a side effect.
/// The two steps are not atomic, so the failure path is explicit: if
/// provisioning fails, the just-created organization row is deleted and the
/// error surfaced, so the system never holds an organization pointing at no
/// database.
#[derive(Clone)]
pub struct OrganizationService {
    manager: Arc<DatabaseManager>,
    directory: TenantDirectory,
    router: ConnectionRouter,
}

impl OrganizationService {
    pub fn new(
        manager: Arc<DatabaseManager>,
        directory: TenantDirectory,
        router: ConnectionRouter,
    ) -> Self {
        Self {
            manager,
            directory,
            router,
        }
    }

    pub async fn create(&self, name: &str, subdomain: &str) -> Result<Organization, SignupError> {
        if name.trim().is_empty() {
            return Err(SignupError::BlankName);
        }
        if !is_valid_tenant_key(subdomain) {
            return Err(SignupError::InvalidSubdomain(subdomain.to_string()));
        }
        if self.directory.resolve(subdomain).await?.is_some() {
            return Err(SignupError::SubdomainTaken(subdomain.to_string()));
        }

        let pool = self.manager.shared_pool().await?;
        let now = Utc::now();
        let org = sqlx::query_as::<_, Organization>(
            "INSERT INTO organizations (name, subdomain, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             RETURNING id, name, subdomain, created_at, updated_at",
        )
        .bind(name)
        .bind(subdomain)
        .bind(now)
        .fetch_one(&pool)
        .await
        .map_err(|e| match &e {
            // Unique index on subdomain closes the check-then-insert window
            sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
                SignupError::SubdomainTaken(subdomain.to_string())
            }
            _ => SignupError::Database(DatabaseError::Sqlx(e)),
        })?;

        if let Err(e) = self.router.provision(subdomain).await {
            error!(subdomain, error = %e, "tenant provisioning failed, rolling back organization");
            if let Err(del) = sqlx::query("DELETE FROM organizations WHERE id = ?1")
                .bind(org.id)
                .execute(&pool)
                .await
            {
                error!(subdomain, error = %del, "failed to roll back organization record");
            }
            return Err(e.into());
        }

        info!(subdomain, "organization created and tenant database provisioned");
        Ok(org)
    }

    pub async fn list(&self) -> Result<Vec<Organization>, DatabaseError> {
        let pool = self.manager.shared_pool().await?;
        let orgs = sqlx::query_as::<_, Organization>(
            "SELECT id, name, subdomain, created_at, updated_at
             FROM organizations
             ORDER BY created_at DESC",
        )
        .fetch_all(&pool)
        .await?;
        Ok(orgs)
    }
}
