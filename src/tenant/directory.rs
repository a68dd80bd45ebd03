use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::debug;

use crate::database::models::Organization;
use crate::database::{
    is_valid_tenant_key, ConnectionDescriptor, DatabaseError, DatabaseManager,
};

/// Maps tenant keys (organization subdomains) to connection descriptors.
///
/// Lookups always run a live query against the shared database, regardless of
/// the caller's current tenant context, so new organizations are routable
/// without a process restart.
#[derive(Clone)]
pub struct TenantDirectory {
    manager: Arc<DatabaseManager>,
}

impl TenantDirectory {
    pub fn new(manager: Arc<DatabaseManager>) -> Self {
        Self { manager }
    }

    /// Look up the organization registered for a tenant key. Returns `None`
    /// for unknown keys, syntactically invalid keys, and for a shared schema
    /// that has not been migrated yet (first boot), so the directory is
    /// safely queryable at any point in the process lifecycle.
    pub async fn resolve(&self, key: &str) -> Result<Option<Organization>, DatabaseError> {
        if !is_valid_tenant_key(key) {
            return Ok(None);
        }

        let pool = self.manager.shared_pool().await?;
        let row = sqlx::query_as::<_, Organization>(
            "SELECT id, name, subdomain, created_at, updated_at
             FROM organizations
             WHERE subdomain = ?1",
        )
        .bind(key)
        .fetch_optional(&pool)
        .await;

        match row {
            Ok(org) => Ok(org),
            Err(e) if is_missing_table(&e) => {
                debug!("organizations table not migrated yet; directory is empty");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Organization by primary key, for callers holding a foreign id (login,
    /// session claims) rather than a subdomain.
    pub async fn resolve_by_id(&self, id: i64) -> Result<Option<Organization>, DatabaseError> {
        let pool = self.manager.shared_pool().await?;
        let row = sqlx::query_as::<_, Organization>(
            "SELECT id, name, subdomain, created_at, updated_at
             FROM organizations
             WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&pool)
        .await;

        match row {
            Ok(org) => Ok(org),
            Err(e) if is_missing_table(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deterministic descriptor construction, used both for routing lookups
    /// and for first-time provisioning so the two never disagree on location.
    pub fn descriptor_for(&self, key: &str) -> Result<ConnectionDescriptor, DatabaseError> {
        self.manager.tenant_descriptor(key)
    }

    /// All known tenant keys, for bulk and administrative operations.
    pub async fn list_keys(&self) -> Result<Vec<String>, DatabaseError> {
        let pool = self.manager.shared_pool().await?;
        let rows: Result<Vec<(String,)>, sqlx::Error> =
            sqlx::query_as("SELECT subdomain FROM organizations ORDER BY subdomain")
                .fetch_all(&pool)
                .await;

        match rows {
            Ok(rows) => Ok(rows.into_iter().map(|(key,)| key).collect()),
            Err(e) if is_missing_table(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_missing_table(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.message().contains("no such table"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn manager(dir: &std::path::Path) -> Arc<DatabaseManager> {
        let mut config = AppConfig::development().database;
        config.data_dir = dir.to_path_buf();
        Arc::new(DatabaseManager::new(config))
    }

    #[tokio::test]
    async fn degrades_to_empty_before_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let directory = TenantDirectory::new(manager.clone());

        // Shared schema not migrated: lookups degrade instead of raising
        assert!(directory.resolve("acme").await.unwrap().is_none());
        assert!(directory.list_keys().await.unwrap().is_empty());
        manager.close_all().await;
    }

    #[tokio::test]
    async fn resolves_registered_organizations() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.migrate_shared().await.unwrap();
        let directory = TenantDirectory::new(manager.clone());

        let pool = manager.shared_pool().await.unwrap();
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO organizations (name, subdomain, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
        )
        .bind("Acme")
        .bind("acme")
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let org = directory.resolve("acme").await.unwrap().unwrap();
        assert_eq!(org.name, "Acme");
        assert!(directory.resolve("ghost").await.unwrap().is_none());
        // Invalid keys never reach the lookup
        assert!(directory.resolve("Not_Valid").await.unwrap().is_none());
        assert_eq!(directory.list_keys().await.unwrap(), vec!["acme"]);
        manager.close_all().await;
    }
}
