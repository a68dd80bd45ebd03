use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::database::models::Organization;
use crate::database::{DatabaseError, DatabaseManager};
use crate::tenant::{BoundContext, TenantContext, TenantError};

/// Binds model queries to the correct physical database for the span of a
/// unit of work.
///
/// This is the single place encoding the create-if-missing / fallback-to-
/// shared policy: a known provisioned key binds directly; a valid key with no
/// database yet is provisioned (file creation plus tenant migration replay)
/// and then bound; transient open failures are retried with backoff before
/// surfacing. On failure the context is left untouched (shared), never
/// dangling or partially bound.
#[derive(Clone)]
pub struct ConnectionRouter {
    manager: Arc<DatabaseManager>,
    bind_retries: u32,
    retry_backoff: Duration,
}

impl ConnectionRouter {
    pub fn new(manager: Arc<DatabaseManager>, config: &DatabaseConfig) -> Self {
        Self {
            manager,
            bind_retries: config.bind_retries,
            retry_backoff: Duration::from_millis(config.bind_retry_backoff_ms),
        }
    }

    /// Bind the unit of work's context to the organization's tenant database.
    /// The returned guard reverts the binding when dropped.
    pub async fn bind(
        &self,
        context: &TenantContext,
        organization: &Organization,
    ) -> Result<BoundContext, TenantError> {
        let key = organization.subdomain.as_str();
        let pool = self.acquire_pool(key).await?;
        let descriptor = self.manager.tenant_descriptor(key)?;
        Ok(context.bind(descriptor, pool))
    }

    /// Provision a tenant database without binding to it (signup, admin CLI).
    pub async fn provision(&self, key: &str) -> Result<(), TenantError> {
        self.manager
            .provision_tenant(key)
            .await
            .map_err(|source| TenantError::ProvisioningFailed {
                key: key.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn acquire_pool(&self, key: &str) -> Result<SqlitePool, TenantError> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_acquire(key).await {
                Ok(pool) => return Ok(pool),
                // Provisioning failures are not transient; surface immediately
                Err(e @ TenantError::ProvisioningFailed { .. }) => return Err(e),
                Err(e) if attempt < self.bind_retries => {
                    attempt += 1;
                    let backoff = self.retry_backoff * attempt;
                    warn!(
                        key,
                        attempt,
                        error = %e,
                        "bind failed, retrying after {:?}", backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_acquire(&self, key: &str) -> Result<SqlitePool, TenantError> {
        match self.manager.tenant_pool(key).await {
            Ok(pool) => Ok(pool),
            Err(DatabaseError::NotProvisioned(_)) => {
                info!(key, "tenant database missing, provisioning on first use");
                self.manager
                    .provision_tenant(key)
                    .await
                    .map_err(|source| TenantError::ProvisioningFailed {
                        key: key.to_string(),
                        source,
                    })
            }
            Err(e @ DatabaseError::InvalidTenantKey(_)) => Err(TenantError::Database(e)),
            Err(source) => Err(TenantError::BindFailed {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::tenant::TenantContext;
    use chrono::Utc;

    struct Fixture {
        manager: Arc<DatabaseManager>,
        router: ConnectionRouter,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::development().database;
        config.data_dir = dir.path().to_path_buf();
        let manager = Arc::new(DatabaseManager::new(config.clone()));
        let router = ConnectionRouter::new(manager.clone(), &config);
        Fixture {
            manager,
            router,
            _dir: dir,
        }
    }

    fn organization(subdomain: &str) -> Organization {
        Organization {
            id: 1,
            name: subdomain.to_string(),
            subdomain: subdomain.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn bind_provisions_on_first_use() {
        let fx = fixture();
        let ctx = TenantContext::new(fx.manager.clone());

        assert!(!fx.manager.is_provisioned("acme"));
        {
            let _bound = fx.router.bind(&ctx, &organization("acme")).await.unwrap();
            assert_eq!(ctx.current_database(), "tenant_acme");

            // The provisioned store has the tasks schema
            let pool = ctx.current_pool().await.unwrap();
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(count, 0);
        }
        assert_eq!(ctx.current_database(), "shared");
        assert!(fx.manager.is_provisioned("acme"));
        fx.manager.close_all().await;
    }

    #[tokio::test]
    async fn rebinding_existing_tenant_keeps_data() {
        let fx = fixture();
        let ctx = TenantContext::new(fx.manager.clone());
        let org = organization("acme");

        {
            let _bound = fx.router.bind(&ctx, &org).await.unwrap();
            let pool = ctx.current_pool().await.unwrap();
            sqlx::query(
                "INSERT INTO tasks (name, user_id, created_at, updated_at)
                 VALUES ('ship it', 1, ?1, ?1)",
            )
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        }

        // Second bind goes through the existing-database path
        let _bound = fx.router.bind(&ctx, &org).await.unwrap();
        let pool = ctx.current_pool().await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
        fx.manager.close_all().await;
    }

    #[tokio::test]
    async fn provisioning_failure_surfaces_distinctly() {
        let fx = fixture();

        // A directory squatting on the tenant's file path makes the sqlite
        // open fail, standing in for a disk-level provisioning failure.
        let path = fx.manager.tenant_descriptor("acme").unwrap().path;
        std::fs::create_dir_all(&path).unwrap();

        let err = fx.router.provision("acme").await.unwrap_err();
        assert!(matches!(err, TenantError::ProvisioningFailed { .. }));
        fx.manager.close_all().await;
    }

    #[tokio::test]
    async fn concurrent_first_use_provisions_once() {
        let fx = fixture();
        let org = organization("acme");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let router = fx.router.clone();
            let manager = fx.manager.clone();
            let org = org.clone();
            handles.push(tokio::spawn(async move {
                let ctx = TenantContext::new(manager);
                let _bound = router.bind(&ctx, &org).await.unwrap();
                // Every concurrent bind observes a fully-migrated database
                let pool = ctx.current_pool().await.unwrap();
                let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
                    .fetch_one(&pool)
                    .await
                    .unwrap();
                count
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 0);
        }
        fx.manager.close_all().await;
    }
}
