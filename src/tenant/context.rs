use std::future::Future;
use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;
use tracing::debug;

use crate::database::{ConnectionDescriptor, DatabaseManager};
use crate::tenant::TenantError;

/// Unit-of-work-local database context.
///
/// One `TenantContext` is created per request and carried through the request
/// pipeline; it is never shared across concurrent units of work, so two
/// in-flight requests can never observe each other's bound tenant. The
/// context is a stack of bindings: empty means Idle (shared database active),
/// the top entry is the currently bound descriptor. Pushes are paired with
/// scope guards so every exit path restores the previous binding.
#[derive(Clone)]
pub struct TenantContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    manager: Arc<DatabaseManager>,
    stack: Mutex<Vec<ActiveBinding>>,
}

struct ActiveBinding {
    descriptor: ConnectionDescriptor,
    pool: SqlitePool,
}

impl TenantContext {
    pub fn new(manager: Arc<DatabaseManager>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                manager,
                stack: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn manager(&self) -> &Arc<DatabaseManager> {
        &self.inner.manager
    }

    /// Name of the database queries currently resolve against.
    pub fn current_database(&self) -> String {
        let stack = self.inner.stack.lock().unwrap();
        stack
            .last()
            .map(|binding| binding.descriptor.database.clone())
            .unwrap_or_else(|| self.inner.manager.shared_descriptor().database)
    }

    /// Whether a tenant (rather than the shared database) is bound.
    pub fn is_bound(&self) -> bool {
        let stack = self.inner.stack.lock().unwrap();
        stack
            .last()
            .map(|binding| !binding.descriptor.is_shared())
            .unwrap_or(false)
    }

    /// Pool for the currently bound database; the shared pool when Idle.
    pub async fn current_pool(&self) -> Result<SqlitePool, TenantError> {
        let bound = {
            let stack = self.inner.stack.lock().unwrap();
            stack.last().map(|binding| binding.pool.clone())
        };
        match bound {
            Some(pool) => Ok(pool),
            None => Ok(self.inner.manager.shared_pool().await?),
        }
    }

    /// Push a binding and return the guard that reverts it. All queries
    /// issued while the guard lives observe the pushed database; dropping the
    /// guard restores whatever was bound before, on every exit path
    /// (including panics and task cancellation, since `Drop` still runs).
    pub fn bind(&self, descriptor: ConnectionDescriptor, pool: SqlitePool) -> BoundContext {
        debug!(database = %descriptor.database, "binding database context");
        let mut stack = self.inner.stack.lock().unwrap();
        stack.push(ActiveBinding { descriptor, pool });
        BoundContext {
            context: self.clone(),
        }
    }

    /// Run `f` against the shared database and restore the previous context
    /// afterward. Restoration targets exactly the previous binding, not
    /// unconditionally Idle, since the caller may be nested inside a
    /// tenant-bound unit of work.
    ///
    /// This is the escape hatch for cross-tenant reads (e.g. resolving a
    /// task's `user_id` to an email). Errors from `f` propagate as
    /// `CrossTenantLookupFailed`; restoration happens regardless.
    pub async fn with_shared_context<F, Fut, T>(&self, f: F) -> Result<T, TenantError>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let pool = self.inner.manager.shared_pool().await?;
        let _bound = self.bind(self.inner.manager.shared_descriptor(), pool.clone());
        f(pool).await.map_err(TenantError::CrossTenantLookupFailed)
    }

    fn pop(&self) {
        let mut stack = self.inner.stack.lock().unwrap();
        if let Some(binding) = stack.pop() {
            debug!(database = %binding.descriptor.database, "reverted database context");
        }
    }
}

/// Scope guard for one binding. Reverting is not an explicit call that can be
/// skipped by an early return or error; it happens when this guard drops.
pub struct BoundContext {
    context: TenantContext,
}

impl Drop for BoundContext {
    fn drop(&mut self) {
        self.context.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    async fn context(dir: &std::path::Path) -> (TenantContext, Arc<DatabaseManager>) {
        let mut config = AppConfig::development().database;
        config.data_dir = dir.to_path_buf();
        let manager = Arc::new(DatabaseManager::new(config));
        manager.migrate_shared().await.unwrap();
        (TenantContext::new(manager.clone()), manager)
    }

    #[tokio::test]
    async fn idle_context_uses_shared() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, manager) = context(dir.path()).await;

        assert!(!ctx.is_bound());
        assert_eq!(ctx.current_database(), "shared");
        ctx.current_pool().await.unwrap();
        manager.close_all().await;
    }

    #[tokio::test]
    async fn bind_and_revert() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, manager) = context(dir.path()).await;

        let pool = manager.provision_tenant("acme").await.unwrap();
        {
            let _bound = ctx.bind(manager.tenant_descriptor("acme").unwrap(), pool);
            assert!(ctx.is_bound());
            assert_eq!(ctx.current_database(), "tenant_acme");
        }
        assert!(!ctx.is_bound());
        assert_eq!(ctx.current_database(), "shared");
        manager.close_all().await;
    }

    #[tokio::test]
    async fn shared_context_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, manager) = context(dir.path()).await;

        let pool = manager.provision_tenant("acme").await.unwrap();
        let _bound = ctx.bind(manager.tenant_descriptor("acme").unwrap(), pool);

        let db_inside = ctx
            .with_shared_context(|_pool| {
                let ctx = ctx.clone();
                async move { Ok(ctx.current_database()) }
            })
            .await
            .unwrap();

        assert_eq!(db_inside, "shared");
        assert_eq!(ctx.current_database(), "tenant_acme");
        manager.close_all().await;
    }

    #[tokio::test]
    async fn shared_context_restores_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, manager) = context(dir.path()).await;

        let pool = manager.provision_tenant("acme").await.unwrap();
        let _bound = ctx.bind(manager.tenant_descriptor("acme").unwrap(), pool);

        let result: Result<(), TenantError> = ctx
            .with_shared_context(|_pool| async { Err(sqlx::Error::RowNotFound) })
            .await;

        assert!(matches!(
            result,
            Err(TenantError::CrossTenantLookupFailed(_))
        ));
        assert_eq!(ctx.current_database(), "tenant_acme");
        manager.close_all().await;
    }

    #[tokio::test]
    async fn contexts_do_not_cross_talk() {
        let dir = tempfile::tempdir().unwrap();
        let (_, manager) = context(dir.path()).await;

        let acme = manager.provision_tenant("acme").await.unwrap();
        let beta = manager.provision_tenant("beta").await.unwrap();

        // Two units of work with their own context handles
        let ctx_a = TenantContext::new(manager.clone());
        let ctx_b = TenantContext::new(manager.clone());
        let _a = ctx_a.bind(manager.tenant_descriptor("acme").unwrap(), acme);
        let _b = ctx_b.bind(manager.tenant_descriptor("beta").unwrap(), beta);

        assert_eq!(ctx_a.current_database(), "tenant_acme");
        assert_eq!(ctx_b.current_database(), "tenant_beta");
        manager.close_all().await;
    }
}
