use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::FromRow;

use crate::tenant::{TenantContext, TenantError};

/// The slice of a user record that task rendering needs.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRef {
    pub id: i64,
    pub email_address: String,
    pub organization_id: i64,
}

struct CacheEntry {
    fetched_at: Instant,
    user: Option<UserRef>,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Read-through cache for resolving user ids found in tenant rows against the
/// shared users table.
///
/// Every miss is one escape-hatch round trip (switch to shared, read, switch
/// back); task lists touch creator and assignee per row, so results are
/// cached with a short TTL. Negative results are cached too, keyed the same
/// way.
pub struct UserLookup {
    ttl: Duration,
    cache: Mutex<HashMap<i64, CacheEntry>>,
}

impl UserLookup {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a user id through the shared context, leaving the caller's
    /// ambient tenant context exactly as it was.
    pub async fn user_ref(
        &self,
        context: &TenantContext,
        user_id: i64,
    ) -> Result<Option<UserRef>, TenantError> {
        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&user_id) {
                if entry.is_fresh(self.ttl) {
                    return Ok(entry.user.clone());
                }
            }
        }

        let user = context
            .with_shared_context(|pool| async move {
                sqlx::query_as::<_, UserRef>(
                    "SELECT id, email_address, organization_id FROM users WHERE id = ?1",
                )
                .bind(user_id)
                .fetch_optional(&pool)
                .await
            })
            .await?;

        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            user_id,
            CacheEntry {
                fetched_at: Instant::now(),
                user: user.clone(),
            },
        );
        Ok(user)
    }

    /// Email for a task's creator, with the placeholder the UI expects.
    pub async fn email_or_unknown(
        &self,
        context: &TenantContext,
        user_id: i64,
    ) -> Result<String, TenantError> {
        Ok(self
            .user_ref(context, user_id)
            .await?
            .map(|u| u.email_address)
            .unwrap_or_else(|| "Unknown User".to_string()))
    }

    /// Email for a task's assignee; `None` assignee renders as unassigned.
    pub async fn assignee_email(
        &self,
        context: &TenantContext,
        assigned_to: Option<i64>,
    ) -> Result<String, TenantError> {
        match assigned_to {
            Some(id) => Ok(self
                .user_ref(context, id)
                .await?
                .map(|u| u.email_address)
                .unwrap_or_else(|| "Unassigned".to_string())),
            None => Ok("Unassigned".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::DatabaseManager;
    use std::sync::Arc;

    #[test]
    fn cache_entries_expire() {
        let entry = CacheEntry {
            fetched_at: Instant::now(),
            user: None,
        };
        assert!(entry.is_fresh(Duration::from_secs(300)));
        assert!(!entry.is_fresh(Duration::ZERO));
    }

    #[tokio::test]
    async fn resolves_through_shared_context_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::development().database;
        config.data_dir = dir.path().to_path_buf();
        let manager = Arc::new(DatabaseManager::new(config));
        manager.migrate_shared().await.unwrap();

        let pool = manager.shared_pool().await.unwrap();
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO organizations (name, subdomain, created_at, updated_at)
             VALUES ('Acme', 'acme', ?1, ?1)",
        )
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO users (organization_id, email_address, password_digest, created_at, updated_at)
             VALUES (1, 'a@acme.test', 'x', ?1, ?1)",
        )
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let tenant_pool = manager.provision_tenant("acme").await.unwrap();
        let ctx = TenantContext::new(manager.clone());
        let _bound = ctx.bind(manager.tenant_descriptor("acme").unwrap(), tenant_pool);

        let lookup = UserLookup::new(Duration::from_secs(300));
        let email = lookup.email_or_unknown(&ctx, 1).await.unwrap();
        assert_eq!(email, "a@acme.test");
        // Ambient context is still the tenant after the lookup
        assert_eq!(ctx.current_database(), "tenant_acme");

        // Unknown ids resolve to the placeholder and are cached as misses
        assert_eq!(lookup.email_or_unknown(&ctx, 99).await.unwrap(), "Unknown User");
        assert_eq!(lookup.assignee_email(&ctx, None).await.unwrap(), "Unassigned");

        // Second hit is served from cache
        let cached = lookup.user_ref(&ctx, 1).await.unwrap().unwrap();
        assert_eq!(cached.organization_id, 1);
        manager.close_all().await;
    }
}
