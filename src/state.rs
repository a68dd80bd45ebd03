use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::database::{DatabaseError, DatabaseManager};
use crate::services::{OrganizationService, UserLookup};
use crate::tenant::{ConnectionRouter, TenantDirectory, TenantResolver};

/// Shared application state: one pool manager, the tenant routing stack built
/// on top of it, and the services handlers call into. Everything here is
/// read-mostly and shared across requests; the per-request tenant binding
/// lives in each request's own `TenantContext`, never in this struct.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseManager>,
    pub directory: TenantDirectory,
    pub resolver: TenantResolver,
    pub router: ConnectionRouter,
    pub organizations: OrganizationService,
    pub users: Arc<UserLookup>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let db = Arc::new(DatabaseManager::new(config.database.clone()));
        let directory = TenantDirectory::new(db.clone());
        let resolver = TenantResolver::new(directory.clone());
        let router = ConnectionRouter::new(db.clone(), &config.database);
        let organizations =
            OrganizationService::new(db.clone(), directory.clone(), router.clone());
        let users = Arc::new(UserLookup::new(Duration::from_secs(
            config.database.user_cache_ttl_secs,
        )));

        Self {
            config: Arc::new(config),
            db,
            directory,
            resolver,
            router,
            organizations,
            users,
        }
    }

    /// Bring the shared schema up to date. Called once at startup.
    pub async fn init(&self) -> Result<(), DatabaseError> {
        self.db.migrate_shared().await
    }
}
