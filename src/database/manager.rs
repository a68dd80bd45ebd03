use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::DatabaseConfig;

/// Migrations for the shared (cross-tenant) schema: organizations, users.
pub static SHARED_MIGRATOR: Migrator = sqlx::migrate!("migrations/shared");

/// Migrations replayed into every tenant database: the tasks schema.
pub static TENANT_MIGRATOR: Migrator = sqlx::migrate!("migrations/tenant");

/// Logical name of the shared database.
pub const SHARED_DB_NAME: &str = "shared";

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid tenant key: {0}")]
    InvalidTenantKey(String),

    #[error("Tenant database not provisioned: {0}")]
    NotProvisioned(String),

    #[error("Timed out opening database: {0}")]
    ConnectTimeout(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Everything needed to open a connection to one physical database.
/// Ephemeral and process-local; derived deterministically from the tenant
/// key so lookup and provisioning always agree on the same location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub database: String,
    pub path: PathBuf,
}

impl ConnectionDescriptor {
    pub fn shared(data_dir: &std::path::Path) -> Self {
        Self {
            database: SHARED_DB_NAME.to_string(),
            path: data_dir.join(format!("{}.sqlite3", SHARED_DB_NAME)),
        }
    }

    pub fn for_tenant(data_dir: &std::path::Path, key: &str) -> Self {
        let database = format!("tenant_{}", key);
        Self {
            path: data_dir.join(format!("{}.sqlite3", database)),
            database,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.database == SHARED_DB_NAME
    }
}

/// Syntactic check applied to every tenant key before it is used as a
/// database-name fragment or looked up in the directory: lowercase
/// alphanumeric plus hyphen, at least two characters.
pub fn is_valid_tenant_key(key: &str) -> bool {
    key.len() >= 2
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Centralized connection pool manager for the shared and tenant databases.
///
/// Pools are keyed by database name, created lazily, and reused across units
/// of work. A per-database async mutex serializes first-use provisioning and
/// eviction so a concurrent bind never observes a partially-migrated store.
pub struct DatabaseManager {
    data_dir: PathBuf,
    config: DatabaseConfig,
    pools: RwLock<HashMap<String, SqlitePool>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DatabaseManager {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            config,
            pools: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::shared(&self.data_dir)
    }

    pub fn tenant_descriptor(&self, key: &str) -> Result<ConnectionDescriptor, DatabaseError> {
        if !is_valid_tenant_key(key) {
            return Err(DatabaseError::InvalidTenantKey(key.to_string()));
        }
        Ok(ConnectionDescriptor::for_tenant(&self.data_dir, key))
    }

    /// Pool for the shared database, created on first use.
    pub async fn shared_pool(&self) -> Result<SqlitePool, DatabaseError> {
        let descriptor = self.shared_descriptor();
        if let Some(pool) = self.cached(&descriptor.database).await {
            return Ok(pool);
        }

        let lock = self.lock_for(&descriptor.database).await;
        let _guard = lock.lock().await;
        if let Some(pool) = self.cached(&descriptor.database).await {
            return Ok(pool);
        }

        let pool = self.open(&descriptor, true).await?;
        self.cache(&descriptor.database, pool.clone()).await;
        Ok(pool)
    }

    /// Run the shared migration set. Called once at startup; idempotent.
    pub async fn migrate_shared(&self) -> Result<(), DatabaseError> {
        let pool = self.shared_pool().await?;
        SHARED_MIGRATOR.run(&pool).await?;
        Ok(())
    }

    /// Pool for an already-provisioned tenant database. Never creates the
    /// store and never runs migrations; a missing file is `NotProvisioned`.
    pub async fn tenant_pool(&self, key: &str) -> Result<SqlitePool, DatabaseError> {
        let descriptor = self.tenant_descriptor(key)?;
        if let Some(pool) = self.cached(&descriptor.database).await {
            return Ok(pool);
        }

        let lock = self.lock_for(&descriptor.database).await;
        let _guard = lock.lock().await;
        if let Some(pool) = self.cached(&descriptor.database).await {
            return Ok(pool);
        }
        if !descriptor.path.exists() {
            return Err(DatabaseError::NotProvisioned(descriptor.database));
        }

        let pool = self.open(&descriptor, false).await?;
        self.cache(&descriptor.database, pool.clone()).await;
        Ok(pool)
    }

    /// Create a tenant database and replay the tenant migration set into it.
    ///
    /// Holds the per-database lock for the whole create-and-migrate step, and
    /// only publishes the pool once migrations have finished, so concurrent
    /// callers resolving the same new key wait and then see a complete store.
    pub async fn provision_tenant(&self, key: &str) -> Result<SqlitePool, DatabaseError> {
        let descriptor = self.tenant_descriptor(key)?;

        let lock = self.lock_for(&descriptor.database).await;
        let _guard = lock.lock().await;
        if let Some(pool) = self.cached(&descriptor.database).await {
            return Ok(pool);
        }

        std::fs::create_dir_all(&self.data_dir)?;
        let pool = self.open(&descriptor, true).await?;
        TENANT_MIGRATOR.run(&pool).await?;
        self.cache(&descriptor.database, pool.clone()).await;

        info!(database = %descriptor.database, "provisioned tenant database");
        Ok(pool)
    }

    /// Whether a tenant database exists on disk for this key.
    pub fn is_provisioned(&self, key: &str) -> bool {
        match self.tenant_descriptor(key) {
            Ok(descriptor) => descriptor.path.exists(),
            Err(_) => false,
        }
    }

    /// Close and forget a tenant pool. Takes the same per-database lock as
    /// provisioning so eviction cannot race an in-flight bind for the key.
    pub async fn evict_tenant(&self, key: &str) -> Result<(), DatabaseError> {
        let descriptor = self.tenant_descriptor(key)?;
        let lock = self.lock_for(&descriptor.database).await;
        let _guard = lock.lock().await;

        let removed = self.pools.write().await.remove(&descriptor.database);
        if let Some(pool) = removed {
            pool.close().await;
            info!(database = %descriptor.database, "evicted tenant pool");
        }
        Ok(())
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!(database = %name, "closed database pool");
        }
    }

    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        create: bool,
    ) -> Result<SqlitePool, DatabaseError> {
        if create {
            std::fs::create_dir_all(&self.data_dir)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&descriptor.path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(self.config.acquire_timeout_secs))
            .foreign_keys(true);

        // One connection per database: pooled WAL readers can serve a stale
        // snapshot, so a SELECT right after a committed INSERT on the same
        // pool may miss the row. A single connection keeps reads ordered
        // after writes within a pool.
        let connect = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(self.config.acquire_timeout_secs))
            .connect_with(options);

        let pool = tokio::time::timeout(
            Duration::from_secs(self.config.connect_timeout_secs),
            connect,
        )
        .await
        .map_err(|_| DatabaseError::ConnectTimeout(descriptor.database.clone()))??;

        info!(database = %descriptor.database, "created database pool");
        Ok(pool)
    }

    async fn cached(&self, database: &str) -> Option<SqlitePool> {
        self.pools.read().await.get(database).cloned()
    }

    async fn cache(&self, database: &str, pool: SqlitePool) {
        self.pools.write().await.insert(database.to_string(), pool);
    }

    async fn lock_for(&self, database: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(database.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
