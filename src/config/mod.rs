use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the shared database and one file per tenant.
    pub data_dir: PathBuf,
    pub connect_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    /// Transient bind failures are retried this many times before falling
    /// back to the shared context.
    pub bind_retries: u32,
    pub bind_retry_backoff_ms: u64,
    /// Time-to-live for the cross-tenant user lookup cache.
    pub user_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("TASKTRACK_PORT").or_else(|_| env::var("PORT")) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("SERVER_ENABLE_CORS") {
            self.server.enable_cors = v.parse().unwrap_or(self.server.enable_cors);
        }

        // Database overrides
        if let Ok(v) = env::var("TASKTRACK_DATA_DIR") {
            self.database.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT_SECS") {
            self.database.connect_timeout_secs =
                v.parse().unwrap_or(self.database.connect_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs =
                v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_BIND_RETRIES") {
            self.database.bind_retries = v.parse().unwrap_or(self.database.bind_retries);
        }
        if let Ok(v) = env::var("DATABASE_BIND_RETRY_BACKOFF_MS") {
            self.database.bind_retry_backoff_ms =
                v.parse().unwrap_or(self.database.bind_retry_backoff_ms);
        }
        if let Ok(v) = env::var("DATABASE_USER_CACHE_TTL_SECS") {
            self.database.user_cache_ttl_secs =
                v.parse().unwrap_or(self.database.user_cache_ttl_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("TASKTRACK_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours =
                v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                enable_cors: true,
            },
            database: DatabaseConfig {
                data_dir: PathBuf::from("storage"),
                connect_timeout_secs: 5,
                acquire_timeout_secs: 5,
                bind_retries: 2,
                bind_retry_backoff_ms: 50,
                user_cache_ttl_secs: 300,
            },
            security: SecurityConfig {
                // Local default only; deployments set TASKTRACK_JWT_SECRET
                jwt_secret: "development-secret".to_string(),
                jwt_expiry_hours: 24 * 7,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3000,
                enable_cors: true,
            },
            database: DatabaseConfig {
                data_dir: PathBuf::from("storage"),
                connect_timeout_secs: 5,
                acquire_timeout_secs: 10,
                bind_retries: 3,
                bind_retry_backoff_ms: 100,
                user_cache_ttl_secs: 300,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 3000,
                enable_cors: false,
            },
            database: DatabaseConfig {
                data_dir: PathBuf::from("storage"),
                connect_timeout_secs: 5,
                acquire_timeout_secs: 10,
                bind_retries: 3,
                bind_retry_backoff_ms: 200,
                user_cache_ttl_secs: 300,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
        }
    }
}
