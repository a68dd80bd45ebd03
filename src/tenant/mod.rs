pub mod context;
pub mod directory;
pub mod resolver;
pub mod router;

use thiserror::Error;

use crate::database::DatabaseError;

pub use context::{BoundContext, TenantContext};
pub use directory::TenantDirectory;
pub use resolver::{RequestFacts, TenantResolver};
pub use router::ConnectionRouter;

/// Tenant routing errors. Resolution failures are swallowed into "no tenant"
/// upstream; everything here means a unit of work must not proceed against an
/// ambiguous context.
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Provisioning tenant database for '{key}' failed")]
    ProvisioningFailed {
        key: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Could not bind tenant database for '{key}'")]
    BindFailed {
        key: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Cross-tenant lookup failed")]
    CrossTenantLookupFailed(#[source] sqlx::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
