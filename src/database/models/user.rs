use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identity record in the shared database, belonging to one organization.
/// Users are never tenant-scoped: they must be resolvable regardless of which
/// tenant context is active, which is why cross-tenant task fields go through
/// the shared-context escape hatch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub organization_id: i64,
    pub email_address: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
