pub mod manager;
pub mod models;

pub use manager::{
    is_valid_tenant_key, ConnectionDescriptor, DatabaseError, DatabaseManager, SHARED_DB_NAME,
};
