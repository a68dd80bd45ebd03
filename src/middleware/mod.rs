pub mod auth;
pub mod resolve_tenant;
pub mod response;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use resolve_tenant::{tenant_middleware, ResolvedOrganization};
pub use response::{ApiResponse, ApiResult};
