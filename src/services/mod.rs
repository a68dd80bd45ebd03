pub mod organization_service;
pub mod user_lookup;

pub use organization_service::{OrganizationService, SignupError};
pub use user_lookup::{UserLookup, UserRef};
