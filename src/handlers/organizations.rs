use axum::{extract::State, Json};
use serde::Deserialize;

use crate::database::models::Organization;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub subdomain: String,
}

/// POST /api/organizations - organization signup.
///
/// Creates the identity record in the shared database and provisions the
/// organization's tenant database; if provisioning fails the record is rolled
/// back and the request fails. Runs against the shared context only (the
/// route group deliberately skips the tenant router).
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> ApiResult<Organization> {
    let organization = state
        .organizations
        .create(&payload.name, &payload.subdomain)
        .await?;
    Ok(ApiResponse::created(organization))
}

/// GET /api/organizations - administrative listing, shared context.
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Organization>> {
    let organizations = state.organizations.list().await?;
    Ok(ApiResponse::success(organizations))
}
