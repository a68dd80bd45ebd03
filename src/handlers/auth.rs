use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{generate_jwt, verify_password, Claims};
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email_address: String,
    pub password: String,
}

/// POST /auth/login - authenticate against the shared users table and issue
/// a JWT. The claims carry the user's organization subdomain, which later
/// requests can rely on as the resolver's session strategy.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Value> {
    let pool = state.db.shared_pool().await?;
    let user = sqlx::query_as::<_, User>(
        "SELECT id, organization_id, email_address, password_digest, created_at, updated_at
         FROM users
         WHERE email_address = ?1",
    )
    .bind(payload.email_address.trim())
    .fetch_optional(&pool)
    .await?;

    let user = match user {
        Some(user) if verify_password(&payload.password, &user.password_digest) => user,
        // Same response for unknown email and bad password
        _ => return Err(ApiError::unauthorized("Invalid email or password")),
    };

    let organization = state
        .directory
        .resolve_by_id(user.organization_id)
        .await?
        .ok_or_else(|| {
            tracing::error!(user_id = user.id, "user references a missing organization");
            ApiError::internal_server_error("Account is not attached to an organization")
        })?;

    let expiry_hours = state.config.security.jwt_expiry_hours;
    let claims = Claims::new(
        user.id,
        user.email_address.clone(),
        organization.id,
        organization.subdomain.clone(),
        expiry_hours,
    );
    let token = generate_jwt(&claims, &state.config.security.jwt_secret)?;

    Ok(ApiResponse::success(json!({
        "token": token,
        "expires_in": expiry_hours * 3600,
        "user": {
            "id": user.id,
            "email_address": user.email_address,
            "organization_id": organization.id,
            "organization": organization.subdomain,
        }
    })))
}

/// GET /auth/whoami - echo the authenticated identity.
pub async fn whoami(Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "id": user.user_id,
        "email_address": user.email,
        "organization_id": user.organization_id,
        "organization": user.org_subdomain,
    })))
}
