use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::hash_password;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email_address: String,
    pub password: String,
    pub organization_id: i64,
}

/// POST /api/users - register a user under an organization. Users live in
/// the shared database; this never touches a tenant context.
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<User> {
    if payload.email_address.trim().is_empty() {
        return Err(ApiError::field_error("email_address", "must not be blank"));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::field_error(
            "password",
            "must be at least 8 characters",
        ));
    }

    if state
        .directory
        .resolve_by_id(payload.organization_id)
        .await?
        .is_none()
    {
        return Err(ApiError::field_error(
            "organization_id",
            "unknown organization",
        ));
    }

    let pool = state.db.shared_pool().await?;
    let now = Utc::now();
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (organization_id, email_address, password_digest, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         RETURNING id, organization_id, email_address, password_digest, created_at, updated_at",
    )
    .bind(payload.organization_id)
    .bind(payload.email_address.trim())
    .bind(hash_password(&payload.password))
    .bind(now)
    .fetch_one(&pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
            ApiError::conflict("Email address is already registered")
        }
        _ => ApiError::from(e),
    })?;

    Ok(ApiResponse::created(user))
}
