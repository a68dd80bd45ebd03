use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{Organization, Task};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, ResolvedOrganization};
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Task as rendered to clients: the tenant row plus creator/assignee emails
/// resolved from the shared database through the escape hatch.
#[derive(Debug, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub user_email: String,
    pub assigned_user_email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<i64>,
}

/// Tenant routes are also reachable without a resolved organization (e.g. a
/// bare host); those requests run on the shared context and get a 404 here
/// rather than an error during resolution. A resolved organization other than
/// the authenticated user's own is rejected: task actions are scoped to the
/// user's organization, whichever strategy named the tenant.
fn require_organization(
    user: &AuthUser,
    organization: Option<Extension<ResolvedOrganization>>,
) -> Result<Organization, ApiError> {
    let org = organization
        .map(|Extension(ResolvedOrganization(org))| org)
        .ok_or_else(|| ApiError::not_found("No organization resolved for this request"))?;
    if org.id != user.organization_id {
        return Err(ApiError::forbidden(
            "Tasks are only accessible within your own organization",
        ));
    }
    Ok(org)
}

async fn render(
    state: &AppState,
    context: &TenantContext,
    task: Task,
) -> Result<TaskView, ApiError> {
    let user_email = state.users.email_or_unknown(context, task.user_id).await?;
    let assigned_user_email = state
        .users
        .assignee_email(context, task.assigned_to)
        .await?;
    Ok(TaskView {
        task,
        user_email,
        assigned_user_email,
    })
}

/// GET /api/tasks - tasks in the bound tenant database.
pub async fn list(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Extension(user): Extension<AuthUser>,
    organization: Option<Extension<ResolvedOrganization>>,
) -> ApiResult<Vec<TaskView>> {
    require_organization(&user, organization)?;

    let pool = context.current_pool().await?;
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT id, name, description, due_date, user_id, assigned_to, created_at, updated_at
         FROM tasks
         ORDER BY created_at DESC",
    )
    .fetch_all(&pool)
    .await?;

    let mut views = Vec::with_capacity(tasks.len());
    for task in tasks {
        views.push(render(&state, &context, task).await?);
    }
    Ok(ApiResponse::success(views))
}

/// GET /api/tasks/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Extension(user): Extension<AuthUser>,
    organization: Option<Extension<ResolvedOrganization>>,
    Path(id): Path<i64>,
) -> ApiResult<TaskView> {
    require_organization(&user, organization)?;

    let task = fetch_task(&context, id).await?;
    Ok(ApiResponse::success(render(&state, &context, task).await?))
}

/// POST /api/tasks - create a task in the bound tenant database. The creator
/// is the authenticated user; an assignee, if given, must exist in the shared
/// users table (validated through the escape hatch, since the tenant database
/// cannot enforce the reference itself).
pub async fn create(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Extension(user): Extension<AuthUser>,
    organization: Option<Extension<ResolvedOrganization>>,
    Json(payload): Json<CreateTaskRequest>,
) -> ApiResult<TaskView> {
    require_organization(&user, organization)?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::field_error("name", "must not be blank"));
    }
    if let Some(assignee) = payload.assigned_to {
        if state.users.user_ref(&context, assignee).await?.is_none() {
            return Err(ApiError::field_error("assigned_to", "unknown user"));
        }
    }

    let pool = context.current_pool().await?;
    let now = Utc::now();
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (name, description, due_date, user_id, assigned_to, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         RETURNING id, name, description, due_date, user_id, assigned_to, created_at, updated_at",
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.due_date)
    .bind(user.user_id)
    .bind(payload.assigned_to)
    .bind(now)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::created(render(&state, &context, task).await?))
}

/// PUT /api/tasks/:id - partial update; omitted fields are unchanged.
pub async fn update(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Extension(user): Extension<AuthUser>,
    organization: Option<Extension<ResolvedOrganization>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTaskRequest>,
) -> ApiResult<TaskView> {
    require_organization(&user, organization)?;

    let current = fetch_task(&context, id).await?;

    let name = payload.name.unwrap_or(current.name);
    if name.trim().is_empty() {
        return Err(ApiError::field_error("name", "must not be blank"));
    }
    if let Some(assignee) = payload.assigned_to {
        if state.users.user_ref(&context, assignee).await?.is_none() {
            return Err(ApiError::field_error("assigned_to", "unknown user"));
        }
    }
    let description = payload.description.or(current.description);
    let due_date = payload.due_date.or(current.due_date);
    let assigned_to = payload.assigned_to.or(current.assigned_to);

    let pool = context.current_pool().await?;
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks
         SET name = ?1, description = ?2, due_date = ?3, assigned_to = ?4, updated_at = ?5
         WHERE id = ?6
         RETURNING id, name, description, due_date, user_id, assigned_to, created_at, updated_at",
    )
    .bind(name.trim())
    .bind(&description)
    .bind(due_date)
    .bind(assigned_to)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::success(render(&state, &context, task).await?))
}

/// DELETE /api/tasks/:id
pub async fn destroy(
    Extension(context): Extension<TenantContext>,
    Extension(user): Extension<AuthUser>,
    organization: Option<Extension<ResolvedOrganization>>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    require_organization(&user, organization)?;

    let pool = context.current_pool().await?;
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found(format!("No task with id {}", id)));
    }
    Ok(ApiResponse::<()>::no_content())
}

async fn fetch_task(context: &TenantContext, id: i64) -> Result<Task, ApiError> {
    let pool = context.current_pool().await?;
    sqlx::query_as::<_, Task>(
        "SELECT id, name, description, due_date, user_id, assigned_to, created_at, updated_at
         FROM tasks
         WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::not_found(format!("No task with id {}", id)))
}
