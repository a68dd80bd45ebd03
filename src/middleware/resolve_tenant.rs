use axum::{
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::Response,
};

use crate::database::models::Organization;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::tenant::{RequestFacts, TenantContext};

/// Organization resolved for the current request, injected for downstream
/// consumers so nothing re-resolves.
#[derive(Clone, Debug)]
pub struct ResolvedOrganization(pub Organization);

/// Per-request tenant elevation.
///
/// Creates the unit-of-work `TenantContext`, runs the resolver chain over the
/// request, and binds the context to the resolved organization's database for
/// the span of the request. The bind guard is held across the inner handler
/// and dropped afterward, so the context reverts on every exit path. A
/// request that resolves no tenant proceeds against the shared context; a
/// failed bind or provision aborts the request instead of letting it run
/// against an ambiguous database.
pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = TenantContext::new(state.db.clone());

    let session_key = request
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.org_subdomain.clone());
    let host = request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let header_key = request
        .headers()
        .get("x-organization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    // Nested mounts (the /orgs/:org group) strip their prefix from the
    // request URI before inner middleware runs; the path strategy needs the
    // path as received.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let facts = RequestFacts {
        host: host.as_deref(),
        path: &path,
        header: header_key.as_deref(),
        session: session_key.as_deref(),
    };

    let resolved = state.resolver.resolve_request(&facts).await;

    request.extensions_mut().insert(context.clone());

    match resolved {
        Some(organization) => {
            let bound = state.router.bind(&context, &organization).await?;
            request
                .extensions_mut()
                .insert(ResolvedOrganization(organization));
            let response = next.run(request).await;
            drop(bound);
            Ok(response)
        }
        None => Ok(next.run(request).await),
    }
}
