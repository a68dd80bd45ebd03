use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::middleware::{jwt_auth_middleware, tenant_middleware};
use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(handlers::public::root))
        .route("/health", get(handlers::public::health))
        .route("/auth/login", post(handlers::auth::login))
        // Shared-context API: organizations and users live in the shared
        // database and explicitly skip the tenant router
        .merge(shared_routes())
        // Tenant-scoped API
        .merge(tenant_routes(&state))
        // Path-prefix tenant strategy: the same tenant API mounted under an
        // organization key segment
        .nest("/orgs/:org", tenant_routes(&state))
        .layer(TraceLayer::new_for_http());

    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

fn shared_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations",
            get(handlers::organizations::list).post(handlers::organizations::create),
        )
        .route("/api/users", post(handlers::users::create))
}

fn tenant_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/tasks",
            get(handlers::tasks::list).post(handlers::tasks::create),
        )
        .route(
            "/api/tasks/:id",
            get(handlers::tasks::show)
                .put(handlers::tasks::update)
                .delete(handlers::tasks::destroy),
        )
        .route("/auth/whoami", get(handlers::auth::whoami))
        // Layer ordering: authentication first, then tenant resolution, so
        // the resolver can use the session claims as its last strategy
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            tenant_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ))
}
