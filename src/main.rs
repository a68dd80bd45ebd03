use tasktrack_api::{app, config::AppConfig, AppState};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up TASKTRACK_DATA_DIR etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting TaskTrack API in {:?} mode", config.environment);

    let port = config.server.port;
    let state = AppState::new(config);
    if let Err(e) = state.init().await {
        panic!("failed to migrate shared database: {}", e);
    }

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("TaskTrack API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.expect("server");
}
