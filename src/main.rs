use se_education_api::{app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "se_education_api=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        app = %config.app_name,
        version = %config.api_version,
        algorithm = ?config.jwt.algorithm,
        ttl_minutes = config.jwt.ttl_minutes,
        "starting"
    );

    let app_state = AppState::init(config).await?;
    let config = app_state.config.clone();
    let router = app::build_app(app_state);
    app::serve(router, &config).await
}
