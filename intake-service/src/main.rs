use anyhow::Context;
use intake_service::{ServiceConfig, create_app, telemetry::init_tracing};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(
        config.log_format,
        "intake_service=debug,intake_engine=info,tower_http=debug",
    );

    let (app, state) = create_app(&config)?;
    let _sweeper = state.spawn_sweeper(config.sessions.sweep_interval);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!(
        session_ttl_secs = config.sessions.ttl.as_secs(),
        session_capacity = config.sessions.capacity,
        enhancer = config.enhancer.is_some(),
        "Research intake service starting on {}",
        addr
    );
    info!("Health check endpoint: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
