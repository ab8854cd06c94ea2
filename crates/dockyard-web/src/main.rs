//! Dockyard web server
//!
//! Run with: cargo run -p dockyard-web

use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dockyard_config::Config;
use dockyard_web::state::AppState;

/// How often idle sessions and old runs are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dockyard=debug,info")),
        )
        .init();

    info!("Starting Dockyard web server...");

    let config = Config::load()?;
    let bind = config.server.bind.clone();
    let idle = Duration::from_secs(config.session.idle_secs);

    // Fails fast when the Vina binary cannot be found.
    let state = AppState::new(config).await?;

    state.spawn_sweeper(SWEEP_INTERVAL, idle);

    let app = dockyard_web::router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
