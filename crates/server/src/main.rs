mod bootstrap;
mod routes;
mod shutdown;

use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use routes::AppState;
use shutdown::ShutdownGuard;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const INIT_GRACE: Duration = Duration::from_secs(8);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing();

    let shutdown = ShutdownGuard::new();
    shutdown.spawn_signal_listener();
    let token = shutdown.token();

    // bind first: /chat answers 503 until initialisation installs the pipeline
    let bind = std::env::var("SUPPORTER_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(addr = %bind, "listening");

    let state = AppState::new();
    let init = {
        let state = state.clone();
        tokio::spawn(async move {
            let (services, pool) = bootstrap::init().await;
            state.install(services);
            tracing::info!("engine ready");
            pool
        })
    };

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;

    // let a half-finished init settle so its pool is closed, not dropped
    if let Some(Some(pool)) = shutdown::join_within(init, INIT_GRACE).await {
        pool.close().await;
        tracing::info!("database pool closed");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

/// `RUST_LOG` filter (default `info`); JSON lines when `SUPPORTER_LOG_JSON` is set.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var_os("SUPPORTER_LOG_JSON").is_some();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer()))
        .init();
}
