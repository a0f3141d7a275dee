use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musicapp_auth::{
    config::FrontendConfig,
    frontend::{self, FrontendState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FrontendConfig::from_env()?;
    if !config.session_cookie_secure {
        warn!("SESSION_COOKIE_SECURE is off; the session cookie will be sent over plain HTTP");
    }

    let addr = format!("{}:{}", config.host, config.port);
    info!("Using API at {}", config.api_base_url);
    let state = FrontendState::new(config)?;
    let router = frontend::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Frontend listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}
