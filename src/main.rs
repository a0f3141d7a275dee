use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musicapp_auth::{
    app,
    config::Config,
    db::{self, memory::MemoryCredentialStore, postgres::PgCredentialStore, store::CredentialStore},
    services::password::PasswordHasher,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn CredentialStore> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            let store = PgCredentialStore::new(pool);
            // Roles are a precondition for registration; refuse to start without them.
            store.seed_roles().await?;
            info!("Database connected and migrations applied");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL is not set; using the in-memory credential store with demo accounts");
            let store = MemoryCredentialStore::new();
            let hasher = PasswordHasher::new(config.auth.bcrypt_cost);
            db::seed_demo_users(&store, &hasher).await?;
            Arc::new(store)
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, store)?;
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}
