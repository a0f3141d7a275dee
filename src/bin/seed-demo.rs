//! Demo account seed script
//!
//! Ensures the `Admin` and `User` roles exist and creates the demo accounts:
//! - admin@example.com / Admin@123 (Admin, User)
//! - user@example.com  / User@123  (User)
//!
//! Existing accounts are left untouched, so the script can be re-run.
//!
//! Usage:
//!   DATABASE_URL=... ./seed-demo

use std::env;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musicapp_auth::{
    config::AuthConfig,
    db::{self, postgres::PgCredentialStore},
    services::password::PasswordHasher,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL required")?;
    let auth = AuthConfig::from_env()?;

    println!("=== Seed Demo Accounts ===");

    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool).await.context("Failed to run migrations")?;

    let store = PgCredentialStore::new(pool);
    let hasher = PasswordHasher::new(auth.bcrypt_cost);
    let created = db::seed_demo_users(&store, &hasher).await?;

    println!("Created {created} demo account(s)");
    for (_, email, password, _, _, roles) in db::DEMO_USERS {
        let roles: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
        println!("  {email} / {password} ({})", roles.join(", "));
    }
    Ok(())
}
