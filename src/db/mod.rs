pub mod memory;
pub mod postgres;
pub mod store;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::models::user::{NewUser, Role};
use crate::services::password::PasswordHasher;
use store::{CredentialStore, StoreError};

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the migrations embedded from ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Demo accounts: (username, email, password, first name, last name, roles).
pub const DEMO_USERS: [(&str, &str, &str, &str, &str, &[Role]); 2] = [
    ("admin", "admin@example.com", "Admin@123", "Admin", "User", &[Role::Admin, Role::User]),
    ("user", "user@example.com", "User@123", "Demo", "User", &[Role::User]),
];

/// Creates the demo accounts if they are missing. Safe to run repeatedly.
pub async fn seed_demo_users(
    store: &dyn CredentialStore,
    hasher: &PasswordHasher,
) -> anyhow::Result<usize> {
    store.seed_roles().await?;

    let mut created = 0;
    for (username, email, password, first_name, last_name, roles) in DEMO_USERS {
        if store.email_exists(email).await? {
            continue;
        }
        let (first_role, extra_roles) = match roles.split_first() {
            Some((first, rest)) => (*first, rest),
            None => (Role::User, &[][..]),
        };

        let password_hash = hasher.hash_async(password.to_string()).await?;
        let user = match store
            .create_user(
                NewUser {
                    username: username.into(),
                    email: email.into(),
                    first_name: first_name.into(),
                    last_name: last_name.into(),
                    password_hash,
                },
                first_role,
            )
            .await
        {
            Ok(user) => user,
            // Another seeder got there first.
            Err(StoreError::Duplicate(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        for role in extra_roles {
            store.assign_role(user.id, *role).await?;
        }
        info!("Seeded demo user {email}");
        created += 1;
    }
    Ok(created)
}
