//! Command-line client for the Music App auth API.
//!
//! Tokens are kept in a JSON file between invocations, and any call that
//! returns a fresh token updates that file.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use musicapp_auth::{
    client::{
        tokens::{FileTokenStore, TokenStore},
        ApiClient, ApiError, CallContext,
    },
    models::user::{TokenPair, TokenResponse, UserDto},
};

#[derive(Parser)]
#[command(name = "musicctl", about = "Sign in to the Music App API from the terminal")]
struct Args {
    /// Base URL of the API
    #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:5117")]
    api_url: String,

    /// Where tokens are stored (defaults to the user config directory)
    #[arg(long, env = "MUSICCTL_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the returned tokens
    Login {
        /// Email address or username
        #[arg(long)]
        email: String,
        #[arg(long, env = "MUSICCTL_PASSWORD")]
        password: String,
    },
    /// Show the signed-in user
    Whoami,
    /// Exchange the stored refresh token for a new pair
    Refresh,
    /// Revoke the stored refresh token and forget the tokens
    Logout,
}

fn report(err: &ApiError) -> anyhow::Error {
    tracing::debug!("API error: {err}");
    match err.login_redirect() {
        Some(_) => anyhow::anyhow!("{}. Run `musicctl login` again.", err.user_message()),
        None => anyhow::anyhow!("{}", err.user_message()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let path = match args.token_file {
        Some(path) => path,
        None => FileTokenStore::default_path().context("No config directory; pass --token-file")?,
    };
    let store = Arc::new(FileTokenStore::new(path));
    let ctx = CallContext::client_side(store.clone());
    let api = ApiClient::new(&args.api_url, Duration::from_secs(args.timeout))?;

    match args.command {
        Command::Login { email, password } => {
            // The token fields in the response are persisted by the client.
            let response: TokenResponse = api
                .post(&ctx, "api/auth/login", &json!({ "email": email, "password": password }))
                .await
                .map_err(|e| report(&e))?;
            println!(
                "Logged in as {} ({})",
                response.user.username,
                response.user.roles.join(", ")
            );
            println!("Tokens saved to {}", store.path().display());
        }
        Command::Whoami => {
            if ctx.bearer_token().is_none() {
                anyhow::bail!("Not logged in");
            }
            let user: UserDto = api.get(&ctx, "api/auth/me").await.map_err(|e| report(&e))?;
            println!("{} <{}> [{}]", user.username, user.email, user.roles.join(", "));
        }
        Command::Refresh => {
            let refresh_token = ctx.refresh_token().context("Not logged in")?;
            let _: TokenPair = api
                .post(&ctx, "api/auth/refresh-token", &json!({ "refreshToken": refresh_token }))
                .await
                .map_err(|e| report(&e))?;
            println!("Tokens refreshed");
        }
        Command::Logout => {
            if let Some(refresh_token) = ctx.refresh_token() {
                let result: Result<Value, ApiError> = api
                    .post(&ctx, "api/auth/revoke-token", &json!({ "refreshToken": refresh_token }))
                    .await;
                if let Err(e) = result {
                    eprintln!("Warning: could not revoke the refresh token: {}", e.user_message());
                }
            }
            store.clear()?;
            println!("Logged out");
        }
    }

    Ok(())
}
