//! Native driver for the Beacon session.
//!
//! Keeps the session in file storage (`BEACON_STORAGE_DIR`) so consecutive
//! invocations behave like restarts of the app: each run rehydrates, acts,
//! and flushes its changes before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use beacon::guard::evaluate;
use beacon::storage::FileStorage;
use beacon::{
    AppReady, AuthGuard, AuthTokens, Clock, GuardDecision, Session, SessionConfig, SessionStore, SystemClock, User,
    bootstrap, decode_claims, is_token_valid,
};
use clap::{Parser, Subcommand};
use reqwest::header::AUTHORIZATION;
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] beacon::ConfigError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("login rejected (HTTP {status}): {message}")]
    LoginRejected { status: u16, message: String },
    #[error("server returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("not logged in")]
    NotLoggedIn,
    #[error("invalid access token: {0}")]
    Token(#[from] beacon::TokenError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "beacon-cli", about = "Inspect and drive the Beacon auth session")]
struct Cli {
    #[arg(long, env = "BEACON_API_URL", default_value = "http://127.0.0.1:8000")]
    base_url: String,

    /// Overrides `BEACON_STORAGE_DIR`.
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the persisted session and what the guard would do with it.
    Status,
    /// Log in against the authentication endpoint.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "BEACON_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in offline with an existing token pair.
    Import {
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: String,
        /// User record as JSON.
        #[arg(long)]
        user: Option<String>,
    },
    Logout,
    /// Fetch the current profile with the stored bearer token.
    Me,
    /// Decode an access token's claims.
    Token { access: String },
    /// Run one guard evaluation against the persisted session.
    Guard,
}

#[derive(Debug, serde::Deserialize)]
struct LoginResponse {
    user: User,
    tokens: AuthTokens,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env()?;
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }

    let storage = Arc::new(FileStorage::new(&config.storage_dir));
    let (store, persist) = bootstrap(storage, config.keys.clone()).await;
    let persist = tokio::spawn(persist);
    let clock = SystemClock;

    let outcome = match cli.command {
        Command::Status => print_json(&status_report(&store.snapshot(), clock.now_ms())),
        Command::Login { email, password } => run_login(&store, &cli.base_url, &email, &password).await,
        Command::Import { access, refresh, user } => run_import(&store, access, refresh, user.as_deref()),
        Command::Logout => {
            store.logout();
            println!("logged out");
            Ok(())
        }
        Command::Me => run_me(&store, &cli.base_url).await,
        Command::Token { access } => run_token(&access, clock.now_ms()),
        Command::Guard => run_guard(&store, &config.login_path).await,
    };

    // Dropping the last store handle ends the persister once it has drained.
    drop(store);
    if let Err(e) = persist.await {
        tracing::warn!(error = %e, "persister task failed");
    }
    outcome
}

async fn run_login(store: &SessionStore, base_url: &str, email: &str, password: &str) -> Result<(), CliError> {
    let response = reqwest::Client::new()
        .post(api_url(base_url, "/api/auth/login"))
        .json(&json!({ "email": email.trim(), "password": password }))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(CliError::LoginRejected { status: status.as_u16(), message });
    }
    let body: LoginResponse = response.json().await?;
    let session = store.login(body.user, body.tokens);
    println!("logged in as {}", session.user.as_ref().map(User::display_name).unwrap_or_default());
    Ok(())
}

fn run_import(store: &SessionStore, access: String, refresh: String, user: Option<&str>) -> Result<(), CliError> {
    let user = parse_user(user)?;
    let tokens = AuthTokens::new(access, refresh);
    if !is_token_valid(Some(&tokens), SystemClock.now_ms()) {
        tracing::warn!("imported access token is not currently valid; the guard will log it out");
    }
    store.login(user, tokens);
    println!("session imported");
    Ok(())
}

async fn run_me(store: &SessionStore, base_url: &str) -> Result<(), CliError> {
    let bearer = store.snapshot().bearer_header().ok_or(CliError::NotLoggedIn)?;
    let response = reqwest::Client::new()
        .get(api_url(base_url, "/api/auth/me"))
        .header(AUTHORIZATION, bearer)
        .send()
        .await?;
    let status = response.status();
    let value = response.json::<Value>().await.unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(CliError::ServerError { status: status.as_u16(), message: value.to_string() });
    }
    match serde_json::from_value::<User>(value.clone()) {
        Ok(user) => {
            store.set_user(user);
        }
        Err(e) => tracing::warn!(error = %e, "profile response is not a user record"),
    }
    print_json(&value)
}

fn run_token(access: &str, now_ms: i64) -> Result<(), CliError> {
    let claims = decode_claims(access)?;
    print_json(&json!({
        "exp": claims.exp,
        "iat": claims.iat,
        "sub": claims.sub,
        "expired": claims.is_expired_at(now_ms),
        "expires_in_ms": claims.remaining_ms(now_ms),
    }))
}

async fn run_guard(store: &SessionStore, login_path: &str) -> Result<(), CliError> {
    let navigate = |path: &str| println!("redirect -> {path}");
    let mut guard =
        AuthGuard::new(store.clone(), navigate, Arc::new(SystemClock), AppReady::ready()).with_login_path(login_path);
    let state = guard.check().await;
    println!("guard: {state:?}");
    Ok(())
}

/// Offline imports without a profile get a placeholder user.
fn parse_user(raw: Option<&str>) -> Result<User, CliError> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(User { id: "local".to_owned(), ..User::default() }),
    }
}

fn status_report(session: &Session, now_ms: i64) -> Value {
    let claims = session.access_token().and_then(|a| decode_claims(a).ok());
    let guard = match evaluate(session, now_ms) {
        GuardDecision::Stay => "stay",
        GuardDecision::Logout => "logout",
    };
    json!({
        "authenticated": session.is_authenticated,
        "user": session.user.as_ref().map(User::display_name),
        "token_valid": is_token_valid(session.tokens.as_ref(), now_ms),
        "expires_in_ms": claims.map(|c| c.remaining_ms(now_ms)),
        "guard": guard,
    })
}

fn api_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
