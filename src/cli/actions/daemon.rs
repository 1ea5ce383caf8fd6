use crate::{
    auth::{hash_secret, AuthConfig, CachedLookup, DigestAuthenticator, IgnoreAuth, UserKind},
    cache::{Sweeper, TtlCache},
    cli::telemetry,
    mdoc::{self, AppState},
    users::UserStore,
};
use anyhow::{Context, Result};
use axum::Router;
use secrecy::{ExposeSecret, SecretString};
use std::{path::PathBuf, time::Duration};
use tracing::{debug, info};

pub const ADMIN_USERNAME: &str = "admin";

#[derive(Debug)]
pub struct Args {
    pub listen: String,
    pub repo: PathBuf,
    pub realm: String,
    pub plaintext_secrets: bool,
    pub token_shortcut: bool,
    pub auth_enabled: bool,
    pub dump: bool,
    pub cache_sweep_seconds: u64,
    pub ignore_auth: Option<PathBuf>,
    pub admin_passwd: Option<SecretString>,
}

impl Args {
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.repo.join("data").join("mdoc.db")
    }

    #[must_use]
    pub fn public_dir(&self) -> PathBuf {
        self.repo.join("public")
    }

    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.realm.clone())
            .with_plaintext_secrets(self.plaintext_secrets)
            .with_token_shortcut(self.token_shortcut)
    }
}

/// Execute the daemon action.
/// # Errors
/// Returns an error if the database or allow-list cannot be opened, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let users = UserStore::connect(&args.database_path())
        .await
        .context("Failed to open user database")?;
    let (app, sweeper) = app(&args, users).await?;

    let result = mdoc::new(&args.listen, app, sweeper).await;
    telemetry::shutdown_tracer();
    result
}

/// Wire cache, authenticator and router around an opened user store.
///
/// # Errors
/// Returns an error if the admin account cannot be seeded or the allow-list
/// cannot be read.
pub async fn app(args: &Args, users: UserStore) -> Result<(Router, Sweeper)> {
    let config = args.auth_config();

    if let Some(passwd) = &args.admin_passwd {
        seed_admin(&users, &config, passwd).await?;
    }

    let ignore = match &args.ignore_auth {
        Some(path) => IgnoreAuth::load(path)
            .with_context(|| format!("Failed to load ignore-auth list {}", path.display()))?,
        None => IgnoreAuth::default(),
    };

    let cache = TtlCache::with_sweep_interval(Duration::from_secs(args.cache_sweep_seconds));
    let sweeper = cache.start_sweeper();

    let lookup = CachedLookup::new(users, cache.clone(), config.secret_cache_ttl());
    let auth = DigestAuthenticator::new(config, lookup, cache);

    let state = AppState::new(auth)
        .with_ignore(ignore)
        .with_auth_enabled(args.auth_enabled)
        .with_dump(args.dump);

    Ok((mdoc::router(state, &args.public_dir()), sweeper))
}

/// Create the `admin` account unless it already exists.
///
/// # Errors
/// Returns an error if the user table cannot be read or written.
pub async fn seed_admin(users: &UserStore, config: &AuthConfig, passwd: &SecretString) -> Result<bool> {
    if users.get_user(ADMIN_USERNAME).await?.is_some() {
        debug!("{} account already present", ADMIN_USERNAME);
        return Ok(false);
    }

    let secret = if config.plaintext_secrets() {
        passwd.expose_secret().to_string()
    } else {
        hash_secret(ADMIN_USERNAME, config.realm(), passwd.expose_secret())
    };
    users
        .add_user(ADMIN_USERNAME, &secret, "", UserKind::Admin)
        .await
        .context("Failed to create admin account")?;
    info!("created {} account", ADMIN_USERNAME);
    Ok(true)
}

fn log_startup_args(args: &Args) {
    info!(
        "mdoc {} ({}) listen={} repo={} realm={} auth={} token_shortcut={} plaintext_secrets={}",
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH,
        args.listen,
        args.repo.display(),
        args.realm,
        args.auth_enabled,
        args.token_shortcut,
        args.plaintext_secrets
    );
}
