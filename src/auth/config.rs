//! Authenticator configuration.

use std::time::Duration;

use super::lockout::LockoutPolicy;

pub const DEFAULT_REALM: &str = "mdoc";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_SECRET_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    realm: String,
    plaintext_secrets: bool,
    token_shortcut: bool,
    session_ttl: Duration,
    secret_cache_ttl: Duration,
    nonce_ttl: Duration,
    lockout: LockoutPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REALM.to_string())
    }
}

impl AuthConfig {
    /// Hashed-secret mode with the token shortcut disabled.
    #[must_use]
    pub fn new(realm: String) -> Self {
        Self {
            realm,
            plaintext_secrets: false,
            token_shortcut: false,
            session_ttl: DEFAULT_SESSION_TTL,
            secret_cache_ttl: DEFAULT_SECRET_CACHE_TTL,
            nonce_ttl: DEFAULT_NONCE_TTL,
            lockout: LockoutPolicy::default(),
        }
    }

    /// When set, the credential lookup returns the plain password instead of
    /// `H(username:realm:password)`.
    #[must_use]
    pub fn with_plaintext_secrets(mut self, plaintext: bool) -> Self {
        self.plaintext_secrets = plaintext;
        self
    }

    /// Accept a valid `login` cookie without a new digest exchange.
    #[must_use]
    pub fn with_token_shortcut(mut self, enabled: bool) -> Self {
        self.token_shortcut = enabled;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_secret_cache_ttl(mut self, ttl: Duration) -> Self {
        self.secret_cache_ttl = ttl;
        self
    }

    /// How long an issued nonce stays valid without being used.
    #[must_use]
    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    #[must_use]
    pub fn plaintext_secrets(&self) -> bool {
        self.plaintext_secrets
    }

    #[must_use]
    pub fn token_shortcut(&self) -> bool {
        self.token_shortcut
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn secret_cache_ttl(&self) -> Duration {
        self.secret_cache_ttl
    }

    #[must_use]
    pub fn nonce_ttl(&self) -> Duration {
        self.nonce_ttl
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutPolicy {
        &self.lockout
    }
}
