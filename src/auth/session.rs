//! Session tokens minted after a successful digest login.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::debug;
use url::form_urlencoded;

use super::error::AuthError;
use crate::cache::{CacheValue, TtlCache};

const TOKEN_KEY_PREFIX: &str = "token_";
pub const LOGIN_COOKIE: &str = "login";

/// Create a new random session token (256 bits, unpadded base64url).
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_session_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

fn token_key(username: &str) -> String {
    format!("{TOKEN_KEY_PREFIX}{username}")
}

/// Maps a username to its current bearer token.
#[derive(Clone, Debug)]
pub struct SessionStore {
    cache: TtlCache,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(cache: TtlCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replaces any previous token for `username` with a fresh one.
    ///
    /// # Errors
    /// Returns an error if no token could be generated.
    pub async fn mint(&self, username: &str) -> Result<String, AuthError> {
        let token = generate_session_token()?;
        self.cache
            .put(token_key(username), token.clone(), self.ttl)
            .await;
        Ok(token)
    }

    pub async fn current(&self, username: &str) -> Option<String> {
        match self.cache.get(&token_key(username)).await {
            Some(CacheValue::Text(token)) => Some(token),
            _ => None,
        }
    }

    /// Checks `token` against the stored one and restarts its TTL on a match.
    pub async fn verify(&self, username: &str, token: &str) -> bool {
        let Some(stored) = self.current(username).await else {
            return false;
        };
        if !bool::from(stored.as_bytes().ct_eq(token.as_bytes())) {
            debug!("session token mismatch for {}", username);
            return false;
        }
        self.cache.put(token_key(username), stored, self.ttl).await;
        true
    }

    pub async fn revoke(&self, username: &str) {
        if self.cache.delete(&token_key(username)).await.is_err() {
            debug!("no session token for {}", username);
        }
    }
}

/// `Set-Cookie` value carrying `username` and `token`.
#[must_use]
pub fn login_cookie(username: &str, token: &str, ttl: Duration) -> String {
    let pairs = form_urlencoded::Serializer::new(String::new())
        .append_pair("username", username)
        .append_pair("token", token)
        .finish();
    let value: String = form_urlencoded::byte_serialize(pairs.as_bytes()).collect();
    format!(
        "{LOGIN_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.as_secs()
    )
}

/// Extracts `(username, token)` from a `Cookie` request header.
#[must_use]
pub fn parse_login_cookie(header: &str) -> Option<(String, String)> {
    let value = header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == LOGIN_COOKIE).then_some(value)
    })?;

    // the pair list is itself url-encoded inside the cookie value
    let decoded = if value.contains('=') {
        value.to_string()
    } else {
        form_urlencoded::parse(value.as_bytes())
            .map(|(key, _)| key.into_owned())
            .next()?
    };

    let mut username = None;
    let mut token = None;
    for (key, value) in form_urlencoded::parse(decoded.as_bytes()) {
        match key.as_ref() {
            "username" => username = Some(value.into_owned()),
            "token" => token = Some(value.into_owned()),
            _ => {}
        }
    }

    match (username, token) {
        (Some(username), Some(token)) if !username.is_empty() && !token.is_empty() => {
            Some((username, token))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(TtlCache::new(), Duration::from_secs(7 * 24 * 60 * 60))
    }

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let first = generate_session_token().ok();
        let second = generate_session_token().ok();

        let decoded_len = first
            .as_deref()
            .and_then(|token| Base64UrlUnpadded::decode_vec(token).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn mint_then_verify() {
        let store = store();
        let token = store.mint("alice").await.ok();
        assert!(token.is_some());

        let token = token.unwrap_or_default();
        assert!(store.verify("alice", &token).await);
        assert!(!store.verify("alice", "forged").await);
        assert!(!store.verify("bob", &token).await);
    }

    #[tokio::test]
    async fn mint_replaces_previous_token() {
        let store = store();
        let old = store.mint("alice").await.unwrap_or_default();
        let new = store.mint("alice").await.unwrap_or_default();

        assert!(!store.verify("alice", &old).await);
        assert!(store.verify("alice", &new).await);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_refreshes_ttl() {
        let store = SessionStore::new(TtlCache::new(), Duration::from_secs(100));
        let token = store.mint("alice").await.unwrap_or_default();

        tokio::time::advance(Duration::from_secs(80)).await;
        assert!(store.verify("alice", &token).await);

        tokio::time::advance(Duration::from_secs(80)).await;
        assert!(store.verify("alice", &token).await);

        tokio::time::advance(Duration::from_secs(101)).await;
        assert!(!store.verify("alice", &token).await);
    }

    #[tokio::test]
    async fn revoke_drops_token() {
        let store = store();
        let token = store.mint("alice").await.unwrap_or_default();

        store.revoke("alice").await;
        store.revoke("alice").await;

        assert!(!store.verify("alice", &token).await);
        assert_eq!(store.current("alice").await, None);
    }

    #[test]
    fn login_cookie_round_trip() {
        let cookie = login_cookie("al ice", "abc-_123", Duration::from_secs(604_800));
        assert!(cookie.starts_with("login=username%3Dal%2Bice%26token%3Dabc-_123;"));
        assert!(cookie.ends_with("Path=/; HttpOnly; SameSite=Lax; Max-Age=604800"));

        let header = cookie.split(';').next().unwrap_or_default();
        let header = format!("theme=dark; {header}");
        assert_eq!(
            parse_login_cookie(&header),
            Some(("al ice".to_string(), "abc-_123".to_string()))
        );
    }

    #[test]
    fn login_cookie_rejects_partial_values() {
        assert_eq!(parse_login_cookie("theme=dark"), None);
        assert_eq!(parse_login_cookie("login=username%3Dalice"), None);
        assert_eq!(parse_login_cookie("login="), None);
        assert_eq!(
            parse_login_cookie("login=username=bob&token=t"),
            Some(("bob".to_string(), "t".to_string()))
        );
    }
}
