//! Credential lookup capability and a cache-backed wrapper.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheValue, TtlCache};

const SECRET_KEY_PREFIX: &str = "secret_";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserKind {
    Admin,
    Standard,
}

impl UserKind {
    /// Numeric code stored in the user table.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Admin => 1,
            Self::Standard => 2,
        }
    }

    /// Unknown codes map to `Standard`.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Admin,
            _ => Self::Standard,
        }
    }
}

/// What the authenticator needs to know about a user.
///
/// `secret` is either the plain password or `H(username:realm:password)`,
/// depending on how the authenticator is configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub username: String,
    pub secret: String,
    pub kind: UserKind,
}

/// The credential store failed for a reason other than "user not found".
#[derive(Debug, Error)]
#[error("credential lookup failed: {message}")]
pub struct LookupError {
    message: String,
}

impl LookupError {
    pub fn new(message: impl ToString) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

pub trait CredentialLookup: Send + Sync {
    /// Returns `Ok(None)` when the user does not exist.
    fn lookup(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<CredentialRecord>, LookupError>> + Send;

    /// Forget anything memoized for `username`.
    fn invalidate(&self, _username: &str) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Memoizes successful lookups of an inner store in a [`TtlCache`].
#[derive(Clone, Debug)]
pub struct CachedLookup<L> {
    inner: L,
    cache: TtlCache,
    ttl: Duration,
}

impl<L: CredentialLookup> CachedLookup<L> {
    #[must_use]
    pub fn new(inner: L, cache: TtlCache, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    #[must_use]
    pub fn inner(&self) -> &L {
        &self.inner
    }
}

fn secret_key(username: &str) -> String {
    format!("{SECRET_KEY_PREFIX}{username}")
}

impl<L: CredentialLookup> CredentialLookup for CachedLookup<L> {
    async fn lookup(&self, username: &str) -> Result<Option<CredentialRecord>, LookupError> {
        let key = secret_key(username);

        if let Some(CacheValue::Text(json)) = self.cache.get(&key).await {
            match serde_json::from_str::<CredentialRecord>(&json) {
                Ok(record) => return Ok(Some(record)),
                Err(err) => warn!("dropping unreadable cached credentials for {username}: {err}"),
            }
        }

        let record = self.inner.lookup(username).await?;
        if let Some(record) = &record {
            match serde_json::to_string(record) {
                Ok(json) => self.cache.put(key, json, self.ttl).await,
                Err(err) => warn!("failed to cache credentials for {username}: {err}"),
            }
        }
        Ok(record)
    }

    async fn invalidate(&self, username: &str) {
        if self.cache.delete(&secret_key(username)).await.is_err() {
            debug!("no cached credentials for {username}");
        }
        self.inner.invalidate(username).await;
    }
}
