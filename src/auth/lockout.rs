//! Failed-login tracking per (username, source addresses).
//!
//! Every failed credential check bumps a counter stored in the shared
//! [`TtlCache`] and re-arms its TTL:
//!
//! - up to `threshold` failures the window is `base_window` (30 minutes);
//! - past the threshold it is `step * (count - threshold)`, growing without a
//!   cap.
//!
//! A key is locked while its stored count exceeds the threshold. Nothing
//! clears the lock explicitly except a successful login; otherwise the entry
//! simply expires.
//!
//! The key covers the direct peer address and every `X-Forwarded-For` hop.
//! Clients behind one proxy chain share a lock, and a client that forges
//! forwarded-for values lands on a fresh key each time. Both effects are
//! known and left as is.

use std::time::Duration;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::error::AuthError;
use crate::cache::{CacheValue, TtlCache};

const LIMIT_KEY_PREFIX: &str = "limit_";
pub const DEFAULT_LOCKOUT_THRESHOLD: u64 = 4;
pub const DEFAULT_LOCKOUT_WINDOW: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_LOCKOUT_STEP: Duration = Duration::from_secs(30 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    threshold: u64,
    base_window: Duration,
    step: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_LOCKOUT_THRESHOLD,
            DEFAULT_LOCKOUT_WINDOW,
            DEFAULT_LOCKOUT_STEP,
        )
    }
}

impl LockoutPolicy {
    #[must_use]
    pub const fn new(threshold: u64, base_window: Duration, step: Duration) -> Self {
        Self {
            threshold,
            base_window,
            step,
        }
    }

    #[must_use]
    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    /// TTL written with the `count`-th consecutive failure.
    #[must_use]
    pub fn cool_down(&self, count: u64) -> Duration {
        if count <= self.threshold {
            return self.base_window;
        }
        let excess = u32::try_from(count - self.threshold).unwrap_or(u32::MAX);
        self.step.saturating_mul(excess)
    }

    #[must_use]
    pub const fn is_exceeded(&self, count: u64) -> bool {
        count > self.threshold
    }
}

fn encode(part: &str) -> String {
    form_urlencoded::byte_serialize(part.as_bytes()).collect()
}

/// Cache key for a username and its address list. Every part is
/// form-encoded, so the separators never occur inside a part.
#[must_use]
pub fn lockout_key(username: &str, addresses: &[String]) -> String {
    let addresses: Vec<String> = addresses.iter().map(|addr| encode(addr)).collect();
    format!(
        "{LIMIT_KEY_PREFIX}{}_[{}]",
        encode(username),
        addresses.join(" ")
    )
}

#[derive(Clone, Debug)]
pub struct LockoutTracker {
    cache: TtlCache,
    policy: LockoutPolicy,
}

impl LockoutTracker {
    #[must_use]
    pub fn new(cache: TtlCache, policy: LockoutPolicy) -> Self {
        Self { cache, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Records one failed attempt and returns the new consecutive count.
    pub async fn record_failure(&self, username: &str, addresses: &[String]) -> u64 {
        let key = lockout_key(username, addresses);
        let policy = self.policy;

        let stored = self
            .cache
            .upsert(&key, |current| {
                let count = current
                    .and_then(CacheValue::as_uint)
                    .unwrap_or(0)
                    .saturating_add(1);
                (CacheValue::Uint(count), policy.cool_down(count))
            })
            .await;

        let count = stored.as_uint().unwrap_or(0);
        if policy.is_exceeded(count) {
            warn!(
                "{} locked for {:?} after {} failures",
                key,
                policy.cool_down(count),
                count
            );
        }
        count
    }

    /// Clears the counter. A missing counter is fine.
    pub async fn record_success(&self, username: &str, addresses: &[String]) {
        let key = lockout_key(username, addresses);
        if self.cache.delete(&key).await.is_err() {
            debug!("no failures recorded for {}", key);
        }
    }

    /// Current consecutive failure count; a stored value of the wrong type
    /// counts as zero.
    pub async fn fail_count(&self, username: &str, addresses: &[String]) -> u64 {
        let key = lockout_key(username, addresses);
        match self.cache.get(&key).await {
            None => 0,
            Some(CacheValue::Uint(count)) => count,
            Some(other) => {
                warn!(
                    "ignoring {} lockout value under {}",
                    other.kind(),
                    key
                );
                0
            }
        }
    }

    pub async fn is_locked(&self, username: &str, addresses: &[String]) -> bool {
        self.policy
            .is_exceeded(self.fail_count(username, addresses).await)
    }

    /// # Errors
    /// Returns `AuthError::LockedOut` with the current count when locked.
    pub async fn ensure_unlocked(
        &self,
        username: &str,
        addresses: &[String],
    ) -> Result<(), AuthError> {
        let count = self.fail_count(username, addresses).await;
        if self.policy.is_exceeded(count) {
            return Err(AuthError::LockedOut { count });
        }
        Ok(())
    }
}
