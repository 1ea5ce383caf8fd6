//! Server-issued digest nonces.
//!
//! Every challenge stores its opaque under `nonce_<nonce>`. A response is
//! only honored for a nonce found there, with the matching opaque and a
//! nonce count above the last one accepted (`nc_<nonce>`). Both entries use
//! the cache's sliding TTL, so a nonce stays valid while a client keeps
//! using it.

use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

use super::params::Challenge;
use crate::cache::{CacheError, CacheValue, TtlCache};

const NONCE_KEY_PREFIX: &str = "nonce_";
const NC_KEY_PREFIX: &str = "nc_";

#[derive(Debug, Error)]
pub enum NonceError {
    #[error("nonce was not issued or has expired")]
    Unknown,
    #[error("opaque does not belong to the nonce")]
    Opaque,
    #[error("nonce count {nc:08x} is not above {last:08x}")]
    Replayed { nc: u64, last: u64 },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Clone, Debug)]
pub struct NonceStore {
    cache: TtlCache,
    ttl: Duration,
}

impl NonceStore {
    #[must_use]
    pub fn new(cache: TtlCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Remember a challenge handed to a client.
    pub async fn issue(&self, challenge: &Challenge) {
        self.cache
            .put(
                format!("{NONCE_KEY_PREFIX}{}", challenge.nonce),
                challenge.opaque.as_str(),
                self.ttl,
            )
            .await;
    }

    /// Accept one use of `nonce` with count `nc`.
    ///
    /// # Errors
    /// Returns `NonceError::Unknown` or `NonceError::Opaque` for a nonce this
    /// store never issued, `NonceError::Replayed` when `nc` does not advance,
    /// and `NonceError::Cache` when a foreign value sits under the count key.
    pub async fn consume(&self, nonce: &str, opaque: &str, nc: u64) -> Result<(), NonceError> {
        let issued = self
            .cache
            .get(&format!("{NONCE_KEY_PREFIX}{nonce}"))
            .await
            .ok_or(NonceError::Unknown)?;
        let issued = issued.as_text().unwrap_or_default();
        if !bool::from(issued.as_bytes().ct_eq(opaque.as_bytes())) {
            return Err(NonceError::Opaque);
        }

        let key = format!("{NC_KEY_PREFIX}{nonce}");
        let ttl = self.ttl;
        let mut verdict = Ok(());
        self.cache
            .upsert(&key, |current| match current {
                None => (CacheValue::Uint(nc), ttl),
                Some(CacheValue::Uint(last)) if nc > *last => (CacheValue::Uint(nc), ttl),
                Some(CacheValue::Uint(last)) => {
                    verdict = Err(NonceError::Replayed { nc, last: *last });
                    (CacheValue::Uint(*last), ttl)
                }
                Some(other) => {
                    verdict = Err(NonceError::Cache(CacheError::TypeMismatch {
                        key: key.clone(),
                        kind: other.kind(),
                    }));
                    (other.clone(), ttl)
                }
            })
            .await;

        if verdict.is_ok() {
            debug!("nonce {} used with nc {:08x}", nonce, nc);
        }
        verdict
    }
}
