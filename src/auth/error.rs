use thiserror::Error;

use super::credentials::LookupError;
use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The `Authorization` header could not be parsed. Callers treat this as
    /// invalid credentials.
    #[error("malformed authorization header: {0}")]
    Protocol(String),
    #[error("too many login failures: {count}")]
    LockedOut { count: u64 },
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to generate random token")]
    Rng(#[from] rand::Error),
}
