//! HTTP digest authentication.
//!
//! [`DigestAuthenticator`] validates `Authorization: Digest ...` headers
//! against a [`CredentialLookup`], counts failures per user and source
//! address in a [`LockoutTracker`] and hands out session tokens from a
//! [`SessionStore`]. Responses are only accepted for nonces recorded by the
//! [`NonceStore`]. All three share one [`TtlCache`](crate::cache::TtlCache)
//! passed in at construction.

pub mod client;
pub mod client_addr;
pub mod config;
pub mod credentials;
pub mod digest;
pub mod error;
pub mod ignore;
pub mod lockout;
pub mod nonce;
pub mod params;
pub mod session;

pub use client::{ClientError, DigestClient};
pub use client_addr::source_addresses;
pub use config::AuthConfig;
pub use credentials::{CachedLookup, CredentialLookup, CredentialRecord, LookupError, UserKind};
pub use digest::{
    hash_secret, AuthDecision, AuthOutcome, AuthRequest, DigestAuthenticator,
};
pub use error::AuthError;
pub use ignore::IgnoreAuth;
pub use lockout::{LockoutPolicy, LockoutTracker};
pub use nonce::NonceStore;
pub use params::Challenge;
pub use session::{login_cookie, SessionStore};
