//! # mdoc
//!
//! A small document server protected by HTTP Digest authentication
//! (RFC 2617, `qop=auth`, MD5).
//!
//! The crate is split into:
//!
//! - [`cache`]: an in-memory TTL cache with lazy and periodic expiration;
//! - [`auth`]: the digest authenticator, lockout tracking after repeated
//!   failures, session tokens and a digest client for the admin endpoints;
//! - [`users`]: the SQLite account table used as credential store;
//! - [`mdoc`]: the axum server (static files, admin routes, health);
//! - [`cli`]: argument parsing, telemetry and actions for the binary.
//!
//! One [`cache::TtlCache`] is created at startup and shared by the lockout
//! tracker, the session store and the credential cache. Its sweeper task is
//! stopped when the server shuts down.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod mdoc;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
