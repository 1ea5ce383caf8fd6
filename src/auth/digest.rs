//! RFC 2617 digest verification (`qop=auth`, `algorithm=MD5`) wired to the
//! lockout tracker and the session store.

use md5::{Digest, Md5};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::config::AuthConfig;
use super::credentials::{CredentialLookup, CredentialRecord, UserKind};
use super::error::AuthError;
use super::lockout::LockoutTracker;
use super::nonce::{NonceError, NonceStore};
use super::params::{Challenge, DigestParams};
use super::session::{parse_login_cookie, SessionStore};
use crate::cache::TtlCache;

const QOP_AUTH: &str = "auth";
const ALGORITHM_MD5: &str = "MD5";

#[must_use]
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// `H(username:realm:password)`, the value stored in hashed-secret mode.
#[must_use]
pub fn hash_secret(username: &str, realm: &str, password: &str) -> String {
    md5_hex(&format!("{username}:{realm}:{password}"))
}

/// `KD(HA1, nonce:nc:cnonce:qop:HA2)`
#[must_use]
pub fn request_digest(ha1: &str, nonce: &str, nc: &str, cnonce: &str, ha2: &str) -> String {
    md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{QOP_AUTH}:{ha2}"))
}

/// The parts of an HTTP request the authenticator looks at.
#[derive(Clone, Debug, Default)]
pub struct AuthRequest {
    method: String,
    uri: String,
    authorization: Option<String>,
    cookie: Option<String>,
    addresses: Vec<String>,
}

impl AuthRequest {
    /// `uri` is the request target as sent by the client (path and query).
    #[must_use]
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_authorization(mut self, header: impl Into<String>) -> Self {
        self.authorization = Some(header.into());
        self
    }

    /// Raw `Cookie` header, read only in token-shortcut mode.
    #[must_use]
    pub fn with_cookie(mut self, header: impl Into<String>) -> Self {
        self.cookie = Some(header.into());
        self
    }

    #[must_use]
    pub fn with_addresses(mut self, addresses: Vec<String>) -> Self {
        self.addresses = addresses;
        self
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Ok,
    NeedLogin,
    BadPassword,
    TooManyFailures(u64),
}

/// Result of one `check_auth` call.
#[derive(Clone, Debug)]
pub struct AuthDecision {
    pub outcome: AuthOutcome,
    /// Set on `Ok` and `TooManyFailures`.
    pub username: Option<String>,
    pub kind: Option<UserKind>,
    /// Fresh challenge for `NeedLogin` and `BadPassword`.
    pub challenge: Option<Challenge>,
    /// `Authentication-Info` value after a digest login.
    pub auth_info: Option<String>,
    /// Newly minted token after a digest login.
    pub session_token: Option<String>,
}

impl AuthDecision {
    fn challenge(outcome: AuthOutcome, challenge: Challenge) -> Self {
        Self {
            outcome,
            username: None,
            kind: None,
            challenge: Some(challenge),
            auth_info: None,
            session_token: None,
        }
    }

    fn too_many_failures(username: &str, count: u64) -> Self {
        Self {
            outcome: AuthOutcome::TooManyFailures(count),
            username: Some(username.to_string()),
            kind: None,
            challenge: None,
            auth_info: None,
            session_token: None,
        }
    }

    fn accepted(record: &CredentialRecord) -> Self {
        Self {
            outcome: AuthOutcome::Ok,
            username: Some(record.username.clone()),
            kind: Some(record.kind),
            challenge: None,
            auth_info: None,
            session_token: None,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome == AuthOutcome::Ok
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_ok() && self.kind == Some(UserKind::Admin)
    }
}

/// Why a digest response was refused. Only ever logged.
#[derive(Debug, Error)]
enum Invalid {
    #[error("unknown user")]
    UnknownUser,
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("unsupported algorithm {0}")]
    Algorithm(String),
    #[error("unsupported qop {0}")]
    Qop(String),
    #[error("realm {0} does not match")]
    Realm(String),
    #[error("uri {0} does not match the request")]
    Uri(String),
    #[error("bad nonce count {0}")]
    NonceCount(String),
    #[error("response mismatch")]
    Mismatch,
    #[error(transparent)]
    Nonce(NonceError),
}

/// A response that matched the expected digest.
struct Verified {
    auth_info: String,
    nc: u64,
}

fn path_of(uri: &str) -> &str {
    uri.split_once('?').map_or(uri, |(path, _)| path)
}

/// Verifies digest credentials and tracks their consequences.
pub struct DigestAuthenticator<L> {
    config: AuthConfig,
    lookup: L,
    lockout: LockoutTracker,
    sessions: SessionStore,
    nonces: NonceStore,
}

impl<L: CredentialLookup> DigestAuthenticator<L> {
    /// Lockout counters, session tokens and issued nonces live in `cache`.
    #[must_use]
    pub fn new(config: AuthConfig, lookup: L, cache: TtlCache) -> Self {
        let lockout = LockoutTracker::new(cache.clone(), *config.lockout());
        let sessions = SessionStore::new(cache.clone(), config.session_ttl());
        let nonces = NonceStore::new(cache, config.nonce_ttl());
        Self {
            config,
            lookup,
            lockout,
            sessions,
            nonces,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutTracker {
        &self.lockout
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    /// A fresh challenge for this realm. Only nonces issued here are
    /// accepted later.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub async fn challenge(&self) -> Result<Challenge, AuthError> {
        let challenge = Challenge::generate(self.config.realm())?;
        self.nonces.issue(&challenge).await;
        Ok(challenge)
    }

    async fn challenged(&self, outcome: AuthOutcome) -> Result<AuthDecision, AuthError> {
        Ok(AuthDecision::challenge(outcome, self.challenge().await?))
    }

    /// `Some` rejection while the key is locked out.
    async fn lock_gate(
        &self,
        username: &str,
        addresses: &[String],
    ) -> Result<Option<AuthDecision>, AuthError> {
        match self.lockout.ensure_unlocked(username, addresses).await {
            Ok(()) => Ok(None),
            Err(AuthError::LockedOut { count }) => {
                warn!("rejecting {} after {} failures", username, count);
                Ok(Some(AuthDecision::too_many_failures(username, count)))
            }
            Err(err) => Err(err),
        }
    }

    /// Decide what to do with one request.
    ///
    /// # Errors
    /// Returns `AuthError::Lookup` when the credential store fails. Such a
    /// request is neither accepted nor counted as a failed login.
    #[instrument(skip(self, request), fields(method = %request.method, uri = %request.uri))]
    pub async fn check_auth(&self, request: &AuthRequest) -> Result<AuthDecision, AuthError> {
        if self.config.token_shortcut() {
            if let Some(decision) = self.check_session(request).await? {
                return Ok(decision);
            }
        }

        let params = match request.authorization.as_deref().map(DigestParams::parse) {
            None => return self.challenged(AuthOutcome::NeedLogin).await,
            Some(Err(err)) => {
                debug!("{}", err);
                return self.challenged(AuthOutcome::NeedLogin).await;
            }
            Some(Ok(params)) => params,
        };
        let Some(username) = params.username() else {
            return self.challenged(AuthOutcome::NeedLogin).await;
        };

        if let Some(rejected) = self.lock_gate(username, &request.addresses).await? {
            return Ok(rejected);
        }

        let record = self.lookup.lookup(username).await.map_err(|err| {
            error!("{}", err);
            AuthError::from(err)
        })?;

        let verdict = match self.verify(&params, request, username, record.as_ref()) {
            Ok(verified) => {
                let nonce = params.get("nonce").unwrap_or_default();
                let opaque = params.get("opaque").unwrap_or_default();
                match self.nonces.consume(nonce, opaque, verified.nc).await {
                    Ok(()) => Ok(verified.auth_info),
                    Err(NonceError::Cache(err)) => return Err(err.into()),
                    Err(err) => Err(Invalid::Nonce(err)),
                }
            }
            Err(reason) => Err(reason),
        };

        match verdict {
            Ok(auth_info) => {
                // `verify` only succeeds with a record
                let Some(record) = record else {
                    return self.challenged(AuthOutcome::BadPassword).await;
                };
                self.lockout
                    .record_success(username, &request.addresses)
                    .await;
                let token = self.sessions.mint(username).await?;
                debug!("{} logged in", username);
                Ok(AuthDecision {
                    auth_info: Some(auth_info),
                    session_token: Some(token),
                    ..AuthDecision::accepted(&record)
                })
            }
            Err(reason) => {
                info!("bad password for {}: {}", username, reason);
                let count = self
                    .lockout
                    .record_failure(username, &request.addresses)
                    .await;
                if self.lockout.policy().is_exceeded(count) {
                    return Ok(AuthDecision::too_many_failures(username, count));
                }
                self.challenged(AuthOutcome::BadPassword).await
            }
        }
    }

    /// Accepts a valid `login` cookie. `None` means fall back to digest.
    async fn check_session(&self, request: &AuthRequest) -> Result<Option<AuthDecision>, AuthError> {
        let Some((username, token)) = request.cookie.as_deref().and_then(parse_login_cookie) else {
            return Ok(None);
        };

        if let Some(rejected) = self.lock_gate(&username, &request.addresses).await? {
            return Ok(Some(rejected));
        }

        if !self.sessions.verify(&username, &token).await {
            return Ok(None);
        }

        match self.lookup.lookup(&username).await? {
            Some(record) => Ok(Some(AuthDecision::accepted(&record))),
            None => {
                self.sessions.revoke(&username).await;
                Ok(None)
            }
        }
    }

    /// Checks the response itself. Whether the nonce was issued here is
    /// settled afterwards by the nonce store.
    fn verify(
        &self,
        params: &DigestParams,
        request: &AuthRequest,
        username: &str,
        record: Option<&CredentialRecord>,
    ) -> Result<Verified, Invalid> {
        let realm = self.config.realm();

        let algorithm = params.get("algorithm").unwrap_or(ALGORITHM_MD5);
        if !algorithm.eq_ignore_ascii_case(ALGORITHM_MD5) {
            return Err(Invalid::Algorithm(algorithm.to_string()));
        }
        let qop = params.get("qop").ok_or(Invalid::Missing("qop"))?;
        if qop != QOP_AUTH {
            return Err(Invalid::Qop(qop.to_string()));
        }
        if let Some(client_realm) = params.get("realm") {
            if client_realm != realm {
                return Err(Invalid::Realm(client_realm.to_string()));
            }
        }

        let uri = params.get("uri").ok_or(Invalid::Missing("uri"))?;
        if uri != request.uri && !path_of(&request.uri).starts_with(path_of(uri)) {
            return Err(Invalid::Uri(uri.to_string()));
        }

        let nonce = params.get("nonce").ok_or(Invalid::Missing("nonce"))?;
        let cnonce = params.get("cnonce").ok_or(Invalid::Missing("cnonce"))?;
        let nc = params.get("nc").ok_or(Invalid::Missing("nc"))?;
        let nc_value =
            u64::from_str_radix(nc, 16).map_err(|_| Invalid::NonceCount(nc.to_string()))?;
        let response = params
            .get("response")
            .ok_or(Invalid::Missing("response"))?
            .to_ascii_lowercase();

        // unknown users still pay for one digest computation
        let secret = record.map_or("", |record| record.secret.as_str());
        let ha1 = if self.config.plaintext_secrets() {
            hash_secret(username, realm, secret)
        } else {
            secret.to_ascii_lowercase()
        };
        let ha2 = md5_hex(&format!("{}:{uri}", request.method));
        let expected = request_digest(&ha1, nonce, nc, cnonce, &ha2);

        if record.is_none() {
            return Err(Invalid::UnknownUser);
        }
        if !bool::from(expected.as_bytes().ct_eq(response.as_bytes())) {
            return Err(Invalid::Mismatch);
        }

        let rspauth = request_digest(&ha1, nonce, nc, cnonce, &md5_hex(&format!(":{uri}")));
        Ok(Verified {
            auth_info: format!(
                r#"qop="{QOP_AUTH}", rspauth="{rspauth}", cnonce="{cnonce}", nc="{nc}""#
            ),
            nc: nc_value,
        })
    }

    /// Drop the session token and any memoized secret for `username`.
    pub async fn invalidate_user(&self, username: &str) {
        self.sessions.revoke(username).await;
        self.lookup.invalidate(username).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::tests::MemoryLookup;
    use crate::auth::lockout::DEFAULT_LOCKOUT_WINDOW;
    use crate::auth::params::Credentials;
    use crate::auth::session::login_cookie;
    use std::time::Duration;

    const REALM: &str = "mdoc";

    fn addrs() -> Vec<String> {
        vec!["192.0.2.10".to_string()]
    }

    fn authenticator(config: AuthConfig) -> DigestAuthenticator<MemoryLookup> {
        let lookup = MemoryLookup::default()
            .with_user("alice", &hash_secret("alice", REALM, "wonderland"), UserKind::Standard)
            .with_user("admin", &hash_secret("admin", REALM, "hello"), UserKind::Admin);
        DigestAuthenticator::new(config, lookup, TtlCache::new())
    }

    type Auth = DigestAuthenticator<MemoryLookup>;

    /// Answer `challenge` with nonce count `nc`.
    fn answer(challenge: &Challenge, username: &str, password: &str, method: &str, uri: &str, nc: &str) -> String {
        let ha1 = hash_secret(username, REALM, password);
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        let response = request_digest(&ha1, &challenge.nonce, nc, "0a4f113b", &ha2);
        Credentials {
            username,
            realm: REALM,
            nonce: &challenge.nonce,
            uri,
            response: &response,
            opaque: &challenge.opaque,
            nc,
            cnonce: "0a4f113b",
        }
        .to_string()
    }

    /// Fetch a fresh challenge and answer it.
    async fn authorization(auth: &Auth, username: &str, password: &str, method: &str, uri: &str) -> String {
        let Ok(challenge) = auth.challenge().await else {
            return String::new();
        };
        answer(&challenge, username, password, method, uri, "00000001")
    }

    async fn request(auth: &Auth, username: &str, password: &str) -> AuthRequest {
        AuthRequest::new("GET", "/dir/index.html")
            .with_authorization(authorization(auth, username, password, "GET", "/dir/index.html").await)
            .with_addresses(addrs())
    }

    async fn outcome(auth: &Auth, request: &AuthRequest) -> Option<AuthOutcome> {
        auth.check_auth(request).await.ok().map(|decision| decision.outcome)
    }

    #[test]
    fn hash_secret_known_vector() {
        assert_eq!(
            hash_secret("admin", "mdoc", "hello"),
            "7628d9fbecd3683d02276b6176b0ee13"
        );
    }

    #[test]
    fn rfc2617_example_response() {
        let ha1 = hash_secret("Mufasa", "testrealm@host.com", "Circle Of Life");
        let ha2 = md5_hex("GET:/dir/index.html");
        assert_eq!(
            request_digest(&ha1, "dcd98b7102dd2f0e8b11d0f600bfb0c093", "00000001", "0a4f113b", &ha2),
            "6629fae49393a05397450978507c4ef1"
        );
    }

    #[tokio::test]
    async fn missing_header_needs_login() {
        let auth = authenticator(AuthConfig::default());
        let decision = auth.check_auth(&AuthRequest::new("GET", "/")).await;
        assert!(decision.is_ok());
        if let Ok(decision) = decision {
            assert_eq!(decision.outcome, AuthOutcome::NeedLogin);
            assert_eq!(decision.challenge.map(|c| c.realm), Some(REALM.to_string()));
        }
    }

    #[tokio::test]
    async fn malformed_header_needs_login() {
        let auth = authenticator(AuthConfig::default());
        let request = AuthRequest::new("GET", "/").with_authorization("Basic YWxpY2U6eA==");
        assert_eq!(outcome(&auth, &request).await, Some(AuthOutcome::NeedLogin));
        assert_eq!(auth.lockout().fail_count("alice", &[]).await, 0);
    }

    #[tokio::test]
    async fn valid_digest_is_accepted() {
        let auth = authenticator(AuthConfig::default());
        let decision = auth.check_auth(&request(&auth, "alice", "wonderland").await).await;
        assert!(decision.is_ok());
        let Ok(decision) = decision else { return };

        assert!(decision.is_ok());
        assert!(!decision.is_admin());
        assert_eq!(decision.username.as_deref(), Some("alice"));
        assert!(decision
            .auth_info
            .as_deref()
            .is_some_and(|info| info.starts_with(r#"qop="auth", rspauth=""#)));

        let token = decision.session_token.unwrap_or_default();
        assert!(auth.sessions().verify("alice", &token).await);
    }

    #[tokio::test]
    async fn admin_kind_is_reported() {
        let auth = authenticator(AuthConfig::default());
        let decision = auth.check_auth(&request(&auth, "admin", "hello").await).await;
        assert!(decision.is_ok_and(|decision| decision.is_admin()));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_alike() {
        let auth = authenticator(AuthConfig::default());
        assert_eq!(
            outcome(&auth, &request(&auth, "alice", "guess").await).await,
            Some(AuthOutcome::BadPassword)
        );
        assert_eq!(
            outcome(&auth, &request(&auth, "mallory", "guess").await).await,
            Some(AuthOutcome::BadPassword)
        );
        assert_eq!(auth.lockout().fail_count("alice", &addrs()).await, 1);
        assert_eq!(auth.lockout().fail_count("mallory", &addrs()).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn five_bad_passwords_lock_the_account() {
        let auth = authenticator(AuthConfig::default());

        for _ in 0..4 {
            assert_eq!(
                outcome(&auth, &request(&auth, "alice", "guess").await).await,
                Some(AuthOutcome::BadPassword)
            );
        }
        assert_eq!(
            outcome(&auth, &request(&auth, "alice", "guess").await).await,
            Some(AuthOutcome::TooManyFailures(5))
        );

        // the right password does not help while locked
        assert_eq!(
            outcome(&auth, &request(&auth, "alice", "wonderland").await).await,
            Some(AuthOutcome::TooManyFailures(5))
        );

        // another address is unaffected
        let elsewhere = request(&auth, "alice", "wonderland").await.with_addresses(vec!["198.51.100.1".to_string()]);
        assert_eq!(outcome(&auth, &elsewhere).await, Some(AuthOutcome::Ok));

        tokio::time::advance(DEFAULT_LOCKOUT_WINDOW + Duration::from_secs(1)).await;
        assert_eq!(
            outcome(&auth, &request(&auth, "alice", "wonderland").await).await,
            Some(AuthOutcome::Ok)
        );
        assert_eq!(auth.lockout().fail_count("alice", &addrs()).await, 0);
    }

    #[tokio::test]
    async fn success_resets_failures() {
        let auth = authenticator(AuthConfig::default());
        for _ in 0..3 {
            auth.check_auth(&request(&auth, "alice", "guess").await).await.ok();
        }
        assert_eq!(
            outcome(&auth, &request(&auth, "alice", "wonderland").await).await,
            Some(AuthOutcome::Ok)
        );
        assert_eq!(auth.lockout().fail_count("alice", &addrs()).await, 0);
    }

    #[tokio::test]
    async fn plaintext_mode_hashes_on_the_fly() {
        let lookup = MemoryLookup::default().with_user("bob", "builder", UserKind::Standard);
        let auth = DigestAuthenticator::new(
            AuthConfig::default().with_plaintext_secrets(true),
            lookup,
            TtlCache::new(),
        );
        assert_eq!(
            outcome(&auth, &request(&auth, "bob", "builder").await).await,
            Some(AuthOutcome::Ok)
        );
        assert_eq!(
            outcome(&auth, &request(&auth, "bob", "wrecker").await).await,
            Some(AuthOutcome::BadPassword)
        );
    }

    #[tokio::test]
    async fn uri_may_be_a_path_prefix() {
        let auth = authenticator(AuthConfig::default());

        let prefixed = AuthRequest::new("GET", "/dir/index.html?page=2")
            .with_authorization(authorization(&auth, "alice", "wonderland", "GET", "/dir/").await)
            .with_addresses(addrs());
        assert_eq!(outcome(&auth, &prefixed).await, Some(AuthOutcome::Ok));

        let unrelated = AuthRequest::new("GET", "/other")
            .with_authorization(authorization(&auth, "alice", "wonderland", "GET", "/dir/").await)
            .with_addresses(addrs());
        assert_eq!(outcome(&auth, &unrelated).await, Some(AuthOutcome::BadPassword));
    }

    #[tokio::test]
    async fn method_is_part_of_the_digest() {
        let auth = authenticator(AuthConfig::default());
        let request = AuthRequest::new("POST", "/dir/index.html")
            .with_authorization(authorization(&auth, "alice", "wonderland", "GET", "/dir/index.html").await)
            .with_addresses(addrs());
        assert_eq!(outcome(&auth, &request).await, Some(AuthOutcome::BadPassword));
    }

    #[tokio::test]
    async fn foreign_realm_and_qop_are_refused() {
        let auth = authenticator(AuthConfig::default());
        let header = authorization(&auth, "alice", "wonderland", "GET", "/dir/index.html").await;

        let other_realm = AuthRequest::new("GET", "/dir/index.html")
            .with_authorization(header.replace(r#"realm="mdoc""#, r#"realm="other""#));
        assert_eq!(outcome(&auth, &other_realm).await, Some(AuthOutcome::BadPassword));

        let other_qop = AuthRequest::new("GET", "/dir/index.html")
            .with_authorization(header.replace("qop=auth", "qop=auth-int"));
        assert_eq!(outcome(&auth, &other_qop).await, Some(AuthOutcome::BadPassword));
    }

    #[tokio::test]
    async fn lookup_failure_is_an_error_not_a_failure() {
        let auth = DigestAuthenticator::new(
            AuthConfig::default(),
            MemoryLookup::failing(),
            TtlCache::new(),
        );
        assert!(matches!(
            auth.check_auth(&request(&auth, "alice", "wonderland").await).await,
            Err(AuthError::Lookup(_))
        ));
        assert_eq!(auth.lockout().fail_count("alice", &addrs()).await, 0);
    }

    #[tokio::test]
    async fn token_shortcut_accepts_cookie() {
        let auth = authenticator(AuthConfig::default().with_token_shortcut(true));
        let token = auth
            .check_auth(&request(&auth, "alice", "wonderland").await)
            .await
            .ok()
            .and_then(|decision| decision.session_token)
            .unwrap_or_default();

        let cookie = login_cookie("alice", &token, Duration::from_secs(60));
        let cookie = cookie.split(';').next().unwrap_or_default().to_string();
        let with_cookie = AuthRequest::new("GET", "/").with_cookie(cookie.clone()).with_addresses(addrs());
        let decision = auth.check_auth(&with_cookie).await.ok();
        assert_eq!(decision.as_ref().map(|d| d.outcome), Some(AuthOutcome::Ok));
        assert_eq!(decision.and_then(|d| d.session_token), None);

        auth.invalidate_user("alice").await;
        assert_eq!(outcome(&auth, &with_cookie).await, Some(AuthOutcome::NeedLogin));
    }

    #[tokio::test]
    async fn cookie_ignored_without_token_shortcut() {
        let auth = authenticator(AuthConfig::default());
        let token = auth.sessions().mint("alice").await.unwrap_or_default();
        let request = AuthRequest::new("GET", "/")
            .with_cookie(format!("login=username=alice&token={token}"));
        assert_eq!(outcome(&auth, &request).await, Some(AuthOutcome::NeedLogin));
    }

    #[tokio::test]
    async fn locked_key_rejects_cookie() {
        let auth = authenticator(AuthConfig::default().with_token_shortcut(true));
        let token = auth.sessions().mint("alice").await.unwrap_or_default();
        for _ in 0..5 {
            auth.lockout().record_failure("alice", &addrs()).await;
        }
        let request = AuthRequest::new("GET", "/")
            .with_cookie(format!("login=username=alice&token={token}"))
            .with_addresses(addrs());
        assert_eq!(
            outcome(&auth, &request).await,
            Some(AuthOutcome::TooManyFailures(5))
        );
    }

    #[tokio::test]
    async fn replayed_header_is_refused() {
        let auth = authenticator(AuthConfig::default());
        let replay = request(&auth, "alice", "wonderland").await;

        assert_eq!(outcome(&auth, &replay).await, Some(AuthOutcome::Ok));
        assert_eq!(outcome(&auth, &replay).await, Some(AuthOutcome::BadPassword));
        assert_eq!(auth.lockout().fail_count("alice", &addrs()).await, 1);
    }

    #[tokio::test]
    async fn nonce_count_must_advance() {
        let auth = authenticator(AuthConfig::default());
        let Ok(challenge) = auth.challenge().await else { return };
        let send = |nc: &str| {
            AuthRequest::new("GET", "/dir/index.html")
                .with_authorization(answer(&challenge, "alice", "wonderland", "GET", "/dir/index.html", nc))
                .with_addresses(addrs())
        };

        assert_eq!(outcome(&auth, &send("00000001")).await, Some(AuthOutcome::Ok));
        assert_eq!(outcome(&auth, &send("00000002")).await, Some(AuthOutcome::Ok));
        assert_eq!(outcome(&auth, &send("00000002")).await, Some(AuthOutcome::BadPassword));
        assert_eq!(outcome(&auth, &send("0000000a")).await, Some(AuthOutcome::Ok));
    }

    #[tokio::test]
    async fn made_up_nonce_or_opaque_is_refused() {
        let auth = authenticator(AuthConfig::default());
        let forged = Challenge {
            realm: REALM.to_string(),
            nonce: "never-issued-nonce".to_string(),
            opaque: "forged-opaque".to_string(),
        };
        let request = AuthRequest::new("GET", "/dir/index.html")
            .with_authorization(answer(&forged, "alice", "wonderland", "GET", "/dir/index.html", "00000001"))
            .with_addresses(addrs());
        for _ in 0..3 {
            assert_eq!(outcome(&auth, &request).await, Some(AuthOutcome::BadPassword));
        }

        let Ok(issued) = auth.challenge().await else { return };
        let wrong_opaque = Challenge {
            opaque: "forged-opaque".to_string(),
            ..issued
        };
        let request = AuthRequest::new("GET", "/dir/index.html")
            .with_authorization(answer(&wrong_opaque, "alice", "wonderland", "GET", "/dir/index.html", "00000001"))
            .with_addresses(addrs());
        assert_eq!(outcome(&auth, &request).await, Some(AuthOutcome::BadPassword));
    }

    #[tokio::test]
    async fn corrupt_nonce_count_is_a_cache_error() {
        let cache = TtlCache::new();
        let lookup = MemoryLookup::default()
            .with_user("alice", &hash_secret("alice", REALM, "wonderland"), UserKind::Standard);
        let auth = DigestAuthenticator::new(AuthConfig::default(), lookup, cache.clone());
        let Ok(challenge) = auth.challenge().await else { return };
        cache
            .put(format!("nc_{}", challenge.nonce), "garbage", Duration::from_secs(60))
            .await;

        let request = AuthRequest::new("GET", "/dir/index.html")
            .with_authorization(answer(&challenge, "alice", "wonderland", "GET", "/dir/index.html", "00000001"));
        assert!(matches!(
            auth.check_auth(&request).await,
            Err(AuthError::Cache(_))
        ));
    }
}
