//! Minimal digest client for the admin endpoints.

use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use super::digest::{hash_secret, md5_hex, request_digest};
use super::error::AuthError;
use super::params::{random_key, Challenge, Credentials};
use crate::APP_USER_AGENT;

const FIRST_NONCE_COUNT: &str = "00000001";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("expected a digest challenge, got {0}")]
    NoChallenge(StatusCode),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("request failed with {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug)]
pub struct DigestClient {
    http: Client,
    username: String,
    password: SecretString,
}

impl DigestClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(username: impl Into<String>, password: SecretString) -> Result<Self, ClientError> {
        let http = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(Self {
            http,
            username: username.into(),
            password,
        })
    }

    /// Authenticates against `url` and posts `form` to it, returning the body.
    ///
    /// # Errors
    /// Returns an error if the server does not challenge, the transport fails
    /// or the final status is not `200`.
    #[instrument(skip(self, form), fields(username = %self.username))]
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, ClientError> {
        let target = Url::parse(url)?;

        let head = self.http.head(target.clone()).send().await?;
        if head.status() != StatusCode::UNAUTHORIZED {
            return Err(ClientError::NoChallenge(head.status()));
        }
        let challenge = head
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .ok_or(ClientError::NoChallenge(head.status()))
            .and_then(|value| Ok(Challenge::parse(value)?))?;
        debug!("challenged by realm {}", challenge.realm);

        let authorization = self.authorization(&challenge, "POST", &request_target(&target))?;
        let response = self
            .http
            .post(target)
            .header(header::AUTHORIZATION, authorization)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(ClientError::Status { status, body });
        }
        Ok(body)
    }

    fn authorization(&self, challenge: &Challenge, method: &str, uri: &str) -> Result<String, AuthError> {
        let cnonce = random_key()?;
        let ha1 = hash_secret(&self.username, &challenge.realm, self.password.expose_secret());
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        let response = request_digest(&ha1, &challenge.nonce, FIRST_NONCE_COUNT, &cnonce, &ha2);

        Ok(Credentials {
            username: &self.username,
            realm: &challenge.realm,
            nonce: &challenge.nonce,
            uri,
            response: &response,
            opaque: &challenge.opaque,
            nc: FIRST_NONCE_COUNT,
            cnonce: &cnonce,
        }
        .to_string())
    }
}

/// Path and query, as the server sees the request target.
fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}
