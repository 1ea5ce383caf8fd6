//! `Authorization` and `WWW-Authenticate` digest parameter codec.

use base64ct::{Base64, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::fmt;

use super::error::AuthError;

const SCHEME: &str = "Digest";

/// Key/value pairs from a `Digest ...` header, keys lowercased.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DigestParams {
    pairs: HashMap<String, String>,
}

impl DigestParams {
    /// Parses `Digest k1=v1, k2="v 2", ...`.
    ///
    /// # Errors
    /// Returns `AuthError::Protocol` when the scheme is not `Digest` or a
    /// quoted value is unterminated.
    pub fn parse(header: &str) -> Result<Self, AuthError> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(AuthError::Protocol(format!(
                "unsupported scheme {scheme:?}"
            )));
        }
        Ok(Self {
            pairs: parse_pairs(rest)?,
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// The `username` parameter, if present and non-empty.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.get("username").filter(|username| !username.is_empty())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn parse_pairs(input: &str) -> Result<HashMap<String, String>, AuthError> {
    let mut pairs = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        let key = key.trim().to_ascii_lowercase();

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            if chars.peek() == Some(&'"') {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => value.push(c),
                    }
                }
                if !closed {
                    return Err(AuthError::Protocol(format!(
                        "unterminated quoted value for {key}"
                    )));
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }

        if !key.is_empty() {
            pairs.insert(key, value);
        }
    }

    Ok(pairs)
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Server challenge sent in `WWW-Authenticate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: String,
}

/// 18 random bytes, standard base64.
pub(crate) fn random_key() -> Result<String, AuthError> {
    let mut bytes = [0u8; 18];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64::encode_string(&bytes))
}

impl Challenge {
    /// Fresh nonce and opaque for `realm`.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate(realm: &str) -> Result<Self, AuthError> {
        Ok(Self {
            realm: realm.to_string(),
            nonce: random_key()?,
            opaque: random_key()?,
        })
    }

    /// Reads a challenge back from a `WWW-Authenticate` value.
    ///
    /// # Errors
    /// Returns `AuthError::Protocol` if the header is not a digest challenge
    /// or lacks a nonce.
    pub fn parse(header: &str) -> Result<Self, AuthError> {
        let params = DigestParams::parse(header)?;
        let nonce = params
            .get("nonce")
            .filter(|nonce| !nonce.is_empty())
            .ok_or_else(|| AuthError::Protocol("challenge without nonce".to_string()))?;
        Ok(Self {
            realm: params.get("realm").unwrap_or_default().to_string(),
            nonce: nonce.to_string(),
            opaque: params.get("opaque").unwrap_or_default().to_string(),
        })
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{SCHEME} realm="{}", nonce="{}", opaque="{}", algorithm=MD5, qop="auth""#,
            quote(&self.realm),
            quote(&self.nonce),
            quote(&self.opaque)
        )
    }
}

/// Client side `Authorization` value for `qop=auth`.
#[derive(Clone, Debug)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub realm: &'a str,
    pub nonce: &'a str,
    pub uri: &'a str,
    pub response: &'a str,
    pub opaque: &'a str,
    pub nc: &'a str,
    pub cnonce: &'a str,
}

impl fmt::Display for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{SCHEME} username="{}", realm="{}", nonce="{}", uri="{}", algorithm=MD5, response="{}", opaque="{}", qop=auth, nc={}, cnonce="{}""#,
            quote(self.username),
            quote(self.realm),
            quote(self.nonce),
            quote(self.uri),
            self.response,
            quote(self.opaque),
            self.nc,
            quote(self.cnonce)
        )
    }
}
