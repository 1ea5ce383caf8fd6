use crate::auth::{hash_secret, DigestClient};
use crate::cli::commands::user::Change;
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub url: String,
    pub admin_user: String,
    pub admin_pwd: SecretString,
    pub realm: String,
    pub plaintext_secrets: bool,
    pub change: Change,
}

impl Args {
    /// The secret the daemon stores for `username`: the raw password in
    /// plaintext mode, `H(username:realm:password)` otherwise.
    fn stored_secret(&self, username: &str, passwd: &SecretString) -> String {
        if self.plaintext_secrets {
            passwd.expose_secret().to_string()
        } else {
            hash_secret(username, &self.realm, passwd.expose_secret())
        }
    }
}

/// Endpoint and form fields for one account change.
fn request(args: &Args) -> (String, Vec<(&'static str, String)>) {
    let base = args.url.trim_end_matches('/');
    match &args.change {
        Change::Add {
            username,
            passwd,
            nickname,
        } => (
            format!("{base}/user/add"),
            vec![
                ("username", username.clone()),
                ("passwd", args.stored_secret(username, passwd)),
                ("nickname", nickname.clone()),
            ],
        ),
        Change::Reset { username, passwd } => (
            format!("{base}/user/pwd/reset"),
            vec![
                ("username", username.clone()),
                ("passwd", args.stored_secret(username, passwd)),
            ],
        ),
    }
}

/// Execute the user action against a running daemon.
/// # Errors
/// Returns an error if the daemon rejects the change or cannot be reached.
pub async fn execute(args: Args) -> Result<()> {
    let (url, form) = request(&args);
    let form: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let client = DigestClient::new(args.admin_user.clone(), args.admin_pwd.clone())?;
    let body = client
        .post_form(&url, &form)
        .await
        .with_context(|| format!("Request to {url} failed"))?;

    info!("{} -> {}", url, body);
    println!("{body}");

    Ok(())
}
