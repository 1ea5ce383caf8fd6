use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::config::DEFAULT_REALM;

pub const CMD_USER: &str = "user";
pub const CMD_ADD: &str = "add";
pub const CMD_RESET: &str = "reset";

pub const ARG_URL: &str = "url";
pub const ARG_ADMIN_USER: &str = "admin-user";
pub const ARG_ADMIN_PWD: &str = "admin-pwd";
pub const ARG_REALM: &str = "realm";
pub const ARG_PLAINTEXT_SECRETS: &str = "plaintext-secrets";
pub const ARG_USERNAME: &str = "username";
pub const ARG_PASSWD: &str = "passwd";
pub const ARG_NICKNAME: &str = "nickname";

#[derive(Debug, Clone)]
pub enum Change {
    Add {
        username: String,
        passwd: SecretString,
        nickname: String,
    },
    Reset {
        username: String,
        passwd: SecretString,
    },
}

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub admin_user: String,
    pub admin_pwd: SecretString,
    pub realm: String,
    pub plaintext_secrets: bool,
    pub change: Change,
}

impl Options {
    /// Parse `user` arguments, including the `add` or `reset` subcommand.
    ///
    /// # Errors
    /// Returns an error if a required argument or the subcommand is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read = |matches: &ArgMatches, id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let change = match matches.subcommand() {
            Some((CMD_ADD, sub)) => Change::Add {
                username: read(sub, ARG_USERNAME)?,
                passwd: SecretString::from(read(sub, ARG_PASSWD)?),
                nickname: sub.get_one::<String>(ARG_NICKNAME).cloned().unwrap_or_default(),
            },
            Some((CMD_RESET, sub)) => Change::Reset {
                username: read(sub, ARG_USERNAME)?,
                passwd: SecretString::from(read(sub, ARG_PASSWD)?),
            },
            _ => anyhow::bail!("missing subcommand: {CMD_ADD} or {CMD_RESET}"),
        };

        Ok(Self {
            url: read(matches, ARG_URL)?,
            admin_user: read(matches, ARG_ADMIN_USER)?,
            admin_pwd: SecretString::from(read(matches, ARG_ADMIN_PWD)?),
            realm: read(matches, ARG_REALM)?,
            plaintext_secrets: matches.get_flag(ARG_PLAINTEXT_SECRETS),
            change,
        })
    }
}

fn account_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_USERNAME)
                .long(ARG_USERNAME)
                .help("Account name")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PASSWD)
                .long(ARG_PASSWD)
                .help("New password, hashed before it is sent unless --plaintext-secrets")
                .required(true),
        )
}

#[must_use]
pub fn subcommand() -> Command {
    Command::new(CMD_USER)
        .about("Manage accounts through a running daemon")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_URL)
                .long(ARG_URL)
                .help("Daemon base URL")
                .default_value("http://127.0.0.1:8080")
                .env("MDOC_URL"),
        )
        .arg(
            Arg::new(ARG_ADMIN_USER)
                .long(ARG_ADMIN_USER)
                .help("Admin account name")
                .default_value("admin")
                .env("MDOC_ADMIN_USER"),
        )
        .arg(
            Arg::new(ARG_ADMIN_PWD)
                .long(ARG_ADMIN_PWD)
                .help("Admin password")
                .env("MDOC_ADMIN_PWD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REALM)
                .long(ARG_REALM)
                .help("Digest authentication realm of the daemon")
                .default_value(DEFAULT_REALM)
                .env("MDOC_REALM"),
        )
        .arg(
            Arg::new(ARG_PLAINTEXT_SECRETS)
                .long(ARG_PLAINTEXT_SECRETS)
                .help("Send the password as is, for a daemon storing plaintext secrets")
                .env("MDOC_PLAINTEXT_SECRETS")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            account_args(Command::new(CMD_ADD).about("Add a standard account")).arg(
                Arg::new(ARG_NICKNAME)
                    .long(ARG_NICKNAME)
                    .help("Display name")
                    .default_value(""),
            ),
        )
        .subcommand(account_args(
            Command::new(CMD_RESET).about("Replace the password of an account"),
        ))
}
