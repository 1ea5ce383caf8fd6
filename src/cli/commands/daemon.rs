use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::path::PathBuf;

use crate::auth::config::DEFAULT_REALM;

pub const CMD_DAEMON: &str = "daemon";

pub const ARG_LISTEN: &str = "listen";
pub const ARG_REPO: &str = "repo";
pub const ARG_REALM: &str = "realm";
pub const ARG_PLAINTEXT_SECRETS: &str = "plaintext-secrets";
pub const ARG_TOKEN_SHORTCUT: &str = "token-shortcut";
pub const ARG_NO_AUTH: &str = "no-auth";
pub const ARG_DUMP: &str = "dump";
pub const ARG_CACHE_SWEEP_SECONDS: &str = "cache-sweep-seconds";
pub const ARG_IGNORE_AUTH: &str = "ignore-auth";
pub const ARG_ADMIN_PASSWD: &str = "admin-passwd";

#[derive(Debug, Clone)]
pub struct Options {
    pub listen: String,
    pub repo: PathBuf,
    pub realm: String,
    pub plaintext_secrets: bool,
    pub token_shortcut: bool,
    pub no_auth: bool,
    pub dump: bool,
    pub cache_sweep_seconds: u64,
    pub ignore_auth: Option<PathBuf>,
    pub admin_passwd: Option<SecretString>,
}

impl Options {
    /// Parse daemon arguments from the subcommand matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_required = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            listen: listen_addr(&read_required(ARG_LISTEN)?),
            repo: expand_home(&read_required(ARG_REPO)?),
            realm: read_required(ARG_REALM)?,
            plaintext_secrets: matches.get_flag(ARG_PLAINTEXT_SECRETS),
            token_shortcut: matches.get_flag(ARG_TOKEN_SHORTCUT),
            no_auth: matches.get_flag(ARG_NO_AUTH),
            dump: matches.get_flag(ARG_DUMP),
            cache_sweep_seconds: matches
                .get_one::<u64>(ARG_CACHE_SWEEP_SECONDS)
                .copied()
                .unwrap_or(60),
            ignore_auth: matches
                .get_one::<String>(ARG_IGNORE_AUTH)
                .filter(|v| !v.trim().is_empty())
                .map(|v| expand_home(v)),
            admin_passwd: matches
                .get_one::<String>(ARG_ADMIN_PASSWD)
                .filter(|v| !v.is_empty())
                .map(|v| SecretString::from(v.as_str())),
        })
    }
}

/// `:8080` listens on every interface.
#[must_use]
pub fn listen_addr(listen: &str) -> String {
    if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_string()
    }
}

/// Replace a leading `~` with `$HOME`.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

fn flag(id: &'static str, env: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .env(env)
        .action(ArgAction::SetTrue)
}

#[must_use]
pub fn subcommand() -> Command {
    Command::new(CMD_DAEMON)
        .about("Serve the document repository")
        .arg(
            Arg::new(ARG_LISTEN)
                .short('l')
                .long(ARG_LISTEN)
                .help("Address to listen on")
                .default_value(":8080")
                .env("MDOC_LISTEN"),
        )
        .arg(
            Arg::new(ARG_REPO)
                .short('r')
                .long(ARG_REPO)
                .help("Repository directory holding public/ and data/")
                .default_value("~/.mdoc")
                .env("MDOC_REPO"),
        )
        .arg(
            Arg::new(ARG_REALM)
                .long(ARG_REALM)
                .help("Digest authentication realm")
                .default_value(DEFAULT_REALM)
                .env("MDOC_REALM"),
        )
        .arg(flag(
            ARG_PLAINTEXT_SECRETS,
            "MDOC_PLAINTEXT_SECRETS",
            "Stored passwords are plain text instead of H(username:realm:password)",
        ))
        .arg(flag(
            ARG_TOKEN_SHORTCUT,
            "MDOC_TOKEN_SHORTCUT",
            "Accept a valid login cookie without a new digest exchange",
        ))
        .arg(flag(
            ARG_NO_AUTH,
            "MDOC_NO_AUTH",
            "Serve everything without authentication",
        ))
        .arg(flag(ARG_DUMP, "MDOC_DUMP", "Log every incoming request"))
        .arg(
            Arg::new(ARG_CACHE_SWEEP_SECONDS)
                .long(ARG_CACHE_SWEEP_SECONDS)
                .help("Interval of the cache expiration sweep in seconds")
                .default_value("60")
                .env("MDOC_CACHE_SWEEP_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_IGNORE_AUTH)
                .long(ARG_IGNORE_AUTH)
                .help("File listing paths served without authentication")
                .env("MDOC_IGNORE_AUTH"),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSWD)
                .long(ARG_ADMIN_PASSWD)
                .help("Create the admin account with this password if it does not exist")
                .env("MDOC_ADMIN_PASSWD")
                .hide_env_values(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn parse(args: &[&str]) -> Option<Options> {
        let mut argv = vec![CMD_DAEMON];
        argv.extend_from_slice(args);
        let matches = subcommand().try_get_matches_from(argv).ok()?;
        Options::parse(&matches).ok()
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(listen_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(listen_addr("127.0.0.1:9000"), "127.0.0.1:9000");
        assert_eq!(listen_addr("[::]:80"), "[::]:80");
    }

    #[test]
    fn test_expand_home() {
        temp_env::with_var("HOME", Some("/home/doc"), || {
            assert_eq!(expand_home("~/.mdoc"), PathBuf::from("/home/doc/.mdoc"));
            assert_eq!(expand_home("~"), PathBuf::from("/home/doc"));
            assert_eq!(expand_home("/srv/mdoc"), PathBuf::from("/srv/mdoc"));
            assert_eq!(expand_home("~other/x"), PathBuf::from("~other/x"));
        });
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("HOME", Some("/home/doc")),
                ("MDOC_LISTEN", None),
                ("MDOC_REPO", None),
                ("MDOC_REALM", None),
                ("MDOC_NO_AUTH", None),
                ("MDOC_ADMIN_PASSWD", None),
            ],
            || {
                let options = parse(&[]);
                assert!(options.is_some());
                let Some(options) = options else { return };

                assert_eq!(options.listen, "0.0.0.0:8080");
                assert_eq!(options.repo, PathBuf::from("/home/doc/.mdoc"));
                assert_eq!(options.realm, "mdoc");
                assert!(!options.plaintext_secrets);
                assert!(!options.token_shortcut);
                assert!(!options.no_auth);
                assert!(!options.dump);
                assert_eq!(options.cache_sweep_seconds, 60);
                assert!(options.ignore_auth.is_none());
                assert!(options.admin_passwd.is_none());
            },
        );
    }

    #[test]
    fn test_flags() {
        let options = parse(&[
            "--listen",
            "127.0.0.1:9000",
            "--repo",
            "/srv/mdoc",
            "--realm",
            "docs",
            "--plaintext-secrets",
            "--token-shortcut",
            "--no-auth",
            "--dump",
            "--cache-sweep-seconds",
            "5",
            "--ignore-auth",
            "/srv/mdoc/ignore.csv",
            "--admin-passwd",
            "hello",
        ]);
        assert!(options.is_some());
        let Some(options) = options else { return };

        assert_eq!(options.listen, "127.0.0.1:9000");
        assert_eq!(options.repo, PathBuf::from("/srv/mdoc"));
        assert_eq!(options.realm, "docs");
        assert!(options.plaintext_secrets);
        assert!(options.token_shortcut);
        assert!(options.no_auth);
        assert!(options.dump);
        assert_eq!(options.cache_sweep_seconds, 5);
        assert_eq!(
            options.ignore_auth,
            Some(PathBuf::from("/srv/mdoc/ignore.csv"))
        );
        assert_eq!(
            options.admin_passwd.as_ref().map(|p| p.expose_secret().to_string()),
            Some("hello".to_string())
        );
    }

    #[test]
    fn test_env() {
        temp_env::with_vars(
            [
                ("MDOC_LISTEN", Some("127.0.0.1:7000")),
                ("MDOC_REPO", Some("/data/docs")),
                ("MDOC_REALM", Some("team")),
                ("MDOC_TOKEN_SHORTCUT", Some("true")),
                ("MDOC_CACHE_SWEEP_SECONDS", Some("30")),
            ],
            || {
                let options = parse(&[]);
                assert!(options.is_some());
                let Some(options) = options else { return };

                assert_eq!(options.listen, "127.0.0.1:7000");
                assert_eq!(options.repo, PathBuf::from("/data/docs"));
                assert_eq!(options.realm, "team");
                assert!(options.token_shortcut);
                assert_eq!(options.cache_sweep_seconds, 30);
            },
        );
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        assert!(subcommand()
            .try_get_matches_from([CMD_DAEMON, "--cache-sweep-seconds", "0"])
            .is_err());
    }
}
