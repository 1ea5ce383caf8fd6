//! Maps parsed command-line matches to an [`Action`].

use crate::cli::actions::{daemon, user, Action};
use crate::cli::commands::{daemon::CMD_DAEMON, user::CMD_USER};
use anyhow::{bail, Result};

/// # Errors
/// Returns an error if the subcommand is unknown or its arguments are incomplete.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_DAEMON, sub)) => {
            let options = crate::cli::commands::daemon::Options::parse(sub)?;
            Ok(Action::Daemon(daemon::Args {
                listen: options.listen,
                repo: options.repo,
                realm: options.realm,
                plaintext_secrets: options.plaintext_secrets,
                token_shortcut: options.token_shortcut,
                auth_enabled: !options.no_auth,
                dump: options.dump,
                cache_sweep_seconds: options.cache_sweep_seconds,
                ignore_auth: options.ignore_auth,
                admin_passwd: options.admin_passwd,
            }))
        }
        Some((CMD_USER, sub)) => {
            let options = crate::cli::commands::user::Options::parse(sub)?;
            Ok(Action::User(user::Args {
                url: options.url,
                admin_user: options.admin_user,
                admin_pwd: options.admin_pwd,
                realm: options.realm,
                plaintext_secrets: options.plaintext_secrets,
                change: options.change,
            }))
        }
        Some((other, _)) => bail!("unknown command: {other}"),
        None => bail!("missing command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn test_dispatch_daemon() {
        temp_env::with_vars([("MDOC_NO_AUTH", None::<&str>)], || {
            let matches = commands::new().try_get_matches_from(["mdoc", "daemon", "--dump"]);
            assert!(matches.is_ok());
            let Ok(matches) = matches else { return };

            match handler(&matches) {
                Ok(Action::Daemon(args)) => {
                    assert!(args.dump);
                    assert!(args.auth_enabled);
                }
                other => panic!("unexpected dispatch result: {other:?}"),
            }
        });
    }

    #[test]
    fn test_dispatch_user() {
        let matches = commands::new().try_get_matches_from([
            "mdoc",
            "user",
            "--admin-pwd",
            "hello",
            "reset",
            "--username",
            "alice",
            "--passwd",
            "x",
        ]);
        assert!(matches.is_ok());
        let Ok(matches) = matches else { return };

        assert!(matches!(handler(&matches), Ok(Action::User(_))));
    }
}
