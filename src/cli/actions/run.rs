use crate::cli::actions::{daemon, user, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Daemon(args) => daemon::execute(args).await,
        Action::User(args) => user::execute(args).await,
    }
}
