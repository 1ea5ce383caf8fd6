pub mod daemon;
pub mod user;

// match over variants lives in `run`
mod run;

#[derive(Debug)]
pub enum Action {
    Daemon(daemon::Args),
    User(user::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
