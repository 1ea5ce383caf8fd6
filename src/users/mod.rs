//! SQLite-backed user accounts.

use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    FromRow, Row, SqlitePool,
};
use std::{path::Path, str::FromStr};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::auth::{CredentialLookup, CredentialRecord, LookupError, UserKind};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS user_info (
        id         TEXT PRIMARY KEY,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        passwd     TEXT NOT NULL,
        nick_name  TEXT NOT NULL DEFAULT '',
        kind       INT  NOT NULL DEFAULT 2,
        memo       TEXT NOT NULL DEFAULT ''
    )
";

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user {0} already exists")]
    AlreadyExists(String),
    #[error("user {0} not found")]
    NotFound(String),
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// One row of `user_info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(skip)]
    pub passwd: String,
    pub nickname: String,
    pub kind: UserKind,
    pub memo: String,
    pub created_at: String,
    pub updated_at: String,
}

impl<'r> FromRow<'r, SqliteRow> for UserInfo {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            username: row.try_get("id")?,
            passwd: row.try_get("passwd")?,
            nickname: row.try_get("nick_name")?,
            kind: UserKind::from_code(row.try_get("kind")?),
            memo: row.try_get("memo")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the directory or the database cannot be created.
    pub async fn connect(path: &Path) -> Result<Self, UserError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let store = Self::with_options(options).await?;
        info!("user database at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, gone when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if SQLite cannot be opened.
    pub async fn in_memory() -> Result<Self, UserError> {
        Self::with_options(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self, UserError> {
        // one connection: writes are rare and an in-memory database lives
        // only as long as its connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// # Errors
    /// Returns `UserError::AlreadyExists` for a taken username.
    #[instrument(skip(self, secret))]
    pub async fn add_user(
        &self,
        username: &str,
        secret: &str,
        nickname: &str,
        kind: UserKind,
    ) -> Result<(), UserError> {
        let result = sqlx::query(
            "INSERT INTO user_info (id, passwd, nick_name, kind) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(username)
        .bind(secret)
        .bind(nickname)
        .bind(kind.code())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!("added user {}", username);
                Ok(())
            }
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(UserError::AlreadyExists(username.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_user(&self, username: &str) -> Result<Option<UserInfo>, UserError> {
        let user = sqlx::query_as::<_, UserInfo>("SELECT * FROM user_info WHERE id = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        debug!("user {} found: {}", username, user.is_some());
        Ok(user)
    }

    /// # Errors
    /// Returns `UserError::NotFound` when no row was updated.
    #[instrument(skip(self, secret))]
    pub async fn reset_password(&self, username: &str, secret: &str) -> Result<(), UserError> {
        let result = sqlx::query(
            "UPDATE user_info SET passwd = ?1, updated_at = datetime('now') WHERE id = ?2",
        )
        .bind(secret)
        .bind(username)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound(username.to_string()));
        }
        info!("password reset for {}", username);
        Ok(())
    }
}

impl CredentialLookup for UserStore {
    async fn lookup(&self, username: &str) -> Result<Option<CredentialRecord>, LookupError> {
        let user = self.get_user(username).await.map_err(LookupError::new)?;
        Ok(user.map(|user| CredentialRecord {
            username: user.username,
            secret: user.passwd,
            kind: user.kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Option<UserStore> {
        UserStore::in_memory().await.ok()
    }

    #[tokio::test]
    async fn add_and_get_user() {
        let Some(store) = store().await else {
            panic!("in-memory database unavailable");
        };

        assert!(store
            .add_user("alice", "s3cret", "Alice", UserKind::Standard)
            .await
            .is_ok());

        let user = store.get_user("alice").await.ok().flatten();
        assert!(user.is_some());
        let Some(user) = user else { return };
        assert_eq!(user.username, "alice");
        assert_eq!(user.passwd, "s3cret");
        assert_eq!(user.nickname, "Alice");
        assert_eq!(user.kind, UserKind::Standard);
        assert!(!user.created_at.is_empty());

        assert!(matches!(store.get_user("bob").await, Ok(None)));
    }

    #[tokio::test]
    async fn duplicate_user_is_rejected() {
        let Some(store) = store().await else {
            panic!("in-memory database unavailable");
        };
        assert!(store.add_user("admin", "x", "", UserKind::Admin).await.is_ok());
        assert!(matches!(
            store.add_user("admin", "y", "", UserKind::Standard).await,
            Err(UserError::AlreadyExists(name)) if name == "admin"
        ));
    }

    #[tokio::test]
    async fn reset_password_updates_secret() {
        let Some(store) = store().await else {
            panic!("in-memory database unavailable");
        };
        assert!(store.add_user("alice", "old", "", UserKind::Standard).await.is_ok());
        assert!(store.reset_password("alice", "new").await.is_ok());

        let secret = store
            .get_user("alice")
            .await
            .ok()
            .flatten()
            .map(|user| user.passwd);
        assert_eq!(secret.as_deref(), Some("new"));

        assert!(matches!(
            store.reset_password("ghost", "x").await,
            Err(UserError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lookup_maps_rows_to_records() {
        let Some(store) = store().await else {
            panic!("in-memory database unavailable");
        };
        assert!(store.add_user("root", "h", "", UserKind::Admin).await.is_ok());

        let record = store.lookup("root").await.ok().flatten();
        assert_eq!(
            record,
            Some(CredentialRecord {
                username: "root".to_string(),
                secret: "h".to_string(),
                kind: UserKind::Admin,
            })
        );
        assert!(matches!(store.lookup("nobody").await, Ok(None)));
    }

    #[tokio::test]
    async fn connect_creates_directory() {
        let dir = tempfile::tempdir();
        assert!(dir.is_ok());
        let Ok(dir) = dir else { return };
        let path = dir.path().join("nested").join("user.db");

        let store = UserStore::connect(&path).await;
        assert!(store.is_ok());
        assert!(path.exists());
    }
}
