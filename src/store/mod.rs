/// Store access layer
///
/// Exposes exactly the queries the admin commands need through the `AdminStore`
/// trait, with one backend per supported driver:
/// - `SqliteStore`: local file-backed database via sqlx
/// - `PostgresStore`: remote server via tokio-postgres
///
/// `Store` picks one of them from the resolved `DatabaseConfig`.

pub mod postgres;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod memory;

use crate::config::DatabaseConfig;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Errors raised by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] sqlx::Error),
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),
    #[error("failed to set up TLS: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to prepare database at {path}: {source}")]
    Setup {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[cfg(test)]
    #[error("{0}")]
    Injected(String),
}

/// Project identifier accepted on the command line
///
/// Non-negative and small enough for a 32-bit integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(i32);

/// Rejected project id text
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid pid {0:?}: expected a non-negative integer")]
pub struct InvalidProjectId(pub String);

impl ProjectId {
    pub fn new(id: i32) -> Result<Self, InvalidProjectId> {
        if id < 0 {
            return Err(InvalidProjectId(id.to_string()));
        }
        Ok(Self(id))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl FromStr for ProjectId {
    type Err = InvalidProjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i32>()
            .ok()
            .filter(|id| *id >= 0)
            .map(Self)
            .ok_or_else(|| InvalidProjectId(s.to_string()))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A project row as shown by listings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: i32,
    pub name: String,
}

/// Tables holding rows keyed by a project id
///
/// `CASCADE_ORDER` is the order in which they must be cleared so that no
/// remaining row references a deleted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectTable {
    Views,
    Owns,
    Projects,
}

impl ProjectTable {
    pub const CASCADE_ORDER: [ProjectTable; 3] = [Self::Views, Self::Owns, Self::Projects];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Views => "views",
            Self::Owns => "owns",
            Self::Projects => "projects",
        }
    }
}

impl fmt::Display for ProjectTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queries the admin commands issue against the backing database
///
/// Mutations return the number of affected rows so callers can tell a
/// successful no-op (unknown user or project) from a change. Listings are lazy,
/// single-pass streams; a decode error ends the stream.
#[allow(async_fn_in_trait)]
pub trait AdminStore {
    /// Create the tables used by the backend if they do not exist yet
    async fn init_schema(&self) -> Result<(), StoreError>;

    async fn set_is_manager(&self, user: &str, is_manager: bool) -> Result<u64, StoreError>;

    /// Role flag of `user`, `None` when there is no such user
    async fn is_manager(&self, user: &str) -> Result<Option<bool>, StoreError>;

    async fn set_password_hash(&self, user: &str, hash: &str) -> Result<u64, StoreError>;

    async fn password_hash(&self, user: &str) -> Result<Option<String>, StoreError>;

    /// Point the `owns` row of `pid` at `user`
    async fn set_owner(&self, pid: ProjectId, user: &str) -> Result<u64, StoreError>;

    async fn owner(&self, pid: ProjectId) -> Result<Option<String>, StoreError>;

    fn user_names(&self) -> BoxStream<'_, Result<String, StoreError>>;

    fn projects(&self) -> BoxStream<'_, Result<ProjectSummary, StoreError>>;

    /// Projects whose `owns` row names `user`
    fn owned_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<ProjectSummary, StoreError>>;

    /// Remove the `users` row only; `owns`/`views` rows are left alone
    async fn delete_user(&self, user: &str) -> Result<u64, StoreError>;

    /// Remove every row of `table` keyed by `pid`
    async fn delete_project_rows(
        &self,
        table: ProjectTable,
        pid: ProjectId,
    ) -> Result<u64, StoreError>;
}

/// The store opened for this process
#[derive(Debug)]
pub enum Store {
    Sqlite(SqliteStore),
    Postgres(PostgresStore),
}

impl Store {
    /// Open the single connection used for the lifetime of the process
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        tracing::info!(driver = config.driver_name(), "opening database connection");
        match config {
            DatabaseConfig::LocalFile { path } => Ok(Self::Sqlite(SqliteStore::open(path).await?)),
            DatabaseConfig::Sqlite { url } => {
                Ok(Self::Sqlite(SqliteStore::connect_url(url).await?))
            }
            DatabaseConfig::Postgres { url } => {
                Ok(Self::Postgres(PostgresStore::connect(url).await?))
            }
        }
    }

    /// Release the connection
    pub async fn close(self) {
        match self {
            Self::Sqlite(store) => store.close().await,
            Self::Postgres(store) => store.close().await,
        }
        tracing::debug!("database connection closed");
    }
}

impl AdminStore for Store {
    async fn init_schema(&self) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(s) => s.init_schema().await,
            Self::Postgres(s) => s.init_schema().await,
        }
    }

    async fn set_is_manager(&self, user: &str, is_manager: bool) -> Result<u64, StoreError> {
        match self {
            Self::Sqlite(s) => s.set_is_manager(user, is_manager).await,
            Self::Postgres(s) => s.set_is_manager(user, is_manager).await,
        }
    }

    async fn is_manager(&self, user: &str) -> Result<Option<bool>, StoreError> {
        match self {
            Self::Sqlite(s) => s.is_manager(user).await,
            Self::Postgres(s) => s.is_manager(user).await,
        }
    }

    async fn set_password_hash(&self, user: &str, hash: &str) -> Result<u64, StoreError> {
        match self {
            Self::Sqlite(s) => s.set_password_hash(user, hash).await,
            Self::Postgres(s) => s.set_password_hash(user, hash).await,
        }
    }

    async fn password_hash(&self, user: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Sqlite(s) => s.password_hash(user).await,
            Self::Postgres(s) => s.password_hash(user).await,
        }
    }

    async fn set_owner(&self, pid: ProjectId, user: &str) -> Result<u64, StoreError> {
        match self {
            Self::Sqlite(s) => s.set_owner(pid, user).await,
            Self::Postgres(s) => s.set_owner(pid, user).await,
        }
    }

    async fn owner(&self, pid: ProjectId) -> Result<Option<String>, StoreError> {
        match self {
            Self::Sqlite(s) => s.owner(pid).await,
            Self::Postgres(s) => s.owner(pid).await,
        }
    }

    fn user_names(&self) -> BoxStream<'_, Result<String, StoreError>> {
        match self {
            Self::Sqlite(s) => s.user_names(),
            Self::Postgres(s) => s.user_names(),
        }
    }

    fn projects(&self) -> BoxStream<'_, Result<ProjectSummary, StoreError>> {
        match self {
            Self::Sqlite(s) => s.projects(),
            Self::Postgres(s) => s.projects(),
        }
    }

    fn owned_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<ProjectSummary, StoreError>> {
        match self {
            Self::Sqlite(s) => s.owned_projects(user),
            Self::Postgres(s) => s.owned_projects(user),
        }
    }

    async fn delete_user(&self, user: &str) -> Result<u64, StoreError> {
        match self {
            Self::Sqlite(s) => s.delete_user(user).await,
            Self::Postgres(s) => s.delete_user(user).await,
        }
    }

    async fn delete_project_rows(
        &self,
        table: ProjectTable,
        pid: ProjectId,
    ) -> Result<u64, StoreError> {
        match self {
            Self::Sqlite(s) => s.delete_project_rows(table, pid).await,
            Self::Postgres(s) => s.delete_project_rows(table, pid).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_accepts_non_negative_integers() {
        assert_eq!("0".parse::<ProjectId>().unwrap().get(), 0);
        assert_eq!("42".parse::<ProjectId>().unwrap().get(), 42);
        assert_eq!(ProjectId::new(7).unwrap().to_string(), "7");
    }

    #[test]
    fn project_id_rejects_garbage() {
        for bad in ["abc", "-1", "", "1.5", " 3", "99999999999"] {
            assert_eq!(bad.parse::<ProjectId>(), Err(InvalidProjectId(bad.to_string())));
        }
        assert!(ProjectId::new(-4).is_err());
    }

    #[tokio::test]
    async fn opens_sqlite_connection_strings() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("x.db").display());

        for config in [
            DatabaseConfig::Sqlite { url: "sqlite::memory:".into() },
            DatabaseConfig::Sqlite { url },
        ] {
            let store = Store::open(&config).await.unwrap();
            store.init_schema().await.unwrap();
            assert_eq!(store.set_is_manager("nobody", true).await.unwrap(), 0);
            store.close().await;
        }
        assert!(dir.path().join("x.db").is_file());
    }

    #[test]
    fn cascade_clears_dependents_first() {
        assert_eq!(
            ProjectTable::CASCADE_ORDER,
            [ProjectTable::Views, ProjectTable::Owns, ProjectTable::Projects]
        );
    }
}
