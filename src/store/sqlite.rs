/// SQLite backend
///
/// Local file-backed store used when no remote database is configured. The pool
/// is capped at a single connection so the process holds exactly one.

use crate::store::{AdminStore, ProjectId, ProjectSummary, ProjectTable, StoreError};
use futures::{stream::BoxStream, StreamExt};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::{path::Path, str::FromStr, time::Duration};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        name TEXT PRIMARY KEY,
        password_hash TEXT NOT NULL DEFAULT '',
        is_manager BOOLEAN NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS owns (
        pid INTEGER NOT NULL UNIQUE REFERENCES projects(id),
        name TEXT NOT NULL REFERENCES users(name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS views (
        pid INTEGER NOT NULL REFERENCES projects(id),
        name TEXT NOT NULL REFERENCES users(name),
        PRIMARY KEY (pid, name)
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Setup {
                path: dir.display().to_string(),
                source,
            })?;
        }

        tracing::info!("🗄️ Opening SQLite database: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        Self::connect_with(options).await
    }

    /// Open the database named by a `sqlite:` connection string or bare path
    pub async fn connect_url(url: &str) -> Result<Self, StoreError> {
        tracing::info!("🗄️ Opening SQLite database: {}", url);

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        Self::connect_with(options).await
    }

    /// Connect with explicit options (one connection, never recycled)
    pub async fn connect_with(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn project_summary(row: SqliteRow) -> Result<ProjectSummary, sqlx::Error> {
    Ok(ProjectSummary {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

impl AdminStore for SqliteStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn set_is_manager(&self, user: &str, is_manager: bool) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE users SET is_manager = ? WHERE name = ?")
            .bind(is_manager)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn is_manager(&self, user: &str) -> Result<Option<bool>, StoreError> {
        let row = sqlx::query("SELECT is_manager FROM users WHERE name = ?")
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("is_manager")).transpose()?)
    }

    async fn set_password_hash(&self, user: &str, hash: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE name = ?")
            .bind(hash)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn password_hash(&self, user: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT password_hash FROM users WHERE name = ?")
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("password_hash")).transpose()?)
    }

    async fn set_owner(&self, pid: ProjectId, user: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE owns SET name = ? WHERE pid = ?")
            .bind(user)
            .bind(pid.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn owner(&self, pid: ProjectId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT name FROM owns WHERE pid = ?")
            .bind(pid.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("name")).transpose()?)
    }

    fn user_names(&self) -> BoxStream<'_, Result<String, StoreError>> {
        sqlx::query("SELECT name FROM users")
            .fetch(&self.pool)
            .map(|row| -> Result<String, StoreError> { Ok(row?.try_get("name")?) })
            .boxed()
    }

    fn projects(&self) -> BoxStream<'_, Result<ProjectSummary, StoreError>> {
        sqlx::query("SELECT id, name FROM projects")
            .fetch(&self.pool)
            .map(|row| -> Result<ProjectSummary, StoreError> { Ok(project_summary(row?)?) })
            .boxed()
    }

    fn owned_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<ProjectSummary, StoreError>> {
        sqlx::query(
            r#"
            SELECT projects.id AS id, projects.name AS name
            FROM owns JOIN projects ON projects.id = owns.pid
            WHERE owns.name = ?
            "#,
        )
        .bind(user)
        .fetch(&self.pool)
        .map(|row| -> Result<ProjectSummary, StoreError> { Ok(project_summary(row?)?) })
        .boxed()
    }

    async fn delete_user(&self, user: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE name = ?")
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_project_rows(
        &self,
        table: ProjectTable,
        pid: ProjectId,
    ) -> Result<u64, StoreError> {
        let statement = match table {
            ProjectTable::Views => "DELETE FROM views WHERE pid = ?",
            ProjectTable::Owns => "DELETE FROM owns WHERE pid = ?",
            ProjectTable::Projects => "DELETE FROM projects WHERE id = ?",
        };
        let result = sqlx::query(statement)
            .bind(pid.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
