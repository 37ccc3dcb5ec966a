/// PostgreSQL backend
///
/// One tokio-postgres client per process. The connection future runs on its own
/// task and is joined when the store is closed. TLS is negotiated through
/// native-tls according to the URL's `sslmode` (tokio-postgres defaults to
/// `prefer`); server certificates are verified against the system roots.

use crate::store::{AdminStore, ProjectId, ProjectSummary, ProjectTable, StoreError};
use futures::{stream, stream::BoxStream, StreamExt, TryStreamExt};
use postgres_native_tls::MakeTlsConnector;
use std::fmt;
use tokio::task::JoinHandle;
use tokio_postgres::{types::ToSql, Client, Row};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        name TEXT PRIMARY KEY,
        password_hash TEXT NOT NULL DEFAULT '',
        is_manager BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id SERIAL PRIMARY KEY,
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

pub struct PostgresStore {
    client: Client,
    connection: JoinHandle<()>,
}

impl fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStore")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

fn project_summary(row: Row) -> Result<ProjectSummary, StoreError> {
    Ok(ProjectSummary {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

fn tls_connector() -> Result<MakeTlsConnector, StoreError> {
    let connector = native_tls::TlsConnector::builder().build()?;
    Ok(MakeTlsConnector::new(connector))
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(url, tls_connector()?).await?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("❌ PostgreSQL connection error: {}", e);
            }
        });
        tracing::info!("🗄️ Connected to PostgreSQL");
        Ok(Self { client, connection })
    }

    /// Drop the client and wait for the connection task to wind down
    pub async fn close(self) {
        let Self { client, connection } = self;
        drop(client);
        if let Err(e) = connection.await {
            tracing::warn!("PostgreSQL connection task ended abnormally: {}", e);
        }
    }

    async fn execute(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, StoreError> {
        Ok(self.client.execute(statement, params).await?)
    }

    /// Lazily stream the rows of a text-parameterised query through `decode`
    fn stream<'a, T, F>(
        &'a self,
        statement: &'static str,
        params: Vec<&'a str>,
        decode: F,
    ) -> BoxStream<'a, Result<T, StoreError>>
    where
        T: Send + 'a,
        F: Fn(Row) -> Result<T, StoreError> + Send + 'a,
    {
        let rows = async move { self.client.query_raw(statement, params).await };
        stream::once(rows)
            .map_ok(move |rows| rows.map_err(StoreError::from))
            .map_err(StoreError::from)
            .try_flatten()
            .map(move |row| row.and_then(&decode))
            .boxed()
    }
}

impl AdminStore for PostgresStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            self.client.batch_execute(statement).await?;
        }
        Ok(())
    }

    async fn set_is_manager(&self, user: &str, is_manager: bool) -> Result<u64, StoreError> {
        self.execute(
            "UPDATE users SET is_manager = $1 WHERE name = $2",
            &[&is_manager, &user],
        )
        .await
    }

    async fn is_manager(&self, user: &str) -> Result<Option<bool>, StoreError> {
        let row = self
            .client
            .query_opt("SELECT is_manager FROM users WHERE name = $1", &[&user])
            .await?;
        Ok(row.map(|row| row.try_get("is_manager")).transpose()?)
    }

    async fn set_password_hash(&self, user: &str, hash: &str) -> Result<u64, StoreError> {
        self.execute("UPDATE users SET password_hash = $1 WHERE name = $2", &[&hash, &user])
            .await
    }

    async fn password_hash(&self, user: &str) -> Result<Option<String>, StoreError> {
        let row = self
            .client
            .query_opt("SELECT password_hash FROM users WHERE name = $1", &[&user])
            .await?;
        Ok(row.map(|row| row.try_get("password_hash")).transpose()?)
    }

    async fn set_owner(&self, pid: ProjectId, user: &str) -> Result<u64, StoreError> {
        self.execute("UPDATE owns SET name = $1 WHERE pid = $2", &[&user, &pid.get()])
            .await
    }

    async fn owner(&self, pid: ProjectId) -> Result<Option<String>, StoreError> {
        let row = self
            .client
            .query_opt("SELECT name FROM owns WHERE pid = $1", &[&pid.get()])
            .await?;
        Ok(row.map(|row| row.try_get("name")).transpose()?)
    }

    fn user_names(&self) -> BoxStream<'_, Result<String, StoreError>> {
        self.stream("SELECT name FROM users", Vec::new(), |row| Ok(row.try_get("name")?))
    }

    fn projects(&self) -> BoxStream<'_, Result<ProjectSummary, StoreError>> {
        self.stream("SELECT id, name FROM projects", Vec::new(), project_summary)
    }

    fn owned_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<ProjectSummary, StoreError>> {
        self.stream(
            r#"
            SELECT projects.id AS id, projects.name AS name
            FROM owns JOIN projects ON projects.id = owns.pid
            WHERE owns.name = $1
            "#,
            vec![user],
            project_summary,
        )
    }

    async fn delete_user(&self, user: &str) -> Result<u64, StoreError> {
        self.execute("DELETE FROM users WHERE name = $1", &[&user]).await
    }

    async fn delete_project_rows(
        &self,
        table: ProjectTable,
        pid: ProjectId,
    ) -> Result<u64, StoreError> {
        let statement = match table {
            ProjectTable::Views => "DELETE FROM views WHERE pid = $1",
            ProjectTable::Owns => "DELETE FROM owns WHERE pid = $1",
            ProjectTable::Projects => "DELETE FROM projects WHERE id = $1",
        };
        self.execute(statement, &[&pid.get()]).await
    }
}
