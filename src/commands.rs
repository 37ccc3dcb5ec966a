/// Command dispatcher
///
/// Runs one parsed [`Command`] against an [`AdminStore`]. Listings go to `out`;
/// per-step failures of the project cascade go to `err` as they happen. Every
/// store call and every row fetch is bounded by the statement timeout.

use crate::{
    cli::{Command, DeleteTarget},
    credentials::{self, CredentialError},
    store::{AdminStore, ProjectId, ProjectSummary, ProjectTable, StoreError},
};
use futures::{stream::BoxStream, Future, TryStreamExt};
use std::{io::Write, time::Duration};
use thiserror::Error;

/// What the caller should do once a command has been dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Hand the open store to the server on `port`
    Serve { port: u16 },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Error {action}: {error}")]
    Store { action: &'static str, error: StoreError },
    #[error("Error resetting password: {0}")]
    Credential(CredentialError),
    #[error("Error deleting project {pid}: {failed} of {total} steps failed")]
    Cascade {
        pid: ProjectId,
        failed: usize,
        total: usize,
    },
    #[error("Error writing output")]
    Output(#[from] std::io::Error),
}

impl CommandError {
    fn store(action: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |error| Self::Store { action, error }
    }
}

pub struct Dispatcher<'s, S> {
    store: &'s S,
    statement_timeout: Duration,
}

impl<'s, S: AdminStore> Dispatcher<'s, S> {
    pub fn new(store: &'s S, statement_timeout: Duration) -> Self {
        Self {
            store,
            statement_timeout,
        }
    }

    pub async fn execute<O, E>(
        &self,
        command: Command,
        out: &mut O,
        err: &mut E,
    ) -> Result<Outcome, CommandError>
    where
        O: Write,
        E: Write,
    {
        match command {
            Command::Bless { user } => self.set_role(&user, true).await?,
            Command::Curse { user } => self.set_role(&user, false).await?,
            Command::Password { user, pass } => self.password(&user, &pass).await?,
            Command::Transfer { pid, user } => self.transfer(pid, &user).await?,
            Command::Users => {
                let action = "listing users";
                self.print_each(self.store.user_names(), action, |name| writeln!(out, "{:?}", name))
                    .await?
            }
            Command::Projects { user: None } => {
                self.print_each(self.store.projects(), "listing projects", |p| {
                    print_project(out, &p)
                })
                .await?
            }
            Command::Projects { user: Some(user) } => {
                self.print_each(self.store.owned_projects(&user), "listing projects", |p| {
                    print_project(out, &p)
                })
                .await?
            }
            Command::Delete(DeleteTarget::User { user }) => self.delete_user(&user).await?,
            Command::Delete(DeleteTarget::Project { pid }) => self.delete_project(pid, err).await?,
            Command::Init => {
                self.bounded(self.store.init_schema())
                    .await
                    .map_err(CommandError::store("initialising database"))?;
                tracing::info!("✅ Database schema ready");
            }
            Command::Serve { port } => return Ok(Outcome::Serve { port }),
        }
        Ok(Outcome::Done)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.statement_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.statement_timeout))?
    }

    /// Write each row as it arrives; a failed fetch stops the listing
    async fn print_each<T, F>(
        &self,
        mut rows: BoxStream<'_, Result<T, StoreError>>,
        action: &'static str,
        mut print: F,
    ) -> Result<(), CommandError>
    where
        F: FnMut(T) -> std::io::Result<()>,
    {
        while let Some(row) = self
            .bounded(rows.try_next())
            .await
            .map_err(CommandError::store(action))?
        {
            print(row)?;
        }
        Ok(())
    }

    async fn set_role(&self, user: &str, is_manager: bool) -> Result<(), CommandError> {
        let action = if is_manager { "blessing user" } else { "cursing user" };
        let updated = self
            .bounded(self.store.set_is_manager(user, is_manager))
            .await
            .map_err(CommandError::store(action))?;
        if updated == 0 {
            tracing::warn!("no user named {:?}; nothing changed", user);
        } else {
            tracing::info!(user, is_manager, "role updated");
        }
        Ok(())
    }

    async fn password(&self, user: &str, password: &str) -> Result<(), CommandError> {
        let reset = credentials::set_password(self.store, user, password);
        let updated = match tokio::time::timeout(self.statement_timeout, reset).await {
            Ok(result) => result.map_err(CommandError::Credential)?,
            Err(_) => {
                let timeout = StoreError::Timeout(self.statement_timeout);
                return Err(CommandError::store("resetting password")(timeout));
            }
        };
        if updated == 0 {
            tracing::warn!("no user named {:?}; password not set", user);
        } else {
            tracing::info!(user, "password reset");
        }
        Ok(())
    }

    async fn transfer(&self, pid: ProjectId, user: &str) -> Result<(), CommandError> {
        let updated = self
            .bounded(self.store.set_owner(pid, user))
            .await
            .map_err(CommandError::store("updating the owner"))?;
        if updated == 0 {
            tracing::warn!("project {} has no owner row; nothing transferred", pid);
        } else {
            tracing::info!(%pid, user, "project transferred");
        }
        Ok(())
    }

    async fn delete_user(&self, user: &str) -> Result<(), CommandError> {
        let deleted = self
            .bounded(self.store.delete_user(user))
            .await
            .map_err(CommandError::store("deleting user"))?;
        if deleted == 0 {
            tracing::warn!("no user named {:?}; nothing deleted", user);
        }
        Ok(())
    }

    /// Clear `views`, then `owns`, then the project row. Every step runs even
    /// if an earlier one failed.
    async fn delete_project<E: Write>(
        &self,
        pid: ProjectId,
        err: &mut E,
    ) -> Result<(), CommandError> {
        let mut failed = 0;
        for table in ProjectTable::CASCADE_ORDER {
            match self.bounded(self.store.delete_project_rows(table, pid)).await {
                Ok(rows) => tracing::debug!(%pid, %table, rows, "cascade step done"),
                Err(e) => {
                    failed += 1;
                    writeln!(err, "Error deleting project: {}: {}", table, e)?;
                }
            }
        }
        if failed > 0 {
            return Err(CommandError::Cascade {
                pid,
                failed,
                total: ProjectTable::CASCADE_ORDER.len(),
            });
        }
        Ok(())
    }
}

fn print_project<O: Write>(out: &mut O, project: &ProjectSummary) -> std::io::Result<()> {
    writeln!(out, "{}: {:?}", project.id, project.name)
}
