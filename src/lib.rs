/// MEL admin: privileged maintenance for the MEL project-management backend
///
/// Promotes and demotes managers, resets passwords, transfers and deletes
/// projects, lists users and projects, initialises the schema and hands off to
/// the server. One database connection is opened per process.

// Environment-driven configuration
pub mod config;

// Typed command-line verbs
pub mod cli;

// Store access trait and SQLite/PostgreSQL backends
pub mod store;

// Password hashing
pub mod credentials;

// Verb dispatch against a store
pub mod commands;

// `serve` hand-off
pub mod server;

pub use cli::{Cli, Command, DeleteTarget};
pub use commands::{CommandError, Dispatcher, Outcome};
pub use config::Config;
pub use store::{AdminStore, ProjectId, Store};

use anyhow::{Context, Result};

/// Open the store, run `command`, and release the connection
///
/// The connection is closed on every path; for `serve` the server owns it and
/// closes it when it stops.
pub async fn run(command: Command, config: Config) -> Result<()> {
    let store = Store::open(&config.database)
        .await
        .context("Error opening DB")?;

    let outcome = Dispatcher::new(&store, config.statement_timeout)
        .execute(command, &mut std::io::stdout(), &mut std::io::stderr())
        .await;

    match outcome {
        Ok(Outcome::Serve { port }) => server::start_server(&config.server, port, store).await,
        Ok(Outcome::Done) => {
            store.close().await;
            Ok(())
        }
        Err(e) => {
            store.close().await;
            Err(e.into())
        }
    }
}
