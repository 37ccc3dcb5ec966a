//! Command-line surface
//!
//! Every verb is a variant of [`Command`] carrying its typed arguments, so an
//! invocation is fully validated before any connection is opened.

use crate::store::ProjectId;
use clap::{Parser, Subcommand};
use std::{ffi::OsString, io::Write};

const ENVIRONMENT_HELP: &str = "\
Environment:
  DATABASE_URL                connection string for the primary store
  DATABASE_TYPE               driver for DATABASE_URL: postgres (default) or sqlite
  MEL_DATA_DIR                directory of the local database when DATABASE_URL is unset
                              [default: data]
  MEL_HOST                    bind address used by `serve` [default: 127.0.0.1]
  MEL_LOG_LEVEL               error, warn, info, debug or trace [default: warn]
  MEL_STATEMENT_TIMEOUT_SECS  upper bound on each statement [default: 30]";

/// Perform maintenance actions on a MEL backend database that need extra authority
#[derive(Debug, Parser)]
#[command(
    name = "mel-admin",
    version,
    after_help = ENVIRONMENT_HELP,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse `args`, sending usage, help and version text to `out`
    ///
    /// On anything other than a runnable command, returns the exit code: 0 for
    /// `--help`/`--version`, 2 for usage errors.
    pub fn parse_or_usage<I, T, W>(args: I, out: &mut W) -> Result<Self, u8>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
        W: Write,
    {
        Self::try_parse_from(args).map_err(|e| {
            let _ = write!(out, "{}", e.render());
            let _ = out.flush();
            u8::try_from(e.exit_code()).unwrap_or(2)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Mark the given user as a manager
    Bless { user: String },
    /// Mark the given user as a client (undo a bless)
    Curse { user: String },
    /// Reset the password for the given user
    Password { user: String, pass: String },
    /// Transfer the project from its current manager to the given user
    Transfer {
        #[arg(value_name = "PROJECT")]
        pid: ProjectId,
        user: String,
    },
    /// List the names of all users
    Users,
    /// List project ids and names, only those owned by USER if given
    Projects { user: Option<String> },
    /// Delete the given user or project
    #[command(subcommand)]
    Delete(DeleteTarget),
    /// Run the server, defaulting to port 8080
    Serve {
        #[arg(default_value_t = 8080)]
        port: u16,
    },
    /// Initialise a new database
    Init,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum DeleteTarget {
    /// Delete a user row; projects it owns or views are left in place
    User { user: String },
    /// Delete a project together with its owns and views rows
    Project {
        #[arg(value_name = "PROJECT")]
        pid: ProjectId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("mel-admin").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    fn pid(id: i32) -> ProjectId {
        ProjectId::new(id).unwrap()
    }

    #[test]
    fn parses_every_verb() {
        assert_eq!(parse(&["bless", "alice"]).unwrap(), Command::Bless { user: "alice".into() });
        assert_eq!(parse(&["curse", "alice"]).unwrap(), Command::Curse { user: "alice".into() });
        assert_eq!(
            parse(&["password", "bob", "s3cret"]).unwrap(),
            Command::Password { user: "bob".into(), pass: "s3cret".into() }
        );
        assert_eq!(
            parse(&["transfer", "3", "bob"]).unwrap(),
            Command::Transfer { pid: pid(3), user: "bob".into() }
        );
        assert_eq!(parse(&["users"]).unwrap(), Command::Users);
        assert_eq!(parse(&["projects"]).unwrap(), Command::Projects { user: None });
        assert_eq!(
            parse(&["projects", "alice"]).unwrap(),
            Command::Projects { user: Some("alice".into()) }
        );
        assert_eq!(
            parse(&["delete", "user", "bob"]).unwrap(),
            Command::Delete(DeleteTarget::User { user: "bob".into() })
        );
        assert_eq!(
            parse(&["delete", "project", "0"]).unwrap(),
            Command::Delete(DeleteTarget::Project { pid: pid(0) })
        );
        assert_eq!(parse(&["init"]).unwrap(), Command::Init);
    }

    #[test]
    fn serve_defaults_to_8080() {
        assert_eq!(parse(&["serve"]).unwrap(), Command::Serve { port: 8080 });
        assert_eq!(parse(&["serve", "9000"]).unwrap(), Command::Serve { port: 9000 });
        assert!(parse(&["serve", "http"]).is_err());
    }

    #[test]
    fn invalid_pid_is_rejected_at_parse_time() {
        let err = parse(&["transfer", "abc", "alice"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        assert!(parse(&["transfer", "-1", "alice"]).is_err());
        assert!(parse(&["delete", "project", "x1"]).is_err());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(parse(&["bless"]).is_err());
        assert!(parse(&["bless", "a", "b"]).is_err());
        assert!(parse(&["password", "bob"]).is_err());
        assert!(parse(&["users", "extra"]).is_err());
        assert!(parse(&["projects", "a", "b"]).is_err());
        assert!(parse(&["delete", "user"]).is_err());
        assert!(parse(&["delete", "group", "x"]).is_err());
        assert!(parse(&["init", "now"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
    }

    #[test]
    fn no_arguments_prints_usage() {
        let err = parse(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand);
    }

    #[test]
    fn usage_is_written_to_the_given_writer() {
        let mut out = Vec::new();
        assert_eq!(Cli::parse_or_usage(["mel-admin"], &mut out).unwrap_err(), 2);
        assert!(String::from_utf8(out).unwrap().contains("Usage"));

        let mut out = Vec::new();
        assert_eq!(Cli::parse_or_usage(["mel-admin", "bless"], &mut out).unwrap_err(), 2);
        assert!(String::from_utf8(out).unwrap().contains("Usage"));

        let mut out = Vec::new();
        assert_eq!(Cli::parse_or_usage(["mel-admin", "--help"], &mut out).unwrap_err(), 0);
        assert!(String::from_utf8(out).unwrap().contains("MEL_STATEMENT_TIMEOUT_SECS"));

        let mut out = Vec::new();
        let cli = Cli::parse_or_usage(["mel-admin", "users"], &mut out).unwrap();
        assert_eq!(cli.command, Command::Users);
        assert!(out.is_empty());
    }
}
